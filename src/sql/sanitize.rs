const FENCE: &str = "```";

/// Strips markdown fences and surrounding whitespace from generated SQL.
///
/// A leading fence line (with or without a language tag) is dropped together
/// with a closing fence line; a fence opened and closed on one line is unwrapped
/// in place. Repeats until the text no longer starts with a fence, so the result
/// is a fixed point: `sanitize(sanitize(x)) == sanitize(x)`.
/// An empty result means there is nothing to execute.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();

    while text.starts_with(FENCE) {
        let Some((_, rest)) = text.split_once('\n') else {
            text = inline_body(text);
            continue;
        };

        text = match rest.rsplit_once('\n') {
            Some((body, last)) if last.trim_start().starts_with(FENCE) => body,
            Some(_) => rest,
            None if rest.trim_start().starts_with(FENCE) => "",
            None => rest,
        }
        .trim();
    }

    text.to_string()
}

/// Body of a single fenced line such as "```sql SELECT 1```".
fn inline_body(line: &str) -> &str {
    let body = line.strip_prefix(FENCE).unwrap_or(line);
    let body = body.strip_suffix(FENCE).unwrap_or(body).trim();

    match body.split_once(char::is_whitespace) {
        Some((tag, rest)) if tag.eq_ignore_ascii_case("sql") => rest.trim(),
        None if body.eq_ignore_ascii_case("sql") => "",
        _ => body,
    }
}
