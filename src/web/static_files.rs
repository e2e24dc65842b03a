use axum::{
    extract::Path,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

pub async fn static_handler(Path(path): Path<String>, headers: HeaderMap) -> Response {
    serve_static_file(&path, headers.get(header::IF_NONE_MATCH))
}

// Embedded assets, revalidated by content hash
pub fn serve_static_file(path: &str, if_none_match: Option<&HeaderValue>) -> Response {
    let path = path.trim_start_matches('/');

    let Some(content) = StaticAssets::get(path) else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    let hash: String = content
        .metadata
        .sha256_hash()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    let etag = format!("\"{}\"", hash);

    if if_none_match.is_some_and(|value| value.as_bytes() == etag.as_bytes()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        content.data.into_owned(),
    )
        .into_response()
}
