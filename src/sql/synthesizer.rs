use crate::credentials::ApiKey;
use crate::llm::{LanguageModel, LlmError};
use crate::schema::TableSchema;
use thiserror::Error;
use tracing::{debug, info};

const SQL_PREAMBLE: &str = "You are an AI assistant that transforms user questions into SQL queries \
to retrieve data from a BigQuery database.
Below is the detailed schema of the database, including table names, column names, data types, and descriptions.
Use this information to generate accurate SQL queries based on user input.
### Data Dictionary
";

const GREETING_PROMPT: &str = "Greet the user as a friendly and knowledgeable data engineer. \
Introduce yourself (you are AI assistant) and let the user know you're here to assist with \
any questions they may have about transforming user questions into SQL queries to retrieve \
data from a BigQuery database.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Error generating AI response: {0}")]
pub struct GenerationError(#[from] pub LlmError);

/// Turns one utterance into candidate SQL with a single language model call.
pub struct QuerySynthesizer {
    schema_description: String,
}

impl QuerySynthesizer {
    pub fn new(schema: &TableSchema) -> Self {
        Self {
            schema_description: schema.to_data_dictionary(),
        }
    }

    pub fn prompt_for(&self, utterance: &str) -> String {
        format!(
            "{}\n{}\nUser Input: {}\n",
            SQL_PREAMBLE, self.schema_description, utterance
        )
    }

    /// Returns the generated text untouched; sanitizing is the caller's job.
    pub async fn synthesize(
        &self,
        llm: &dyn LanguageModel,
        api_key: &ApiKey,
        utterance: &str,
    ) -> Result<String, GenerationError> {
        info!("Synthesizing SQL for: {}", utterance);
        let raw = llm.generate(api_key, &self.prompt_for(utterance)).await?;
        debug!("Generated: {}", raw);
        Ok(raw)
    }

    pub async fn greet(
        &self,
        llm: &dyn LanguageModel,
        api_key: &ApiKey,
    ) -> Result<String, GenerationError> {
        let greeting = llm.generate(api_key, GREETING_PROMPT).await?;
        Ok(greeting.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubLlm;

    fn key() -> ApiKey {
        ApiKey::new("test-key").unwrap()
    }

    #[test]
    fn prompt_combines_preamble_schema_and_utterance() {
        let synthesizer = QuerySynthesizer::new(&TableSchema::inv_transaction());
        let prompt = synthesizer.prompt_for("Top 5 stores by revenue");

        assert!(prompt.starts_with("You are an AI assistant that transforms user questions"));
        assert!(prompt.contains("### Data Dictionary"));
        assert!(prompt.contains("| Zoning_Region | STRING | Region |"));
        assert!(prompt.ends_with("\nUser Input: Top 5 stores by revenue\n"));
    }

    #[tokio::test]
    async fn returns_raw_generation() {
        let llm = StubLlm::replying(["```sql\nSELECT 1\n```\n"]);
        let synthesizer = QuerySynthesizer::new(&TableSchema::inv_transaction());

        let raw = synthesizer.synthesize(&llm, &key(), "one").await.unwrap();

        assert_eq!(raw, "```sql\nSELECT 1\n```\n");
        assert_eq!(llm.prompts().len(), 1);
        assert!(llm.prompts()[0].ends_with("User Input: one\n"));
    }

    #[tokio::test]
    async fn gateway_failure_becomes_generation_error() {
        let llm = StubLlm::failing(LlmError::QuotaExceeded("daily limit".into()));
        let synthesizer = QuerySynthesizer::new(&TableSchema::inv_transaction());

        let err = synthesizer.synthesize(&llm, &key(), "one").await.unwrap_err();

        assert_eq!(err, GenerationError(LlmError::QuotaExceeded("daily limit".into())));
        assert_eq!(
            err.to_string(),
            "Error generating AI response: quota exceeded: daily limit"
        );
    }

    #[tokio::test]
    async fn greeting_uses_fixed_prompt_and_is_trimmed() {
        let llm = StubLlm::replying(["\n  Hello! I'm your data engineer.  \n"]);
        let synthesizer = QuerySynthesizer::new(&TableSchema::inv_transaction());

        let greeting = synthesizer.greet(&llm, &key()).await.unwrap();

        assert_eq!(greeting, "Hello! I'm your data engineer.");
        assert!(llm.prompts()[0].starts_with("Greet the user"));
    }
}
