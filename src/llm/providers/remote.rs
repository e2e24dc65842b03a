use crate::config::LlmConfig;
use crate::credentials::ApiKey;
use crate::llm::{LanguageModel, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Any OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

fn first_choice(response: PromptResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))
}

#[async_trait]
impl LanguageModel for RemoteLlmProvider {
    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: 2000,
        };

        info!("Sending request to {} with model: {}", self.api_url, self.model);
        debug!("Prompt: {}", prompt);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("API responded with status code: {} - {}", status, body);
            return Err(LlmError::from_status(status, body));
        }

        let prompt_response: PromptResponse = response.json().await?;
        first_choice(prompt_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_an_api_url() {
        let config = LlmConfig {
            backend: "remote".to_string(),
            api_url: None,
            ..LlmConfig::default()
        };
        assert!(matches!(
            RemoteLlmProvider::new(&config),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[test]
    fn returns_first_choice_verbatim() {
        let response: PromptResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "```sql\nSELECT 1\n```"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "```sql\nSELECT 1\n```");
    }

    #[test]
    fn no_choices_is_an_error() {
        let response: PromptResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(first_choice(response).is_err());
    }
}
