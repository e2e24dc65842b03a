pub mod providers;

use crate::config::LlmConfig;
use crate::credentials::ApiKey;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("invalid API key: {0}")]
    InvalidKey(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("LLM connection error: {0}")]
    Transient(String),

    #[error("LLM response error: {0}")]
    ResponseError(String),

    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Classifies a non-success HTTP reply from a generation endpoint.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidKey(message),
            StatusCode::BAD_REQUEST
                if message.contains("API_KEY_INVALID") || message.contains("API key not valid") =>
            {
                LlmError::InvalidKey(message)
            }
            StatusCode::TOO_MANY_REQUESTS => LlmError::QuotaExceeded(message),
            s if s.is_server_error() => LlmError::Transient(message),
            s => LlmError::ResponseError(format!(
                "API responded with status code {}: {}",
                s, message
            )),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::ResponseError(err.to_string())
        } else {
            LlmError::Transient(err.to_string())
        }
    }
}

/// A hosted text generation endpoint. One prompt in, generated text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmManager {
    backend: String,
    generator: Box<dyn LanguageModel>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn LanguageModel> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self {
            backend: config.backend.clone(),
            generator,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

#[async_trait]
impl LanguageModel for LlmManager {
    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String, LlmError> {
        self.generator.generate(api_key, prompt).await
    }
}
