use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Error reading the uploaded file: {0}")]
    Malformed(String),

    #[error("Please upload a valid Google Service Account Key file.")]
    MissingServiceAccount,

    #[error("Please enter your language model API key.")]
    MissingApiKey,
}

/// A Google service account key file, validated on upload.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(bytes: &[u8]) -> Result<Self, CredentialError> {
        let key: ServiceAccountKey = serde_json::from_slice(bytes)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        key.validate()?;
        Ok(key)
    }

    fn validate(&self) -> Result<(), CredentialError> {
        if self.account_type != "service_account" {
            return Err(CredentialError::Malformed(format!(
                "expected a key of type \"service_account\", found \"{}\"",
                self.account_type
            )));
        }

        let required = [
            ("project_id", &self.project_id),
            ("private_key", &self.private_key),
            ("client_email", &self.client_email),
            ("token_uri", &self.token_uri),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CredentialError::Malformed(format!(
                    "field `{}` is empty",
                    field
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Opaque bearer key for the language model API.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Secrets supplied by the user for the lifetime of one session. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    service_account: Option<ServiceAccountKey>,
    api_key: Option<ApiKey>,
}

impl CredentialStore {
    /// Parses and stores an uploaded key file. On failure the store is left as it was.
    pub fn upload_service_account(
        &mut self,
        bytes: &[u8],
    ) -> Result<&ServiceAccountKey, CredentialError> {
        let key = ServiceAccountKey::from_json(bytes).map_err(|e| {
            warn!("Rejected service account upload: {}", e);
            e
        })?;
        info!(
            project_id = %key.project_id,
            client_email = %key.client_email,
            "Service account key accepted"
        );
        Ok(self.service_account.insert(key))
    }

    /// Blank input removes the key, the same as emptying the key box.
    pub fn set_api_key(&mut self, raw: &str) {
        self.api_key = ApiKey::new(raw);
    }

    pub fn service_account(&self) -> Option<&ServiceAccountKey> {
        self.service_account.as_ref()
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn require_service_account(&self) -> Result<&ServiceAccountKey, CredentialError> {
        self.service_account
            .as_ref()
            .ok_or(CredentialError::MissingServiceAccount)
    }

    pub fn require_api_key(&self) -> Result<&ApiKey, CredentialError> {
        self.api_key.as_ref().ok_or(CredentialError::MissingApiKey)
    }
}
