use crate::credentials::{CredentialError, ServiceAccountKey};
use crate::warehouse::ExecutionError;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Serialize, PartialEq)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn claims_for(key: &ServiceAccountKey, now: DateTime<Utc>) -> Claims<'_> {
    let iat = now.timestamp();
    Claims {
        iss: &key.client_email,
        scope: BIGQUERY_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    }
}

/// Signs the RS256 assertion for the JWT bearer grant.
pub fn build_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, ExecutionError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
        CredentialError::Malformed(format!("private_key is not a valid RSA key: {}", e))
    })?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    jsonwebtoken::encode(&header, &claims_for(key, now), &encoding_key)
        .map_err(|e| ExecutionError::Failed(format!("Failed to sign token request: {}", e)))
}

/// Exchanges the service account key for a short-lived OAuth access token.
pub async fn fetch_access_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<String, ExecutionError> {
    let assertion = build_assertion(key, Utc::now())?;
    debug!("Requesting access token for {}", key.client_email);

    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| ExecutionError::Transient(format!("Token request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Token endpoint responded with status code: {} - {}", status, body);
        return Err(if status.is_server_error() {
            ExecutionError::Transient(body)
        } else {
            ExecutionError::Unauthorized(format!("token request rejected ({}): {}", status, body))
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ExecutionError::Failed(format!("Failed to parse token response: {}", e)))?;

    Ok(token.access_token)
}
