//! Extraction provider abstraction.
//!
//! An [`ExtractionClient`] sends a document plus a natural-language
//! instruction to a content-understanding model and returns whatever text
//! the model produced. The caller owns all parsing of that text.
//!
//! # Retry policy
//!
//! Clients make exactly one attempt per call. There is no retry, no backoff,
//! and no fallback model. A transport error, a non-2xx status, or a response
//! without text is returned to the caller as a [`ProviderError`]
//! immediately. Callers that want retries wrap the whole operation.
//!
//! # Providers
//!
//! | `extraction.provider` | Client |
//! |-----------------------|--------|
//! | `gemini` | [`GeminiClient`] (`models/{model}:generateContent`) |
//! | `disabled` | none; extraction fails with a configuration error |

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ExtractionConfig;

/// Failure talking to the extraction provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to extraction provider failed: {0}")]
    Transport(String),

    #[error("extraction provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("extraction provider response was malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Submit `bytes` (of type `mime_type`) with `instruction`, returning the
    /// model's raw text. Single attempt; see the module docs.
    async fn generate(
        &self,
        instruction: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ProviderError>;
}

/// Build the configured client.
///
/// Returns `Ok(None)` when extraction is disabled or the credential is not
/// set; extraction calls then fail with a configuration error instead of
/// reaching the network.
pub fn build_client(config: &ExtractionConfig) -> Result<Option<Arc<dyn ExtractionClient>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "gemini" => match &config.api_key {
            Some(key) => {
                let client: Arc<dyn ExtractionClient> =
                    Arc::new(GeminiClient::new(config, key.clone())?);
                Ok(Some(client))
            }
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "extraction credential not set; processing receipts will fail"
                );
                Ok(None)
            }
        },
        other => bail!("Unknown extraction provider: {}", other),
    }
}

// ============ Gemini ============

/// Client for the Gemini `generateContent` REST endpoint.
///
/// The document is sent inline as base64 next to the instruction text.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ExtractionConfig, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// Request body for `generateContent` with one text part and one inline file.
pub fn gemini_request_body(instruction: &str, bytes: &[u8], mime_type: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": instruction },
                {
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                    }
                }
            ]
        }]
    })
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(json: &Value) -> Result<String, ProviderError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            ProviderError::Malformed(reason.to_string())
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| ProviderError::Malformed("candidate has no content parts".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::Malformed("candidate has no text".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl ExtractionClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        instruction: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ProviderError> {
        let body = gemini_request_body(instruction, bytes, mime_type);

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_gemini_response(&json)
    }
}
