// Remote moderation model over HTTP.
//
// POSTs the submission as JSON to `{base_url}/moderate` and expects a
// ModerationResult back. Transport and status failures are mapped onto the
// ModerationError taxonomy so the retry policy can decide what to retry:
// 429 and 5xx are transient, any other 4xx is a rejected request.
//
// The per-call timeout and the sanity checks on the returned verdict are
// applied by the pipeline, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::models::{ModerationRequest, ModerationResult};
use super::traits::ModerationModel;
use crate::errors::ModerationError;

/// Moderation model backed by a remote HTTP service.
pub struct HttpModerationModel {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpModerationModel {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("automod/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for the moderation model")?;

        Ok(Self {
            client,
            endpoint: format!("{}/moderate", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl ModerationModel for HttpModerationModel {
    async fn moderate(
        &self,
        request: &ModerationRequest,
    ) -> Result<ModerationResult, ModerationError> {
        let mut call = self.client.post(&self.endpoint).json(request);
        if let Some(ref key) = self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| ModerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModerationError::from_status(status.as_u16(), body)
                .unwrap_or_else(|| ModerationError::Internal(format!("unexpected status {status}"))));
        }

        let result: ModerationResult = response
            .json()
            .await
            .map_err(|e| ModerationError::MalformedPayload(e.to_string()))?;

        debug!(
            content_id = %result.content_id,
            confidence = result.confidence,
            flags = result.flags.len(),
            pii = result.detected_pii.len(),
            "Moderated content"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let model = HttpModerationModel::new("https://mod.example.com/", None).unwrap();
        assert_eq!(model.endpoint, "https://mod.example.com/moderate");
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let model = HttpModerationModel::new("https://mod.example.com", Some(String::new())).unwrap();
        assert!(model.api_key.is_none());
    }
}
