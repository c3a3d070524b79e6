//! Text-to-speech synthesis client.

use crate::config::SynthesisConfig;
use crate::error::{Result, VoiceError};

/// HTTP client for the speech-synthesis endpoint.
///
/// The endpoint accepts `{"text": ...}` and responds with a compressed
/// audio payload, or an `{"error": ...}` body on failure.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    url: String,
    client: reqwest::Client,
}

impl SynthesisClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            url: config.url.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Request synthesized audio for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the endpoint responds with a
    /// non-success status, or the payload is empty.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "synthesis returned {status}: {}",
                extract_error_message(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read audio payload: {e}")))?;

        if bytes.is_empty() {
            return Err(VoiceError::Synthesis("empty audio payload".into()));
        }

        Ok(bytes.to_vec())
    }
}

/// Extract a message from an `{"error": ...}` response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}
