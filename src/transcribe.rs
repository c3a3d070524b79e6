//! Speech-to-text transcription client.

use crate::audio::capture::RecordedAudio;
use crate::config::TranscribeConfig;
use crate::error::{Result, VoiceError};

/// HTTP client for the transcription endpoint.
///
/// The endpoint accepts a raw audio body and responds with
/// `{"transcript": ...}`, or an `{"error": ...}` body with an HTTP-style
/// status on failure.
#[derive(Debug, Clone)]
pub struct TranscribeClient {
    url: String,
    client: reqwest::Client,
}

impl TranscribeClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: &TranscribeConfig) -> Self {
        Self {
            url: config.url.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Transcribe a finalized capture payload.
    ///
    /// An utterance the service could not make out comes back as an empty
    /// transcript, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the endpoint responds with
    /// a non-success status.
    pub async fn transcribe(&self, audio: &RecordedAudio) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "audio/wav")
            .body(audio.wav.clone())
            .send()
            .await
            .map_err(|e| VoiceError::Transcribe(format!("transcription request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Transcribe(format!(
                "transcription returned {status}: {}",
                extract_error_message(&body)
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Transcribe(format!("invalid transcription response: {e}")))?;

        Ok(payload
            .get("transcript")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_owned())
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

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn error_message_from_json_body() {
        assert_eq!(
            extract_error_message("{\"error\":\"Empty audio data\"}"),
            "Empty audio data"
        );
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(extract_error_message("bad gateway"), "bad gateway");
    }
}
