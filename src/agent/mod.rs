//! Streaming agent client.
//!
//! Issues one run request against the remote agent endpoint and drives the
//! response event stream: bytes → [`sse::EventStreamParser`] →
//! [`events::AgentEvent`], delivered to the caller in arrival order. The
//! request carries the full message history, a fresh correlation id, and
//! the caller's current conversation state as session continuity context.

pub mod events;
pub mod sse;

use crate::agent::events::AgentEvent;
use crate::agent::sse::EventStreamParser;
use crate::config::AgentConfig;
use crate::conversation::messages::Message;
use crate::error::{Result, VoiceError};
use crate::state::ConversationState;
use futures_util::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// How a run ended from the transport's point of view.
///
/// Cancellation is a normal outcome, not an error: a superseded or reset
/// run must never surface a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The server closed the stream normally.
    Completed,
    /// The caller invalidated the request token mid-run.
    Cancelled,
}

/// HTTP client for the agent's event-stream endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    url: String,
    client: reqwest::Client,
}

impl AgentClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: &AgentConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: config.url.clone(),
            client,
        }
    }

    /// Execute one run and deliver each decoded event to `on_event`.
    ///
    /// The cancellation token is checked before every delivery: once it
    /// fires, no further event reaches the caller, so stale events from a
    /// superseded run cannot mutate live state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server responds with a
    /// non-success status, or the stream aborts mid-run.
    pub async fn run(
        &self,
        messages: &[Message],
        state: &ConversationState,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(AgentEvent),
    ) -> Result<RunOutcome> {
        let body = build_run_body(messages, state);
        info!("starting agent run ({} messages)", messages.len());

        let request = self
            .client
            .post(&self.url)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            res = request => {
                res.map_err(|e| VoiceError::Agent(format!("agent request failed: {e}")))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Agent(format!(
                "agent returned {status}: {detail}"
            )));
        }

        let mut parser = EventStreamParser::new();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Ok(RunOutcome::Cancelled),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for event in parser.push(&bytes) {
                        if cancel.is_cancelled() {
                            return Ok(RunOutcome::Cancelled);
                        }
                        on_event(event);
                    }
                }
                Some(Err(e)) => {
                    return Err(VoiceError::Agent(format!("stream read error: {e}")));
                }
                None => {
                    if let Some(event) = parser.flush()
                        && !cancel.is_cancelled()
                    {
                        on_event(event);
                    }
                    return Ok(RunOutcome::Completed);
                }
            }
        }
    }
}

/// Build the run request body: full history (each message with a generated
/// id), a fresh run correlation id, and the current state.
fn build_run_body(messages: &[Message], state: &ConversationState) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": Uuid::new_v4().to_string(),
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "messages": messages,
        "run_id": Uuid::new_v4().to_string(),
        "state": state,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::conversation::messages::Role;

    #[test]
    fn run_body_carries_history_and_state() {
        let messages = vec![
            Message {
                role: Role::User,
                content: "show me worlds".into(),
            },
            Message {
                role: Role::Assistant,
                content: "Here are three worlds.".into(),
            },
        ];
        let mut state = ConversationState::default();
        state.breadcrumbs.push("worlds".into());

        let body = build_run_body(&messages, &state);

        let sent = body["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["role"], "user");
        assert_eq!(sent[0]["content"], "show me worlds");
        assert_eq!(sent[1]["role"], "assistant");
        assert!(sent[0]["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(body["run_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(body["state"]["breadcrumbs"][0], "worlds");
    }

    #[test]
    fn run_ids_are_unique_per_request() {
        let state = ConversationState::default();
        let a = build_run_body(&[], &state);
        let b = build_run_body(&[], &state);
        assert_ne!(a["run_id"], b["run_id"]);
    }
}
