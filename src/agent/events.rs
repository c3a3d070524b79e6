//! Decoded agent protocol events.
//!
//! The wire protocol tags events with SCREAMING_SNAKE_CASE kinds, either in
//! the stream's `event:` field or as a `type` field inside the JSON payload.
//! Only the kinds the conversation core reacts to are decoded; everything
//! else (message framing markers, future kinds) is dropped by the parser.

use crate::state::ConversationState;

/// One decoded event from the agent's response stream.
///
/// Produced transiently by the stream parser and consumed immediately by
/// the state reducer; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The agent has started processing the run.
    RunStarted,
    /// The run completed normally.
    RunFinished,
    /// A fragment of the assistant's response text.
    TextDelta {
        /// Text to append to the accumulated response.
        delta: String,
    },
    /// A full replacement of the conversation state.
    StateSnapshot {
        /// The replacement state.
        snapshot: ConversationState,
    },
    /// An incremental state patch. Reserved: the reducer does not apply
    /// these (see [`crate::state::StateMachine::apply`]).
    StateDelta {
        /// The opaque patch payload.
        delta: serde_json::Value,
    },
    /// The agent has started executing a tool.
    ToolCallStart,
    /// The agent has finished executing a tool.
    ToolCallEnd,
    /// The run failed on the agent side.
    RunError {
        /// Human-readable failure description.
        message: String,
    },
}

/// Decode a terminated stream frame into an [`AgentEvent`].
///
/// `event_type` is the stream-level `event:` field when present; otherwise
/// the payload's own `type` field names the kind. Returns `None` for
/// malformed payloads and unhandled kinds — both are dropped silently.
pub(crate) fn decode_frame(event_type: Option<&str>, data: &str) -> Option<AgentEvent> {
    let payload: serde_json::Value = serde_json::from_str(data).ok()?;

    let kind = match event_type.filter(|t| !t.is_empty()) {
        Some(t) => t.to_owned(),
        None => payload.get("type")?.as_str()?.to_owned(),
    };

    match kind.as_str() {
        "RUN_STARTED" => Some(AgentEvent::RunStarted),
        "RUN_FINISHED" => Some(AgentEvent::RunFinished),
        "TEXT_MESSAGE_CONTENT" => {
            let delta = payload
                .get("delta")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_owned();
            Some(AgentEvent::TextDelta { delta })
        }
        "STATE_SNAPSHOT" => {
            let snapshot = payload.get("snapshot")?;
            let snapshot: ConversationState = serde_json::from_value(snapshot.clone()).ok()?;
            Some(AgentEvent::StateSnapshot { snapshot })
        }
        "STATE_DELTA" => Some(AgentEvent::StateDelta {
            delta: payload
                .get("delta")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }),
        "TOOL_CALL_START" => Some(AgentEvent::ToolCallStart),
        "TOOL_CALL_END" => Some(AgentEvent::ToolCallEnd),
        "RUN_ERROR" => {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Agent error")
                .to_owned();
            Some(AgentEvent::RunError { message })
        }
        _ => None,
    }
}
