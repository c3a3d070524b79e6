//! Conversation state and the event reducer.
//!
//! [`ConversationState`] is the single UI-facing state value for the active
//! conversation. [`StateMachine`] reduces decoded agent events into it and
//! tracks the derived signals (`is_streaming`, `is_tool_running`) that are
//! observable but deliberately not part of the state payload itself, so a
//! server snapshot can never clobber them.

use crate::agent::events::AgentEvent;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// High-level conversation status as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing in flight.
    #[default]
    Idle,
    /// An agent run is in progress.
    Thinking,
    /// Speech playback is active (composed by the orchestrator; a server
    /// snapshot may also carry it).
    Speaking,
}

/// An opaque, typed chunk of structured content for rich rendering.
///
/// The core never interprets `data`; ownership passes outward to the
/// rendering layer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPanel {
    /// Renderer-facing type tag.
    #[serde(rename = "type")]
    pub panel_type: String,
    /// Opaque structured payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The single live conversation state value.
///
/// Replaced wholesale by a snapshot event, field-mutated by delta/text
/// events. Round-trips through `STATE_SNAPSHOT` payloads and is sent back
/// verbatim with the next agent request as session continuity context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    /// Response text accumulated across the current run.
    pub response_text: String,
    /// Ordered panels emitted by the agent for the rendering layer.
    pub panels: Vec<UiPanel>,
    /// Identifier of the world currently in focus, if any.
    pub current_world_id: Option<String>,
    /// Display name of the world currently in focus, if any.
    pub current_world_name: Option<String>,
    /// Current conversation status.
    pub status: Status,
    /// Navigation/context trail surfaced to the user.
    pub breadcrumbs: Vec<String>,
}

/// Reduces agent events into [`ConversationState`].
///
/// Exactly one instance is alive per conversation, owned by the
/// coordinator, which is its only writer.
#[derive(Debug, Default)]
pub struct StateMachine {
    state: ConversationState,
    streaming: bool,
    tool_running: bool,
    error: Option<String>,
}

impl StateMachine {
    /// Create a machine in the initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current conversation state.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// True from request start until the request settles.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// True between a `ToolCallStart` and the matching `ToolCallEnd`.
    pub fn is_tool_running(&self) -> bool {
        self.tool_running
    }

    /// The most recent surfaced run error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Mark a new run as started: clear the previous response and error and
    /// show `thinking` immediately, without waiting for the first event.
    pub fn begin_run(&mut self) {
        self.streaming = true;
        self.error = None;
        self.state.response_text.clear();
        self.state.status = Status::Thinking;
    }

    /// Mark the current run as settled (completed, failed, or cancelled).
    ///
    /// Transport failures produce no terminal event, so the status is
    /// forced back to idle here if the reducer never saw one.
    pub fn settle_run(&mut self) {
        self.streaming = false;
        self.tool_running = false;
        if self.state.status == Status::Thinking {
            self.state.status = Status::Idle;
        }
    }

    /// Record a transport-level run failure for the caller.
    pub fn fail_run(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Apply one decoded agent event to the live state.
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::RunStarted => {
                self.state.status = Status::Thinking;
                self.state.response_text.clear();
            }
            AgentEvent::TextDelta { delta } => {
                self.state.response_text.push_str(delta);
            }
            AgentEvent::StateSnapshot { snapshot } => {
                self.state = snapshot.clone();
            }
            AgentEvent::StateDelta { .. } => {
                // Patch application is unimplemented pending a backend
                // contract for the delta format.
                warn!("state delta event received but not applied; state may be stale");
            }
            AgentEvent::ToolCallStart => {
                self.tool_running = true;
            }
            AgentEvent::ToolCallEnd => {
                self.tool_running = false;
            }
            AgentEvent::RunFinished => {
                self.state.status = Status::Idle;
            }
            AgentEvent::RunError { message } => {
                self.error = Some(message.clone());
                self.state.status = Status::Idle;
            }
        }
    }

    /// Return everything to the initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
