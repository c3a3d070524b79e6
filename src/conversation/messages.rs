//! Message and notification types for the conversation coordinator.

use crate::audio::capture::AnalysisHandle;
use crate::state::ConversationState;
use serde::{Deserialize, Serialize};

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The agent side of the conversation.
    Assistant,
}

/// One turn in the conversation history.
///
/// The history is append-only and owned exclusively by the coordinator; it
/// is sent in full with every agent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Turn author.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

/// Commands accepted by the coordinator loop.
#[derive(Debug, Clone)]
pub(crate) enum Command {
    /// Send a typed or transcribed message to the agent.
    SendMessage(String),
    /// Begin microphone capture, preempting playback.
    StartRecording,
    /// Finalize capture and transcribe the result.
    StopRecording,
    /// Cancel everything and return to the initial state.
    Reset,
    /// Stop the coordinator loop, releasing all sessions.
    Shutdown,
}

/// Notifications delivered to the embedding UI.
///
/// The coordinator exposes a plain observer feed with one subscriber per
/// conversation; nothing here is interpreted by the core itself.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// The conversation state was replaced or reached a lifecycle edge.
    StateChanged(ConversationState),
    /// The accumulated response text after a text delta.
    ResponseText(String),
    /// An agent run started or settled.
    Streaming {
        /// True from request start until the request settles.
        active: bool,
    },
    /// The agent started or finished executing a tool.
    ToolRunning {
        /// True between tool start and end.
        active: bool,
    },
    /// Recording started (with its live analysis feed) or stopped.
    Recording {
        /// The analysis feed while recording, `None` once idle.
        analysis: Option<AnalysisHandle>,
    },
    /// Speech playback became audible or stopped.
    Speaking {
        /// True while audio is playing.
        active: bool,
    },
    /// A capture was transcribed; the text is about to be sent.
    Transcript(String),
    /// A user-visible error from any subsystem.
    Error(String),
}
