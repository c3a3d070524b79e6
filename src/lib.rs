//! Sibyl: streaming voice-agent conversation client.
//!
//! This crate is the conversation core of a voice interface: it sends a
//! message to a remote streaming agent, parses the incrementally delivered
//! event stream, reduces those events into one authoritative conversation
//! state, and orchestrates microphone capture and speech playback around
//! the exchange — including mid-conversation interruption.
//!
//! # Architecture
//!
//! Leaves first, each stage owned by the coordinator:
//! - **Event stream parsing**: raw bytes → protocol events, independent of
//!   network fragmentation (`agent::sse`)
//! - **State reduction**: protocol events → one conversation state value
//!   (`state`)
//! - **Capture**: microphone slices with a live analysis feed, finalized
//!   into a WAV payload (`audio::capture`)
//! - **Playback**: synthesized speech fetched, decoded, and played, with
//!   supersede-on-new-speech semantics (`audio::playback`)
//! - **Coordination**: one select loop serializing every transition, with
//!   generation-counter cancellation (`conversation`)
//!
//! Rendering, page chrome, and the speech/agent backends themselves are
//! external collaborators reached over HTTP.

pub mod agent;
pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod state;
pub mod synth;
pub mod transcribe;

pub use agent::events::AgentEvent;
pub use audio::capture::{AnalysisHandle, RecordedAudio};
pub use config::VoiceConfig;
pub use conversation::coordinator::{Conversation, ConversationHandle};
pub use conversation::messages::{ConversationEvent, Message, Role};
pub use error::{Result, VoiceError};
pub use state::{ConversationState, Status, UiPanel};
