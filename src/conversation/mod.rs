//! Conversation orchestration.
//!
//! The coordinator is the top level of the crate: it owns message history,
//! the live conversation state, and the capture/playback sessions, and it
//! enforces the interruption policy between them. Policy decisions are a
//! pure function of coordinator activity (the internal driver module); the
//! coordinator itself only executes the resulting effects.

pub mod coordinator;
pub(crate) mod driver;
pub mod messages;
