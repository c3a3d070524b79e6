//! Error types for the voice conversation client.

/// Top-level error type for the conversation core.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Agent request or event-stream transport error.
    #[error("agent error: {0}")]
    Agent(String),

    /// Transcription request error.
    #[error("transcription error: {0}")]
    Transcribe(String),

    /// Speech synthesis or playback error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone access was denied by the platform.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
