//! Configuration types for the voice conversation client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the conversation core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Streaming agent endpoint settings.
    pub agent: AgentConfig,
    /// Speech-to-text endpoint settings.
    pub transcribe: TranscribeConfig,
    /// Text-to-speech endpoint settings.
    pub synthesis: SynthesisConfig,
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
}

/// Streaming agent endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Full URL of the agent's event-stream endpoint.
    pub url: String,
    /// Request timeout in seconds for establishing the stream.
    ///
    /// Once the stream is open there is no overall deadline; a run ends
    /// when the server closes the stream or the request is cancelled.
    pub connect_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api/voice/chat".to_owned(),
            connect_timeout_secs: 30,
        }
    }
}

/// Speech-to-text endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Full URL of the transcription endpoint.
    pub url: String,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/voice/transcribe".to_owned(),
        }
    }
}

/// Text-to-speech endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Full URL of the synthesis endpoint.
    pub url: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/voice/tts".to_owned(),
        }
    }
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz after downsampling.
    pub input_sample_rate: u32,
    /// Playback sample rate in Hz (decoded audio is resampled to this).
    pub output_sample_rate: u32,
    /// Capture slice duration in ms for buffering and visualization.
    pub slice_ms: u32,
    /// FFT size for the capture analysis feed (power of two; the feed
    /// exposes `fft_size / 2` frequency bins).
    pub analysis_fft_size: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            slice_ms: 100,
            analysis_fft_size: 256,
            input_device: None,
            output_device: None,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::VoiceError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sibyl/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sibyl").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sibyl")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sibyl-config").join("config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = VoiceConfig::default();
        assert!(config.agent.url.starts_with("http"));
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.slice_ms, 100);
        assert!(config.audio.analysis_fft_size.is_power_of_two());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = VoiceConfig::default();
        config.agent.url = "http://example.test/chat".to_owned();
        config.audio.slice_ms = 50;
        config.save_to_file(&path).unwrap();

        let loaded = VoiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.agent.url, "http://example.test/chat");
        assert_eq!(loaded.audio.slice_ms, 50);
        assert_eq!(loaded.audio.output_sample_rate, 24_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nurl = \"http://localhost:9999/chat\"\n").unwrap();

        let loaded = VoiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.agent.url, "http://localhost:9999/chat");
        assert_eq!(loaded.audio.input_sample_rate, 16_000);
    }

    #[test]
    fn invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        assert!(VoiceConfig::from_file(&path).is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = VoiceConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("sibyl"));
    }
}
