//! Error types for CodeCoach

use thiserror::Error;

/// Result type alias for CodeCoach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in CodeCoach
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech provider error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Synthesis produced no usable audio
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Build a timeout error for the named operation
    #[must_use]
    pub fn timeout(operation: &'static str, limit: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            secs: limit.as_secs(),
        }
    }
}
