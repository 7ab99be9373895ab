//! TOML configuration file loading
//!
//! Supports `~/.config/codecoach/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CoachConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Interview persona and reply shaping
    #[serde(default)]
    pub interview: InterviewFileConfig,

    /// Transcription providers
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text generation provider
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis provider
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Microphone capture limits
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Per-call deadlines for external services
    #[serde(default)]
    pub timeouts: TimeoutsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory synthesized MP3 files are written to
    pub audio_dir: Option<PathBuf>,

    /// Directory with a static web UI
    pub static_dir: Option<PathBuf>,
}

/// Interview configuration
#[derive(Debug, Default, Deserialize)]
pub struct InterviewFileConfig {
    /// Topic used until the user picks one
    pub default_topic: Option<String>,

    /// Name the interviewer introduces itself with
    pub persona_name: Option<String>,

    /// Upper bound on sentences per spoken reply
    pub max_sentences: Option<usize>,

    /// Number of recent turns given to the model as context
    pub history_turns: Option<usize>,

    /// Minutes a session may sit idle before it is discarded
    pub session_idle_mins: Option<u64>,

    /// Upper bound on live sessions
    pub max_sessions: Option<usize>,
}

/// Transcription configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Deepgram model (e.g. "nova-2")
    pub primary_model: Option<String>,

    /// Whisper model (e.g. "whisper-1")
    pub fallback_model: Option<String>,

    /// Language hint (ISO 639-1)
    pub language: Option<String>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "gemini" or "openai"
    pub provider: Option<String>,

    /// Model identifier
    pub model: Option<String>,
}

/// TTS configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "murf" or "openai"
    pub provider: Option<String>,

    /// Voice identifier (e.g. "en-US-caleb")
    pub voice: Option<String>,

    /// Model identifier (e.g. "FALCON")
    pub model: Option<String>,

    /// Locale passed to multi-native voices
    pub locale: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub listen_timeout_secs: Option<u64>,
    pub phrase_limit_secs: Option<u64>,
    pub calibration_ms: Option<u64>,
}

/// Timeout configuration
#[derive(Debug, Default, Deserialize)]
pub struct TimeoutsFileConfig {
    pub transcribe_secs: Option<u64>,
    pub generate_secs: Option<u64>,
    pub synthesize_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub deepgram: Option<String>,
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub murf: Option<String>,
}

/// Resolve the config file path
///
/// `CODECOACH_CONFIG` overrides the default XDG location
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CODECOACH_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::ProjectDirs::from("dev", "codecoach", "codecoach")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load the config file, returning defaults when it does not exist
///
/// A file that exists but fails to parse is logged and ignored
#[must_use]
pub fn load_config_file() -> CoachConfigFile {
    let Some(path) = config_file_path() else {
        return CoachConfigFile::default();
    };

    if !path.exists() {
        return CoachConfigFile::default();
    }

    match parse_config_file(&path) {
        Ok(fc) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            fc
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
            CoachConfigFile::default()
        }
    }
}

/// Parse a config file at an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn parse_config_file(path: &Path) -> Result<CoachConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let fc: CoachConfigFile = toml::from_str(
            r#"
            [interview]
            default_topic = "Rust Ownership"

            [tts]
            voice = "en-US-natalie"
            "#,
        )
        .unwrap();

        assert_eq!(fc.interview.default_topic.as_deref(), Some("Rust Ownership"));
        assert_eq!(fc.tts.voice.as_deref(), Some("en-US-natalie"));
        assert!(fc.server.port.is_none());
        assert!(fc.api_keys.murf.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        let fc: CoachConfigFile = toml::from_str("").unwrap();
        assert!(fc.llm.provider.is_none());
        assert!(fc.capture.listen_timeout_secs.is_none());
    }
}
