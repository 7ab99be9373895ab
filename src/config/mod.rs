//! Configuration management for CodeCoach
//!
//! Values are layered: environment > TOML file > defaults.
//! Missing provider credentials are reported by [`Config::validate`] so the
//! process fails at startup rather than on the first turn.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Topic used until a user picks one
pub const DEFAULT_TOPIC: &str = "General Python";

/// CodeCoach configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Interview persona and reply shaping
    pub interview: InterviewConfig,

    /// Transcription providers
    pub stt: SttConfig,

    /// Text generation provider
    pub llm: LlmConfig,

    /// Speech synthesis provider
    pub tts: TtsConfig,

    /// Microphone capture limits
    pub capture: CaptureConfig,

    /// Per-call deadlines for external services
    pub timeouts: TimeoutConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Whether the host microphone/speaker may be used
    pub voice_enabled: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Directory synthesized audio is written to
    pub audio_dir: PathBuf,

    /// URL prefix stored audio is served under
    pub audio_url_prefix: String,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

/// Interview persona and reply shaping
#[derive(Debug, Clone)]
pub struct InterviewConfig {
    pub default_topic: String,
    pub persona_name: String,
    pub max_sentences: usize,
    pub history_turns: usize,
    /// Sessions idle this long are discarded
    pub session_idle_ttl: Duration,
    pub max_sessions: usize,
}

/// Transcription provider settings
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Deepgram model for the primary attempt
    pub primary_model: String,

    /// Whisper model for the fallback attempt
    pub fallback_model: String,

    /// Language hint passed to both providers
    pub language: String,
}

/// Supported text generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

impl LlmProvider {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown LLM provider: {other}"))),
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

/// Text generation settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
}

/// Supported speech synthesis backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    Murf,
    OpenAi,
}

impl TtsProvider {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "murf" => Ok(Self::Murf),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }

    const fn default_voice(self) -> &'static str {
        match self {
            Self::Murf => "en-US-caleb",
            Self::OpenAi => "alloy",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::Murf => "FALCON",
            Self::OpenAi => "tts-1",
        }
    }
}

/// Speech synthesis settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub voice: String,
    pub model: String,
    pub locale: String,
}

/// Microphone capture limits
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// How long to wait for speech to start
    pub listen_timeout: Duration,

    /// Longest single utterance
    pub phrase_limit: Duration,

    /// Ambient noise sampling before listening
    pub calibration: Duration,
}

impl CaptureConfig {
    /// Hard upper bound on one capture, with a little slack for device setup
    #[must_use]
    pub fn hard_limit(&self) -> Duration {
        self.calibration + self.listen_timeout + self.phrase_limit + Duration::from_secs(2)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(4),
            phrase_limit: Duration::from_secs(8),
            calibration: Duration::from_millis(500),
        }
    }
}

/// Deadlines for the three external calls of a turn
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub transcribe: Duration,
    pub generate: Duration,
    pub synthesize: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transcribe: Duration::from_secs(15),
            generate: Duration::from_secs(20),
            synthesize: Duration::from_secs(30),
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Deepgram key (primary STT)
    pub deepgram: Option<SecretString>,

    /// `OpenAI` key (Whisper fallback, optional LLM/TTS)
    pub openai: Option<SecretString>,

    /// Google Gemini key
    pub gemini: Option<SecretString>,

    /// Murf key
    pub murf: Option<SecretString>,
}

impl ApiKeys {
    /// Copy out a configured key
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming `var` when the key is missing
    pub fn require(key: Option<&SecretString>, var: &str) -> Result<SecretString> {
        key.map(|k| SecretString::from(k.expose_secret().to_owned()))
            .ok_or_else(|| Error::Config(format!("{var} not set")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                audio_dir: PathBuf::from("static/audio"),
                audio_url_prefix: "/static/audio".to_string(),
                static_dir: None,
            },
            interview: InterviewConfig {
                default_topic: DEFAULT_TOPIC.to_string(),
                persona_name: "CodeCoach".to_string(),
                max_sentences: 2,
                history_turns: 6,
                session_idle_ttl: crate::session::DEFAULT_IDLE_TTL,
                max_sessions: crate::session::DEFAULT_MAX_SESSIONS,
            },
            stt: SttConfig {
                primary_model: "nova-2".to_string(),
                fallback_model: "whisper-1".to_string(),
                language: "en".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                model: LlmProvider::Gemini.default_model().to_string(),
            },
            tts: TtsConfig {
                provider: TtsProvider::Murf,
                voice: TtsProvider::Murf.default_voice().to_string(),
                model: TtsProvider::Murf.default_model().to_string(),
                locale: "en-US".to_string(),
            },
            capture: CaptureConfig::default(),
            timeouts: TimeoutConfig::default(),
            api_keys: ApiKeys::default(),
            voice_enabled: true,
        }
    }
}

/// Read a non-empty environment variable
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an environment variable, ignoring malformed values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.trim().parse().ok())
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

impl Config {
    /// Load configuration
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let defaults = Self::default();

        let api_keys = ApiKeys {
            deepgram: secret(env_string("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram)),
            openai: secret(env_string("OPENAI_API_KEY").or(fc.api_keys.openai)),
            gemini: secret(env_string("GEMINI_API_KEY").or(fc.api_keys.gemini)),
            murf: secret(env_string("MURF_API_KEY").or(fc.api_keys.murf)),
        };

        let server = ServerConfig {
            port: env_parse("CODECOACH_PORT")
                .or_else(|| env_parse("PORT"))
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
            audio_dir: env_string("CODECOACH_AUDIO_DIR")
                .map(PathBuf::from)
                .or(fc.server.audio_dir)
                .unwrap_or(defaults.server.audio_dir),
            audio_url_prefix: defaults.server.audio_url_prefix,
            static_dir: env_string("CODECOACH_STATIC_DIR")
                .map(PathBuf::from)
                .or(fc.server.static_dir),
        };

        let interview = InterviewConfig {
            default_topic: env_string("CODECOACH_DEFAULT_TOPIC")
                .or(fc.interview.default_topic)
                .unwrap_or(defaults.interview.default_topic),
            persona_name: fc
                .interview
                .persona_name
                .unwrap_or(defaults.interview.persona_name),
            max_sentences: fc
                .interview
                .max_sentences
                .filter(|n| *n > 0)
                .unwrap_or(defaults.interview.max_sentences),
            history_turns: fc
                .interview
                .history_turns
                .unwrap_or(defaults.interview.history_turns),
            session_idle_ttl: fc
                .interview
                .session_idle_mins
                .map_or(defaults.interview.session_idle_ttl, |m| Duration::from_secs(m.saturating_mul(60))),
            max_sessions: env_parse("CODECOACH_MAX_SESSIONS")
                .or(fc.interview.max_sessions)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.interview.max_sessions),
        };

        let stt = SttConfig {
            primary_model: env_string("CODECOACH_STT_MODEL")
                .or(fc.stt.primary_model)
                .unwrap_or(defaults.stt.primary_model),
            fallback_model: env_string("CODECOACH_STT_FALLBACK_MODEL")
                .or(fc.stt.fallback_model)
                .unwrap_or(defaults.stt.fallback_model),
            language: fc.stt.language.unwrap_or(defaults.stt.language),
        };

        let llm_provider = env_string("CODECOACH_LLM_PROVIDER")
            .or(fc.llm.provider)
            .map(|p| LlmProvider::parse(&p))
            .transpose()?
            .unwrap_or(LlmProvider::Gemini);
        let llm = LlmConfig {
            provider: llm_provider,
            model: env_string("CODECOACH_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| llm_provider.default_model().to_string()),
        };

        let tts_provider = env_string("CODECOACH_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map(|p| TtsProvider::parse(&p))
            .transpose()?
            .unwrap_or(TtsProvider::Murf);
        let tts = TtsConfig {
            provider: tts_provider,
            voice: env_string("CODECOACH_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            model: fc
                .tts
                .model
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            locale: fc.tts.locale.unwrap_or(defaults.tts.locale),
        };

        let capture = CaptureConfig {
            listen_timeout: fc
                .capture
                .listen_timeout_secs
                .map_or(defaults.capture.listen_timeout, Duration::from_secs),
            phrase_limit: fc
                .capture
                .phrase_limit_secs
                .map_or(defaults.capture.phrase_limit, Duration::from_secs),
            calibration: fc
                .capture
                .calibration_ms
                .map_or(defaults.capture.calibration, Duration::from_millis),
        };

        let timeouts = TimeoutConfig {
            transcribe: fc
                .timeouts
                .transcribe_secs
                .map_or(defaults.timeouts.transcribe, Duration::from_secs),
            generate: fc
                .timeouts
                .generate_secs
                .map_or(defaults.timeouts.generate, Duration::from_secs),
            synthesize: fc
                .timeouts
                .synthesize_secs
                .map_or(defaults.timeouts.synthesize, Duration::from_secs),
        };

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        Ok(Self {
            server,
            interview,
            stt,
            llm,
            tts,
            capture,
            timeouts,
            api_keys,
            voice_enabled: !disable_voice,
        })
    }

    /// Check that every required provider credential is present
    ///
    /// A missing `OpenAI` key only disables the Whisper fallback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming every missing key
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.api_keys.deepgram.is_none() {
            missing.push("DEEPGRAM_API_KEY");
        }

        match self.llm.provider {
            LlmProvider::Gemini if self.api_keys.gemini.is_none() => missing.push("GEMINI_API_KEY"),
            LlmProvider::OpenAi if self.api_keys.openai.is_none() => missing.push("OPENAI_API_KEY"),
            _ => {}
        }

        match self.tts.provider {
            TtsProvider::Murf if self.api_keys.murf.is_none() => missing.push("MURF_API_KEY"),
            TtsProvider::OpenAi if self.api_keys.openai.is_none() => {
                if !missing.contains(&"OPENAI_API_KEY") {
                    missing.push("OPENAI_API_KEY");
                }
            }
            _ => {}
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )));
        }

        if self.api_keys.openai.is_none() {
            tracing::warn!("OPENAI_API_KEY not set - Whisper transcription fallback disabled");
        }

        Ok(())
    }
}
