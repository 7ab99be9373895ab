//! CodeCoach - voice interview practice assistant
//!
//! One turn captures spoken (or typed) input, transcribes it, asks a
//! language model for a short interviewer reply, and synthesizes that reply
//! to an MP3 served back to the caller. A transcript per session feeds an
//! end-of-session feedback report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front ends                        │
//! │        HTTP API (axum)   │   Console interview       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Turn Orchestrator                      │
//! │   Sessions  │  STT + fallback  │  LLM  │  TTS       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Remote providers                       │
//! │   Deepgram / Whisper  │  Gemini / OpenAI  │  Murf   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod stt;
pub mod tts;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use llm::{FeedbackReport, ResponseGenerator, TextGenerator};
pub use pipeline::{
    CompletedTurn, TurnFailure, TurnFailureReason, TurnInput, TurnOrchestrator, TurnStage,
    is_exit_command,
};
pub use session::{Session, SessionRegistry, Speaker, Turn};
pub use stt::{TranscriptSource, Transcriber, TranscriptionAdapter, TranscriptionResult};
pub use tts::{AudioArtifact, AudioStore, SpeechProvider, Synthesizer};
