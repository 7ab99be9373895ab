//! Turn orchestration
//!
//! One turn runs `AwaitingInput -> Transcribing -> Generating ->
//! Synthesizing -> Done`, or stops in a [`TurnFailure`] from any stage.
//! Input is recognized before the session is looked up, so a turn that hears
//! nothing never creates one. From generation on, the session's mutex is held
//! until the transcript is updated. Turns are appended only on `Done`, user
//! first.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::llm::{FeedbackReport, ResponseGenerator, prompt};
use crate::session::{Session, SessionRegistry, Speaker, Turn};
use crate::stt::{TranscriptSource, TranscriptionAdapter, TranscriptionResult};
use crate::tts::{AudioArtifact, AudioStore, Synthesizer};
use crate::voice::{AudioSample, AudioSource, DisabledSource, MicrophoneSource};
use crate::{Error, Result};

/// Words that end a console interview
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "stop"];

/// Report used when a session ends before the user said anything
pub const EMPTY_SESSION_FEEDBACK: &str =
    "We did not get to any questions this time, so there is nothing to score yet.";

/// Stage a turn is in, or failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    AwaitingInput,
    Transcribing,
    Generating,
    Synthesizing,
    Done,
}

impl TurnStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a turn failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnFailureReason {
    /// Capture timed out or every transcription attempt came back empty
    NoSpeechDetected,
    /// Synthesis or storage produced no usable audio
    AudioGenerationFailed,
}

impl TurnFailureReason {
    /// Machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NoSpeechDetected => "no_speech_detected",
            Self::AudioGenerationFailed => "audio_generation_failed",
        }
    }
}

impl fmt::Display for TurnFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal failure of one turn
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} while {stage}: {message}")]
pub struct TurnFailure {
    pub stage: TurnStage,
    pub reason: TurnFailureReason,
    /// Human-readable explanation
    pub message: String,
}

impl TurnFailure {
    fn no_speech(stage: TurnStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            reason: TurnFailureReason::NoSpeechDetected,
            message: message.into(),
        }
    }

    fn audio(error: &Error) -> Self {
        Self {
            stage: TurnStage::Synthesizing,
            reason: TurnFailureReason::AudioGenerationFailed,
            message: format!("Audio generation failed: {error}"),
        }
    }
}

/// What the user supplied for a turn
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Typed text; skips capture and transcription
    Text(String),
    /// An already captured sample
    Audio(AudioSample),
    /// Capture one utterance from the configured audio source
    Capture,
}

impl TurnInput {
    /// Text when supplied, live capture otherwise
    #[must_use]
    pub fn text_or_capture(text: Option<String>) -> Self {
        text.map_or(Self::Capture, Self::Text)
    }
}

/// User input after capture and transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedInput {
    pub text: String,
    /// `None` when the text was typed
    pub source: Option<TranscriptSource>,
}

/// A synthesized artifact and the URL it is served under
#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub url: String,
    pub artifact: AudioArtifact,
}

/// A turn that reached `Done`
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub user_text: String,
    pub reply_text: String,
    pub transcript_source: Option<TranscriptSource>,
    pub audio: StoredAudio,
}

/// Result of switching topic
#[derive(Debug, Clone)]
pub struct TopicChange {
    pub topic: String,
    /// Welcome sentence that was spoken
    pub message: String,
    pub audio: StoredAudio,
}

/// Opening line of a console interview
#[derive(Debug, Clone)]
pub struct Introduction {
    pub text: String,
    pub audio: Option<StoredAudio>,
}

/// Final report for an ended session
#[derive(Debug, Clone)]
pub struct SessionFeedback {
    pub topic: String,
    pub report: FeedbackReport,
    /// Number of turns the report covered
    pub turns: usize,
    /// Spoken report, when requested and synthesis succeeded
    pub audio: Option<StoredAudio>,
}

/// Read-only view of a session transcript
#[derive(Debug, Clone, Serialize)]
pub struct HistorySnapshot {
    pub session_id: String,
    pub topic: String,
    pub turns: Vec<Turn>,
}

/// Provider names per stage
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    /// Transcribers in attempt order
    pub transcription: Vec<&'static str>,
    pub generation: &'static str,
    pub synthesis: &'static str,
    pub capture: &'static str,
}

/// Whether an utterance asks to end the interview
#[must_use]
pub fn is_exit_command(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    EXIT_WORDS.contains(&normalized.as_str())
}

/// Composes transcription, generation and synthesis into turns
pub struct TurnOrchestrator {
    sessions: SessionRegistry,
    transcription: TranscriptionAdapter,
    generator: ResponseGenerator,
    synthesizer: Synthesizer,
    store: AudioStore,
    source: Arc<dyn AudioSource>,
    history_turns: usize,
}

impl TurnOrchestrator {
    /// Create an orchestrator with capture disabled
    #[must_use]
    pub fn new(
        sessions: SessionRegistry,
        transcription: TranscriptionAdapter,
        generator: ResponseGenerator,
        synthesizer: Synthesizer,
        store: AudioStore,
    ) -> Self {
        Self {
            sessions,
            transcription,
            generator,
            synthesizer,
            store,
            source: Arc::new(DisabledSource),
            history_turns: 6,
        }
    }

    /// Set the source used for `TurnInput::Capture`
    #[must_use]
    pub fn with_audio_source(mut self, source: Arc<dyn AudioSource>) -> Self {
        self.source = source;
        self
    }

    /// Set how many recent turns are passed to the generator
    #[must_use]
    pub const fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Build the provider stack described by `config`
    ///
    /// Whisper is added as the transcription fallback only when an `OpenAI`
    /// key is configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a selected provider has no credentials or
    /// the audio directory cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let transcription = TranscriptionAdapter::from_config(config)?;
        let generator = ResponseGenerator::from_config(config)?;
        let synthesizer = Synthesizer::from_config(config)?;
        let store = AudioStore::new(&config.server.audio_dir, config.server.audio_url_prefix.clone())?;

        let source: Arc<dyn AudioSource> = if config.voice_enabled {
            Arc::new(MicrophoneSource::new(config.capture))
        } else {
            Arc::new(DisabledSource)
        };

        Ok(Self::new(
            SessionRegistry::new(config.interview.default_topic.clone())
                .with_limits(config.interview.session_idle_ttl, config.interview.max_sessions),
            transcription,
            generator,
            synthesizer,
            store,
        )
        .with_audio_source(source)
        .with_history_turns(config.interview.history_turns))
    }

    /// Providers each stage will use
    #[must_use]
    pub fn providers(&self) -> ProviderSummary {
        ProviderSummary {
            transcription: self.transcription.provider_names(),
            generation: self.generator.provider_name(),
            synthesis: self.synthesizer.provider_name(),
            capture: self.source.name(),
        }
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    #[must_use]
    pub const fn store(&self) -> &AudioStore {
        &self.store
    }

    /// Run one full turn for `session_id`
    ///
    /// # Errors
    ///
    /// Returns a [`TurnFailure`] when no speech was recognized or no audio
    /// could be produced; the transcript is unchanged in both cases, and no
    /// session is created when nothing was recognized
    pub async fn process_turn(
        &self,
        session_id: &str,
        input: TurnInput,
    ) -> std::result::Result<CompletedTurn, TurnFailure> {
        let recognized = self.recognize(input).await.inspect_err(|failure| {
            tracing::info!(session = session_id, stage = %failure.stage, reason = %failure.reason, "turn failed");
        })?;

        self.respond(session_id, recognized).await
    }

    /// Capture and transcribe input without touching any session
    ///
    /// # Errors
    ///
    /// Returns `NoSpeechDetected` when capture or transcription yields nothing
    pub async fn recognize(
        &self,
        input: TurnInput,
    ) -> std::result::Result<RecognizedInput, TurnFailure> {
        let sample = match input {
            TurnInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(TurnFailure::no_speech(
                        TurnStage::AwaitingInput,
                        "No speech or text detected",
                    ));
                }
                tracing::debug!(text, "typed input");
                return Ok(RecognizedInput {
                    text: text.to_string(),
                    source: None,
                });
            }
            TurnInput::Audio(sample) => sample,
            TurnInput::Capture => self.capture().await?,
        };

        match self.transcription.transcribe(&sample).await {
            TranscriptionResult::Recognized { text, source, .. } => Ok(RecognizedInput {
                text,
                source: Some(source),
            }),
            TranscriptionResult::Empty => Err(TurnFailure::no_speech(
                TurnStage::Transcribing,
                "No speech or text detected",
            )),
        }
    }

    async fn capture(&self) -> std::result::Result<AudioSample, TurnFailure> {
        match self.source.capture().await {
            Ok(Some(sample)) => Ok(sample),
            Ok(None) => Err(TurnFailure::no_speech(
                TurnStage::AwaitingInput,
                "No speech detected before the listen timeout",
            )),
            Err(e) => {
                tracing::warn!(source = self.source.name(), error = %e, "capture failed");
                Err(TurnFailure::no_speech(
                    TurnStage::AwaitingInput,
                    format!("Capture failed: {e}"),
                ))
            }
        }
    }

    /// Generate, synthesize and record a reply to already recognized input
    ///
    /// # Errors
    ///
    /// Returns `AudioGenerationFailed` if the reply cannot be synthesized
    pub async fn respond(
        &self,
        session_id: &str,
        recognized: RecognizedInput,
    ) -> std::result::Result<CompletedTurn, TurnFailure> {
        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        self.respond_in(&mut session, recognized).await
    }

    async fn respond_in(
        &self,
        session: &mut Session,
        recognized: RecognizedInput,
    ) -> std::result::Result<CompletedTurn, TurnFailure> {
        let reply = self
            .generator
            .reply(
                session.topic(),
                &recognized.text,
                session.recent(self.history_turns),
            )
            .await;

        let audio = self.speak(&reply).await.map_err(|e| {
            tracing::error!(session = session.id(), stage = %TurnStage::Synthesizing, error = %e, "turn failed");
            TurnFailure::audio(&e)
        })?;

        session.append_turn(Speaker::User, &recognized.text);
        session.append_turn(Speaker::Assistant, &reply);

        tracing::info!(
            session = session.id(),
            stage = %TurnStage::Done,
            artifact = %audio.artifact.id,
            "turn complete"
        );

        Ok(CompletedTurn {
            user_text: recognized.text,
            reply_text: reply,
            transcript_source: recognized.source,
            audio,
        })
    }

    /// Switch the session topic and speak a welcome line
    ///
    /// A blank topic selects the default. The topic change sticks even when
    /// the welcome audio fails.
    ///
    /// # Errors
    ///
    /// Returns `AudioGenerationFailed` if the welcome cannot be synthesized
    pub async fn set_topic(
        &self,
        session_id: &str,
        topic: &str,
    ) -> std::result::Result<TopicChange, TurnFailure> {
        let topic = match topic.trim() {
            "" => self.sessions.default_topic().to_string(),
            t => t.to_string(),
        };

        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;
        session.set_topic(topic.clone());

        let message = prompt::welcome_text(&topic);
        let audio = self.speak(&message).await.map_err(|e| {
            tracing::error!(session = session_id, error = %e, "welcome synthesis failed");
            TurnFailure::audio(&e)
        })?;

        Ok(TopicChange {
            topic,
            message,
            audio,
        })
    }

    /// Speak the opening line and record it as the first assistant turn
    ///
    /// Audio failure is logged; the text is still recorded.
    pub async fn introduce(&self, session_id: &str) -> Introduction {
        let handle = self.sessions.get_or_create(session_id).await;
        let mut session = handle.lock().await;

        let text = prompt::intro_text(self.generator.persona_name(), session.topic());
        let audio = match self.speak(&text).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "intro synthesis failed");
                None
            }
        };

        session.append_turn(Speaker::Assistant, &text);
        Introduction { text, audio }
    }

    /// End a session and produce its feedback report
    ///
    /// The session is discarded. When `speak` is set the report is also
    /// synthesized; audio failure leaves `audio` empty.
    pub async fn end_session(&self, session_id: &str, speak: bool) -> SessionFeedback {
        let (topic, history) = match self.sessions.end(session_id).await {
            Some(handle) => {
                let session = handle.lock().await;
                (session.topic().to_string(), session.history().to_vec())
            }
            None => (self.sessions.default_topic().to_string(), Vec::new()),
        };

        let answered = history.iter().any(|t| t.speaker == Speaker::User);
        let report = if answered {
            self.generator.feedback(&topic, &history).await
        } else {
            FeedbackReport {
                text: EMPTY_SESSION_FEEDBACK.to_string(),
                score: None,
            }
        };

        let audio = if speak {
            match self.speak(&prompt::feedback_speech(&report.text)).await {
                Ok(audio) => Some(audio),
                Err(e) => {
                    tracing::warn!(session = session_id, error = %e, "feedback synthesis failed");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(session = session_id, turns = history.len(), score = ?report.score, "session ended");

        SessionFeedback {
            topic,
            report,
            turns: history.len(),
            audio,
        }
    }

    /// Snapshot of a session's topic and transcript
    ///
    /// Unknown sessions report the default topic and no turns.
    pub async fn history(&self, session_id: &str) -> HistorySnapshot {
        let (topic, turns) = match self.sessions.get(session_id).await {
            Some(handle) => {
                let session = handle.lock().await;
                (session.topic().to_string(), session.history().to_vec())
            }
            None => (self.sessions.default_topic().to_string(), Vec::new()),
        };

        HistorySnapshot {
            session_id: session_id.to_string(),
            topic,
            turns,
        }
    }

    async fn speak(&self, text: &str) -> Result<StoredAudio> {
        let artifact = self.synthesizer.synthesize(text).await?;
        let url = self.store.store(&artifact).await?;
        Ok(StoredAudio { url, artifact })
    }
}
