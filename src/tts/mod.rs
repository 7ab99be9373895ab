//! Text-to-speech
//!
//! Providers hand back a finite stream of MP3 chunks. [`Synthesizer`]
//! consumes the stream once and accumulates it into an [`AudioArtifact`];
//! a stream that errors or yields no bytes is a synthesis failure, never an
//! empty artifact.

mod murf;
mod openai;
mod store;

pub use murf::MurfSpeech;
pub use openai::OpenAiSpeech;
pub use store::AudioStore;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::config::{ApiKeys, Config, TtsProvider};
use crate::{Error, Result};

/// Streamed audio chunks from a provider
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// A remote speech synthesis service
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Start synthesizing `text` as MP3
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the request
    async fn stream(&self, text: &str) -> Result<ChunkStream>;
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier of a synthesized artifact, unique within the process
///
/// Formatted `<unix-millis>-<sequence>`; the sequence keeps ids distinct
/// when two artifacts are created in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Allocate a fresh id
    #[must_use]
    pub fn next() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{millis}-{seq}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the artifact is stored under
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("response_{}.mp3", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encoded audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
}

impl AudioFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
        }
    }
}

/// One synthesized utterance
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub id: ArtifactId,
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    /// Text the audio speaks
    pub source_text: String,
}

/// Turns text into audio artifacts
pub struct Synthesizer {
    provider: Box<dyn SpeechProvider>,
    timeout: Duration,
}

impl Synthesizer {
    #[must_use]
    pub fn new(provider: Box<dyn SpeechProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Build the configured speech provider
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the selected provider has no key
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = &config.api_keys;
        let tts = &config.tts;

        let provider: Box<dyn SpeechProvider> = match tts.provider {
            TtsProvider::Murf => Box::new(MurfSpeech::new(
                ApiKeys::require(keys.murf.as_ref(), "MURF_API_KEY")?,
                tts.voice.clone(),
                tts.model.clone(),
                tts.locale.clone(),
            )?),
            TtsProvider::OpenAi => Box::new(OpenAiSpeech::new(
                ApiKeys::require(keys.openai.as_ref(), "OPENAI_API_KEY")?,
                tts.voice.clone(),
                tts.model.clone(),
            )?),
        };

        Ok(Self::new(provider, config.timeouts.synthesize))
    }

    /// Name of the underlying provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Synthesize `text` into a single artifact
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisFailed` if the provider errors or yields no
    /// audio, or `Error::Timeout` if it exceeds the configured limit
    pub async fn synthesize(&self, text: &str) -> Result<AudioArtifact> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::SynthesisFailed("nothing to synthesize".to_string()));
        }

        let limit = self.timeout;
        let bytes = tokio::time::timeout(limit, self.collect(text))
            .await
            .map_err(|_| Error::timeout("synthesis", limit))??;

        let artifact = AudioArtifact {
            id: ArtifactId::next(),
            bytes,
            format: AudioFormat::Mp3,
            source_text: text.to_string(),
        };

        tracing::debug!(
            provider = self.provider.name(),
            artifact = %artifact.id,
            bytes = artifact.bytes.len(),
            "synthesized"
        );

        Ok(artifact)
    }

    async fn collect(&self, text: &str) -> Result<Vec<u8>> {
        let name = self.provider.name();
        let mut stream = self
            .provider
            .stream(text)
            .await
            .map_err(|e| Error::SynthesisFailed(format!("{name}: {e}")))?;

        let mut audio = Vec::new();
        let mut chunks = 0_usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::SynthesisFailed(format!("{name} stream: {e}")))?;
            if chunk.is_empty() {
                continue;
            }
            chunks += 1;
            audio.extend_from_slice(&chunk);
        }

        if audio.is_empty() {
            return Err(Error::SynthesisFailed(format!("{name} returned no audio")));
        }

        tracing::trace!(chunks, bytes = audio.len(), "audio stream drained");
        Ok(audio)
    }
}
