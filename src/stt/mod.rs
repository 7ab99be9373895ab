//! Speech-to-text with provider fallback
//!
//! Providers are tried strictly in order, one at a time. The first
//! non-blank transcript wins; errors, timeouts and blank results move on to
//! the next provider. Nothing is remembered between calls.

mod deepgram;
mod whisper;

pub use deepgram::DeepgramTranscriber;
pub use whisper::WhisperTranscriber;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;
use crate::config::{ApiKeys, Config};
use crate::voice::AudioSample;

/// Samples shorter than this never reach a provider
pub const MIN_CAPTURE_DURATION: Duration = Duration::from_millis(300);

/// Request hints shared by every provider
#[derive(Debug, Clone)]
pub struct TranscriptionHint {
    /// ISO 639-1 language code
    pub language: String,
}

impl Default for TranscriptionHint {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
        }
    }
}

/// A remote transcription service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Transcribe WAV bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed
    async fn transcribe(&self, wav: &[u8], hint: &TranscriptionHint) -> Result<String>;
}

/// Which position in the provider order produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Primary,
    Fallback,
}

/// Outcome of transcribing one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionResult {
    /// A provider returned non-blank text
    Recognized {
        text: String,
        provider: &'static str,
        source: TranscriptSource,
    },
    /// Nothing usable was recognized
    Empty,
}

impl TranscriptionResult {
    /// Recognized text, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Recognized { text, .. } => Some(text),
            Self::Empty => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Try each provider in order and return the first non-blank transcript
///
/// Each attempt is bounded by `limit`. Providers after the first success
/// are never called.
pub async fn first_non_empty(
    providers: &[Box<dyn Transcriber>],
    wav: &[u8],
    hint: &TranscriptionHint,
    limit: Duration,
) -> TranscriptionResult {
    for (index, provider) in providers.iter().enumerate() {
        let source = if index == 0 {
            TranscriptSource::Primary
        } else {
            TranscriptSource::Fallback
        };

        tracing::debug!(provider = provider.name(), ?source, "transcription attempt");

        match tokio::time::timeout(limit, provider.transcribe(wav, hint)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::warn!(provider = provider.name(), "empty transcript, trying next");
                    continue;
                }
                tracing::info!(provider = provider.name(), ?source, transcript = %text, "transcribed");
                return TranscriptionResult::Recognized {
                    text: text.to_string(),
                    provider: provider.name(),
                    source,
                };
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = provider.name(), error = %e, "transcription failed, trying next");
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    limit_secs = limit.as_secs(),
                    "transcription timed out, trying next"
                );
            }
        }
    }

    tracing::info!(attempts = providers.len(), "no provider produced a transcript");
    TranscriptionResult::Empty
}

/// Turns captured audio into text using an ordered provider list
pub struct TranscriptionAdapter {
    providers: Vec<Box<dyn Transcriber>>,
    hint: TranscriptionHint,
    timeout: Duration,
}

impl TranscriptionAdapter {
    /// Create an adapter with a primary provider
    #[must_use]
    pub fn new(primary: Box<dyn Transcriber>, hint: TranscriptionHint, timeout: Duration) -> Self {
        Self {
            providers: vec![primary],
            hint,
            timeout,
        }
    }

    /// Deepgram first, then Whisper when an `OpenAI` key is configured
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the Deepgram key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = &config.api_keys;
        let primary = DeepgramTranscriber::new(
            ApiKeys::require(keys.deepgram.as_ref(), "DEEPGRAM_API_KEY")?,
            config.stt.primary_model.clone(),
        )?;
        let hint = TranscriptionHint {
            language: config.stt.language.clone(),
        };
        let adapter = Self::new(Box::new(primary), hint, config.timeouts.transcribe);

        match keys.openai.as_ref() {
            Some(key) => {
                let fallback = WhisperTranscriber::new(
                    ApiKeys::require(Some(key), "OPENAI_API_KEY")?,
                    config.stt.fallback_model.clone(),
                )?;
                Ok(adapter.with_fallback(Box::new(fallback)))
            }
            None => Ok(adapter),
        }
    }

    /// Append a fallback provider
    #[must_use]
    pub fn with_fallback(mut self, fallback: Box<dyn Transcriber>) -> Self {
        self.providers.push(fallback);
        self
    }

    /// Provider names in attempt order
    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Transcribe a sample; never fails, returns `Empty` instead
    ///
    /// Too-short or silent samples short-circuit without calling a provider.
    pub async fn transcribe(&self, sample: &AudioSample) -> TranscriptionResult {
        if sample.duration() < MIN_CAPTURE_DURATION {
            tracing::debug!(
                duration_ms = sample.duration().as_millis(),
                "sample too short, skipping transcription"
            );
            return TranscriptionResult::Empty;
        }

        if sample.is_silent() {
            tracing::debug!("sample is silent, skipping transcription");
            return TranscriptionResult::Empty;
        }

        let wav = match sample.to_wav() {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode sample");
                return TranscriptionResult::Empty;
            }
        };

        first_non_empty(&self.providers, &wav, &self.hint, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transcriber for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn transcribe(&self, _wav: &[u8], _hint: &TranscriptionHint) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(ToString::to_string)
                .ok_or_else(|| Error::Stt("scripted failure".to_string()))
        }
    }

    fn scripted(name: &'static str, reply: Option<&'static str>) -> (Box<dyn Transcriber>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Scripted {
            name,
            reply,
            delay: Duration::ZERO,
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }

    #[tokio::test]
    async fn test_trims_and_tags_primary() {
        let (primary, _) = scripted("a", Some("  hello  "));
        let result = first_non_empty(&[primary], b"wav", &TranscriptionHint::default(), Duration::from_secs(1)).await;
        assert_eq!(
            result,
            TranscriptionResult::Recognized {
                text: "hello".to_string(),
                provider: "a",
                source: TranscriptSource::Primary,
            }
        );
    }

    #[tokio::test]
    async fn test_whitespace_only_counts_as_empty() {
        let (primary, _) = scripted("a", Some("   "));
        let (fallback, fallback_calls) = scripted("b", Some("from fallback"));
        let result = first_non_empty(
            &[primary, fallback],
            b"wav",
            &TranscriptionHint::default(),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.text(), Some("from fallback"));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_times_out_to_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slow: Box<dyn Transcriber> = Box::new(Scripted {
            name: "slow",
            reply: Some("too late"),
            delay: Duration::from_secs(60),
            calls: Arc::clone(&calls),
        });
        let (fallback, _) = scripted("fast", Some("in time"));

        let result = first_non_empty(
            &[slow, fallback],
            b"wav",
            &TranscriptionHint::default(),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(result.text(), Some("in time"));
        assert!(matches!(
            result,
            TranscriptionResult::Recognized {
                source: TranscriptSource::Fallback,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_no_providers_is_empty() {
        let result = first_non_empty(&[], b"wav", &TranscriptionHint::default(), Duration::from_secs(1)).await;
        assert!(result.is_empty());
    }
}
