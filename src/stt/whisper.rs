//! `OpenAI` Whisper transcription

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};

use super::{Transcriber, TranscriptionHint};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech with `OpenAI` Whisper
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point requests at an OpenAI-compatible host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, wav: &[u8], hint: &TranscriptionHint) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), model = %self.model, "starting Whisper transcription");

        let part = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", hint.language.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("failed to parse Whisper response: {e}")))?;

        Ok(result.text)
    }
}
