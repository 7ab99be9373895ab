//! `OpenAI` speech synthesis

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use secrecy::{ExposeSecret, SecretString};

use super::{ChunkStream, SpeechProvider};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Synthesizes speech with `OpenAI` TTS
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    model: String,
    base_url: String,
}

impl OpenAiSpeech {
    /// Create a new `OpenAI` synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_key: SecretString, voice: String, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
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
impl SpeechProvider for OpenAiSpeech {
    fn name(&self) -> &'static str {
        "openai-tts"
    }

    async fn stream(&self, text: &str) -> Result<ChunkStream> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(Error::from)
            .boxed())
    }
}
