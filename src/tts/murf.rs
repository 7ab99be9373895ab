//! Murf streaming speech synthesis

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{ChunkStream, SpeechProvider};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.murf.ai";

/// Synthesizes speech with Murf's streaming endpoint
pub struct MurfSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    model: String,
    locale: String,
    base_url: String,
}

impl MurfSpeech {
    /// Create a new Murf synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_key: SecretString, voice_id: String, model: String, locale: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Murf API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model,
            locale,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point requests at a different host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MurfRequest<'a> {
    voice_id: &'a str,
    text: &'a str,
    model: &'a str,
    format: &'a str,
    multi_native_locale: &'a str,
}

#[async_trait]
impl SpeechProvider for MurfSpeech {
    fn name(&self) -> &'static str {
        "murf"
    }

    async fn stream(&self, text: &str) -> Result<ChunkStream> {
        let request = MurfRequest {
            voice_id: &self.voice_id,
            text,
            model: &self.model,
            format: "MP3",
            multi_native_locale: &self.locale,
        };

        let response = self
            .client
            .post(format!("{}/v1/speech/stream", self.base_url))
            .header("api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Murf API error {status}: {body}")));
        }

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(Error::from)
            .boxed())
    }
}
