//! Deepgram pre-recorded transcription

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{Transcriber, TranscriptionHint};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.deepgram.com";

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech with Deepgram
pub struct DeepgramTranscriber {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl DeepgramTranscriber {
    /// Create a new Deepgram transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point requests at a different host (proxies, self-hosted Deepgram)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    async fn transcribe(&self, wav: &[u8], hint: &TranscriptionHint) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), model = %self.model, "starting Deepgram transcription");

        let url = format!("{}/v1/listen", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("model", self.model.as_str()),
                ("smart_format", "true"),
                ("language", hint.language.as_str()),
            ])
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("failed to parse Deepgram response: {e}")))?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(DeepgramTranscriber::new(SecretString::from(String::new()), "nova-2".to_string()).is_err());
    }

    #[test]
    fn test_response_without_alternatives_parses() {
        let parsed: DeepgramResponse =
            serde_json::from_str(r#"{"results":{"channels":[{"alternatives":[]}]}}"#).unwrap();
        assert!(parsed.results.channels[0].alternatives.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let t = DeepgramTranscriber::new(SecretString::from("k".to_string()), "nova-2".to_string())
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(t.base_url, "http://localhost:9000");
    }
}
