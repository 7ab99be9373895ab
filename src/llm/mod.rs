//! Interviewer replies and feedback via a text generation service
//!
//! [`ResponseGenerator`] fails closed: any provider error, timeout or blank
//! output is replaced by a fixed sentence so a turn never dead-ends on a
//! language-model outage.

mod gemini;
mod openai;
pub mod prompt;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{ApiKeys, Config, LlmProvider};
use crate::session::Turn;
use crate::{Error, Result};

/// Reply used when generation fails
pub const FALLBACK_REPLY: &str = "I'm having trouble connecting to my brain right now.";

/// Report used when feedback generation fails
pub const FALLBACK_FEEDBACK: &str =
    "I couldn't put together your feedback right now, but thanks for practicing with me.";

/// A remote text generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Generate a completion for a single prompt
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or no text comes back
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// End-of-session critique
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackReport {
    /// Report as plain text
    pub text: String,
    /// Score out of 10 when the report states one
    pub score: Option<u8>,
}

impl FeedbackReport {
    fn from_text(text: String) -> Self {
        let score = parse_score(&text);
        Self { text, score }
    }
}

/// Reply shaping applied to every generation
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    pub persona_name: String,
    pub max_sentences: usize,
    pub timeout: Duration,
}

/// Builds interviewer prompts and absorbs generation failures
pub struct ResponseGenerator {
    generator: Box<dyn TextGenerator>,
    policy: ReplyPolicy,
}

impl ResponseGenerator {
    #[must_use]
    pub fn new(generator: Box<dyn TextGenerator>, policy: ReplyPolicy) -> Self {
        Self { generator, policy }
    }

    /// Build the configured provider with the interview's reply policy
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the selected provider has no key
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = &config.api_keys;
        let model = config.llm.model.clone();

        let generator: Box<dyn TextGenerator> = match config.llm.provider {
            LlmProvider::Gemini => Box::new(GeminiGenerator::new(
                ApiKeys::require(keys.gemini.as_ref(), "GEMINI_API_KEY")?,
                model,
            )?),
            LlmProvider::OpenAi => Box::new(OpenAiGenerator::new(
                ApiKeys::require(keys.openai.as_ref(), "OPENAI_API_KEY")?,
                model,
            )?),
        };

        Ok(Self::new(
            generator,
            ReplyPolicy {
                persona_name: config.interview.persona_name.clone(),
                max_sentences: config.interview.max_sentences,
                timeout: config.timeouts.generate,
            },
        ))
    }

    /// Name of the underlying provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.generator.name()
    }

    #[must_use]
    pub fn persona_name(&self) -> &str {
        self.policy.persona_name.as_str()
    }

    /// Generate the interviewer's reply to `utterance`
    ///
    /// Never fails; returns [`FALLBACK_REPLY`] when generation is degraded.
    pub async fn reply(&self, topic: &str, utterance: &str, recent: &[Turn]) -> String {
        let prompt = prompt::interviewer_prompt(
            &self.policy.persona_name,
            topic,
            self.policy.max_sentences,
            recent,
            utterance,
        );
        tracing::debug!(provider = self.generator.name(), topic, utterance, "generating reply");

        match self.generate_bounded(&prompt).await {
            Ok(text) => limit_sentences(&text, self.policy.max_sentences),
            Err(e) => {
                tracing::error!(provider = self.generator.name(), error = %e, "generation degraded, using fallback reply");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Produce a feedback report for a finished interview
    ///
    /// Never fails; returns [`FALLBACK_FEEDBACK`] when generation is degraded.
    pub async fn feedback(&self, topic: &str, history: &[Turn]) -> FeedbackReport {
        let prompt = prompt::feedback_prompt(topic, history);

        match self.generate_bounded(&prompt).await {
            Ok(text) => FeedbackReport::from_text(text),
            Err(e) => {
                tracing::error!(provider = self.generator.name(), error = %e, "feedback generation degraded");
                FeedbackReport::from_text(FALLBACK_FEEDBACK.to_string())
            }
        }
    }

    async fn generate_bounded(&self, prompt: &str) -> Result<String> {
        let limit = self.policy.timeout;
        let text = tokio::time::timeout(limit, self.generator.generate(prompt))
            .await
            .map_err(|_| Error::timeout("generation", limit))??;

        // markdown-only output cleans down to nothing
        let text = clean_for_speech(&text);
        if text.is_empty() {
            return Err(Error::Llm("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Strip markdown emphasis and collapse whitespace so text reads aloud cleanly
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    text.replace(['*', '#', '`'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep at most `max` sentences of `text`
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or the end of
/// the text, so decimals and dotted names stay intact.
#[must_use]
pub fn limit_sentences(text: &str, max: usize) -> String {
    let text = clean_for_speech(text);
    if max == 0 {
        return text;
    }

    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            // swallow runs like "?!" or "..."
            while chars.peek().is_some_and(|(_, n)| matches!(n, '.' | '!' | '?')) {
                chars.next();
            }
            let boundary = chars.peek().map_or(text.len(), |(i, _)| *i);
            let at_break = chars.peek().is_none_or(|(_, n)| n.is_whitespace());
            if at_break {
                count += 1;
                if count == max {
                    return text[..boundary].trim().to_string();
                }
            }
        }
    }

    text
}

/// Find a score written as `N/10` or `N out of 10`
#[must_use]
pub fn parse_score(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() || (i > 0 && bytes[i - 1].is_ascii_digit()) {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }

        let rest = text[i..].trim_start().to_lowercase();
        let denominator = rest
            .strip_prefix('/')
            .or_else(|| rest.strip_prefix("out of"))
            .map(str::trim_start);

        if denominator.is_some_and(|d| d.starts_with("10") && !d[2..].starts_with(|c: char| c.is_ascii_digit())) {
            if let Ok(score) = text[start..i].parse::<u8>() {
                if score <= 10 {
                    return Some(score);
                }
            }
        }
    }

    None
}
