//! Interview endpoints: topic, turns, session end and history

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ApiState, session_id};
use crate::pipeline::{CompletedTurn, HistorySnapshot, TurnFailure, TurnFailureReason, TurnInput};
use crate::stt::TranscriptSource;
use crate::voice::AudioSample;

/// Build interview router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/set_topic", post(set_topic))
        .route("/process_interaction", post(process_interaction))
        .route("/process_audio", post(process_audio))
        .route("/end_session", post(end_session))
        .route("/session/history", get(history))
        .with_state(state)
}

/// Topic change request
#[derive(Debug, Default, Deserialize)]
pub struct SetTopicRequest {
    pub topic: Option<String>,
}

/// Topic change response
#[derive(Debug, Serialize)]
pub struct SetTopicResponse {
    pub status: &'static str,
    pub topic: String,
    pub message: String,
    pub audio_url: String,
}

async fn set_topic(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SetTopicResponse>, InterviewError> {
    let request: SetTopicRequest = parse_optional(&body)?;
    let session = session_id(&headers);

    let change = state
        .orchestrator
        .set_topic(&session, request.topic.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(SetTopicResponse {
        status: "success",
        topic: change.topic,
        message: change.message,
        audio_url: change.audio.url,
    }))
}

/// Turn request; without `text` the server captures from its microphone
#[derive(Debug, Default, Deserialize)]
pub struct InteractionRequest {
    pub text: Option<String>,
}

/// Completed turn response
#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub status: &'static str,
    pub user_text: String,
    pub ai_text: String,
    pub audio_url: String,
    pub transcript_source: Option<TranscriptSource>,
}

impl From<CompletedTurn> for InteractionResponse {
    fn from(turn: CompletedTurn) -> Self {
        Self {
            status: "success",
            user_text: turn.user_text,
            ai_text: turn.reply_text,
            audio_url: turn.audio.url,
            transcript_source: turn.transcript_source,
        }
    }
}

async fn process_interaction(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, InterviewError> {
    let request: InteractionRequest = parse_optional(&body)?;
    let session = session_id(&headers);

    let turn = state
        .orchestrator
        .process_turn(&session, TurnInput::text_or_capture(request.text))
        .await?;

    Ok(Json(turn.into()))
}

/// Run a turn on an uploaded WAV recording
async fn process_audio(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, InterviewError> {
    if body.is_empty() {
        return Err(InterviewError::BadRequest("Empty audio data".to_string()));
    }

    let sample = AudioSample::from_wav(&body)
        .map_err(|e| InterviewError::BadRequest(format!("Invalid WAV audio: {e}")))?;
    let session = session_id(&headers);

    let turn = state
        .orchestrator
        .process_turn(&session, TurnInput::Audio(sample))
        .await?;

    Ok(Json(turn.into()))
}

/// Session end request
#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default = "default_speak")]
    pub speak: bool,
}

impl Default for EndSessionRequest {
    fn default() -> Self {
        Self {
            speak: default_speak(),
        }
    }
}

const fn default_speak() -> bool {
    true
}

/// Feedback report response
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub status: &'static str,
    pub topic: String,
    pub feedback: String,
    pub score: Option<u8>,
    pub turns: usize,
    pub audio_url: Option<String>,
}

async fn end_session(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EndSessionResponse>, InterviewError> {
    let request: EndSessionRequest = parse_optional(&body)?;
    let session = session_id(&headers);

    let feedback = state.orchestrator.end_session(&session, request.speak).await;

    Ok(Json(EndSessionResponse {
        status: "success",
        topic: feedback.topic,
        feedback: feedback.report.text,
        score: feedback.report.score,
        turns: feedback.turns,
        audio_url: feedback.audio.map(|a| a.url),
    }))
}

async fn history(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Json<HistorySnapshot> {
    Json(state.orchestrator.history(&session_id(&headers)).await)
}

/// Parse an optional JSON body; an empty body yields the default request
fn parse_optional<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, InterviewError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| InterviewError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Interview API errors
#[derive(Debug)]
pub enum InterviewError {
    BadRequest(String),
    Turn(TurnFailure),
}

impl From<TurnFailure> for InterviewError {
    fn from(failure: TurnFailure) -> Self {
        Self::Turn(failure)
    }
}

impl IntoResponse for InterviewError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            status: &'static str,
            reason: &'static str,
            message: String,
        }

        let (status, reason, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Turn(failure) => {
                let status = match failure.reason {
                    TurnFailureReason::NoSpeechDetected => StatusCode::UNPROCESSABLE_ENTITY,
                    TurnFailureReason::AudioGenerationFailed => StatusCode::BAD_GATEWAY,
                };
                (status, failure.reason.code(), failure.message)
            }
        };

        (
            status,
            Json(ErrorResponse {
                status: "error",
                reason,
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_empty_body() {
        let request: InteractionRequest = parse_optional(b"").unwrap();
        assert!(request.text.is_none());

        let request: EndSessionRequest = parse_optional(b"  \n").unwrap();
        assert!(request.speak);
    }

    #[test]
    fn test_parse_optional_rejects_garbage() {
        let err = parse_optional::<SetTopicRequest>(b"{not json").unwrap_err();
        assert!(matches!(err, InterviewError::BadRequest(_)));
    }

    #[test]
    fn test_end_session_speak_defaults_on() {
        let request: EndSessionRequest = parse_optional(b"{}").unwrap();
        assert!(request.speak);
        let request: EndSessionRequest = parse_optional(br#"{"speak":false}"#).unwrap();
        assert!(!request.speak);
    }
}
