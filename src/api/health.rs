//! Health check and session creation endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response listing the active providers
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub transcription: Vec<&'static str>,
    pub generation: &'static str,
    pub synthesis: &'static str,
    pub capture: &'static str,
    pub sessions: usize,
}

/// New session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub status: &'static str,
    pub session_id: String,
    pub topic: String,
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/session", post(create_session))
        .with_state(state)
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - which providers will serve a turn?
async fn ready(State(state): State<Arc<ApiState>>) -> Json<ReadinessResponse> {
    let providers = state.orchestrator.providers();

    Json(ReadinessResponse {
        status: "ok",
        transcription: providers.transcription,
        generation: providers.generation,
        synthesis: providers.synthesis,
        capture: providers.capture,
        sessions: state.orchestrator.sessions().len().await,
    })
}

/// Allocate a fresh session id for a browser tab or client
async fn create_session(State(state): State<Arc<ApiState>>) -> Json<CreateSessionResponse> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let handle = state.orchestrator.sessions().get_or_create(&session_id).await;
    let topic = handle.lock().await.topic().to_string();

    tracing::info!(session = %session_id, "session opened");

    Json(CreateSessionResponse {
        status: "success",
        session_id,
        topic,
    })
}
