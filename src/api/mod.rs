//! HTTP API server for CodeCoach

pub mod health;
pub mod interview;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::pipeline::TurnOrchestrator;

/// Header carrying the interview session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Session used when a request carries no id
pub const DEFAULT_SESSION: &str = "default";

/// Shared state for API handlers
pub struct ApiState {
    pub orchestrator: TurnOrchestrator,
}

/// Session id from the request headers, or the default session
#[must_use]
pub fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

/// Interview, health and stored-audio routes
pub fn router(state: Arc<ApiState>) -> Router {
    let store = state.orchestrator.store();
    let audio_prefix = store.url_prefix().to_string();
    let audio = ServeDir::new(store.dir());

    Router::new()
        .merge(interview::router(state.clone()))
        .merge(health::router(state))
        .nest_service(&audio_prefix, audio)
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    #[must_use]
    pub fn new(orchestrator: TurnOrchestrator, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState { orchestrator }),
            port,
            static_dir: None,
        }
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = router(self.state.clone());

        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from the browser UI
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
