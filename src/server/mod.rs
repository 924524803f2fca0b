//! WebSocket transport for live transcription sessions.

pub mod protocol;
pub mod ws;

use crate::asr::dispatcher::RecognitionPool;
use crate::asr::engine::Recognizer;
use crate::config::Config;
use crate::error::Result;
use crate::session::SessionRegistry;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state behind every request handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub pool: Arc<RecognitionPool>,
}

impl AppState {
    pub fn new(config: Config, recognizer: Arc<dyn Recognizer>) -> Self {
        let pool = RecognitionPool::from_config(recognizer, &config.asr);
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            pool: Arc::new(pool),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ws/audio/{session_id}/{source}", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::version_string(),
        "sessions": state.registry.session_count(),
        "available_workers": state.pool.available_workers(),
    }))
}

/// Binds the listen address and serves until the process is stopped.
pub async fn serve(config: Config, recognizer: Arc<dyn Recognizer>) -> Result<()> {
    let listen = config.server.listen.clone();
    let state = Arc::new(AppState::new(config, recognizer));
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(listen = %listen, engine = state.pool.engine_name(), "interscribe listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
