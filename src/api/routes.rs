//! API Routes
//!
//! Configures the Axum router with all voice cache endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    audio_handler, generate_handler, health_handler, list_outputs_handler, list_uploads_handler,
    purge_handler, stats_handler, upload_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /sessions/:session/uploads` - Store user audio
/// - `GET /sessions/:session/uploads` - List uploads, newest first
/// - `POST /sessions/:session/generate` - Run the whole pipeline
/// - `GET /sessions/:session/outputs` - List finished outputs with lineage
/// - `GET /sessions/:session/audio/:stage/:hash` - Fetch a payload
/// - `DELETE /sessions/:session/cache/:stage` - Purge one partition
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/sessions/:session/uploads",
            post(upload_handler).get(list_uploads_handler),
        )
        .route("/sessions/:session/generate", post(generate_handler))
        .route("/sessions/:session/outputs", get(list_outputs_handler))
        .route("/sessions/:session/audio/:stage/:hash", get(audio_handler))
        .route("/sessions/:session/cache/:stage", delete(purge_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
