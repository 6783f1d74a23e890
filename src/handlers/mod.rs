pub mod auth;
pub mod chat;
pub mod history;
pub mod status;
pub mod transcribe;

use crate::middleware::{
    auth::auth_middleware, logging::request_logging_middleware, rate_limit::ai_rate_limit_middleware,
};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Extension},
    routing::post,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Transcription and completion: authenticated, then rate limited per client.
pub fn gateway_routes(max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/transcribe",
            post(transcribe::transcribe).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/chat", post(chat::chat))
        .layer(axum::middleware::from_fn(ai_rate_limit_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// The whole HTTP surface with shared state attached.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::auth_routes())
        .merge(gateway_routes(state.config.max_upload_bytes))
        .merge(history::history_routes())
        .merge(status::status_routes())
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
