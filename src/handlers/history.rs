use crate::db::StoreError;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::{Claims, ErrorResponse};
use crate::models::chat::{ChatMessage, ClearHistoryResponse, HistoryPage, HistoryQuery, NewMessageRequest};
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn history_routes() -> Router {
    Router::new()
        .route("/api/history", get(list_history).post(append_message).delete(clear_history))
        .route("/api/history/:id", delete(delete_message))
        .layer(axum::middleware::from_fn(auth_middleware))
}

fn error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
}

fn store_failure(e: StoreError) -> ApiError {
    tracing::error!(error = %e, "history store failure");
    error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to access chat history")
}

async fn list_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let page = state
        .history
        .page(claims.sub, query.page)
        .await
        .map_err(store_failure)?;

    tracing::debug!(
        user_id = %claims.sub,
        page = query.page,
        returned = page.messages.len(),
        total = page.total,
        "history page loaded"
    );
    Ok(Json(page))
}

async fn append_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    if payload.content.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Message content is required"));
    }

    let message = state
        .history
        .append(claims.sub, &payload.content, payload.kind)
        .await
        .map_err(store_failure)?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .history
        .delete(claims.sub, id)
        .await
        .map_err(store_failure)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, "Message not found"))
    }
}

async fn clear_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let deleted = state.history.clear(claims.sub).await.map_err(store_failure)?;
    tracing::info!(user_id = %claims.sub, deleted, "chat history cleared");
    Ok(Json(ClearHistoryResponse { deleted }))
}
