use crate::budget::RequestBudget;
use crate::gateway::{ApiFailure, GatewayError};
use crate::models::auth::Claims;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::AppState;
use axum::extract::{rejection::JsonRejection, Extension};
use axum::response::Json;
use std::sync::Arc;

const CHAT_FAILED: &str = "Chat failed";

/// `POST /api/chat`: one reply, optionally with speech, under the chat budget.
pub async fn chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiFailure> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "malformed chat request");
        ApiFailure::new(CHAT_FAILED, &GatewayError::MissingInput("No message provided"))
    })?;

    tracing::info!(
        user_id = %claims.sub,
        message_chars = request.message.chars().count(),
        enable_voice = request.enable_voice,
        "chat request"
    );

    let budget = RequestBudget::with_token(state.config.chat_timeout, state.shutdown.child_token());

    match state.completion.respond(&request, &budget).await {
        Ok(response) => {
            tracing::info!(
                user_id = %claims.sub,
                reply_chars = response.text.chars().count(),
                has_audio = response.audio.is_some(),
                speech_failed = response.speech_error.is_some(),
                "chat reply ready"
            );
            Ok(Json(response))
        }
        Err(e) => {
            tracing::error!(user_id = %claims.sub, kind = ?e.kind(), error = %e, "chat failed");
            Err(ApiFailure::new(CHAT_FAILED, &e))
        }
    }
}
