use crate::budget::RequestBudget;
use crate::gateway::{ApiFailure, GatewayError};
use crate::models::chat::TranscriptionResult;
use crate::providers::AudioUpload;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Extension, Multipart},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

const FILE_FIELD: &str = "file";

/// `POST /api/transcribe`: multipart upload with one `file` part.
pub async fn transcribe(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<TranscriptionResult>, Response> {
    let missing = GatewayError::MissingInput("No file provided");

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "transcription request is not multipart");
            return Err(ApiFailure::new("No file provided", &missing).into_response());
        }
    };

    let audio = match read_file_field(&mut multipart).await? {
        Some(audio) => audio,
        None => return Err(ApiFailure::new("No file provided", &missing).into_response()),
    };

    let budget = RequestBudget::with_token(state.config.provider_timeout, state.shutdown.child_token());

    match state.transcription.transcribe(audio, &budget).await {
        Ok(result) => Ok(Json(result)),
        Err(e @ GatewayError::MissingInput(_)) => Err(ApiFailure::new("No file provided", &e).into_response()),
        Err(e) => {
            tracing::warn!(error = %e, kind = ?e.kind(), "transcription failed");
            Err(ApiFailure::server_error("Transcription failed", &e).into_response())
        }
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<AudioUpload>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(upload_failure(e.status(), e.body_text())),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_owned);
        let file_name = field.file_name().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_failure(e.status(), e.body_text()))?;

        let mut audio = AudioUpload::webm(bytes.to_vec());
        // Forward what the recorder declared; the provider sniffs the container anyway.
        if let Some(content_type) = content_type.filter(|ct| ct.starts_with("audio/")) {
            audio.content_type = content_type;
        }
        if let Some(file_name) = file_name.filter(|name| !name.is_empty()) {
            audio.file_name = file_name;
        }
        return Ok(Some(audio));
    }
}

fn upload_failure(status: StatusCode, reason: String) -> Response {
    tracing::warn!(status = status.as_u16(), reason = %reason, "failed to read upload");
    let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "File too large"
    } else {
        "Invalid upload"
    };
    (
        status,
        Json(json!({
            "error": error,
            "message": reason,
        })),
    )
        .into_response()
}
