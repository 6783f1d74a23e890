// src/gateway/mod.rs
//! Server-side handlers' core: forward one request to a provider and
//! normalize the outcome into the error taxonomy below.

pub mod completion;
pub mod transcription;

pub use completion::CompletionGateway;
pub use transcription::TranscriptionGateway;

use crate::budget::BudgetExceeded;
use crate::providers::ProviderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayErrorKind {
    Timeout,
    NoReply,
    ServiceUnavailable,
    MissingInput,
    Unknown,
}

impl GatewayErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayErrorKind::MissingInput => StatusCode::BAD_REQUEST,
            GatewayErrorKind::NoReply | GatewayErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request timed out")]
    Timeout,
    #[error("No reply from AI")]
    NoReply,
    #[error("{0}")]
    MissingInput(&'static str),
    #[error("Server is shutting down")]
    Cancelled,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::Timeout => GatewayErrorKind::Timeout,
            GatewayError::NoReply => GatewayErrorKind::NoReply,
            GatewayError::MissingInput(_) => GatewayErrorKind::MissingInput,
            GatewayError::Cancelled => GatewayErrorKind::ServiceUnavailable,
            GatewayError::Provider(e) if e.is_transient() => GatewayErrorKind::ServiceUnavailable,
            GatewayError::Provider(_) => GatewayErrorKind::Unknown,
        }
    }

    /// User-facing message; provider internals go to `details`.
    fn message(&self) -> String {
        match self.kind() {
            GatewayErrorKind::ServiceUnavailable => "Service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            GatewayError::Provider(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

impl From<BudgetExceeded> for GatewayError {
    fn from(e: BudgetExceeded) -> Self {
        match e {
            BudgetExceeded::Deadline => GatewayError::Timeout,
            BudgetExceeded::Cancelled => GatewayError::Cancelled,
        }
    }
}

/// JSON body of every failed gateway request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub error_kind: GatewayErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A gateway error paired with the label of the operation that failed.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub envelope: ErrorEnvelope,
}

impl ApiFailure {
    pub fn new(label: &str, error: &GatewayError) -> Self {
        let kind = error.kind();
        Self {
            status: kind.status(),
            envelope: ErrorEnvelope {
                error: label.to_string(),
                error_kind: kind,
                message: error.message(),
                timestamp: Utc::now(),
                details: error.details(),
            },
        }
    }

    /// Same envelope, but every failure other than missing input is a 500.
    /// Transcription callers only distinguish bad requests from server errors.
    pub fn server_error(label: &str, error: &GatewayError) -> Self {
        let mut failure = Self::new(label, error);
        if failure.envelope.error_kind != GatewayErrorKind::MissingInput {
            failure.status = StatusCode::INTERNAL_SERVER_ERROR;
        }
        failure
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}
