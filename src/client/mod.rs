// src/client/mod.rs
//! Capture client: records an utterance, sends it through transcription and
//! completion, plays the reply and keeps the conversation in sync with the
//! server's history.

pub mod api;
pub mod capture;
pub mod log;
pub mod playback;
pub mod session;

pub use api::{ApiClient, VoiceBackend};
pub use capture::{FileMicrophone, Microphone};
pub use log::ConversationLog;
pub use playback::{AudioSink, FileSink, Playback};
pub use session::{SessionSettings, SessionState, Turn, VoiceSession};

use crate::gateway::GatewayErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("A recording is already in progress")]
    Busy,
    #[error("Nothing was recorded")]
    EmptyUtterance,
    #[error("Microphone error: {0}")]
    Capture(String),
    #[error("Network error: {0}")]
    Http(String),
    #[error("{message} ({status})")]
    Server {
        status: u16,
        kind: Option<GatewayErrorKind>,
        message: String,
    },
    #[error("Request timed out")]
    TimedOut,
    #[error("Request cancelled")]
    Cancelled,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Playback error: {0}")]
    Playback(String),
}

impl ClientError {
    /// Only a service-unavailable answer is worth asking again.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Server { status, kind, .. } => {
                *status == 503 || *kind == Some(GatewayErrorKind::ServiceUnavailable)
            }
            _ => false,
        }
    }

    /// The line shown to the user for this failure.
    pub fn notice(&self) -> String {
        match self {
            ClientError::Busy => "Already recording".to_string(),
            ClientError::EmptyUtterance => "Didn't catch that, please try again".to_string(),
            ClientError::TimedOut => "Request timed out, please try again later".to_string(),
            ClientError::Cancelled => "Request cancelled".to_string(),
            ClientError::NotSignedIn => "Please sign in first".to_string(),
            ClientError::Server { status: 429, .. } => "Too many requests, wait a minute and try again".to_string(),
            ClientError::Server { kind, message, .. } => match kind {
                Some(GatewayErrorKind::Timeout) => "The assistant took too long to answer".to_string(),
                Some(GatewayErrorKind::NoReply) => "The assistant had nothing to say, try rephrasing".to_string(),
                Some(GatewayErrorKind::ServiceUnavailable) => {
                    "The assistant is temporarily unavailable".to_string()
                }
                Some(GatewayErrorKind::MissingInput) => "Nothing to send".to_string(),
                Some(GatewayErrorKind::Unknown) | None => format!("Request failed: {}", message),
            },
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::TimedOut
        } else {
            ClientError::Http(e.to_string())
        }
    }
}
