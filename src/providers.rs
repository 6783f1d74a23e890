// src/providers.rs
//! Seams to the hosted AI services. The server only talks to these traits;
//! `openai_client::OpenAiClient` is the production implementation.

use crate::budget::RequestBudget;
use crate::models::chat::TranscriptionResult;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Connection refused, DNS failure, reset, or per-call timeout.
    #[error("Provider unreachable: {0}")]
    Unreachable(String),
    #[error("Provider API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse provider response: {0}")]
    Decode(String),
    #[error("Request error: {0}")]
    Request(String),
}

impl ProviderError {
    /// Failures worth retrying later: network trouble, rate limiting and gateway errors upstream.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unreachable(_) => true,
            ProviderError::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            ProviderError::Decode(_) | ProviderError::Request(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ProviderError::Unreachable(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

/// An uploaded audio blob in whatever container the recorder produced.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl AudioUpload {
    pub fn webm(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "audio.webm".to_string(),
            content_type: "audio/webm".to_string(),
        }
    }
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: AudioUpload,
        budget: &RequestBudget,
    ) -> Result<TranscriptionResult, ProviderError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns `Ok(None)` when the provider answered but produced no text.
    async fn complete(
        &self,
        prompt: &str,
        budget: &RequestBudget,
    ) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns encoded audio (MP3).
    async fn synthesize(&self, input: &str, budget: &RequestBudget) -> Result<Vec<u8>, ProviderError>;
}
