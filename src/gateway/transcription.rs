// src/gateway/transcription.rs
use super::GatewayError;
use crate::budget::RequestBudget;
use crate::models::chat::TranscriptionResult;
use crate::providers::{AudioUpload, SpeechToText};
use std::sync::Arc;

/// Forwards one audio blob to the speech-to-text provider. No retries here;
/// the caller decides whether a failure is worth another attempt.
#[derive(Clone)]
pub struct TranscriptionGateway {
    provider: Arc<dyn SpeechToText>,
}

impl TranscriptionGateway {
    pub fn new(provider: Arc<dyn SpeechToText>) -> Self {
        Self { provider }
    }

    pub async fn transcribe(
        &self,
        audio: AudioUpload,
        budget: &RequestBudget,
    ) -> Result<TranscriptionResult, GatewayError> {
        if audio.bytes.is_empty() {
            return Err(GatewayError::MissingInput("No file provided"));
        }

        tracing::info!(audio_bytes = audio.bytes.len(), content_type = %audio.content_type, "transcribing utterance");

        let result = budget.run(self.provider.transcribe(audio, budget)).await?;
        match result {
            Ok(transcription) => Ok(transcription),
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                Err(GatewayError::Provider(e))
            }
        }
    }
}
