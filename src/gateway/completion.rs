// src/gateway/completion.rs
//! Reply generation with optional speech, bounded by one request budget.
//!
//! Text delivery never depends on speech delivery: a synthesis failure is
//! reported as a `speechError` annotation next to the text. Only the budget
//! running out, or the text stage itself failing, fails the request, and in
//! that case nothing produced so far is returned.

use super::GatewayError;
use crate::budget::RequestBudget;
use crate::models::chat::{ChatRequest, ChatResponse, SpeechError};
use crate::providers::{SpeechSynthesizer, TextGenerator};
use base64::Engine;
use std::sync::Arc;

#[derive(Clone)]
pub struct CompletionGateway {
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speech_input_limit: usize,
}

impl CompletionGateway {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        speech_input_limit: usize,
    ) -> Self {
        Self {
            generator,
            synthesizer,
            speech_input_limit,
        }
    }

    pub async fn respond(
        &self,
        request: &ChatRequest,
        budget: &RequestBudget,
    ) -> Result<ChatResponse, GatewayError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(GatewayError::MissingInput("No message provided"));
        }

        match budget.run(self.pipeline(message, request.enable_voice, budget)).await {
            Ok(outcome) => outcome,
            Err(exceeded) => {
                tracing::warn!(reason = %exceeded, "chat request abandoned");
                Err(exceeded.into())
            }
        }
    }

    async fn pipeline(
        &self,
        message: &str,
        enable_voice: bool,
        budget: &RequestBudget,
    ) -> Result<ChatResponse, GatewayError> {
        let reply = match self.generator.complete(message, budget).await? {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                tracing::warn!("provider returned no reply text");
                return Err(GatewayError::NoReply);
            }
        };

        if !enable_voice {
            return Ok(ChatResponse::text_only(reply));
        }

        let input = speech_input(&reply, self.speech_input_limit);
        match self.synthesizer.synthesize(input, budget).await {
            Ok(audio) => Ok(ChatResponse {
                audio: Some(base64::engine::general_purpose::STANDARD.encode(audio)),
                text: reply,
                speech_error: None,
            }),
            Err(e) => {
                tracing::error!(error = %e, "speech synthesis failed, returning text only");
                Ok(ChatResponse {
                    text: reply,
                    audio: None,
                    speech_error: Some(SpeechError::SpeechGenerationFailed),
                })
            }
        }
    }
}

/// The first `limit` characters of `reply`.
pub fn speech_input(reply: &str, limit: usize) -> &str {
    match reply.char_indices().nth(limit) {
        Some((end, _)) => &reply[..end],
        None => reply,
    }
}
