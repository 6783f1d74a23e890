// OpenAI-compatible API client
// Supports: Whisper transcription, chat completions, text-to-speech

use crate::budget::RequestBudget;
use crate::config::OpenAiSettings;
use crate::models::chat::TranscriptionResult;
use crate::providers::{
    AudioUpload, ProviderError, SpeechSynthesizer, SpeechToText, TextGenerator,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    settings: OpenAiSettings,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatCompletionMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Serialize, Debug)]
pub struct ChatCompletionMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SpeechRequest<'a> {
    pub model: &'a str,
    pub voice: &'a str,
    pub input: &'a str,
}

/// `verbose_json` transcription; only the fields we surface.
#[derive(Deserialize, Debug)]
pub struct VerboseTranscription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// Per-call HTTP timeout; refuses to start a call once the budget is spent.
    fn call_timeout(budget: &RequestBudget, api: &str) -> Result<std::time::Duration, ProviderError> {
        if budget.is_exhausted() {
            tracing::warn!(api, "request budget spent before the call started");
            return Err(ProviderError::Unreachable(format!("no time left to call {}", api)));
        }
        Ok(budget.remaining())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    /// Turns a non-2xx response into a typed error, keeping the body for diagnostics.
    async fn ensure_success(response: Response, api: &str) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        if status.as_u16() == 429 || status.is_server_error() {
            tracing::warn!(api, status = status.as_u16(), body = %body, "provider API error");
        } else {
            tracing::error!(api, status = status.as_u16(), body = %body, "provider API error");
        }
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(
        &self,
        audio: AudioUpload,
        budget: &RequestBudget,
    ) -> Result<TranscriptionResult, ProviderError> {
        let timeout = Self::call_timeout(budget, "transcriptions")?;
        tracing::debug!(audio_bytes = audio.bytes.len(), "starting transcription");

        let part = reqwest::multipart::Part::bytes(audio.bytes)
            .file_name(audio.file_name)
            .mime_str(&audio.content_type)
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.settings.stt_model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.settings.api_key)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                ProviderError::from(e)
            })?;

        let response = Self::ensure_success(response, "transcriptions").await?;
        let result: VerboseTranscription = response.json().await?;

        tracing::info!(chars = result.text.len(), language = ?result.language, "transcription complete");
        Ok(TranscriptionResult {
            text: result.text,
            language: result.language.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        budget: &RequestBudget,
    ) -> Result<Option<String>, ProviderError> {
        let timeout = Self::call_timeout(budget, "chat/completions")?;
        let request = ChatCompletionRequest {
            model: &self.settings.chat_model,
            messages: vec![ChatCompletionMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        tracing::debug!(model = %self.settings.chat_model, prompt_chars = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.settings.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "completion request failed");
                ProviderError::from(e)
            })?;

        let response = Self::ensure_success(response, "chat/completions").await?;
        let completion: ChatCompletionResponse = response.json().await?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, input: &str, budget: &RequestBudget) -> Result<Vec<u8>, ProviderError> {
        let timeout = Self::call_timeout(budget, "audio/speech")?;
        let request = SpeechRequest {
            model: &self.settings.tts_model,
            voice: &self.settings.tts_voice,
            input,
        };

        let response = self
            .client
            .post(self.url("audio/speech"))
            .bearer_auth(&self.settings.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let response = Self::ensure_success(response, "audio/speech").await?;
        let audio_bytes = response.bytes().await?;
        tracing::debug!(audio_bytes = audio_bytes.len(), "speech synthesized");
        Ok(audio_bytes.to_vec())
    }
}
