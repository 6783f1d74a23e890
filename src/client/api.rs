// HTTP client for the open-speech server API

use super::ClientError;
use crate::gateway::GatewayErrorKind;
use crate::models::auth::{AuthResponse, Credentials, UserResponse};
use crate::models::chat::{
    ChatMessage, ChatRequest, ChatResponse, ClearHistoryResponse, HistoryPage, MessageType,
    NewMessageRequest, TranscriptionResult,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use uuid::Uuid;

/// Everything a voice session needs from the server.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<TranscriptionResult, ClientError>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
    async fn append_message(&self, content: &str, kind: MessageType) -> Result<ChatMessage, ClientError>;
    async fn history_page(&self, page: u32) -> Result<HistoryPage, ClientError>;
    async fn delete_message(&self, id: Uuid) -> Result<(), ClientError>;
    async fn clear_history(&self) -> Result<u64, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotSignedIn)?;
        Ok(builder.bearer_auth(token))
    }

    /// Maps a non-2xx answer to `ClientError::Server`, reading whichever
    /// error body shape the endpoint uses.
    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let kind = body
            .get("errorKind")
            .and_then(|kind| serde_json::from_value::<GatewayErrorKind>(kind.clone()).ok());
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| body.get("error").and_then(Value::as_str))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed"))
            .to_string();

        tracing::debug!(status = status.as_u16(), ?kind, message = %message, "server returned an error");
        Err(ClientError::Server {
            status: status.as_u16(),
            kind,
            message,
        })
    }

    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        self.authenticate("/api/auth/signup", email, password).await
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        self.authenticate("/api/auth/signin", email, password).await
    }

    async fn authenticate(&mut self, path: &str, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.client.post(self.url(path)).json(&credentials).send().await?;
        let auth: AuthResponse = Self::check(response).await?.json().await?;

        tracing::info!(user = %auth.user.email, "signed in");
        self.token = Some(auth.token);
        Ok(auth.user)
    }

    pub async fn sign_out(&mut self) -> Result<(), ClientError> {
        let request = self.authorized(self.client.post(self.url("/api/auth/signout")))?;
        Self::check(request.send().await?).await?;
        self.token = None;
        Ok(())
    }
}

#[async_trait]
impl VoiceBackend for ApiClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<TranscriptionResult, ClientError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("audio.webm")
            .mime_str("audio/webm")
            .map_err(|e| ClientError::Http(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let request = self.authorized(self.client.post(self.url("/api/transcribe")))?;
        let response = request.multipart(form).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let builder = self.authorized(self.client.post(self.url("/api/chat")))?;
        let response = builder.json(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn append_message(&self, content: &str, kind: MessageType) -> Result<ChatMessage, ClientError> {
        let body = NewMessageRequest {
            content: content.to_string(),
            kind,
        };
        let builder = self.authorized(self.client.post(self.url("/api/history")))?;
        let response = builder.json(&body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn history_page(&self, page: u32) -> Result<HistoryPage, ClientError> {
        let builder = self.authorized(self.client.get(self.url("/api/history")))?;
        let response = builder.query(&[("page", page)]).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_message(&self, id: Uuid) -> Result<(), ClientError> {
        let builder = self.authorized(self.client.delete(self.url(&format!("/api/history/{}", id))))?;
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn clear_history(&self) -> Result<u64, ClientError> {
        let builder = self.authorized(self.client.delete(self.url("/api/history")))?;
        let cleared: ClearHistoryResponse = Self::check(builder.send().await?).await?.json().await?;
        Ok(cleared.deleted)
    }
}
