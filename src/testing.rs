// In-memory providers and stores plus request helpers for the test modules.

use crate::accounts::AccountStore;
use crate::budget::RequestBudget;
use crate::config::AppConfig;
use crate::db::StoreError;
use crate::handlers::app;
use crate::history::{has_more, page_window, HistoryStore};
use crate::models::auth::User;
use crate::models::chat::{ChatMessage, HistoryPage, MessageType, TranscriptionResult};
use crate::providers::{AudioUpload, ProviderError, SpeechSynthesizer, SpeechToText, TextGenerator};
use crate::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

// ============================================================================
// Providers
// ============================================================================

pub struct FakeSpeechToText {
    outcome: Result<TranscriptionResult, ProviderError>,
    delay: Option<Duration>,
    uploads: Mutex<Vec<usize>>,
}

impl FakeSpeechToText {
    pub fn ok(text: &str, language: &str) -> Self {
        Self::with_outcome(Ok(TranscriptionResult {
            text: text.to_string(),
            language: language.to_string(),
        }))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<TranscriptionResult, ProviderError>) -> Self {
        Self {
            outcome,
            delay: None,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Byte length of every upload received.
    pub fn uploads(&self) -> Vec<usize> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToText for FakeSpeechToText {
    async fn transcribe(
        &self,
        audio: AudioUpload,
        _budget: &RequestBudget,
    ) -> Result<TranscriptionResult, ProviderError> {
        self.uploads.lock().unwrap().push(audio.bytes.len());
        pause(self.delay).await;
        self.outcome.clone()
    }
}

pub struct FakeTextGenerator {
    outcome: Result<Option<String>, ProviderError>,
    delay: Option<Duration>,
}

impl FakeTextGenerator {
    pub fn reply(text: &str) -> Self {
        Self {
            outcome: Ok(Some(text.to_string())),
            delay: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            outcome: Ok(None),
            delay: None,
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn complete(&self, _prompt: &str, _budget: &RequestBudget) -> Result<Option<String>, ProviderError> {
        pause(self.delay).await;
        self.outcome.clone()
    }
}

pub struct FakeSynthesizer {
    outcome: Result<Vec<u8>, ProviderError>,
    delay: Option<Duration>,
    inputs: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn ok(audio: Vec<u8>) -> Self {
        Self::with_outcome(Ok(audio))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<Vec<u8>, ProviderError>) -> Self {
        Self {
            outcome,
            delay: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every text handed to the synthesizer, recorded when the call starts.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, _budget: &RequestBudget) -> Result<Vec<u8>, ProviderError> {
        self.inputs.lock().unwrap().push(text.to_string());
        pause(self.delay).await;
        self.outcome.clone()
    }
}

// ============================================================================
// Stores
// ============================================================================

#[derive(Default)]
pub struct MemoryHistory {
    // Insertion order is creation order.
    rows: Mutex<Vec<(Uuid, ChatMessage)>>,
    unavailable: AtomicBool,
}

impl MemoryHistory {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, user_id: Uuid, content: &str, kind: MessageType) -> Result<ChatMessage, StoreError> {
        self.check()?;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push((user_id, message.clone()));
        Ok(message)
    }

    async fn page(&self, user_id: Uuid, page: u32) -> Result<HistoryPage, StoreError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let owned: Vec<&ChatMessage> = rows.iter().filter(|(owner, _)| *owner == user_id).map(|(_, m)| m).collect();
        let (offset, limit) = page_window(page);
        let total = owned.len() as i64;

        Ok(HistoryPage {
            messages: owned
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect(),
            page,
            has_more: has_more(page, total),
            total,
        })
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(owner, m)| !(*owner == user_id && m.id == id));
        Ok(rows.len() < before)
    }

    async fn clear(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(owner, _)| *owner != user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[derive(Default)]
pub struct MemoryAccounts {
    users: Mutex<Vec<User>>,
    revoked: Mutex<HashSet<Uuid>>,
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict("User"));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn revoke_token(&self, jti: Uuid, _expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.revoked.lock().unwrap().insert(jti);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(self.revoked.lock().unwrap().contains(&jti))
    }
}

// ============================================================================
// Application
// ============================================================================

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/open_speech_test".to_string()),
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        "JWT_SECRET" => Some("test-secret".to_string()),
        // Cheapest cost bcrypt accepts keeps the auth tests fast.
        "BCRYPT_COST" => Some("4".to_string()),
        _ => None,
    })
    .unwrap()
}

pub struct TestAppBuilder {
    config: AppConfig,
    speech_to_text: Arc<dyn SpeechToText>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl TestAppBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn speech_to_text(mut self, provider: Arc<dyn SpeechToText>) -> Self {
        self.speech_to_text = provider;
        self
    }

    pub fn text_generator(mut self, provider: Arc<dyn TextGenerator>) -> Self {
        self.generator = provider;
        self
    }

    pub fn synthesizer(mut self, provider: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = provider;
        self
    }

    pub fn build(self) -> TestApp {
        let history = Arc::new(MemoryHistory::default());
        let state = Arc::new(AppState::new(
            self.config,
            Arc::new(MemoryAccounts::default()),
            history.clone(),
            self.speech_to_text,
            self.generator,
            self.synthesizer,
        ));
        TestApp {
            router: app(state.clone()),
            state,
            history,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub history: Arc<MemoryHistory>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            config: test_config(),
            speech_to_text: Arc::new(FakeSpeechToText::ok("hello", "english")),
            generator: Arc::new(FakeTextGenerator::reply("Hi!")),
            synthesizer: Arc::new(FakeSynthesizer::ok(b"mp3".to_vec())),
        }
    }

    /// Registers an account and returns its session token.
    pub async fn sign_up(&self, email: &str, password: &str) -> String {
        let (status, body) = send(
            &self.router,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "sign up failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Serves the app on an ephemeral local port and returns its base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }
}

pub async fn send_request(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send_request(router, request).await
}

pub fn multipart_request(uri: &str, token: &str, field: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "open-speech-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"audio.webm\"\r\nContent-Type: audio/webm\r\n\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}
