// src/client/session.rs
//! One voice conversation: record, transcribe, complete, play.
//!
//! A turn moves Idle → Recording → Transcribing → Processing and always ends
//! back in Idle, whether it succeeds, fails, or its future is dropped.

use super::api::VoiceBackend;
use super::capture::{record_utterance, Microphone};
use super::log::ConversationLog;
use super::playback::{play_reply, AudioSink, Playback};
use super::ClientError;
use crate::models::chat::{ChatMessage, ChatRequest, ChatResponse, MessageType, TranscriptionResult};
use backoff::{future::retry, ExponentialBackoffBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Transcribing,
    Processing,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Longest utterance recorded before capture stops on its own.
    pub record_limit: Duration,
    /// Client-side bound on a completion request, retries included.
    pub request_timeout: Duration,
    /// Extra attempts after a service-unavailable answer.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub enable_voice: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            record_limit: Duration::from_secs(10),
            request_timeout: Duration::from_secs(110),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            enable_voice: true,
        }
    }
}

/// Outcome of one completed turn.
#[derive(Debug)]
pub struct Turn {
    pub transcript: TranscriptionResult,
    pub reply: ChatResponse,
    pub playback: Playback,
}

// Puts the session back to Idle however the turn ends.
struct IdleOnDrop(Arc<watch::Sender<SessionState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(SessionState::Idle);
    }
}

pub struct VoiceSession {
    backend: Arc<dyn VoiceBackend>,
    microphone: Arc<dyn Microphone>,
    sink: Arc<dyn AudioSink>,
    settings: SessionSettings,
    state: Arc<watch::Sender<SessionState>>,
    log: ConversationLog,
    cancel: CancellationToken,
}

impl VoiceSession {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        microphone: Arc<dyn Microphone>,
        sink: Arc<dyn AudioSink>,
        settings: SessionSettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            backend,
            microphone,
            sink,
            settings,
            state: Arc::new(state),
            log: ConversationLog::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Cancelling this token abandons the in-flight request and every later one.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn set_state(&self, next: SessionState) {
        tracing::debug!(state = ?next, "session state");
        self.state.send_replace(next);
    }

    /// Records one utterance (until `stop` fires or the record limit is hit)
    /// and runs it through transcription, completion and playback.
    pub async fn run_turn(&mut self, stop: &CancellationToken) -> Result<Turn, ClientError> {
        if self.state() != SessionState::Idle {
            return Err(ClientError::Busy);
        }
        let _idle = IdleOnDrop(self.state.clone());

        let result = self.turn(stop).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "voice turn failed");
        }
        result
    }

    async fn turn(&mut self, stop: &CancellationToken) -> Result<Turn, ClientError> {
        self.set_state(SessionState::Recording);
        let audio = record_utterance(self.microphone.as_ref(), stop, self.settings.record_limit).await?;
        if audio.is_empty() {
            return Err(ClientError::EmptyUtterance);
        }

        self.set_state(SessionState::Transcribing);
        let transcript = self.backend.transcribe(audio).await?;
        if transcript.text.trim().is_empty() {
            return Err(ClientError::EmptyUtterance);
        }
        tracing::info!(language = %transcript.language, chars = transcript.text.chars().count(), "utterance transcribed");
        self.persist(&transcript.text, MessageType::User).await;

        self.set_state(SessionState::Processing);
        let reply = self.complete(&transcript.text).await?;
        self.persist(&reply.text, MessageType::Assistant).await;

        let playback = play_reply(self.sink.as_ref(), &reply).await;

        Ok(Turn {
            transcript,
            reply,
            playback,
        })
    }

    /// History writes never fail a turn.
    async fn persist(&mut self, content: &str, kind: MessageType) {
        match self.backend.append_message(content, kind).await {
            Ok(message) => {
                self.log.push(message);
            }
            Err(e) => tracing::warn!(error = %e, kind = %kind, "failed to save message"),
        }
    }

    async fn complete(&self, text: &str) -> Result<ChatResponse, ClientError> {
        let request = ChatRequest {
            message: text.to_string(),
            enable_voice: self.settings.enable_voice,
        };
        let cancel = self.cancel.child_token();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(self.settings.request_timeout) => {
                tracing::warn!(timeout_secs = self.settings.request_timeout.as_secs(), "chat request timed out");
                Err(ClientError::TimedOut)
            }
            result = self.chat_with_retry(&request) => result,
        }
    }

    async fn chat_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(None)
            .build();

        let backend = &self.backend;
        let max_retries = self.settings.max_retries;
        let mut attempt = 0u32;

        retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match backend.chat(request).await {
                    Ok(reply) => Ok(reply),
                    Err(e) if e.is_transient() && current <= max_retries => {
                        tracing::warn!(attempt = current, error = %e, "chat unavailable, retrying");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    /// Loads `page` of the server history into the log.
    pub async fn load_history(&mut self, page: u32) -> Result<(), ClientError> {
        let page = self.backend.history_page(page).await?;
        self.log.merge_page(page);
        Ok(())
    }

    /// Fetches the next page when the server reported more.
    pub async fn load_more(&mut self) -> Result<(), ClientError> {
        if !self.log.has_more() {
            return Ok(());
        }
        self.load_history(self.log.next_page()).await
    }

    pub async fn delete_message(&mut self, id: Uuid) -> Result<(), ClientError> {
        self.backend.delete_message(id).await?;
        self.log.remove(id);
        Ok(())
    }

    pub async fn clear_history(&mut self) -> Result<u64, ClientError> {
        let deleted = self.backend.clear_history().await?;
        self.log.clear();
        Ok(deleted)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.messages()
    }
}
