// lib.rs - voice chat server and client
pub mod accounts;
pub mod budget;
pub mod client;
pub mod config;
pub mod db;
pub mod gateway;
pub mod handlers;
pub mod history;
pub mod middleware;
pub mod models;
pub mod openai_client;
pub mod providers;

#[cfg(test)]
mod testing;

use accounts::{AccountStore, TokenService};
use config::AppConfig;
use gateway::{CompletionGateway, TranscriptionGateway};
use history::HistoryStore;
use middleware::rate_limit::RateLimiter;
use providers::{SpeechSynthesizer, SpeechToText, TextGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// Shared by every handler through an `Extension<Arc<AppState>>`
pub struct AppState {
    pub config: AppConfig,
    pub accounts: Arc<dyn AccountStore>,
    pub history: Arc<dyn HistoryStore>,
    pub transcription: TranscriptionGateway,
    pub completion: CompletionGateway,
    pub tokens: TokenService,
    pub ai_rate_limiter: RateLimiter,
    pub auth_rate_limiter: RateLimiter,
    /// Cancelled on shutdown; every request budget is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        accounts: Arc<dyn AccountStore>,
        history: Arc<dyn HistoryStore>,
        speech_to_text: Arc<dyn SpeechToText>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            transcription: TranscriptionGateway::new(speech_to_text),
            completion: CompletionGateway::new(generator, synthesizer, config.speech_input_limit),
            tokens: TokenService::new(config.jwt_secret.clone(), config.token_ttl_hours),
            ai_rate_limiter: RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
            auth_rate_limiter: RateLimiter::new(config.auth_rate_limit_per_minute, Duration::from_secs(60)),
            shutdown: CancellationToken::new(),
            accounts,
            history,
            config,
        }
    }
}
