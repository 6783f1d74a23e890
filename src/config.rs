// src/config.rs
use rand::RngCore;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Model and voice selection for the OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub openai: OpenAiSettings,
    /// Wall-clock budget for one completion request, synthesis included.
    pub chat_timeout: Duration,
    /// Budget for a single transcription call.
    pub provider_timeout: Duration,
    /// Hard truncation boundary (in characters) for speech synthesis input.
    pub speech_input_limit: usize,
    pub max_upload_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub auth_rate_limit_per_minute: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using an ephemeral secret, sessions will not survive a restart");
                let mut key = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                hex::encode(key)
            }
        };

        let openai = OpenAiSettings {
            api_key,
            base_url: get("OPENAI_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            max_tokens: parse_or("CHAT_MAX_TOKENS", get("CHAT_MAX_TOKENS"), 5000)?,
            temperature: parse_or("CHAT_TEMPERATURE", get("CHAT_TEMPERATURE"), 0.7)?,
            stt_model: get("STT_MODEL").unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: get("TTS_MODEL").unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: get("TTS_VOICE").unwrap_or_else(|| "alloy".to_string()),
        };

        let chat_timeout_secs: u64 = parse_or("CHAT_TIMEOUT_SECS", get("CHAT_TIMEOUT_SECS"), 60)?;
        if chat_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CHAT_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let speech_input_limit: usize =
            parse_or("SPEECH_INPUT_LIMIT", get("SPEECH_INPUT_LIMIT"), 500)?;
        if speech_input_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "SPEECH_INPUT_LIMIT",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            database_url,
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            jwt_secret,
            token_ttl_hours: parse_or("TOKEN_TTL_HOURS", get("TOKEN_TTL_HOURS"), 24)?,
            bcrypt_cost: parse_or("BCRYPT_COST", get("BCRYPT_COST"), bcrypt::DEFAULT_COST)?,
            openai,
            chat_timeout: Duration::from_secs(chat_timeout_secs),
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECS",
                get("PROVIDER_TIMEOUT_SECS"),
                120,
            )?),
            speech_input_limit,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 25 * 1024 * 1024)?,
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", get("RATE_LIMIT_PER_MINUTE"), 60)?,
            auth_rate_limit_per_minute: parse_or(
                "AUTH_RATE_LIMIT_PER_MINUTE",
                get("AUTH_RATE_LIMIT_PER_MINUTE"),
                10,
            )?,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}
