// Reply audio playback

use super::ClientError;
use crate::models::chat::ChatResponse;
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;

/// Where decoded reply audio (MP3) goes.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<(), ClientError>;
}

/// What happened to the spoken half of a reply. The text is delivered
/// regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playback {
    /// Voice was off, or the reply carried no audio.
    Silent,
    Played,
    /// The server produced text but could not synthesize speech.
    SpeechUnavailable,
    Failed(String),
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

pub async fn play_reply(sink: &dyn AudioSink, reply: &ChatResponse) -> Playback {
    let Some(encoded) = reply.audio.as_deref() else {
        return if reply.speech_error.is_some() {
            Playback::SpeechUnavailable
        } else {
            Playback::Silent
        };
    };

    let audio = match decode_audio(encoded) {
        Ok(audio) => audio,
        Err(e) => {
            tracing::error!(error = %e, "reply audio is not valid base64");
            return Playback::Failed(format!("Could not decode audio: {}", e));
        }
    };

    match sink.play(&audio).await {
        Ok(()) => Playback::Played,
        Err(e) => {
            tracing::error!(error = %e, "audio playback failed");
            Playback::Failed(e.to_string())
        }
    }
}

/// Writes each reply to `<dir>/reply-<timestamp>.mp3` for an external player.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&self, audio: &[u8]) -> Result<(), ClientError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ClientError::Playback(e.to_string()))?;

        let file_name = format!("reply-{}.mp3", chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f"));
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, audio)
            .await
            .map_err(|e| ClientError::Playback(format!("{}: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), bytes = audio.len(), "reply audio saved");
        Ok(())
    }
}
