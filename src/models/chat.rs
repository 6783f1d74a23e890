// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Assistant,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "assistant" => Ok(MessageType::Assistant),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

/// One turn of a conversation as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub page: u32,
    pub has_more: bool,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewMessageRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub enable_voice: bool,
}

/// Non-fatal annotation attached when the reply text was produced but speech was not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeechError {
    SpeechGenerationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub text: String,
    /// Base64-encoded MP3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_error: Option<SpeechError>,
}

impl ChatResponse {
    pub fn text_only(text: String) -> Self {
        Self {
            text,
            audio: None,
            speech_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_only_reply_has_no_audio_field() {
        let value = serde_json::to_value(ChatResponse::text_only("Hi there".to_string())).unwrap();
        assert_eq!(value, json!({ "text": "Hi there" }));
    }

    #[test]
    fn speech_failure_marker_wire_format() {
        let response = ChatResponse {
            text: "Hi there".to_string(),
            audio: None,
            speech_error: Some(SpeechError::SpeechGenerationFailed),
        };
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(
            value,
            json!({ "text": "Hi there", "speechError": "SPEECH_GENERATION_FAILED" })
        );
    }

    #[test]
    fn enable_voice_defaults_to_false() {
        let request: ChatRequest = serde_json::from_value(json!({ "message": "Hello" })).unwrap();
        assert!(!request.enable_voice);

        let request: ChatRequest =
            serde_json::from_value(json!({ "message": "Hello", "enableVoice": true })).unwrap();
        assert!(request.enable_voice);
    }

    #[test]
    fn message_type_uses_lowercase_names() {
        assert_eq!("assistant".parse::<MessageType>().unwrap(), MessageType::Assistant);
        assert!("system".parse::<MessageType>().is_err());
        assert_eq!(serde_json::to_value(MessageType::User).unwrap(), json!("user"));
    }
}
