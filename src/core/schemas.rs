//! Wire types shared by the HTTP API, the WebSocket channel and the REPL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::utils::new_id;

/// A dataset the user uploaded, addressed by a path the sandbox can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub filename: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    File(FileRef),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::File(_) => None,
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "stream/start")]
    StreamStart,
    #[serde(rename = "stream/text")]
    StreamText,
    #[serde(rename = "stream/end")]
    StreamEnd,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "error")]
    Error,
}

/// One message on the chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub conversation: String,
    #[serde(rename = "from", default)]
    pub from: Option<String>,
    pub content: MessageContent,
    #[serde(rename = "type", default = "default_type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sent_at: Option<DateTime<Utc>>,
}

fn default_type() -> MessageType {
    MessageType::Text
}

impl ChatMessage {
    pub fn new(
        conversation: &str,
        from: &str,
        content: impl Into<MessageContent>,
        kind: MessageType,
    ) -> Self {
        Self {
            id: new_id(),
            conversation: conversation.to_string(),
            from: Some(from.to_string()),
            content: content.into(),
            kind,
            sent_at: Some(Utc::now()),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn info(conversation: &str, text: impl Into<String>) -> Self {
        Self::new(conversation, "system", text.into(), MessageType::Info)
    }

    pub fn error(conversation: &str, text: impl Into<String>) -> Self {
        Self::new(conversation, "system", text.into(), MessageType::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConversation {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConversation {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub userid: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_text_message() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"conversation":"c1","from":"alice","content":"hi"}"#)
                .unwrap();
        assert_eq!(msg.conversation, "c1");
        assert_eq!(msg.content.as_text(), Some("hi"));
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.id.len(), 32);
    }

    #[test]
    fn parses_file_message() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"id":"m1","conversation":"c1","content":{"filename":"a.csv","path":"/data/a.csv","size":12},"type":"file"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageType::File);
        match msg.content {
            MessageContent::File(file) => {
                assert_eq!(file.filename, "a.csv");
                assert_eq!(file.path, "/data/a.csv");
                assert_eq!(file.size, 12);
            }
            other => panic!("expected file content, got {other:?}"),
        }
    }

    #[test]
    fn stream_types_serialize_with_slash() {
        let msg = ChatMessage::new("c1", "ai", "tok", MessageType::StreamText);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "stream/text");
        assert_eq!(json["from"], "ai");
        assert_eq!(json["content"], "tok");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res = serde_json::from_str::<ChatMessage>(
            r#"{"conversation":"c1","content":"hi","type":"bogus"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn detail_flattens_conversation() {
        let now = Utc::now();
        let detail = ConversationDetail {
            conversation: Conversation {
                id: "c1".into(),
                title: "New chat".into(),
                owner: Some("alice".into()),
                created_at: now,
                updated_at: now,
            },
            messages: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], "c1");
        assert_eq!(json["title"], "New chat");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }
}
