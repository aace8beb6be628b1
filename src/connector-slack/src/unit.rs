//! Upstream message contract.
//!
//! The connector pipeline hands the adapter a JSON document with a
//! `message_info` routing section and a `content` section. It is parsed into
//! [`OutboundMessage`] and validated into an [`OutboundUnit`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SlackError, SlackResult};

/// Raw unit of work as produced upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default)]
    pub message_info: MessageInfo,
    #[serde(default)]
    pub content: Content,
}

/// Routing data for a reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Target channel id.
    #[serde(default)]
    pub channel: Option<String>,
    /// `ts` of the message being answered; replies go into its thread.
    #[serde(default)]
    pub ts: Option<String>,
    /// `ts` of the "working on it" placeholder to delete afterwards.
    #[serde(default)]
    pub ack_msg_ts: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Reply payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub text: Option<TextPayload>,
    #[serde(default)]
    pub files: Option<Vec<FileAttachment>>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub first_streamed_chunk: Option<bool>,
    #[serde(default)]
    pub last_streamed_chunk: Option<bool>,
    /// Stream id shared by all chunks of one streamed reply.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Text is either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextPayload {
    One(String),
    Many(Vec<Value>),
}

impl TextPayload {
    /// The string items; anything else in a list is skipped.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TextPayload::One(text) => vec![text],
            TextPayload::Many(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A file to upload alongside the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    /// Base64-encoded file bytes.
    pub content: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileAttachment {
    /// Decode the base64 content.
    pub fn decode(&self) -> SlackResult<Vec<u8>> {
        STANDARD
            .decode(self.content.trim())
            .map_err(|e| SlackError::Decode(format!("{}: {}", self.name, e)))
    }
}

/// A validated unit of work, consumed once by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundUnit {
    pub channel: String,
    pub text: Vec<String>,
    pub files: Vec<FileAttachment>,
    pub thread_ts: Option<String>,
    pub ack_msg_ts: Option<String>,
    pub session_id: Option<String>,
    pub stream: bool,
    pub first_chunk: bool,
    pub last_chunk: bool,
    pub stream_id: Option<String>,
}

impl OutboundUnit {
    /// Plain, non-streamed text reply.
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: vec![text.into()],
            ..Default::default()
        }
    }

    /// One chunk of a streamed reply.
    pub fn chunk(
        channel: impl Into<String>,
        stream_id: impl Into<String>,
        text: impl Into<String>,
        first_chunk: bool,
        last_chunk: bool,
    ) -> Self {
        Self {
            channel: channel.into(),
            text: vec![text.into()],
            stream: true,
            first_chunk,
            last_chunk,
            stream_id: Some(stream_id.into()),
            ..Default::default()
        }
    }

    /// Whether this unit carries the final text of its reply.
    pub fn is_final(&self) -> bool {
        !self.stream || self.last_chunk
    }
}

impl TryFrom<OutboundMessage> for OutboundUnit {
    type Error = SlackError;

    fn try_from(message: OutboundMessage) -> SlackResult<Self> {
        let OutboundMessage {
            message_info,
            content,
        } = message;

        let channel = message_info
            .channel
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SlackError::InvalidPayload("No channel specified in message".into()))?;

        Ok(Self {
            channel,
            text: content.text.map(TextPayload::into_vec).unwrap_or_default(),
            files: content.files.unwrap_or_default(),
            thread_ts: message_info.ts,
            ack_msg_ts: message_info.ack_msg_ts,
            session_id: message_info.session_id,
            stream: content.stream.unwrap_or(false),
            first_chunk: content.first_streamed_chunk.unwrap_or(false),
            last_chunk: content.last_streamed_chunk.unwrap_or(false),
            stream_id: content.uuid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_streamed_chunk() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "message_info": {
                "channel": "C1",
                "ts": "100.1",
                "ack_msg_ts": "100.2",
                "session_id": "sess-1",
                "user_email": "someone@example.com"
            },
            "content": {
                "text": "partial",
                "stream": true,
                "first_streamed_chunk": true,
                "last_streamed_chunk": null,
                "uuid": "stream-1"
            }
        }))
        .unwrap();

        let unit = OutboundUnit::try_from(message).unwrap();
        assert_eq!(unit.channel, "C1");
        assert_eq!(unit.text, vec!["partial"]);
        assert_eq!(unit.thread_ts.as_deref(), Some("100.1"));
        assert_eq!(unit.ack_msg_ts.as_deref(), Some("100.2"));
        assert!(unit.stream);
        assert!(unit.first_chunk);
        assert!(!unit.last_chunk);
        assert!(!unit.is_final());
        assert_eq!(unit.stream_id.as_deref(), Some("stream-1"));
    }

    #[test]
    fn test_text_list_and_files_only() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "message_info": {"channel": "C1", "session_id": "s"},
            "content": {"text": ["a", "b"]}
        }))
        .unwrap();
        assert_eq!(OutboundUnit::try_from(message).unwrap().text, vec!["a", "b"]);

        let message: OutboundMessage = serde_json::from_value(json!({
            "message_info": {"channel": "C1", "session_id": "s"},
            "content": {"files": [{"name": "a.txt", "content": "aGk=", "mime_type": "text/plain", "filetype": "txt", "size": 2}]}
        }))
        .unwrap();
        let unit = OutboundUnit::try_from(message).unwrap();
        assert!(unit.text.is_empty());
        assert_eq!(unit.files.len(), 1);
        assert!(unit.is_final());
    }

    #[test]
    fn test_non_string_text_items_skipped() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "message_info": {"channel": "C1", "ack_msg_ts": "100.2"},
            "content": {
                "text": ["a", null, 3, "b"],
                "files": [{"name": "a.txt", "content": "aGk="}]
            }
        }))
        .unwrap();

        let unit = OutboundUnit::try_from(message).unwrap();
        assert_eq!(unit.text, vec!["a", "b"]);
        assert_eq!(unit.files.len(), 1);
        assert_eq!(unit.ack_msg_ts.as_deref(), Some("100.2"));
    }

    #[test]
    fn test_missing_channel_rejected() {
        let message: OutboundMessage = serde_json::from_value(json!({
            "message_info": {"session_id": "s"},
            "content": {"text": "hi"}
        }))
        .unwrap();
        assert!(matches!(
            OutboundUnit::try_from(message),
            Err(SlackError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_file_decode() {
        let file = FileAttachment {
            name: "a.txt".to_string(),
            content: "aGVsbG8=".to_string(),
            mime_type: None,
            filetype: None,
            size: None,
        };
        assert_eq!(file.decode().unwrap(), b"hello");

        let bad = FileAttachment {
            content: "%%%".to_string(),
            ..file
        };
        assert!(matches!(bad.decode(), Err(SlackError::Decode(_))));
    }
}
