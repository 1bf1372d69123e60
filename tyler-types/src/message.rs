//! A single turn in a thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::attachment::Attachment;
use crate::completion::{ChatMessage, ToolCall};
use crate::metrics::MessageMetrics;
use crate::time::{format_utc, utc_datetime};

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The system prompt.
    System,
    /// A human user.
    User,
    /// The model.
    Assistant,
    /// A tool result.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// The URL of an image content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// An https or `data:` URL.
    pub url: String,
}

/// One typed part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// An image reference.
    ImageUrl {
        /// The image location.
        image_url: ImageUrl,
    },
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// A plain text body.
    Text(String),
    /// Multimodal parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The first text in the content, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            }),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A single message in a thread.
///
/// The id is derived deterministically from the hashed fields (role,
/// sequence, content, timestamp, tool-result name, source), so a message
/// keeps the same identity across processes and serialization
/// round-trips. The thread assigns `sequence` when the message is added
/// and re-derives the id at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Deterministic hash-derived identifier.
    pub id: String,
    /// Who authored this message.
    pub role: Role,
    /// Position within the thread: system = 0, others 1-indexed.
    #[serde(default)]
    pub sequence: u64,
    /// The message body, if any.
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// Tool name, set on tool results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlates a tool result with the tool call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls emitted by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Free-form attributes. The reserved key `tool_attributes` carries
    /// the tool's declared attributes on tool results.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    /// When the message was created (UTC).
    #[serde(with = "utc_datetime")]
    pub timestamp: DateTime<Utc>,
    /// Where the message came from (at least a `name` key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,
    /// Files attached to the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Timing, usage, and tracing metrics.
    #[serde(default)]
    pub metrics: MessageMetrics,
}

impl Message {
    /// Create a message with the given role and content. The id is
    /// derived immediately; adding the message to a thread assigns its
    /// sequence and re-derives the id.
    #[must_use]
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        let mut message = Self {
            id: String::new(),
            role,
            sequence: 0,
            content: Some(content.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            attributes: Map::new(),
            timestamp: crate::time::now_utc(),
            source: None,
            attachments: Vec::new(),
            metrics: MessageMetrics::default(),
        };
        message.refresh_id();
        message
    }

    /// Set the tool name (for tool results).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.refresh_id();
        self
    }

    /// Set the correlating tool call id (for tool results).
    #[must_use]
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    /// Set the tool calls emitted by an assistant message.
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = if calls.is_empty() { None } else { Some(calls) };
        self
    }

    /// Set the message metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MessageMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the source descriptor.
    #[must_use]
    pub fn with_source(mut self, source: Map<String, Value>) -> Self {
        self.source = Some(source);
        self.refresh_id();
        self
    }

    /// Set the free-form attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Attach files to the message.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Override the creation timestamp. Adapters that redeliver
    /// messages supply the original event time here so the derived id
    /// stays stable across deliveries.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self.refresh_id();
        self
    }

    /// Re-derive the id from the current hashed fields.
    pub fn refresh_id(&mut self) {
        self.id = self.derive_id();
    }

    /// Compute the deterministic id: hex SHA-256 over a canonical
    /// key-sorted JSON encoding of the identity fields.
    #[must_use]
    pub fn derive_id(&self) -> String {
        let mut identity = Map::new();
        identity.insert("role".into(), json!(self.role));
        identity.insert("sequence".into(), json!(self.sequence));
        identity.insert(
            "content".into(),
            serde_json::to_value(&self.content).unwrap_or(Value::Null),
        );
        identity.insert("timestamp".into(), json!(format_utc(&self.timestamp)));
        if self.role == Role::Tool
            && let Some(name) = &self.name
        {
            identity.insert("name".into(), json!(name));
        }
        if let Some(source) = &self.source {
            identity.insert("source".into(), Value::Object(source.clone()));
        }

        // serde_json maps serialize with sorted keys, which makes the
        // encoding canonical.
        let canonical = Value::Object(identity).to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Project the message into the shape expected by chat-completion
    /// APIs, appending extracted attachment text to user content and
    /// expanding processed images into multimodal parts. Tool messages
    /// are never augmented.
    #[must_use]
    pub fn to_chat_completion_message(&self) -> ChatMessage {
        let mut text = match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(_)) | None => String::new(),
        };
        let mut content = match &self.content {
            Some(MessageContent::Parts(parts)) => MessageContent::Parts(parts.clone()),
            _ => MessageContent::Text(text.clone()),
        };

        if self.role != Role::Tool
            && !self.attachments.is_empty()
            && matches!(content, MessageContent::Text(_))
        {
            let mut file_contents: Vec<String> = Vec::new();
            for attachment in &self.attachments {
                let Some(processed) = &attachment.processed_content else {
                    continue;
                };
                if attachment.is_processed_image() {
                    continue;
                }
                file_contents.push(format!("\n--- File: {} ---", attachment.filename));
                if let Some(overview) = processed.get("overview").and_then(Value::as_str) {
                    file_contents.push(format!("Overview: {overview}"));
                }
                if let Some(extracted) = processed.get("text").and_then(Value::as_str) {
                    file_contents.push(format!("Content:\n{extracted}"));
                }
                if let Some(error) = processed.get("error").and_then(Value::as_str) {
                    file_contents.push(format!("Error: {error}"));
                }
            }
            if !file_contents.is_empty() {
                if text.is_empty() {
                    text = file_contents.join("\n");
                } else {
                    text = format!("{text}\n\n{}", file_contents.join("\n"));
                }
            }

            let images: Vec<&Attachment> = self
                .attachments
                .iter()
                .filter(|a| a.is_processed_image())
                .collect();
            if images.is_empty() {
                content = MessageContent::Text(text);
            } else {
                // Images go into the projection only; the stored message
                // content stays text.
                let mut parts = vec![ContentPart::Text { text }];
                for image in images {
                    let processed = image.processed_content.as_ref().unwrap();
                    let mime = processed
                        .get("mime_type")
                        .and_then(Value::as_str)
                        .unwrap_or("image/png");
                    let data = processed
                        .get("content")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{mime};base64,{data}"),
                        },
                    });
                }
                content = MessageContent::Parts(parts);
            }
        }

        ChatMessage {
            role: self.role,
            content,
            sequence: self.sequence,
            name: self.name.clone(),
            tool_calls: if self.role == Role::Assistant {
                self.tool_calls.clone()
            } else {
                None
            },
            tool_call_id: if self.role == Role::Tool {
                self.tool_call_id.clone()
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::FunctionCall;
    use proptest::prelude::*;

    #[test]
    fn id_is_stable_across_recomputation() {
        let message = Message::new(Role::User, "Hello");
        assert_eq!(message.id, message.derive_id());
    }

    #[test]
    fn id_survives_serialization_roundtrip() {
        let mut message = Message::new(Role::User, "Here are some files to look at");
        message.sequence = 1;
        message.refresh_id();

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, message.id);
        assert_eq!(back.derive_id(), message.id);
    }

    #[test]
    fn stable_timestamp_makes_ids_reproducible() {
        let timestamp = crate::time::parse_utc("2024-02-07T00:00:00+00:00").unwrap();
        let a = Message::new(Role::User, "Hello").with_timestamp(timestamp);
        let b = Message::new(Role::User, "Hello").with_timestamp(timestamp);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn id_depends_on_sequence() {
        let mut a = Message::new(Role::User, "Hello");
        let mut b = a.clone();
        a.sequence = 1;
        a.refresh_id();
        b.sequence = 2;
        b.refresh_id();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn tool_name_participates_in_hash_only_for_tool_role() {
        let base = Message::new(Role::Assistant, "result");
        let named = base.clone().with_name("calculate");
        // Assistant messages ignore name in the hash.
        assert_eq!(base.derive_id(), named.derive_id());

        let mut tool = base.clone();
        tool.role = Role::Tool;
        let tool_named = tool.clone().with_name("calculate");
        assert_ne!(tool.derive_id(), tool_named.derive_id());
    }

    #[test]
    fn chat_completion_projection_minimal() {
        let mut message = Message::new(Role::User, "Hello");
        message.sequence = 1;
        let chat = message.to_chat_completion_message();
        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Hello");
        assert_eq!(value["sequence"], 1);
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn chat_completion_projection_none_content_becomes_empty() {
        let mut message = Message::new(Role::Assistant, "x");
        message.content = None;
        let chat = message.to_chat_completion_message();
        assert_eq!(chat.content, MessageContent::Text(String::new()));
    }

    #[test]
    fn chat_completion_projection_includes_tool_fields() {
        let assistant = Message::new(Role::Assistant, "").with_tool_calls(vec![ToolCall {
            id: "call_1".into(),
            kind: "function".into(),
            function: FunctionCall {
                name: "calculate".into(),
                arguments: r#"{"op":"divide","x":537,"y":3}"#.into(),
            },
        }]);
        let chat = assistant.to_chat_completion_message();
        assert_eq!(chat.tool_calls.as_ref().unwrap().len(), 1);

        let tool = Message::new(Role::Tool, "179")
            .with_name("calculate")
            .with_tool_call_id("call_1");
        let chat = tool.to_chat_completion_message();
        assert_eq!(chat.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(chat.name.as_deref(), Some("calculate"));
    }

    #[test]
    fn chat_completion_projection_appends_file_text() {
        let mut processed = Map::new();
        processed.insert("type".into(), json!("document"));
        processed.insert("overview".into(), json!("A quarterly report"));
        processed.insert("text".into(), json!("Revenue grew 10%"));

        let mut attachment = Attachment::new("report.pdf", b"%PDF".to_vec());
        attachment.processed_content = Some(processed);

        let message =
            Message::new(Role::User, "Summarize this").with_attachments(vec![attachment]);
        let chat = message.to_chat_completion_message();
        let MessageContent::Text(text) = &chat.content else {
            panic!("expected text content");
        };
        assert!(text.starts_with("Summarize this\n\n"));
        assert!(text.contains("--- File: report.pdf ---"));
        assert!(text.contains("Overview: A quarterly report"));
        assert!(text.contains("Content:\nRevenue grew 10%"));
    }

    #[test]
    fn chat_completion_projection_reports_processing_errors() {
        let mut processed = Map::new();
        processed.insert("error".into(), json!("Failed to process file: corrupt"));

        let mut attachment = Attachment::new("broken.pdf", b"%PDF".to_vec());
        attachment.processed_content = Some(processed);

        let message = Message::new(Role::User, "Look at this").with_attachments(vec![attachment]);
        let chat = message.to_chat_completion_message();
        let MessageContent::Text(text) = &chat.content else {
            panic!("expected text content");
        };
        assert!(text.contains("Error: Failed to process file: corrupt"));
    }

    #[test]
    fn chat_completion_projection_expands_images_to_parts() {
        let mut processed = Map::new();
        processed.insert("type".into(), json!("image"));
        processed.insert("content".into(), json!("aGVsbG8="));
        processed.insert("mime_type".into(), json!("image/png"));

        let mut attachment = Attachment::new("shot.png", b"\x89PNG".to_vec());
        attachment.processed_content = Some(processed);

        let message =
            Message::new(Role::User, "What is in this?").with_attachments(vec![attachment]);
        let chat = message.to_chat_completion_message();
        let MessageContent::Parts(parts) = &chat.content else {
            panic!("expected multimodal parts");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], ContentPart::Text { text } if text == "What is in this?"));
        assert!(matches!(
            &parts[1],
            ContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,aGVsbG8="
        ));
    }

    #[test]
    fn tool_messages_are_never_augmented() {
        let mut processed = Map::new();
        processed.insert("text".into(), json!("extracted"));
        let mut attachment = Attachment::new("out.txt", b"data".to_vec());
        attachment.processed_content = Some(processed);

        let message = Message::new(Role::Tool, "result")
            .with_name("generate_report")
            .with_tool_call_id("call_9")
            .with_attachments(vec![attachment]);
        let chat = message.to_chat_completion_message();
        assert_eq!(chat.content, MessageContent::Text("result".into()));
    }

    proptest! {
        #[test]
        fn derive_id_is_pure(text in ".{0,64}", sequence in 0u64..100) {
            let mut message = Message::new(Role::User, text.as_str());
            message.sequence = sequence;
            message.refresh_id();
            let json = serde_json::to_string(&message).unwrap();
            let back: Message = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.derive_id(), message.id);
        }
    }
}
