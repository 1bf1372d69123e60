//! Attachment pipeline: prepare user-message attachments for the model
//! and for persistence.
//!
//! For each attachment the pipeline resolves the bytes, records the
//! detected MIME type, inlines images as base64, hands other formats to
//! the configured [`FileProcessor`], and persists the bytes through the
//! file backend when one is configured. Failures are captured into
//! `processed_content` and never raised to the caller.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};
use tracing::warn;

use tyler_files::detect_mime;
use tyler_types::{FileBackend, Message};

/// A file-processing failure, captured into the attachment's
/// `processed_content`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProcessingError(pub String);

/// Extracts model-readable content from an attachment.
///
/// This is the seam for external file-processor libraries (PDF text
/// extraction, OCR, transcription). The default [`TextFileProcessor`]
/// handles text-like formats only.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Produce a `processed_content` map (`type`, `text`, `overview`,
    /// ...) for the given content.
    async fn process(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<Map<String, Value>, ProcessingError>;
}

/// Processor for text-like attachments. Binary formats it cannot read
/// are reported as processing failures, which the pipeline captures
/// into the attachment rather than raising.
#[derive(Debug, Default)]
pub struct TextFileProcessor;

#[async_trait]
impl FileProcessor for TextFileProcessor {
    async fn process(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: &str,
    ) -> Result<Map<String, Value>, ProcessingError> {
        if mime_type == "application/json" {
            let text = String::from_utf8(content.to_vec())
                .map_err(|e| ProcessingError(format!("{filename} is not valid UTF-8: {e}")))?;
            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| ProcessingError(format!("{filename} is not valid JSON: {e}")))?;
            let mut map = Map::new();
            map.insert("type".into(), json!("json"));
            map.insert("text".into(), json!(text));
            map.insert("parsed_content".into(), parsed);
            return Ok(map);
        }

        if mime_type.starts_with("text/") {
            let text = String::from_utf8(content.to_vec())
                .map_err(|e| ProcessingError(format!("{filename} is not valid UTF-8: {e}")))?;
            let mut map = Map::new();
            map.insert("type".into(), json!("document"));
            map.insert("text".into(), json!(text));
            return Ok(map);
        }

        Err(ProcessingError(format!(
            "no processor available for {mime_type}"
        )))
    }
}

/// Run the pipeline over every attachment of a message.
///
/// Mutates the attachments in place: sets `mime_type`, fills
/// `processed_content`, and stores the bytes through `backend` when one
/// is given. The message `content` itself is never modified; image
/// attachments are expanded only in the chat-completion projection.
pub async fn process_message_files(
    message: &mut Message,
    processor: &dyn FileProcessor,
    backend: Option<&dyn FileBackend>,
) {
    for attachment in &mut message.attachments {
        let bytes = match attachment.get_content_bytes(backend).await {
            Ok(bytes) => bytes,
            Err(e) => {
                attachment.processed_content = Some(error_content(&e.to_string()));
                continue;
            }
        };

        let mime = match &attachment.mime_type {
            Some(mime) => mime.clone(),
            None => {
                let detected = detect_mime(&bytes, &attachment.filename, None);
                attachment.mime_type = Some(detected.clone());
                detected
            }
        };

        attachment.processed_content = if mime.starts_with("image/") {
            let mut map = Map::new();
            map.insert("type".into(), json!("image"));
            map.insert("content".into(), json!(BASE64.encode(&bytes)));
            map.insert("mime_type".into(), json!(mime));
            Some(map)
        } else {
            match processor.process(&bytes, &attachment.filename, &mime).await {
                Ok(map) => Some(map),
                Err(e) => Some(error_content(&e.to_string())),
            }
        };

        if let Some(backend) = backend
            && let Err(e) = attachment.ensure_stored(backend).await
        {
            // Validation or capacity failures degrade to inline content.
            warn!(
                filename = %attachment.filename,
                error = %e,
                "failed to store attachment"
            );
        }
    }
}

fn error_content(message: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "error".into(),
        json!(format!("Failed to process file: {message}")),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use tyler_files::{FileStore, FileStoreConfig};
    use tyler_types::{Attachment, Role};

    fn message_with(attachment: Attachment) -> Message {
        Message::new(Role::User, "look at this").with_attachments(vec![attachment])
    }

    #[tokio::test]
    async fn images_are_inlined_as_base64() {
        let png = b"\x89PNG\r\n\x1a\nfakeimagedata".to_vec();
        let mut message = message_with(Attachment::new("shot.png", png.clone()));
        process_message_files(&mut message, &TextFileProcessor, None).await;

        let processed = message.attachments[0].processed_content.as_ref().unwrap();
        assert_eq!(processed["type"], json!("image"));
        assert_eq!(processed["mime_type"], json!("image/png"));
        assert_eq!(processed["content"], json!(BASE64.encode(&png)));
        assert_eq!(
            message.attachments[0].mime_type.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn text_files_extract_their_content() {
        let mut message = message_with(Attachment::new("notes.txt", b"meeting notes".to_vec()));
        process_message_files(&mut message, &TextFileProcessor, None).await;

        let processed = message.attachments[0].processed_content.as_ref().unwrap();
        assert_eq!(processed["type"], json!("document"));
        assert_eq!(processed["text"], json!("meeting notes"));
    }

    #[tokio::test]
    async fn json_files_parse_their_content() {
        let mut message =
            message_with(Attachment::new("data.json", br#"{"key": "value"}"#.to_vec()));
        process_message_files(&mut message, &TextFileProcessor, None).await;

        let processed = message.attachments[0].processed_content.as_ref().unwrap();
        assert_eq!(processed["type"], json!("json"));
        assert_eq!(processed["parsed_content"]["key"], json!("value"));
    }

    #[tokio::test]
    async fn unprocessable_formats_capture_an_error() {
        let mut message = message_with(Attachment::new("archive.zip", b"PK\x03\x04data".to_vec()));
        process_message_files(&mut message, &TextFileProcessor, None).await;

        let processed = message.attachments[0].processed_content.as_ref().unwrap();
        let error = processed["error"].as_str().unwrap();
        assert!(error.starts_with("Failed to process file:"));
    }

    #[tokio::test]
    async fn message_content_is_never_modified() {
        let mut message = message_with(Attachment::new("notes.txt", b"text".to_vec()));
        let before = message.content.clone();
        process_message_files(&mut message, &TextFileProcessor, None).await;
        assert_eq!(message.content, before);
    }

    #[tokio::test]
    async fn attachments_are_stored_through_the_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(FileStoreConfig {
            base_path: dir.path().to_path_buf(),
            ..FileStoreConfig::default()
        })
        .unwrap();

        let mut message = message_with(Attachment::new("notes.txt", b"persist me".to_vec()));
        process_message_files(&mut message, &TextFileProcessor, Some(&store as &dyn FileBackend))
            .await;

        let attachment = &message.attachments[0];
        assert!(attachment.file_id.is_some());
        assert_eq!(attachment.storage_backend.as_deref(), Some("local"));
        let bytes = attachment
            .get_content_bytes(Some(&store as &dyn FileBackend))
            .await
            .unwrap();
        assert_eq!(bytes, b"persist me");
    }
}
