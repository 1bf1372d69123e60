//! File attachments bound to messages.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::FileStoreError;
use crate::traits::FileBackend;

/// Inline attachment payload: raw bytes, or a string that may be base64.
///
/// Serialized forms always carry a string (bytes are base64-encoded), so
/// a round-tripped attachment deserializes to the [`Text`](Self::Text)
/// variant and [`Attachment::get_content_bytes`] decodes it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    /// Raw bytes as provided by the caller.
    Bytes(Vec<u8>),
    /// A base64 or plain-text string.
    Text(String),
}

impl Serialize for AttachmentContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bytes(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            Self::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for AttachmentContent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::Text(String::deserialize(deserializer)?))
    }
}

impl From<Vec<u8>> for AttachmentContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for AttachmentContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A file attached to a message.
///
/// Created with inline content, then validated and persisted to a
/// [`FileBackend`], after which the serialized form carries only the
/// storage reference (`file_id` + `storage_path` + `storage_backend`)
/// and omits the raw bytes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    /// Original filename.
    pub filename: String,
    /// MIME type, detected during processing when absent.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Inline payload; cleared from serialized forms once stored.
    #[serde(default)]
    pub content: Option<AttachmentContent>,
    /// Result of post-processing (extracted text, image payload, or an
    /// `error` entry when processing failed).
    #[serde(default)]
    pub processed_content: Option<Map<String, Value>>,
    /// Identifier assigned by the file store.
    #[serde(default)]
    pub file_id: Option<String>,
    /// Path within the storage backend.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Which backend holds the bytes (e.g. `"local"`).
    #[serde(default)]
    pub storage_backend: Option<String>,
}

impl Attachment {
    /// Create an attachment from inline content.
    #[must_use]
    pub fn new(filename: impl Into<String>, content: impl Into<AttachmentContent>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            content: Some(content.into()),
            processed_content: None,
            file_id: None,
            storage_path: None,
            storage_backend: None,
        }
    }

    /// Resolve the attachment's bytes.
    ///
    /// Resolution order: the storage backend when a `file_id` is present,
    /// then inline bytes, then base64-decoding the inline string, then
    /// the UTF-8 bytes of the string itself.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NoContent`] when there is neither a
    /// resolvable storage reference nor inline content, or the backend's
    /// error when a stored read fails.
    pub async fn get_content_bytes(
        &self,
        backend: Option<&dyn FileBackend>,
    ) -> Result<Vec<u8>, FileStoreError> {
        if let Some(file_id) = &self.file_id
            && let Some(backend) = backend
        {
            return backend.get_file(file_id, self.storage_path.as_deref()).await;
        }

        match &self.content {
            Some(AttachmentContent::Bytes(bytes)) => Ok(bytes.clone()),
            Some(AttachmentContent::Text(text)) => Ok(BASE64
                .decode(text)
                .unwrap_or_else(|_| text.as_bytes().to_vec())),
            None => Err(FileStoreError::NoContent(self.filename.clone())),
        }
    }

    /// Persist the inline content to the backend and record the storage
    /// reference. No-op when the attachment is already stored or has no
    /// inline content.
    ///
    /// # Errors
    ///
    /// Propagates validation and I/O errors from the backend.
    pub async fn ensure_stored(&mut self, backend: &dyn FileBackend) -> Result<(), FileStoreError> {
        if self.file_id.is_some() {
            return Ok(());
        }
        let bytes = match &self.content {
            Some(_) => self.get_content_bytes(None).await?,
            None => return Ok(()),
        };
        let stored = backend
            .save_file(&bytes, &self.filename, self.mime_type.as_deref())
            .await?;
        self.file_id = Some(stored.id);
        self.storage_path = Some(stored.storage_path);
        self.storage_backend = Some(stored.storage_backend);
        if self.mime_type.is_none() {
            self.mime_type = Some(stored.mime_type);
        }
        Ok(())
    }

    /// Whether post-processing classified this attachment as an image.
    #[must_use]
    pub fn is_processed_image(&self) -> bool {
        self.processed_content
            .as_ref()
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            == Some("image")
    }
}

// Serialized forms omit `content` once a file_id is present; the bytes
// then live in the file store only.
impl Serialize for Attachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let include_content = self.file_id.is_none() && self.content.is_some();
        let mut fields = 6;
        if include_content {
            fields += 1;
        }
        let mut state = serializer.serialize_struct("Attachment", fields)?;
        state.serialize_field("filename", &self.filename)?;
        state.serialize_field("mime_type", &self.mime_type)?;
        if include_content {
            state.serialize_field("content", &self.content)?;
        }
        state.serialize_field("processed_content", &self.processed_content)?;
        state.serialize_field("file_id", &self.file_id)?;
        state.serialize_field("storage_path", &self.storage_path)?;
        state.serialize_field("storage_backend", &self.storage_backend)?;
        state.end()
    }
}
