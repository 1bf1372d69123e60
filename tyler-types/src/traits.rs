//! Object-safe traits implemented by the backend crates.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::completion::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::error::{FileStoreError, ProviderError, StoreError};
use crate::thread::Thread;
use crate::time::utc_datetime;

/// A stream of completion chunks from a provider.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ProviderError>> + Send>>;

/// An LLM backend speaking the Chat Completions shape.
///
/// Implementations convert their transport-specific responses into the
/// internal wire types once, at this boundary.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send a completion request and return the full response.
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// Send a completion request and return a chunk stream.
    async fn complete_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<CompletionStream, ProviderError>;
}

/// Durable storage for threads and their messages.
///
/// Reads of a nonexistent id return `None`; deletes return `false`.
/// A save either persists the whole thread or fails without a partial
/// write. Concurrent saves to the same thread are safe: the last writer
/// wins on the thread row while messages merge by their hash-derived id.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Upsert a thread and diff-apply its messages.
    async fn save(&self, thread: &Thread) -> Result<(), StoreError>;

    /// Fetch a thread with all messages, or `None` when absent.
    async fn get(&self, thread_id: &str) -> Result<Option<Thread>, StoreError>;

    /// Delete a thread and its messages. Returns whether it existed.
    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError>;

    /// List threads ordered by `updated_at` descending.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Thread>, StoreError>;

    /// The most recently updated threads.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Thread>, StoreError>;

    /// Threads whose attributes contain every requested key with an
    /// equal value.
    async fn find_by_attributes(
        &self,
        attributes: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError>;

    /// Threads whose source `name` matches and whose source contains
    /// every requested property with an equal value.
    async fn find_by_source(
        &self,
        source_name: &str,
        properties: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError>;
}

/// Metadata recorded alongside a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Size of the stored content in bytes.
    pub size: u64,
}

/// The record returned by a successful file save. This is the only
/// metadata a backend keeps; the filesystem carries no sidecars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Generated file identifier.
    pub id: String,
    /// Original filename.
    pub filename: String,
    /// Validated MIME type.
    pub mime_type: String,
    /// Backend-relative storage path.
    pub storage_path: String,
    /// Which backend holds the bytes (e.g. `"local"`).
    pub storage_backend: String,
    /// When the file was stored (UTC).
    #[serde(with = "utc_datetime")]
    pub created_at: DateTime<Utc>,
    /// Additional metadata.
    pub metadata: FileMetadata,
}

/// Content-addressed persistence of attachment bytes.
///
/// The default implementation is a local sharded filesystem tree; any
/// backend exposing these operations (object storage) satisfies the
/// contract.
#[async_trait]
pub trait FileBackend: Send + Sync {
    /// Validate and persist a blob, returning its storage record.
    async fn save_file(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<StoredFile, FileStoreError>;

    /// Fetch a blob by id, preferring the recorded storage path.
    async fn get_file(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<Vec<u8>, FileStoreError>;

    /// Remove a blob by id.
    async fn delete_file(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<(), FileStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_object_safe() {
        fn check(
            _: Option<&dyn Provider>,
            _: Option<&dyn ThreadStore>,
            _: Option<&dyn FileBackend>,
        ) {
        }
        check(None, None, None);
    }
}
