#![deny(missing_docs)]
//! Local sharded file storage for message attachments.
//!
//! [`FileStore`] persists opaque byte blobs under
//! `<base>/<id[0:2]>/<id[2:]>.<ext>` with quota and MIME policy
//! enforcement. The metadata of a stored file is only ever the returned
//! [`StoredFile`] record; the filesystem carries no sidecars.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use tyler_types::{FileBackend, FileMetadata, FileStoreError, StoredFile, ThreadStore};

mod config;
mod mime;

pub use config::{
    DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_STORAGE_SIZE, FileStoreConfig,
};
pub use mime::{detect_mime, sniff_mime};

/// Result of a [`FileStore::check_health`] probe.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether the store is usable.
    pub healthy: bool,
    /// Total bytes stored.
    pub total_size: u64,
    /// Number of stored files.
    pub file_count: u64,
    /// Errors encountered while probing.
    pub errors: Vec<String>,
}

/// Local filesystem file store with a sharded directory layout.
pub struct FileStore {
    base_path: PathBuf,
    max_file_size: u64,
    max_storage_size: u64,
    allowed_mime_types: HashSet<String>,
}

impl FileStore {
    /// Create a store from the given configuration, ensuring the base
    /// directory exists with 0755 permissions.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Initialization`] when the directory
    /// cannot be created.
    pub fn new(config: FileStoreConfig) -> Result<Self, FileStoreError> {
        std::fs::create_dir_all(&config.base_path)
            .map_err(|e| FileStoreError::Initialization(e.to_string()))?;
        set_dir_permissions(&config.base_path)
            .map_err(|e| FileStoreError::Initialization(e.to_string()))?;

        info!(
            base_path = %config.base_path.display(),
            max_file_size = config.max_file_size,
            max_storage_size = config.max_storage_size,
            "initialized file store"
        );
        Ok(Self {
            base_path: config.base_path,
            max_file_size: config.max_file_size,
            max_storage_size: config.max_storage_size,
            allowed_mime_types: config.allowed_mime_types,
        })
    }

    /// Create a store configured from the `TYLER_*` environment.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::Initialization`] when the directory
    /// cannot be created.
    pub fn from_env() -> Result<Self, FileStoreError> {
        Self::new(FileStoreConfig::from_env())
    }

    /// The storage root.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Sharded path for a file id: first two id characters form the
    /// shard directory, the rest the filename.
    fn file_path(&self, file_id: &str, extension: Option<&str>) -> PathBuf {
        let (shard, rest) = file_id.split_at(file_id.len().min(2));
        let filename = match extension {
            Some(ext) if !ext.is_empty() => format!("{rest}.{}", ext.trim_start_matches('.')),
            _ => rest.to_string(),
        };
        self.base_path.join(shard).join(filename)
    }

    /// Validate content against the size limit and MIME policy,
    /// returning the resolved MIME type.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::FileTooLarge`] or
    /// [`FileStoreError::UnsupportedFileType`].
    pub fn validate(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<String, FileStoreError> {
        if content.len() as u64 > self.max_file_size {
            return Err(FileStoreError::FileTooLarge {
                size: content.len() as u64,
                max: self.max_file_size,
            });
        }

        let mime = detect_mime(content, filename, mime_type);
        if !self.allowed_mime_types.contains(&mime) {
            return Err(FileStoreError::UnsupportedFileType(mime));
        }
        Ok(mime)
    }

    /// Validate and persist a blob under a fresh UUID.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`FileStoreError::StorageFull`] when
    /// the total capacity would be exceeded, or an I/O error.
    pub async fn save(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<StoredFile, FileStoreError> {
        let mime = self.validate(content, filename, mime_type)?;

        let used = self.get_storage_size().await?;
        if used + content.len() as u64 > self.max_storage_size {
            return Err(FileStoreError::StorageFull {
                used,
                needed: content.len() as u64,
                max: self.max_storage_size,
            });
        }

        let file_id = Uuid::new_v4().to_string();
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(String::from);
        let path = self.file_path(&file_id, extension.as_deref());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
            set_dir_permissions(parent)?;
        }
        tokio::fs::write(&path, content).await?;

        debug!(
            filename,
            bytes = content.len(),
            path = %path.display(),
            "saved file"
        );
        Ok(StoredFile {
            id: file_id,
            filename: filename.to_string(),
            mime_type: mime,
            storage_path: path
                .strip_prefix(&self.base_path)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned(),
            storage_backend: "local".to_string(),
            created_at: tyler_types::time::now_utc(),
            metadata: FileMetadata {
                size: content.len() as u64,
            },
        })
    }

    /// Fetch a blob, preferring the recorded storage path and falling
    /// back to the sharded path derived from the id.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NotFound`] when the file is absent.
    pub async fn get(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<Vec<u8>, FileStoreError> {
        let path = self
            .locate(file_id, storage_path)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(file_id.to_string()))?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Delete a blob and best-effort remove its emptied shard directory.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError::NotFound`] when the file is absent.
    pub async fn delete(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<(), FileStoreError> {
        let path = self
            .locate(file_id, storage_path)
            .await?
            .ok_or_else(|| FileStoreError::NotFound(file_id.to_string()))?;
        tokio::fs::remove_file(&path).await?;

        if let Some(parent) = path.parent() {
            // Fails while the shard still holds files; that is fine.
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }

    /// Save several files, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Propagates the first save error.
    pub async fn batch_save(
        &self,
        files: Vec<(Vec<u8>, String, Option<String>)>,
    ) -> Result<Vec<StoredFile>, FileStoreError> {
        let mut saved = Vec::with_capacity(files.len());
        for (content, filename, mime_type) in files {
            saved.push(self.save(&content, &filename, mime_type.as_deref()).await?);
        }
        Ok(saved)
    }

    /// Delete several files concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first deletion error after all deletions ran.
    pub async fn batch_delete(&self, file_ids: &[String]) -> Result<(), FileStoreError> {
        let results =
            futures::future::join_all(file_ids.iter().map(|id| self.delete(id, None))).await;
        results.into_iter().collect()
    }

    /// Total bytes stored.
    ///
    /// # Errors
    ///
    /// Propagates directory traversal failures.
    pub async fn get_storage_size(&self) -> Result<u64, FileStoreError> {
        let mut total = 0;
        for path in self.walk_files().await? {
            total += tokio::fs::metadata(&path).await?.len();
        }
        Ok(total)
    }

    /// Number of stored files.
    ///
    /// # Errors
    ///
    /// Propagates directory traversal failures.
    pub async fn get_file_count(&self) -> Result<u64, FileStoreError> {
        Ok(self.walk_files().await?.len() as u64)
    }

    /// Probe the store and report size, count, and any errors.
    pub async fn check_health(&self) -> HealthReport {
        let mut errors = Vec::new();
        let total_size = self.get_storage_size().await.unwrap_or_else(|e| {
            errors.push(e.to_string());
            0
        });
        let file_count = self.get_file_count().await.unwrap_or_else(|e| {
            errors.push(e.to_string());
            0
        });
        HealthReport {
            healthy: errors.is_empty(),
            total_size,
            file_count,
            errors,
        }
    }

    /// All file ids in storage, reconstructed from the sharded layout.
    ///
    /// # Errors
    ///
    /// Propagates directory traversal failures.
    pub async fn list_files(&self) -> Result<Vec<String>, FileStoreError> {
        let mut ids = Vec::new();
        for path in self.walk_files().await? {
            let shard = path
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ids.push(format!("{shard}{stem}"));
        }
        Ok(ids)
    }

    /// Delete stored files that no message attachment in the thread
    /// store references. Returns the deletion count and any errors.
    pub async fn cleanup_orphaned_files(
        &self,
        store: &dyn ThreadStore,
    ) -> (usize, Vec<String>) {
        let mut referenced: HashSet<String> = HashSet::new();
        let mut errors: Vec<String> = Vec::new();

        const PAGE: usize = 100;
        let mut offset = 0;
        loop {
            let threads = match store.list(PAGE, offset).await {
                Ok(threads) => threads,
                Err(e) => {
                    errors.push(format!("Failed to scan thread store: {e}"));
                    return (0, errors);
                }
            };
            let page_len = threads.len();
            for thread in threads {
                for message in &thread.messages {
                    for attachment in &message.attachments {
                        if let Some(file_id) = &attachment.file_id {
                            referenced.insert(file_id.clone());
                        }
                    }
                }
            }
            if page_len < PAGE {
                break;
            }
            offset += PAGE;
        }

        let stored = match self.list_files().await {
            Ok(stored) => stored,
            Err(e) => {
                errors.push(format!("Failed to list stored files: {e}"));
                return (0, errors);
            }
        };

        let mut deleted = 0;
        for file_id in stored {
            if referenced.contains(&file_id) {
                continue;
            }
            match self.delete(&file_id, None).await {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(format!("Failed to delete {file_id}: {e}")),
            }
        }
        if deleted > 0 {
            info!(deleted, "cleaned up orphaned files");
        }
        (deleted, errors)
    }

    /// Find the on-disk path of a file: the recorded storage path when
    /// it resolves, then the bare sharded path, then a shard scan for a
    /// matching stem (the stored extension is not recoverable from the
    /// id alone).
    async fn locate(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<Option<PathBuf>, FileStoreError> {
        if let Some(rel) = storage_path {
            let path = self.base_path.join(rel);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(path));
            }
        }

        let exact = self.file_path(file_id, None);
        if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
            return Ok(Some(exact));
        }

        let (shard, rest) = file_id.split_at(file_id.len().min(2));
        let shard_dir = self.base_path.join(shard);
        let mut reader = match tokio::fs::read_dir(&shard_dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = reader.next_entry().await? {
            if entry.path().file_stem().and_then(|s| s.to_str()) == Some(rest) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Collect every regular file under the base path without recursion.
    async fn walk_files(&self) -> Result<Vec<PathBuf>, FileStoreError> {
        let mut files = Vec::new();
        let mut pending = vec![self.base_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = reader.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl FileBackend for FileStore {
    async fn save_file(
        &self,
        content: &[u8],
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<StoredFile, FileStoreError> {
        self.save(content, filename, mime_type).await
    }

    async fn get_file(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<Vec<u8>, FileStoreError> {
        self.get(file_id, storage_path).await
    }

    async fn delete_file(
        &self,
        file_id: &str,
        storage_path: Option<&str>,
    ) -> Result<(), FileStoreError> {
        self.delete(file_id, storage_path).await
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> FileStore {
        FileStore::new(FileStoreConfig {
            base_path: dir.to_path_buf(),
            ..FileStoreConfig::default()
        })
        .unwrap()
    }

    fn small_store(dir: &Path, max_file: u64, max_storage: u64) -> FileStore {
        FileStore::new(FileStoreConfig {
            base_path: dir.to_path_buf(),
            max_file_size: max_file,
            max_storage_size: max_storage,
            ..FileStoreConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let stored = store.save(b"hello world", "notes.txt", None).await.unwrap();
        assert_eq!(stored.storage_backend, "local");
        assert_eq!(stored.metadata.size, 11);
        assert_eq!(stored.mime_type, "text/plain");

        let bytes = store
            .get(&stored.id, Some(&stored.storage_path))
            .await
            .unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn get_falls_back_to_sharded_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // A file stored without an extension resolves from the id alone.
        let stored = store.save(b"raw bytes here", "blob", None).await.unwrap();
        let bytes = store.get(&stored.id, None).await.unwrap();
        assert_eq!(bytes, b"raw bytes here");
    }

    #[tokio::test]
    async fn layout_is_sharded_by_id_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let stored = store.save(b"content", "doc.txt", None).await.unwrap();
        assert!(stored.storage_path.starts_with(&stored.id[..2]));
        assert!(stored.storage_path.ends_with(".txt"));
        assert!(dir.path().join(&stored.storage_path).exists());
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_store(dir.path(), 4, 1024);

        let result = store.save(b"too big", "big.txt", None).await;
        assert!(matches!(result, Err(FileStoreError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn rejects_disallowed_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let result = store
            .save(b"#!/bin/sh", "run.sh", Some("application/x-sh"))
            .await;
        assert!(matches!(
            result,
            Err(FileStoreError::UnsupportedFileType(_))
        ));
    }

    #[tokio::test]
    async fn rejects_when_storage_full() {
        let dir = tempfile::tempdir().unwrap();
        let store = small_store(dir.path(), 1024, 10);

        store.save(b"12345678", "a.txt", None).await.unwrap();
        let result = store.save(b"12345678", "b.txt", None).await;
        assert!(matches!(result, Err(FileStoreError::StorageFull { .. })));
    }

    #[tokio::test]
    async fn delete_removes_file_and_errors_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let stored = store.save(b"bye", "bye.txt", None).await.unwrap();
        store
            .delete(&stored.id, Some(&stored.storage_path))
            .await
            .unwrap();

        let result = store.get(&stored.id, Some(&stored.storage_path)).await;
        assert!(matches!(result, Err(FileStoreError::NotFound(_))));

        let again = store.delete(&stored.id, Some(&stored.storage_path)).await;
        assert!(matches!(again, Err(FileStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn size_and_count_track_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.save(b"aaaa", "a.txt", None).await.unwrap();
        store.save(b"bbbbbb", "b.txt", None).await.unwrap();

        assert_eq!(store.get_storage_size().await.unwrap(), 10);
        assert_eq!(store.get_file_count().await.unwrap(), 2);

        let health = store.check_health().await;
        assert!(health.healthy);
        assert_eq!(health.total_size, 10);
        assert_eq!(health.file_count, 2);
    }

    #[tokio::test]
    async fn list_files_reconstructs_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let stored = store.save(b"x", "x.txt", None).await.unwrap();
        let ids = store.list_files().await.unwrap();
        assert_eq!(ids, vec![stored.id]);
    }

    #[tokio::test]
    async fn batch_save_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let saved = store
            .batch_save(vec![
                (b"one".to_vec(), "one.txt".into(), None),
                (b"two".to_vec(), "two.txt".into(), Some("text/plain".into())),
            ])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);

        let ids: Vec<String> = saved.iter().map(|s| s.id.clone()).collect();
        store.batch_delete(&ids).await.unwrap();
        assert_eq!(store.get_file_count().await.unwrap(), 0);
    }
}
