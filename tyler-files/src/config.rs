//! File store configuration from the environment.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::warn;

/// Default per-file size limit: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default total storage limit: 5 GiB.
pub const DEFAULT_MAX_STORAGE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// MIME types accepted by default: common documents, images, archives,
/// and audio formats.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/csv",
    "application/json",
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    // Archives
    "application/zip",
    "application/x-tar",
    "application/gzip",
    // Audio
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/opus",
    "audio/ogg",
    "audio/wav",
    "audio/webm",
    "audio/aac",
    "audio/flac",
    "audio/x-m4a",
];

/// Configuration for [`FileStore`](crate::FileStore).
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Root directory of the sharded storage tree.
    pub base_path: PathBuf,
    /// Per-file size limit in bytes.
    pub max_file_size: u64,
    /// Total storage limit in bytes.
    pub max_storage_size: u64,
    /// MIME types accepted by `save`.
    pub allowed_mime_types: HashSet<String>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_storage_size: DEFAULT_MAX_STORAGE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl FileStoreConfig {
    /// Build the configuration from `TYLER_FILE_STORAGE_PATH`,
    /// `TYLER_MAX_FILE_SIZE`, `TYLER_MAX_STORAGE_SIZE`, and
    /// `TYLER_ALLOWED_MIME_TYPES`. Invalid values fall back to the
    /// defaults with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TYLER_FILE_STORAGE_PATH")
            && !path.is_empty()
        {
            config.base_path = expand_home(&path);
        }

        if let Ok(raw) = std::env::var("TYLER_MAX_FILE_SIZE") {
            match raw.parse::<u64>() {
                Ok(size) => config.max_file_size = size,
                Err(_) => {
                    warn!(value = %raw, "invalid TYLER_MAX_FILE_SIZE value, using default");
                }
            }
        }

        if let Ok(raw) = std::env::var("TYLER_MAX_STORAGE_SIZE") {
            match raw.parse::<u64>() {
                Ok(size) => config.max_storage_size = size,
                Err(_) => {
                    warn!(value = %raw, "invalid TYLER_MAX_STORAGE_SIZE value, using default");
                }
            }
        }

        if let Ok(raw) = std::env::var("TYLER_ALLOWED_MIME_TYPES") {
            let types: HashSet<String> = raw
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            // A single malformed entry invalidates the whole list.
            if types.is_empty() || types.iter().any(|m| !m.contains('/')) {
                warn!(value = %raw, "invalid TYLER_ALLOWED_MIME_TYPES value, using default");
            } else {
                config.allowed_mime_types = types;
            }
        }

        config
    }
}

/// `~/.tyler/files`, or a relative fallback when no home directory is
/// resolvable.
fn default_base_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tyler")
        .join("files")
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
