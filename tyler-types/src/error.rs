//! Error types for all Tyler crates.

use std::time::Duration;

/// Errors from LLM provider operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    // Retryable errors
    /// Network-level error (connection reset, DNS failure, etc.).
    #[error("network error: {0}")]
    Network(String),
    /// Rate limited by the provider.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested retry delay, if provided by the API.
        retry_after: Option<Duration>,
    },
    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// Provider service is temporarily unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Terminal errors
    /// Authentication/authorization failure.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Malformed or invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The provider returned a response the runtime cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    // Catch-all
    /// Error during streaming.
    #[error("stream error: {0}")]
    Stream(String),
    /// Any other provider error.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// Whether this error is likely transient and the request can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::RateLimited { .. }
                | Self::Timeout(_)
                | Self::ServiceUnavailable(_)
        )
    }
}

/// Errors from tool operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool not found in the runtime.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// Tool bundle not found among the built-in modules.
    #[error("tool module not found: {0}")]
    ModuleNotFound(String),
    /// Invalid input for the tool.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// Tool execution was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Errors from thread storage operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Thread not found where the caller asserted existence.
    #[error("thread not found: {0}")]
    NotFound(String),
    /// Serialization/deserialization failed. A save that hits this fails
    /// as a whole; no partial write is performed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Failed to connect to or configure the backing database.
    #[error("connection error: {0}")]
    Connection(String),
    /// A query against the backing database failed.
    #[error("query error: {0}")]
    Query(String),
    /// I/O error during a storage operation.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from file storage operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    /// The file's MIME type is not in the allowed set.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// The file exceeds the per-file size limit.
    #[error("file too large: {size} bytes, maximum allowed: {max} bytes")]
    FileTooLarge {
        /// Size of the rejected file.
        size: u64,
        /// Configured per-file maximum.
        max: u64,
    },
    /// Total storage capacity would be exceeded.
    #[error("storage full: {used} bytes used, {needed} bytes needed, {max} bytes maximum")]
    StorageFull {
        /// Bytes currently stored.
        used: u64,
        /// Bytes the rejected save would add.
        needed: u64,
        /// Configured total maximum.
        max: u64,
    },
    /// The requested file does not exist in storage.
    #[error("file not found: {0}")]
    NotFound(String),
    /// The attachment has neither a storage reference nor inline content.
    #[error("no content available: {0}")]
    NoContent(String),
    /// Storage directory setup failed.
    #[error("storage initialization failed: {0}")]
    Initialization(String),
    /// I/O error during a file operation.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from external tool provider (MCP) operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to connect to the server.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Initialization handshake failed.
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// A remote tool call failed.
    #[error("tool call failed: {0}")]
    ToolCall(String),
    /// Transport-level error, including transports that are not available.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from the agent loop.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A thread id was passed but no thread store is configured.
    #[error("thread store is required when passing a thread id")]
    MissingThreadStore,
    /// A submitted source descriptor is missing required keys.
    #[error("invalid source: {0}")]
    InvalidSource(String),
    /// The given thread id does not exist in the store.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),
    /// Provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Thread persistence failed. The in-memory thread remains the latest
    /// copy; callers may retry the save.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
