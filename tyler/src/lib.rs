#![deny(missing_docs)]
//! # tyler — umbrella crate
//!
//! Single import surface for the Tyler agent runtime. Re-exports the
//! model, tool runtime, agent loop, and backend crates behind feature
//! flags, plus a `prelude` for the happy path.

#[cfg(feature = "core")]
pub use tyler_agent;
#[cfg(feature = "files")]
pub use tyler_files;
#[cfg(feature = "mcp")]
pub use tyler_mcp;
#[cfg(feature = "orch")]
pub use tyler_orch;
#[cfg(feature = "provider-openai")]
pub use tyler_provider_openai;
#[cfg(feature = "store-memory")]
pub use tyler_store_memory;
#[cfg(feature = "store-sql")]
pub use tyler_store_sql;
#[cfg(feature = "core")]
pub use tyler_tool;
#[cfg(feature = "core")]
pub use tyler_types;

/// Happy-path imports for composing Tyler systems.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use tyler_agent::{Agent, AgentBuilder, FileProcessor, TextFileProcessor, ThreadInput};

    #[cfg(feature = "core")]
    pub use tyler_tool::{ToolArtifact, ToolOutput, ToolRuntime};

    #[cfg(feature = "core")]
    pub use tyler_types::{
        AgentError, Attachment, FileBackend, Message, MessageContent, Provider, Role,
        StreamUpdate, Thread, ThreadStore, ToolCall,
    };

    #[cfg(feature = "files")]
    pub use tyler_files::{FileStore, FileStoreConfig};

    #[cfg(feature = "store-memory")]
    pub use tyler_store_memory::MemoryThreadStore;

    #[cfg(feature = "store-sql")]
    pub use tyler_store_sql::SqlThreadStore;

    #[cfg(feature = "mcp")]
    pub use tyler_mcp::{McpBridge, McpServerConfig, McpTransport};

    #[cfg(feature = "provider-openai")]
    pub use tyler_provider_openai::OpenAIProvider;

    #[cfg(feature = "orch")]
    pub use tyler_orch::{Registry, Router, Runtime};
}
