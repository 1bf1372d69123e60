#![deny(missing_docs)]
//! Core types for the Tyler agent runtime.
//!
//! Defines the conversation model ([`Thread`], [`Message`], [`Attachment`]),
//! the chat-completion wire types exchanged with LLM providers, streaming
//! update events, the error taxonomy, and the object-safe traits
//! ([`Provider`], [`ThreadStore`], [`FileBackend`]) implemented by the
//! backend crates.

mod attachment;
mod completion;
mod error;
mod message;
mod metrics;
mod stream;
mod thread;
mod traits;

pub mod time;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use attachment::{Attachment, AttachmentContent};
pub use completion::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, Delta, FunctionCall, FunctionCallDelta, FunctionSpec, ResponseMessage, ToolCall,
    ToolCallDelta, ToolSpec,
};
pub use error::{
    AgentError, FileStoreError, McpError, ProviderError, StoreError, ToolError,
};
pub use message::{ContentPart, ImageUrl, Message, MessageContent, Role};
pub use metrics::{MessageMetrics, ModelUsage, ThreadMetrics, Timing, TokenUsage, WeaveCall};
pub use stream::StreamUpdate;
pub use thread::Thread;
pub use traits::{CompletionStream, FileBackend, FileMetadata, Provider, StoredFile, ThreadStore};
