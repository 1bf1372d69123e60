//! Streaming update events emitted by the agent loop.

use crate::message::Message;

/// An ordered update emitted while a streaming turn is produced.
///
/// Ordering guarantees: content chunks arrive in model-production order;
/// each [`AssistantMessage`](Self::AssistantMessage) follows all of its
/// chunks; tool messages for an iteration precede the next iteration's
/// first chunk; [`Complete`](Self::Complete) is last. After an
/// [`Error`](Self::Error) the stream is closed.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// An incremental text delta.
    ContentChunk(String),
    /// The fully assembled assistant message at the end of a completion.
    AssistantMessage(Message),
    /// A tool message appended after a tool execution.
    ToolMessage(Message),
    /// A failure description; terminal.
    Error(String),
    /// The final event of a successful turn.
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn updates_carry_their_payloads() {
        let chunk = StreamUpdate::ContentChunk("Hel".into());
        assert!(matches!(chunk, StreamUpdate::ContentChunk(ref s) if s == "Hel"));

        let message = Message::new(Role::Assistant, "done");
        let update = StreamUpdate::AssistantMessage(message.clone());
        assert!(
            matches!(update, StreamUpdate::AssistantMessage(ref m) if m.id == message.id)
        );
    }
}
