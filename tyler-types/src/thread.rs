//! A conversation thread: ordered messages plus aggregated metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::completion::ChatMessage;
use crate::message::{Message, Role};
use crate::metrics::ThreadMetrics;
use crate::time::utc_datetime;

/// Title given to threads until the first user message supplies one.
pub const DEFAULT_THREAD_TITLE: &str = "Untitled Thread";

/// Maximum characters kept when deriving a title from a user message.
const TITLE_MAX_CHARS: usize = 30;

/// A conversation thread.
///
/// Owns its messages exclusively. At most one system message exists and
/// it sits at index 0 with sequence 0; non-system messages are 1-indexed
/// in insertion order. `updated_at` is rewritten on every mutation and
/// `metrics` is the running sum of the child messages' usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Stable opaque identifier (UUID by default).
    pub id: String,
    /// Human-readable title; auto-derived from the first user message
    /// while still the default.
    pub title: String,
    /// The ordered messages.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// When the thread was created (UTC).
    #[serde(with = "utc_datetime")]
    pub created_at: DateTime<Utc>,
    /// When the thread was last mutated (UTC).
    #[serde(with = "utc_datetime")]
    pub updated_at: DateTime<Utc>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Where the thread originates (at least a `name` key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,
    /// Aggregated usage across all messages.
    #[serde(default)]
    pub metrics: ThreadMetrics,
}

impl Thread {
    /// Create an empty thread with a fresh UUID.
    #[must_use]
    pub fn new() -> Self {
        let now = crate::time::now_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_THREAD_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            attributes: Map::new(),
            source: None,
            metrics: ThreadMetrics::default(),
        }
    }

    /// Set the source descriptor.
    #[must_use]
    pub fn with_source(mut self, source: Map<String, Value>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Ensure a system prompt exists as the first message.
    ///
    /// Idempotent when the existing system message already carries the
    /// same content; otherwise the content is replaced in place. This is
    /// the only sanctioned way to change an existing system message.
    pub fn ensure_system_prompt(&mut self, prompt: &str) {
        match self.messages.first_mut() {
            Some(existing) if existing.role == Role::System => {
                if existing.content.as_ref().and_then(|c| c.first_text()) == Some(prompt) {
                    return;
                }
                existing.content = Some(prompt.into());
                existing.refresh_id();
            }
            _ => {
                let mut message = Message::new(Role::System, prompt);
                message.sequence = 0;
                message.refresh_id();
                self.messages.insert(0, message);
            }
        }
        self.updated_at = crate::time::now_utc();
    }

    /// The next sequence number a non-system message would receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.sequence)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Add a message, assigning its sequence, folding its metrics into
    /// the thread totals, rewriting `updated_at`, and deriving the title
    /// from the first user message while the title is still the default.
    /// Returns the message as appended (with its final sequence and id).
    pub fn add_message(&mut self, mut message: Message) -> &Message {
        if message.role == Role::System {
            message.sequence = 0;
            message.refresh_id();
            self.messages.insert(0, message);
            self.updated_at = crate::time::now_utc();
            return &self.messages[0];
        }

        message.sequence = self.next_sequence();
        message.refresh_id();
        self.metrics.absorb(&message.metrics);

        if self.title == DEFAULT_THREAD_TITLE
            && message.role == Role::User
            && let Some(text) = message.content.as_ref().and_then(|c| c.first_text())
            && !text.is_empty()
        {
            self.title = truncate_title(text);
        }

        self.messages.push(message);
        self.updated_at = crate::time::now_utc();
        let last = self.messages.len() - 1;
        &self.messages[last]
    }

    /// The chat-completion projection of the thread, in stored order.
    #[must_use]
    pub fn get_messages_for_chat_completion(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(Message::to_chat_completion_message)
            .collect()
    }

    /// The last message with the given role, if any.
    #[must_use]
    pub fn get_last_message_by_role(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    /// Mutable access to the last message with the given role.
    pub fn get_last_message_by_role_mut(&mut self, role: Role) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.role == role)
    }

    /// Remove all messages.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.updated_at = crate::time::now_utc();
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// First `TITLE_MAX_CHARS` characters, with an ellipsis only when the
/// text was actually truncated.
fn truncate_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let prefix: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{prefix}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MessageMetrics, TokenUsage};

    fn user(text: &str) -> Message {
        Message::new(Role::User, text)
    }

    #[test]
    fn system_message_sits_first_with_sequence_zero() {
        let mut thread = Thread::new();
        thread.add_message(user("Hello"));
        thread.ensure_system_prompt("You are a helpful assistant.");

        assert_eq!(thread.messages[0].role, Role::System);
        assert_eq!(thread.messages[0].sequence, 0);
        assert_eq!(thread.messages[1].sequence, 1);
        assert_eq!(
            thread
                .messages
                .iter()
                .filter(|m| m.sequence == 0)
                .count(),
            1
        );
    }

    #[test]
    fn ensure_system_prompt_is_idempotent_for_same_content() {
        let mut thread = Thread::new();
        thread.ensure_system_prompt("Be helpful.");
        let before = thread.messages[0].id.clone();
        thread.ensure_system_prompt("Be helpful.");

        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].id, before);
    }

    #[test]
    fn ensure_system_prompt_replaces_different_content() {
        let mut thread = Thread::new();
        thread.ensure_system_prompt("Be helpful.");
        thread.ensure_system_prompt("Be terse.");

        assert_eq!(thread.messages.len(), 1);
        assert_eq!(
            thread.messages[0]
                .content
                .as_ref()
                .unwrap()
                .first_text()
                .unwrap(),
            "Be terse."
        );
    }

    #[test]
    fn sequences_are_one_indexed_in_insertion_order() {
        let mut thread = Thread::new();
        thread.add_message(user("first"));
        thread.add_message(Message::new(Role::Assistant, "second"));
        thread.add_message(Message::new(Role::Tool, "third").with_tool_call_id("c1"));

        let sequences: Vec<u64> = thread.messages.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn title_derived_from_first_user_message() {
        let mut thread = Thread::new();
        thread.add_message(user("Hello"));
        assert_eq!(thread.title, "Hello");

        // A later user message does not overwrite a derived title.
        thread.add_message(user("Something else entirely"));
        assert_eq!(thread.title, "Hello");
    }

    #[test]
    fn title_truncated_with_ellipsis_only_when_needed() {
        let mut thread = Thread::new();
        thread.add_message(user("a".repeat(31).as_str()));
        assert_eq!(thread.title, format!("{}...", "a".repeat(30)));

        let mut exact = Thread::new();
        exact.add_message(user("b".repeat(30).as_str()));
        assert_eq!(exact.title, "b".repeat(30));
    }

    #[test]
    fn title_ignores_assistant_messages() {
        let mut thread = Thread::new();
        thread.add_message(Message::new(Role::Assistant, "I start"));
        assert_eq!(thread.title, DEFAULT_THREAD_TITLE);
    }

    #[test]
    fn metrics_are_running_sum_of_messages() {
        let mut thread = Thread::new();
        for (completion, prompt) in [(10, 20), (5, 5)] {
            let metrics = MessageMetrics {
                model: Some("gpt-4o".into()),
                usage: TokenUsage {
                    completion_tokens: completion,
                    prompt_tokens: prompt,
                    total_tokens: completion + prompt,
                },
                ..Default::default()
            };
            thread.add_message(Message::new(Role::Assistant, "x").with_metrics(metrics));
        }

        assert_eq!(thread.metrics.completion_tokens, 15);
        assert_eq!(thread.metrics.prompt_tokens, 25);
        assert_eq!(thread.metrics.total_tokens, 40);
        assert_eq!(thread.metrics.model_usage["gpt-4o"].calls, 2);

        let summed: u64 = thread
            .messages
            .iter()
            .map(|m| m.metrics.usage.total_tokens)
            .sum();
        assert_eq!(thread.metrics.total_tokens, summed);
    }

    #[test]
    fn updated_at_rewritten_on_mutation() {
        let mut thread = Thread::new();
        let before = thread.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        thread.add_message(user("Hello"));
        assert!(thread.updated_at > before);
    }

    #[test]
    fn get_last_message_by_role_finds_latest() {
        let mut thread = Thread::new();
        thread.add_message(user("one"));
        thread.add_message(Message::new(Role::Assistant, "reply"));
        thread.add_message(user("two"));

        let last = thread.get_last_message_by_role(Role::User).unwrap();
        assert_eq!(last.content.as_ref().unwrap().first_text(), Some("two"));
        assert!(thread.get_last_message_by_role(Role::Tool).is_none());
    }

    #[test]
    fn serialization_roundtrip_is_structurally_equal() {
        let mut thread = Thread::new();
        thread.ensure_system_prompt("Be helpful.");
        thread.add_message(user("Hello"));
        thread
            .attributes
            .insert("assigned_agent".into(), "tyler".into());

        let json = serde_json::to_string(&thread).unwrap();
        let back: Thread = serde_json::from_str(&json).unwrap();
        assert_eq!(back, thread);
    }

    #[test]
    fn clear_messages_empties_thread() {
        let mut thread = Thread::new();
        thread.add_message(user("Hello"));
        thread.clear_messages();
        assert!(thread.messages.is_empty());
    }
}
