//! Agent selection for a thread: explicit mentions first, then a
//! classification completion over the registered agents' purposes.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use tyler_types::{
    AgentError, ChatCompletionRequest, ChatMessage, MessageContent, Provider, Role, ThreadStore,
};

use crate::Registry;

static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("mention pattern is valid"));

/// Extract lowercase `@name` mentions from text, in order.
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION_PATTERN
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Selects an agent name for a thread, or none when no agent fits.
///
/// The router never mutates the thread; the caller decides what to do
/// with a nil selection.
pub struct Router {
    registry: Arc<Registry>,
    thread_store: Arc<dyn ThreadStore>,
    provider: Arc<dyn Provider>,
    model_name: String,
}

impl Router {
    /// Create a router over a registry, thread store, and the provider
    /// used for the classification completion.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        thread_store: Arc<dyn ThreadStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            registry,
            thread_store,
            provider,
            model_name: "gpt-4o".into(),
        }
    }

    /// Override the classification model.
    #[must_use]
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Pick an agent for the thread's last user message.
    ///
    /// Rules: the first `@mention` matching a registered agent wins;
    /// otherwise a classification completion chooses by purpose; a
    /// thread without user messages selects nothing.
    ///
    /// # Errors
    ///
    /// Propagates store and provider failures.
    pub async fn select_agent(&self, thread_id: &str) -> Result<Option<String>, AgentError> {
        let Some(thread) = self.thread_store.get(thread_id).await? else {
            return Ok(None);
        };
        let Some(message) = thread.get_last_message_by_role(Role::User) else {
            return Ok(None);
        };
        let Some(text) = message.content.as_ref().and_then(|c| c.first_text()) else {
            return Ok(None);
        };

        for mention in extract_mentions(text) {
            if self.registry.has(&mention) {
                info!(agent = %mention, "selected agent from explicit mention");
                return Ok(Some(mention));
            }
        }

        self.classify(text).await
    }

    /// Ask the model which registered agent fits the message.
    async fn classify(&self, text: &str) -> Result<Option<String>, AgentError> {
        let mut descriptions = Vec::new();
        for name in self.registry.list() {
            if let Some(agent) = self.registry.get(&name) {
                descriptions.push(format!("{name}: {}", agent.purpose()));
            }
        }
        if descriptions.is_empty() {
            return Ok(None);
        }

        let system = format!(
            "You are a router that directs incoming messages to the most \
appropriate specialized agent. Current date: {date}\n\n\
Available agents and their purposes:\n{agents}\n\n\
Respond with exactly the name of the most appropriate agent (in \
lowercase), or 'none' if no agent is suitable.",
            date = chrono::Utc::now().format("%Y-%m-%d %A"),
            agents = descriptions.join("\n"),
        );

        let request = ChatCompletionRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text(system),
                    sequence: 0,
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
                ChatMessage {
                    role: Role::User,
                    content: MessageContent::Text(text.to_string()),
                    sequence: 1,
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                },
            ],
            temperature: 0.3,
            tools: None,
            stream: false,
        };

        let response = self.provider.complete(request).await?;
        let selected = response
            .first_message()
            .and_then(|m| m.content.as_deref())
            .unwrap_or("")
            .trim()
            .to_lowercase();
        debug!(selected = %selected, "classification completion returned");

        if self.registry.has(&selected) {
            Ok(Some(selected))
        } else {
            if selected != "none" && !selected.is_empty() {
                warn!(selected = %selected, "classifier chose an unregistered agent");
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tyler_agent::Agent;
    use tyler_store_memory::MemoryThreadStore;
    use tyler_types::test_utils::{MockProvider, text_response};
    use tyler_types::{Message, Thread};

    fn registry_with(names: &[(&str, &str)]) -> Arc<Registry> {
        let mut registry = Registry::new();
        for (name, purpose) in names {
            registry.register(
                *name,
                Arc::new(
                    Agent::builder(Arc::new(MockProvider::new()))
                        .name(*name)
                        .purpose(*purpose)
                        .build(),
                ),
            );
        }
        Arc::new(registry)
    }

    async fn stored_thread(store: &MemoryThreadStore, text: &str) -> String {
        let mut thread = Thread::new();
        thread.add_message(Message::new(Role::User, text));
        store.save(&thread).await.unwrap();
        thread.id
    }

    #[test]
    fn mentions_are_extracted_in_order() {
        assert_eq!(
            extract_mentions("hey @Support and @dev, help?"),
            vec!["support", "dev"]
        );
        assert!(extract_mentions("no mentions here").is_empty());
    }

    #[tokio::test]
    async fn explicit_mention_wins_without_classification() {
        let store = Arc::new(MemoryThreadStore::new());
        let provider = Arc::new(MockProvider::new());
        let registry = registry_with(&[("support", "Answer support questions.")]);
        let router = Router::new(registry, store.clone(), provider.clone());

        let id = stored_thread(&store, "hey @support can you help?").await;
        let selected = router.select_agent(&id).await.unwrap();
        assert_eq!(selected.as_deref(), Some("support"));
        // No classification completion was made.
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn classifier_selects_registered_agent() {
        let store = Arc::new(MemoryThreadStore::new());
        let provider = Arc::new(MockProvider::new());
        provider.push_response(text_response("gpt-4o", "billing", (1, 1)));
        let registry = registry_with(&[
            ("billing", "Resolve invoice and payment issues."),
            ("support", "Answer support questions."),
        ]);
        let router = Router::new(registry, store.clone(), provider.clone());

        let id = stored_thread(&store, "my invoice is wrong").await;
        let selected = router.select_agent(&id).await.unwrap();
        assert_eq!(selected.as_deref(), Some("billing"));

        // The classifier saw each agent's purpose.
        let request = &provider.requests()[0];
        let MessageContent::Text(system) = &request.messages[0].content else {
            panic!("expected text system prompt");
        };
        assert!(system.contains("billing: Resolve invoice and payment issues."));
    }

    #[tokio::test]
    async fn unregistered_classifier_answer_selects_nothing() {
        let store = Arc::new(MemoryThreadStore::new());
        let provider = Arc::new(MockProvider::new());
        provider.push_response(text_response("gpt-4o", "none", (1, 1)));
        let registry = registry_with(&[("support", "Answer support questions.")]);
        let router = Router::new(registry, store.clone(), provider);

        let id = stored_thread(&store, "untriageable message").await;
        assert!(router.select_agent(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_thread_selects_nothing() {
        let store = Arc::new(MemoryThreadStore::new());
        let provider = Arc::new(MockProvider::new());
        let registry = registry_with(&[("support", "Answer support questions.")]);
        let router = Router::new(registry, store, provider);

        assert!(router.select_agent("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn thread_without_user_messages_selects_nothing() {
        let store = Arc::new(MemoryThreadStore::new());
        let provider = Arc::new(MockProvider::new());
        let registry = registry_with(&[("support", "Answer support questions.")]);
        let router = Router::new(registry, store.clone(), provider);

        let thread = Thread::new();
        store.save(&thread).await.unwrap();
        assert!(router.select_agent(&thread.id).await.unwrap().is_none());
    }
}
