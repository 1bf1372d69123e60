//! The ingress surface exposed to transport adapters.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{info, warn};

use tyler_types::{
    AgentError, Attachment, Message, Provider, Role, StoreError, Thread, ThreadStore,
};

use crate::{Registry, Router};

/// Text appended when no agent can be selected for a message.
const NO_AGENT_MESSAGE: &str = "I couldn't determine which agent should handle this request.";

/// Loads-or-creates threads for inbound messages, routes them to an
/// agent, and drives the turn. Streaming adapters call
/// [`Agent::go_stream`](tyler_agent::Agent::go_stream) on the selected
/// agent directly.
pub struct Runtime {
    thread_store: Arc<dyn ThreadStore>,
    registry: Arc<Registry>,
    router: Router,
}

impl Runtime {
    /// Wire the ingress surface over a store, a registry, and the
    /// provider used for routing classification.
    #[must_use]
    pub fn new(
        thread_store: Arc<dyn ThreadStore>,
        registry: Arc<Registry>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&thread_store),
            provider,
        );
        Self {
            thread_store,
            registry,
            router,
        }
    }

    /// Handle one inbound message.
    ///
    /// Finds the thread matching the source (`name` plus `thread_id`)
    /// or creates one, appends the user message with its attachments,
    /// selects an agent, records the assignment, and runs the turn.
    /// When no agent is selected, an explanatory assistant message is
    /// appended instead.
    ///
    /// Adapters that may redeliver a message put the original event
    /// time under a `timestamp` key (RFC 3339) in the source; the
    /// message's hash-derived id is then stable across deliveries, and
    /// a message already recorded on the thread is skipped.
    ///
    /// # Errors
    ///
    /// Fails on a source without a `name` key, and propagates store,
    /// router, and agent failures.
    pub async fn submit(
        &self,
        text: &str,
        source: Map<String, Value>,
        attachments: Vec<Attachment>,
    ) -> Result<(Thread, Vec<Message>), AgentError> {
        let source_name = source
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::InvalidSource("missing name".into()))?
            .to_string();

        let mut properties = Map::new();
        if let Some(thread_id) = source.get("thread_id") {
            properties.insert("thread_id".into(), thread_id.clone());
        }

        let mut thread = match self
            .thread_store
            .find_by_source(&source_name, &properties)
            .await?
            .into_iter()
            .next()
        {
            Some(existing) => {
                info!(thread = %existing.id, source = %source_name, "found existing thread");
                existing
            }
            None => {
                let thread = Thread::new().with_source(source.clone());
                info!(thread = %thread.id, source = %source_name, "created new thread");
                thread
            }
        };

        let event_timestamp = source
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|raw| tyler_types::time::parse_utc(raw).ok());

        let mut user = Message::new(Role::User, text)
            .with_source(source)
            .with_attachments(attachments);
        if let Some(timestamp) = event_timestamp {
            user = user.with_timestamp(timestamp);
        }

        // Redelivery check: the id hashes the sequence, so recompute
        // the candidate at each recorded user message's position.
        let duplicate = thread
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .any(|m| {
                let mut candidate = user.clone();
                candidate.sequence = m.sequence;
                candidate.derive_id() == m.id
            });
        if duplicate {
            info!(message = %user.id, "skipping already processed message");
            return Ok((thread, Vec::new()));
        }

        thread.add_message(user);
        self.thread_store.save(&thread).await?;

        let selected = self.router.select_agent(&thread.id).await?;
        let agent = selected
            .as_ref()
            .and_then(|name| self.registry.get(name).map(|agent| (name.clone(), agent)));

        match agent {
            Some((name, agent)) => {
                thread
                    .attributes
                    .insert("assigned_agent".into(), json!(name));
                self.thread_store.save(&thread).await?;
                agent.go(thread).await
            }
            None => {
                warn!(thread = %thread.id, "no suitable agent found for message");
                let appended = thread
                    .add_message(Message::new(Role::Assistant, NO_AGENT_MESSAGE))
                    .clone();
                self.thread_store.save(&thread).await?;
                Ok((thread, vec![appended]))
            }
        }
    }

    /// Fetch a thread by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        self.thread_store.get(thread_id).await
    }

    /// The most recently updated threads.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Thread>, StoreError> {
        self.thread_store.list_recent(limit).await
    }

    /// Delete a thread. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.thread_store.delete(thread_id).await
    }
}
