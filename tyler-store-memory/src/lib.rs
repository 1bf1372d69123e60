#![deny(missing_docs)]
//! In-memory implementation of the ThreadStore trait.
//!
//! Threads live in a `HashMap` behind a `RwLock`. Suitable for tests,
//! prototyping, and agents that do not need persistence across process
//! restarts; it is the default store for agents constructed without one.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use tyler_types::{StoreError, Thread, ThreadStore};

/// In-memory thread store backed by a `HashMap` behind a `RwLock`.
#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<String, Thread>>,
}

impl MemoryThreadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Threads sorted by `updated_at` descending.
fn sorted_recent(threads: &HashMap<String, Thread>) -> Vec<Thread> {
    let mut all: Vec<Thread> = threads.values().cloned().collect();
    all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    all
}

/// Whether `candidate` contains every key of `wanted` with an equal value.
fn matches_subset(candidate: &Map<String, Value>, wanted: &Map<String, Value>) -> bool {
    wanted
        .iter()
        .all(|(key, value)| candidate.get(key) == Some(value))
}

#[async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn save(&self, thread: &Thread) -> Result<(), StoreError> {
        // The persistence contract requires every field to be
        // JSON-serializable; surface violations here like the SQL
        // backend would.
        serde_json::to_string(thread).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut threads = self.threads.write().await;
        threads.insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError> {
        let mut threads = self.threads.write().await;
        Ok(threads.remove(thread_id).is_some())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.read().await;
        Ok(sorted_recent(&threads)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Thread>, StoreError> {
        self.list(limit, 0).await
    }

    async fn find_by_attributes(
        &self,
        attributes: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.read().await;
        Ok(sorted_recent(&threads)
            .into_iter()
            .filter(|t| matches_subset(&t.attributes, attributes))
            .collect())
    }

    async fn find_by_source(
        &self,
        source_name: &str,
        properties: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.read().await;
        Ok(sorted_recent(&threads)
            .into_iter()
            .filter(|t| match &t.source {
                Some(source) => {
                    source.get("name").and_then(Value::as_str) == Some(source_name)
                        && matches_subset(source, properties)
                }
                None => false,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tyler_types::{Message, Role};

    fn thread_from(source_name: &str, thread_id: &str) -> Thread {
        let mut source = Map::new();
        source.insert("name".into(), json!(source_name));
        source.insert("thread_id".into(), json!(thread_id));
        Thread::new().with_source(source)
    }

    #[tokio::test]
    async fn save_get_roundtrip() {
        let store = MemoryThreadStore::new();
        let mut thread = Thread::new();
        thread.add_message(Message::new(Role::User, "Hello"));
        store.save(&thread).await.unwrap();

        let loaded = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded, thread);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = MemoryThreadStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryThreadStore::new();
        let thread = Thread::new();
        store.save(&thread).await.unwrap();

        assert!(store.delete(&thread.id).await.unwrap());
        assert!(!store.delete(&thread.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_orders_by_updated_at_desc() {
        let store = MemoryThreadStore::new();
        let mut first = Thread::new();
        store.save(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = Thread::new();
        store.save(&second).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        first.add_message(Message::new(Role::User, "bump"));
        store.save(&first).await.unwrap();

        let listed = store.list_recent(10).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn list_respects_limit_and_offset() {
        let store = MemoryThreadStore::new();
        for _ in 0..5 {
            store.save(&Thread::new()).await.unwrap();
        }
        assert_eq!(store.list(2, 0).await.unwrap().len(), 2);
        assert_eq!(store.list(10, 4).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_by_attributes_matches_equality() {
        let store = MemoryThreadStore::new();
        let mut a = Thread::new();
        a.attributes.insert("assigned_agent".into(), json!("tyler"));
        a.attributes.insert("priority".into(), json!(2));
        store.save(&a).await.unwrap();

        let mut b = Thread::new();
        b.attributes.insert("assigned_agent".into(), json!("router"));
        store.save(&b).await.unwrap();

        let mut wanted = Map::new();
        wanted.insert("assigned_agent".into(), json!("tyler"));
        let found = store.find_by_attributes(&wanted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        wanted.insert("priority".into(), json!(3));
        assert!(store.find_by_attributes(&wanted).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_by_source_matches_name_and_properties() {
        let store = MemoryThreadStore::new();
        let slack = thread_from("slack", "1234.5678");
        store.save(&slack).await.unwrap();
        store.save(&thread_from("email", "1234.5678")).await.unwrap();

        let mut props = Map::new();
        props.insert("thread_id".into(), json!("1234.5678"));
        let found = store.find_by_source("slack", &props).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, slack.id);

        props.insert("channel".into(), json!("C042"));
        assert!(store.find_by_source("slack", &props).await.unwrap().is_empty());
    }
}
