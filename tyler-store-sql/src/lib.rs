#![deny(missing_docs)]
//! SQL-backed implementation of the ThreadStore trait.
//!
//! One query surface serves both SQLite (development) and PostgreSQL
//! (production) through sqlx's `Any` driver. Free-form fields are stored
//! as JSON text and timestamps as RFC 3339 text so the same statements
//! run unchanged on either backend.
//!
//! Saves are transactional: the thread row is upserted and messages are
//! diff-applied by their hash-derived id (existing rows update content,
//! metrics, and attachments only; new rows are inserted). A
//! serialization failure aborts the whole save with no partial write.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, warn};

use tyler_types::{
    Message, MessageContent, MessageMetrics, Role, StoreError, Thread, ThreadMetrics, ThreadStore,
    ToolCall,
};

const CREATE_THREADS: &str = r#"
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    title TEXT,
    attributes TEXT NOT NULL,
    source TEXT,
    metrics TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    "sequence" BIGINT NOT NULL,
    role TEXT NOT NULL,
    content TEXT,
    name TEXT,
    tool_call_id TEXT,
    tool_calls TEXT,
    attributes TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    source TEXT,
    attachments TEXT,
    metrics TEXT NOT NULL
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_threads_updated_at ON threads(updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_threads_created_at ON threads(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id)",
];

/// SQL thread store over a sqlx `Any` pool.
pub struct SqlThreadStore {
    pool: AnyPool,
    echo: bool,
}

impl SqlThreadStore {
    /// Connect to the given database URL.
    ///
    /// Accepted URLs: `postgres://…`, `sqlite://path`, and the shorthand
    /// `":memory:"`. When no URL is given, `TYLER_DB_TYPE` plus the
    /// `TYLER_DB_HOST/PORT/NAME/USER/PASSWORD` variables compose a
    /// PostgreSQL URL; absent those, an ephemeral SQLite database under
    /// the system temp directory is used.
    ///
    /// Pool sizing follows `TYLER_DB_POOL_SIZE` and
    /// `TYLER_DB_MAX_OVERFLOW`; `TYLER_DB_ECHO=true` logs statements.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] when the URL cannot be
    /// resolved or the pool cannot connect.
    pub async fn connect(database_url: Option<&str>) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let url = match database_url {
            Some(":memory:") => "sqlite::memory:".to_string(),
            Some(url) => url.to_string(),
            None => resolve_url_from_env()?,
        };

        let echo = std::env::var("TYLER_DB_ECHO")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let pool_size = env_u32("TYLER_DB_POOL_SIZE", 5);
        let max_overflow = env_u32("TYLER_DB_MAX_OVERFLOW", 10);

        // A shared in-memory SQLite database exists per connection, so
        // the pool must not grow past one.
        let max_connections = if url.starts_with("sqlite::memory:") {
            1
        } else {
            pool_size + max_overflow
        };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(url = %redact_url(&url), max_connections, "connected thread store");
        Ok(Self { pool, echo })
    }

    /// Create the schema when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] on DDL failure.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        for ddl in [CREATE_THREADS, CREATE_MESSAGES]
            .into_iter()
            .chain(CREATE_INDEXES.iter().copied())
        {
            self.log_sql(ddl);
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }
        Ok(())
    }

    fn log_sql(&self, sql: &str) {
        if self.echo {
            debug!(sql = sql.trim(), "executing statement");
        }
    }

    fn thread_from_row(row: &AnyRow) -> Result<Thread, StoreError> {
        let attributes: String = get(row, "attributes")?;
        let source: Option<String> = get(row, "source")?;
        let metrics: String = get(row, "metrics")?;
        let created_at: String = get(row, "created_at")?;
        let updated_at: String = get(row, "updated_at")?;

        Ok(Thread {
            id: get(row, "id")?,
            title: get::<Option<String>>(row, "title")?.unwrap_or_default(),
            messages: Vec::new(),
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            attributes: from_json_text(&attributes)?,
            source: source.as_deref().map(from_json_text).transpose()?,
            metrics: from_json_text::<ThreadMetrics>(&metrics)?,
        })
    }

    fn message_from_row(row: &AnyRow) -> Result<Message, StoreError> {
        let content: Option<String> = get(row, "content")?;
        let tool_calls: Option<String> = get(row, "tool_calls")?;
        let attributes: String = get(row, "attributes")?;
        let timestamp: String = get(row, "timestamp")?;
        let source: Option<String> = get(row, "source")?;
        let attachments: Option<String> = get(row, "attachments")?;
        let metrics: String = get(row, "metrics")?;
        let role: String = get(row, "role")?;

        Ok(Message {
            id: get(row, "id")?,
            role: parse_role(&role)?,
            sequence: get::<i64>(row, "sequence")? as u64,
            content: content
                .as_deref()
                .map(from_json_text::<MessageContent>)
                .transpose()?,
            name: get(row, "name")?,
            tool_call_id: get(row, "tool_call_id")?,
            tool_calls: tool_calls
                .as_deref()
                .map(from_json_text::<Vec<ToolCall>>)
                .transpose()?,
            attributes: from_json_text(&attributes)?,
            timestamp: parse_timestamp(&timestamp)?,
            source: source.as_deref().map(from_json_text).transpose()?,
            attachments: attachments
                .as_deref()
                .map(from_json_text)
                .transpose()?
                .unwrap_or_default(),
            metrics: from_json_text::<MessageMetrics>(&metrics)?,
        })
    }

    async fn load_messages(&self, thread: &mut Thread) -> Result<(), StoreError> {
        let sql = r#"SELECT * FROM messages WHERE thread_id = $1 ORDER BY "sequence" ASC, timestamp ASC"#;
        self.log_sql(sql);
        let rows = sqlx::query(sql)
            .bind(&thread.id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(Self::message_from_row(row)?);
        }
        // System messages carry sequence 0 and stay in front.
        messages.sort_by_key(|m| (m.role != Role::System, m.sequence));
        thread.messages = messages;
        Ok(())
    }

    async fn load_threads_filtered<F>(&self, predicate: F) -> Result<Vec<Thread>, StoreError>
    where
        F: Fn(&Thread) -> bool,
    {
        let sql = "SELECT * FROM threads ORDER BY updated_at DESC";
        self.log_sql(sql);
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut threads = Vec::new();
        for row in &rows {
            let thread = Self::thread_from_row(row)?;
            if predicate(&thread) {
                threads.push(thread);
            }
        }
        for thread in &mut threads {
            self.load_messages(thread).await?;
        }
        Ok(threads)
    }
}

#[async_trait]
impl ThreadStore for SqlThreadStore {
    async fn save(&self, thread: &Thread) -> Result<(), StoreError> {
        // Serialize everything up front: a failure here fails the whole
        // save before any row is touched.
        let attributes = to_json_text(&thread.attributes)?;
        let source = thread.source.as_ref().map(to_json_text).transpose()?;
        let metrics = to_json_text(&thread.metrics)?;
        let created_at = format_timestamp(&thread.created_at);
        let updated_at = format_timestamp(&thread.updated_at);

        struct MessageRow {
            id: String,
            sequence: i64,
            role: String,
            content: Option<String>,
            name: Option<String>,
            tool_call_id: Option<String>,
            tool_calls: Option<String>,
            attributes: String,
            timestamp: String,
            source: Option<String>,
            attachments: Option<String>,
            metrics: String,
        }

        let mut rows = Vec::with_capacity(thread.messages.len());
        for message in &thread.messages {
            rows.push(MessageRow {
                id: message.id.clone(),
                sequence: message.sequence as i64,
                role: message.role.to_string(),
                content: message.content.as_ref().map(to_json_text).transpose()?,
                name: message.name.clone(),
                tool_call_id: message.tool_call_id.clone(),
                tool_calls: message.tool_calls.as_ref().map(to_json_text).transpose()?,
                attributes: to_json_text(&message.attributes)?,
                timestamp: format_timestamp(&message.timestamp),
                source: message.source.as_ref().map(to_json_text).transpose()?,
                attachments: if message.attachments.is_empty() {
                    None
                } else {
                    Some(to_json_text(&message.attachments)?)
                },
                metrics: to_json_text(&message.metrics)?,
            });
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let existing = sqlx::query("SELECT id FROM threads WHERE id = $1")
            .bind(&thread.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if existing.is_none() {
            let sql = "INSERT INTO threads (id, title, attributes, source, metrics, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)";
            self.log_sql(sql);
            sqlx::query(sql)
                .bind(&thread.id)
                .bind(&thread.title)
                .bind(&attributes)
                .bind(&source)
                .bind(&metrics)
                .bind(&created_at)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        } else {
            // Last writer wins on the thread row.
            let sql = "UPDATE threads SET title = $2, attributes = $3, source = $4, metrics = $5, updated_at = $6 WHERE id = $1";
            self.log_sql(sql);
            sqlx::query(sql)
                .bind(&thread.id)
                .bind(&thread.title)
                .bind(&attributes)
                .bind(&source)
                .bind(&metrics)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
        }

        let existing_ids: HashSet<String> =
            sqlx::query("SELECT id FROM messages WHERE thread_id = $1")
                .bind(&thread.id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?
                .iter()
                .map(|row| get::<String>(row, "id"))
                .collect::<Result<_, _>>()?;

        for row in rows {
            if existing_ids.contains(&row.id) {
                // The hash-derived id keeps updates idempotent; only the
                // mutable fields are rewritten.
                let sql = "UPDATE messages SET content = $2, metrics = $3, attachments = $4 WHERE id = $1";
                self.log_sql(sql);
                sqlx::query(sql)
                    .bind(&row.id)
                    .bind(&row.content)
                    .bind(&row.metrics)
                    .bind(&row.attachments)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Query(e.to_string()))?;
            } else {
                let sql = r#"INSERT INTO messages (id, thread_id, "sequence", role, content, name, tool_call_id, tool_calls, attributes, timestamp, source, attachments, metrics) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#;
                self.log_sql(sql);
                sqlx::query(sql)
                    .bind(&row.id)
                    .bind(&thread.id)
                    .bind(row.sequence)
                    .bind(&row.role)
                    .bind(&row.content)
                    .bind(&row.name)
                    .bind(&row.tool_call_id)
                    .bind(&row.tool_calls)
                    .bind(&row.attributes)
                    .bind(&row.timestamp)
                    .bind(&row.source)
                    .bind(&row.attachments)
                    .bind(&row.metrics)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Query(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        let sql = "SELECT * FROM threads WHERE id = $1";
        self.log_sql(sql);
        let row = sqlx::query(sql)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut thread = Self::thread_from_row(&row)?;
        self.load_messages(&mut thread).await?;
        Ok(Some(thread))
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // Explicit child delete keeps the cascade portable across
        // backends regardless of foreign-key enforcement settings.
        sqlx::query("DELETE FROM messages WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let result = sqlx::query("DELETE FROM threads WHERE id = $1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Thread>, StoreError> {
        let sql = "SELECT * FROM threads ORDER BY updated_at DESC LIMIT $1 OFFSET $2";
        self.log_sql(sql);
        let rows = sqlx::query(sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut threads = Vec::with_capacity(rows.len());
        for row in &rows {
            threads.push(Self::thread_from_row(row)?);
        }
        for thread in &mut threads {
            self.load_messages(thread).await?;
        }
        Ok(threads)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Thread>, StoreError> {
        self.list(limit, 0).await
    }

    async fn find_by_attributes(
        &self,
        attributes: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError> {
        self.load_threads_filtered(|thread| {
            attributes
                .iter()
                .all(|(key, value)| thread.attributes.get(key) == Some(value))
        })
        .await
    }

    async fn find_by_source(
        &self,
        source_name: &str,
        properties: &Map<String, Value>,
    ) -> Result<Vec<Thread>, StoreError> {
        self.load_threads_filtered(|thread| match &thread.source {
            Some(source) => {
                source.get("name").and_then(Value::as_str) == Some(source_name)
                    && properties
                        .iter()
                        .all(|(key, value)| source.get(key) == Some(value))
            }
            None => false,
        })
        .await
    }
}

fn to_json_text<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json_text<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn format_timestamp(value: &chrono::DateTime<chrono::Utc>) -> String {
    tyler_types::time::format_utc(value)
}

fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    tyler_types::time::parse_utc(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_role(value: &str) -> Result<Role, StoreError> {
    match value {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(StoreError::Serialization(format!("unknown role: {other}"))),
    }
}

fn get<'r, T: sqlx::Decode<'r, sqlx::Any> + sqlx::Type<sqlx::Any>>(
    row: &'r AnyRow,
    column: &str,
) -> Result<T, StoreError> {
    row.try_get(column)
        .map_err(|e| StoreError::Query(format!("column {column}: {e}")))
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "invalid pool setting, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Compose a database URL from the `TYLER_DB_*` environment, falling
/// back to an ephemeral SQLite database under the temp directory.
fn resolve_url_from_env() -> Result<String, StoreError> {
    let db_type = std::env::var("TYLER_DB_TYPE").unwrap_or_default();
    if db_type.eq_ignore_ascii_case("postgresql") || db_type.eq_ignore_ascii_case("postgres") {
        let host = std::env::var("TYLER_DB_HOST").unwrap_or_else(|_| "localhost".into());
        let port = std::env::var("TYLER_DB_PORT").unwrap_or_else(|_| "5432".into());
        let name = std::env::var("TYLER_DB_NAME")
            .map_err(|_| StoreError::Connection("TYLER_DB_NAME is required".into()))?;
        let user = std::env::var("TYLER_DB_USER")
            .map_err(|_| StoreError::Connection("TYLER_DB_USER is required".into()))?;
        let password = std::env::var("TYLER_DB_PASSWORD").unwrap_or_default();
        return Ok(format!("postgres://{user}:{password}@{host}:{port}/{name}"));
    }

    let dir: PathBuf = std::env::temp_dir().join("tyler_threads");
    std::fs::create_dir_all(&dir)
        .map_err(|e| StoreError::Connection(format!("cannot create {}: {e}", dir.display())))?;
    Ok(format!("sqlite://{}/threads.db?mode=rwc", dir.display()))
}

/// Strip credentials before a URL reaches the logs.
fn redact_url(url: &str) -> String {
    match url.split_once('@') {
        Some((head, tail)) => match head.split_once("://") {
            Some((scheme, _)) => format!("{scheme}://***@{tail}"),
            None => format!("***@{tail}"),
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tyler_types::{Attachment, Message, Role};

    async fn memory_store() -> SqlThreadStore {
        let store = SqlThreadStore::connect(Some(":memory:")).await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    fn sample_thread() -> Thread {
        let mut thread = Thread::new();
        thread.ensure_system_prompt("You are a helpful assistant.");
        thread.add_message(Message::new(Role::User, "Hello"));
        thread.add_message(Message::new(Role::Assistant, "Hi! How can I help?"));
        thread
            .attributes
            .insert("assigned_agent".into(), json!("tyler"));
        thread
    }

    #[tokio::test]
    async fn save_then_get_is_structurally_equal() {
        let store = memory_store().await;
        let thread = sample_thread();
        store.save(&thread).await.unwrap();

        let loaded = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded, thread);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = memory_store().await;
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resave_updates_existing_messages_by_id() {
        let store = memory_store().await;
        let mut thread = sample_thread();
        store.save(&thread).await.unwrap();

        // Mutate an existing message's metrics and add a new message.
        thread.messages[2].metrics.usage.total_tokens = 42;
        thread.add_message(Message::new(Role::User, "Another question"));
        store.save(&thread).await.unwrap();

        let loaded = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 4);
        assert_eq!(loaded.messages[2].metrics.usage.total_tokens, 42);
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_existence() {
        let store = memory_store().await;
        let thread = sample_thread();
        store.save(&thread).await.unwrap();

        assert!(store.delete(&thread.id).await.unwrap());
        assert!(store.get(&thread.id).await.unwrap().is_none());
        assert!(!store.delete(&thread.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_recent_orders_by_updated_at() {
        let store = memory_store().await;
        let mut first = Thread::new();
        store.save(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = Thread::new();
        store.save(&second).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        first.add_message(Message::new(Role::User, "bump"));
        store.save(&first).await.unwrap();

        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent[0].id, first.id);
        assert_eq!(recent[1].id, second.id);

        let paged = store.list(1, 1).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, second.id);
    }

    #[tokio::test]
    async fn find_by_attributes_matches_equality() {
        let store = memory_store().await;
        let thread = sample_thread();
        store.save(&thread).await.unwrap();
        store.save(&Thread::new()).await.unwrap();

        let mut wanted = Map::new();
        wanted.insert("assigned_agent".into(), json!("tyler"));
        let found = store.find_by_attributes(&wanted).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, thread.id);
    }

    #[tokio::test]
    async fn find_by_source_matches_name_and_subset() {
        let store = memory_store().await;
        let mut source = Map::new();
        source.insert("name".into(), json!("slack"));
        source.insert("thread_id".into(), json!("1234.5678"));
        let thread = Thread::new().with_source(source);
        store.save(&thread).await.unwrap();

        let mut props = Map::new();
        props.insert("thread_id".into(), json!("1234.5678"));
        let found = store.find_by_source("slack", &props).await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(store.find_by_source("email", &props).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attachments_roundtrip_without_inline_content() {
        let store = memory_store().await;
        let mut attachment = Attachment::new("doc.pdf", b"%PDF-1.4".to_vec());
        attachment.file_id = Some("file-1".into());
        attachment.storage_path = Some("fi/le-1.pdf".into());
        attachment.storage_backend = Some("local".into());
        attachment.mime_type = Some("application/pdf".into());

        let mut thread = Thread::new();
        thread.add_message(
            Message::new(Role::User, "see attachment").with_attachments(vec![attachment]),
        );
        store.save(&thread).await.unwrap();

        let loaded = store.get(&thread.id).await.unwrap().unwrap();
        let att = &loaded.messages[0].attachments[0];
        assert_eq!(att.file_id.as_deref(), Some("file-1"));
        // Stored serialization omits inline bytes once a file_id is set.
        assert!(att.content.is_none());
    }

    #[tokio::test]
    async fn sqlite_file_backend_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/threads.db?mode=rwc", dir.path().display());

        let thread = sample_thread();
        {
            let store = SqlThreadStore::connect(Some(&url)).await.unwrap();
            store.initialize().await.unwrap();
            store.save(&thread).await.unwrap();
        }

        let store = SqlThreadStore::connect(Some(&url)).await.unwrap();
        store.initialize().await.unwrap();
        let loaded = store.get(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded, thread);
    }

    #[test]
    fn redact_url_strips_credentials() {
        assert_eq!(
            redact_url("postgres://user:secret@db:5432/tyler"),
            "postgres://***@db:5432/tyler"
        );
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }
}
