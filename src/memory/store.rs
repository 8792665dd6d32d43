//! Durable, append-only conversation logs.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{BujjiError, Result};
use crate::types::Message;

/// Identifies one conversation log: the owning user plus the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

/// Append-only message log partitioned by session.
///
/// Messages come back in insertion order and are never rewritten.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message to the session's log.
    async fn append(&self, session: &SessionKey, message: &Message) -> Result<()>;

    /// The full, untrimmed log in append order.
    async fn messages(&self, session: &SessionKey) -> Result<Vec<Message>>;

    /// Remove every message of the session.
    async fn clear(&self, session: &SessionKey) -> Result<()>;
}

/// SQLite-backed store. One table holds every session; rows are keyed by
/// user id and session id and ordered by their rowid.
#[derive(Clone)]
pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteMessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteMessageStore").field("path", &self.path).finish()
    }
}

impl SqliteMessageStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BujjiError::Storage(format!("memory: create {}: {e}", parent.display()))
            })?;
        }
        let conn = open_conn(path)?;
        init_schema(&conn)?;
        debug!(path = %path.display(), "opened memory database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-process database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BujjiError::Storage(format!("memory: open in-memory database: {e}")))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| BujjiError::Storage("memory: connection lock poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|e| BujjiError::Storage(format!("memory: worker task failed: {e}")))?
    }
}

fn open_conn(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| BujjiError::Storage(format!("memory: open {}: {e}", path.display())))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| BujjiError::Storage(format!("memory: set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| BujjiError::Storage(format!("memory: enable foreign_keys: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| BujjiError::Storage(format!("memory: set busy_timeout: {e}")))?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS message_store (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS message_store_session
            ON message_store (user_id, session_id, id);
        ",
    )
    .map_err(|e| BujjiError::Storage(format!("memory: initialize schema: {e}")))
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, session: &SessionKey, message: &Message) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let session = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO message_store (user_id, session_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.user_id,
                    session.session_id,
                    payload,
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn messages(&self, session: &SessionKey) -> Result<Vec<Message>> {
        let session = session.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message FROM message_store
                 WHERE user_id = ?1 AND session_id = ?2
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![session.user_id, session.session_id], |row| {
                row.get::<_, String>(0)
            })?;
            let mut out = Vec::new();
            for raw in rows {
                out.push(serde_json::from_str(&raw?)?);
            }
            Ok(out)
        })
        .await
    }

    async fn clear(&self, session: &SessionKey) -> Result<()> {
        let session = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM message_store WHERE user_id = ?1 AND session_id = ?2",
                params![session.user_id, session.session_id],
            )?;
            Ok(())
        })
        .await
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMessageStore {
    logs: Arc<Mutex<HashMap<SessionKey, Vec<Message>>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionKey, Vec<Message>>>> {
        self.logs
            .lock()
            .map_err(|_| BujjiError::Storage("memory: store lock poisoned".into()))
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, session: &SessionKey, message: &Message) -> Result<()> {
        self.lock()?.entry(session.clone()).or_default().push(message.clone());
        Ok(())
    }

    async fn messages(&self, session: &SessionKey) -> Result<Vec<Message>> {
        Ok(self.lock()?.get(session).cloned().unwrap_or_default())
    }

    async fn clear(&self, session: &SessionKey) -> Result<()> {
        self.lock()?.remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_log() -> Vec<Message> {
        vec![
            Message::human("What is 2+2?"),
            Message::ai_with_tool_calls(
                "",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "calculator".into(),
                    arguments: json!({"expression": "2+2"}),
                }],
            ),
            Message::tool("calculator", "call_1", "4"),
            Message::ai("2+2 is 4."),
        ]
    }

    #[tokio::test]
    async fn sqlite_log_round_trips_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMessageStore::open(dir.path().join("nested/memory.db")).unwrap();
        let session = SessionKey::new("u1", "c1");
        let log = sample_log();
        for msg in &log {
            store.append(&session, msg).await.unwrap();
        }
        assert_eq!(store.messages(&session).await.unwrap(), log);
    }

    #[tokio::test]
    async fn sqlite_sessions_are_partitioned() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let a = SessionKey::new("u1", "c1");
        let b = SessionKey::new("u1", "c2");
        let other_user = SessionKey::new("u2", "c1");
        store.append(&a, &Message::human("first")).await.unwrap();
        store.append(&b, &Message::human("second")).await.unwrap();

        assert_eq!(store.messages(&a).await.unwrap().len(), 1);
        assert_eq!(store.messages(&b).await.unwrap()[0].content, "second");
        assert!(store.messages(&other_user).await.unwrap().is_empty());

        store.clear(&a).await.unwrap();
        assert!(store.messages(&a).await.unwrap().is_empty());
        assert_eq!(store.messages(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sqlite_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let session = SessionKey::new("u1", "c1");
        {
            let store = SqliteMessageStore::open(&path).unwrap();
            store.append(&session, &Message::human("persist me")).await.unwrap();
        }
        let reopened = SqliteMessageStore::open(&path).unwrap();
        assert_eq!(reopened.messages(&session).await.unwrap()[0].content, "persist me");
    }

    #[tokio::test]
    async fn in_memory_store_matches_sqlite_semantics() {
        let store = InMemoryMessageStore::new();
        let session = SessionKey::new("u1", "c1");
        let log = sample_log();
        for msg in &log {
            store.append(&session, msg).await.unwrap();
        }
        assert_eq!(store.messages(&session).await.unwrap(), log);
        store.clear(&session).await.unwrap();
        assert!(store.messages(&session).await.unwrap().is_empty());
    }
}
