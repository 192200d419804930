//! SQLite store implementation.
//!
//! Sessions, turns, protocol events, and preferences live in one database
//! file. Timestamps are stored as RFC3339 text; event metadata is stored as
//! a JSON column.

use chrono::{DateTime, Utc};
use sovwren_core::entity::{EventKind, Preference, ProtocolEvent, Session, Turn};
use sovwren_core::error::StorageError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 50;
const AUTO_NAME_CHARS: usize = 30;

/// Fields `update_session` may touch. `first_message` also derives the
/// session preview and, when no name is set yet, an auto-name.
#[derive(Debug, Default, Clone)]
pub struct SessionUpdate {
    pub message_count: Option<i64>,
    pub first_message: Option<String>,
    pub model: Option<String>,
}

/// The durable session store.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Database(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Database(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id                    TEXT PRIMARY KEY,
                name                  TEXT,
                created_at            TEXT NOT NULL,
                last_active           TEXT NOT NULL,
                message_count         INTEGER NOT NULL DEFAULT 0,
                first_message_preview TEXT,
                model_used            TEXT,
                preferred_profile     TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id      TEXT NOT NULL,
                steward_text    TEXT NOT NULL,
                node_text       TEXT NOT NULL,
                model_used      TEXT,
                context_summary TEXT,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS protocol_events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                event_kind TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("protocol_events table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("user_preferences table: {e}")))?;

        for (name, stmt) in [
            (
                "turns session index",
                "CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id)",
            ),
            (
                "sessions recency index",
                "CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sessions(last_active DESC)",
            ),
            (
                "events session index",
                "CREATE INDEX IF NOT EXISTS idx_events_session ON protocol_events(session_id)",
            ),
            (
                "events kind index",
                "CREATE INDEX IF NOT EXISTS idx_events_kind ON protocol_events(event_kind)",
            ),
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("store migrations complete");
        Ok(())
    }

    // --- sessions ---

    /// Create a session if it does not already exist.
    pub async fn create_session(
        &self,
        id: &str,
        model: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (id, created_at, last_active, message_count, model_used)
            VALUES (?1, ?2, ?2, 0, ?3)
            "#,
        )
        .bind(id)
        .bind(&now)
        .bind(model)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("create_session: {e}")))?;
        Ok(())
    }

    /// Update session bookkeeping after a turn.
    ///
    /// `first_message` only takes effect when the session has no preview
    /// yet: it sets the preview and, if the session is unnamed, derives an
    /// auto-name from the leading characters.
    pub async fn update_session(
        &self,
        id: &str,
        update: SessionUpdate,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();

        let (preview, auto_name) = match update.first_message.as_deref() {
            Some(text) => (
                Some(truncate_chars(text, PREVIEW_CHARS)),
                Some(truncate_chars(text, AUTO_NAME_CHARS)),
            ),
            None => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE sessions SET
                last_active = ?2,
                message_count = COALESCE(?3, message_count),
                first_message_preview = COALESCE(first_message_preview, ?4),
                name = COALESCE(name, ?5),
                model_used = COALESCE(?6, model_used)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&now)
        .bind(update.message_count)
        .bind(preview)
        .bind(auto_name)
        .bind(update.model)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("update_session: {e}")))?;
        Ok(())
    }

    /// Set the preferred profile recorded on a session.
    pub async fn set_session_profile(
        &self,
        id: &str,
        profile: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET preferred_profile = ?2 WHERE id = ?1")
            .bind(id)
            .bind(profile)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("set_session_profile: {e}")))?;
        Ok(())
    }

    pub async fn rename_session(&self, id: &str, name: &str) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE sessions SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("rename_session: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a session together with its turns and events.
    pub async fn delete_session(&self, id: &str) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(format!("delete_session begin: {e}")))?;

        sqlx::query("DELETE FROM turns WHERE session_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete turns: {e}")))?;
        sqlx::query("DELETE FROM protocol_events WHERE session_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete events: {e}")))?;
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete session: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(format!("delete_session commit: {e}")))?;
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    pub async fn delete_all_sessions(&self) -> Result<u64, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(format!("delete_all begin: {e}")))?;

        sqlx::query("DELETE FROM turns")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete all turns: {e}")))?;
        sqlx::query("DELETE FROM protocol_events")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete all events: {e}")))?;
        let result = sqlx::query("DELETE FROM sessions")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("delete all sessions: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(format!("delete_all commit: {e}")))?;
        Ok(result.rows_affected())
    }

    /// List sessions most-recent first. Empty sessions (no messages yet)
    /// are not listed.
    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at, last_active, message_count,
                   first_message_preview, model_used, preferred_profile
            FROM sessions
            WHERE message_count > 0
            ORDER BY last_active DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("list_sessions: {e}")))?;

        rows.iter().map(row_to_session).collect()
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_at, last_active, message_count,
                   first_message_preview, model_used, preferred_profile
            FROM sessions WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get_session: {e}")))?;

        row.as_ref().map(row_to_session).transpose()
    }

    pub async fn count_sessions(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("count_sessions: {e}")))?;
        row.try_get("n")
            .map_err(|e| StorageError::QueryFailed(format!("count column: {e}")))
    }

    // --- turns ---

    /// Append a completed exchange, returning the new turn id.
    pub async fn append_turn(
        &self,
        session_id: &str,
        steward: &str,
        node: &str,
        model: Option<&str>,
        context_summary: Option<&str>,
    ) -> Result<i64, StorageError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO turns (session_id, steward_text, node_text, model_used, context_summary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(session_id)
        .bind(steward)
        .bind(node)
        .bind(model)
        .bind(context_summary)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("append_turn: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// All turns of a session in chronological order.
    pub async fn get_session_turns(&self, session_id: &str) -> Result<Vec<Turn>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, steward_text, node_text, model_used, context_summary, created_at
            FROM turns WHERE session_id = ?1 ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get_session_turns: {e}")))?;

        rows.iter().map(row_to_turn).collect()
    }

    /// Turn counts grouped by model, most used first.
    pub async fn get_model_usage(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT model_used, COUNT(*) AS n FROM turns
            WHERE model_used IS NOT NULL
            GROUP BY model_used ORDER BY n DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get_model_usage: {e}")))?;

        rows.iter()
            .map(|row| {
                let model: String = row
                    .try_get("model_used")
                    .map_err(|e| StorageError::QueryFailed(format!("model column: {e}")))?;
                let n: i64 = row
                    .try_get("n")
                    .map_err(|e| StorageError::QueryFailed(format!("count column: {e}")))?;
                Ok((model, n))
            })
            .collect()
    }

    // --- protocol events ---

    /// Append an audit event. Callers on the turn path should treat a
    /// failure here as non-fatal; `log_event_best_effort` does that.
    pub async fn log_event(
        &self,
        session_id: &str,
        kind: EventKind,
        metadata: serde_json::Value,
    ) -> Result<i64, StorageError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO protocol_events (session_id, event_kind, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(session_id)
        .bind(kind.as_str())
        .bind(metadata.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("log_event: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// Like `log_event` but never fails the caller. A lost audit row must
    /// not abort an accepted turn.
    pub async fn log_event_best_effort(
        &self,
        session_id: &str,
        kind: EventKind,
        metadata: serde_json::Value,
    ) {
        if let Err(e) = self.log_event(session_id, kind, metadata).await {
            warn!(kind = kind.as_str(), "failed to log protocol event: {e}");
        }
    }

    /// Events for a session, oldest first, optionally narrowed to one kind.
    pub async fn get_session_events(
        &self,
        session_id: &str,
        kind: Option<EventKind>,
        limit: i64,
    ) -> Result<Vec<ProtocolEvent>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, event_kind, metadata, created_at
            FROM protocol_events
            WHERE session_id = ?1 AND (?2 IS NULL OR event_kind = ?2)
            ORDER BY id ASC LIMIT ?3
            "#,
        )
        .bind(session_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get_session_events: {e}")))?;

        rows.iter().map(row_to_event).collect()
    }

    /// Event counts per kind for a session.
    pub async fn get_event_counts(
        &self,
        session_id: &str,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT event_kind, COUNT(*) AS n FROM protocol_events
            WHERE session_id = ?1 GROUP BY event_kind ORDER BY n DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("get_event_counts: {e}")))?;

        rows.iter()
            .map(|row| {
                let kind: String = row
                    .try_get("event_kind")
                    .map_err(|e| StorageError::QueryFailed(format!("kind column: {e}")))?;
                let n: i64 = row
                    .try_get("n")
                    .map_err(|e| StorageError::QueryFailed(format!("count column: {e}")))?;
                Ok((kind, n))
            })
            .collect()
    }

    // --- preferences ---

    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("set_preference: {e}")))?;
        Ok(())
    }

    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM user_preferences WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get_preference: {e}")))?;
        row.map(|r| {
            r.try_get("value")
                .map_err(|e| StorageError::QueryFailed(format!("value column: {e}")))
        })
        .transpose()
    }

    pub async fn get_all_preferences(&self) -> Result<Vec<Preference>, StorageError> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM user_preferences ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("get_all_preferences: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(Preference {
                    key: row
                        .try_get("key")
                        .map_err(|e| StorageError::QueryFailed(format!("key column: {e}")))?,
                    value: row
                        .try_get("value")
                        .map_err(|e| StorageError::QueryFailed(format!("value column: {e}")))?,
                    updated_at: parse_timestamp(
                        &row.try_get::<String, _>("updated_at").map_err(|e| {
                            StorageError::QueryFailed(format!("updated_at column: {e}"))
                        })?,
                    ),
                })
            })
            .collect()
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(limit).collect();
        format!("{head}...")
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    Ok(Session {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
        name: row
            .try_get("name")
            .map_err(|e| StorageError::QueryFailed(format!("name column: {e}")))?,
        created_at: parse_timestamp(
            &row.try_get::<String, _>("created_at")
                .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?,
        ),
        last_active: parse_timestamp(
            &row.try_get::<String, _>("last_active")
                .map_err(|e| StorageError::QueryFailed(format!("last_active column: {e}")))?,
        ),
        message_count: row
            .try_get("message_count")
            .map_err(|e| StorageError::QueryFailed(format!("message_count column: {e}")))?,
        first_message_preview: row
            .try_get("first_message_preview")
            .map_err(|e| StorageError::QueryFailed(format!("preview column: {e}")))?,
        model_used: row
            .try_get("model_used")
            .map_err(|e| StorageError::QueryFailed(format!("model_used column: {e}")))?,
        preferred_profile: row
            .try_get("preferred_profile")
            .map_err(|e| StorageError::QueryFailed(format!("preferred_profile column: {e}")))?,
    })
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StorageError> {
    Ok(Turn {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| StorageError::QueryFailed(format!("session_id column: {e}")))?,
        steward_text: row
            .try_get("steward_text")
            .map_err(|e| StorageError::QueryFailed(format!("steward_text column: {e}")))?,
        node_text: row
            .try_get("node_text")
            .map_err(|e| StorageError::QueryFailed(format!("node_text column: {e}")))?,
        model_used: row
            .try_get("model_used")
            .map_err(|e| StorageError::QueryFailed(format!("model_used column: {e}")))?,
        context_summary: row
            .try_get("context_summary")
            .map_err(|e| StorageError::QueryFailed(format!("context_summary column: {e}")))?,
        created_at: parse_timestamp(
            &row.try_get::<String, _>("created_at")
                .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?,
        ),
    })
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ProtocolEvent, StorageError> {
    let kind_str: String = row
        .try_get("event_kind")
        .map_err(|e| StorageError::QueryFailed(format!("event_kind column: {e}")))?;
    let kind = EventKind::parse(&kind_str)
        .ok_or_else(|| StorageError::QueryFailed(format!("unknown event kind: {kind_str}")))?;
    let metadata_str: String = row
        .try_get("metadata")
        .map_err(|e| StorageError::QueryFailed(format!("metadata column: {e}")))?;

    Ok(ProtocolEvent {
        id: row
            .try_get("id")
            .map_err(|e| StorageError::QueryFailed(format!("id column: {e}")))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| StorageError::QueryFailed(format!("session_id column: {e}")))?,
        kind,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        created_at: parse_timestamp(
            &row.try_get::<String, _>("created_at")
                .map_err(|e| StorageError::QueryFailed(format!("created_at column: {e}")))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> Store {
        Store::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_session_is_idempotent() {
        let store = store().await;
        store.create_session("s1", Some("ministral-3b")).await.unwrap();
        store.create_session("s1", Some("other-model")).await.unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.model_used.as_deref(), Some("ministral-3b"));
        assert_eq!(store.count_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_derives_preview_and_auto_name() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();

        let long = "a".repeat(80);
        store
            .update_session(
                "s1",
                SessionUpdate {
                    message_count: Some(1),
                    first_message: Some(long),
                    model: Some("qwen2.5".into()),
                },
            )
            .await
            .unwrap();

        let session = store.get_session("s1").await.unwrap().unwrap();
        let preview = session.first_message_preview.clone().unwrap();
        assert_eq!(preview.chars().count(), 53); // 50 + "..."
        assert!(preview.ends_with("..."));
        assert_eq!(session.name.clone().unwrap().chars().count(), 33);
        assert_eq!(session.model_used.as_deref(), Some("qwen2.5"));
    }

    #[tokio::test]
    async fn preview_is_set_only_once() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();

        for (count, msg) in [(1, "first message"), (2, "second message")] {
            store
                .update_session(
                    "s1",
                    SessionUpdate {
                        message_count: Some(count),
                        first_message: Some(msg.into()),
                        model: None,
                    },
                )
                .await
                .unwrap();
        }

        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.first_message_preview.as_deref(), Some("first message"));
        assert_eq!(session.message_count, 2);
    }

    #[tokio::test]
    async fn empty_sessions_are_not_listed() {
        let store = store().await;
        store.create_session("empty", None).await.unwrap();
        store.create_session("used", None).await.unwrap();
        store
            .update_session(
                "used",
                SessionUpdate {
                    message_count: Some(1),
                    first_message: Some("hello".into()),
                    model: None,
                },
            )
            .await
            .unwrap();

        let listed = store.list_sessions(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "used");
        // but it still exists and counts
        assert_eq!(store.count_sessions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rename_unknown_session_errors() {
        let store = store().await;
        let err = store.rename_session("ghost", "name").await.unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn turns_come_back_in_order() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();

        for i in 0..3 {
            store
                .append_turn("s1", &format!("q{i}"), &format!("a{i}"), Some("m"), None)
                .await
                .unwrap();
        }

        let turns = store.get_session_turns("s1").await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].steward_text, "q0");
        assert_eq!(turns[2].node_text, "a2");
    }

    #[tokio::test]
    async fn delete_session_cascades() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();
        store.append_turn("s1", "q", "a", None, None).await.unwrap();
        store
            .log_event("s1", EventKind::ModeChanged, json!({"to": "sanctuary"}))
            .await
            .unwrap();

        store.delete_session("s1").await.unwrap();

        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.get_session_turns("s1").await.unwrap().is_empty());
        assert!(store
            .get_session_events("s1", None, 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_all_reports_count() {
        let store = store().await;
        store.create_session("a", None).await.unwrap();
        store.create_session("b", None).await.unwrap();
        assert_eq!(store.delete_all_sessions().await.unwrap(), 2);
        assert_eq!(store.count_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn events_roundtrip_with_metadata() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();
        store
            .log_event(
                "s1",
                EventKind::ContextBandTransition,
                json!({"from": "Low", "to": "Medium"}),
            )
            .await
            .unwrap();

        let events = store.get_session_events("s1", None, 100).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ContextBandTransition);
        assert_eq!(events[0].metadata["to"], "Medium");
    }

    #[tokio::test]
    async fn events_filter_by_kind_and_limit() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();
        for i in 0..3 {
            store
                .log_event("s1", EventKind::SearchPerformed, json!({"n": i}))
                .await
                .unwrap();
        }
        store
            .log_event("s1", EventKind::ModeChanged, json!({"to": "library"}))
            .await
            .unwrap();

        let searches = store
            .get_session_events("s1", Some(EventKind::SearchPerformed), 100)
            .await
            .unwrap();
        assert_eq!(searches.len(), 3);
        assert!(searches.iter().all(|e| e.kind == EventKind::SearchPerformed));

        let capped = store
            .get_session_events("s1", Some(EventKind::SearchPerformed), 2)
            .await
            .unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].metadata["n"], 0);

        let all = store.get_session_events("s1", None, 100).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn event_counts_group_by_kind() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();
        for _ in 0..2 {
            store
                .log_event("s1", EventKind::SearchPerformed, json!({}))
                .await
                .unwrap();
        }
        store
            .log_event("s1", EventKind::BookmarkCreated, json!({}))
            .await
            .unwrap();

        let counts = store.get_event_counts("s1").await.unwrap();
        assert_eq!(counts[0], ("search_performed".to_string(), 2));
        assert_eq!(counts[1], ("bookmark_created".to_string(), 1));
    }

    #[tokio::test]
    async fn preferences_upsert() {
        let store = store().await;
        store.set_preference("last_model", "llama-3.2").await.unwrap();
        store.set_preference("last_model", "qwen2.5").await.unwrap();

        assert_eq!(
            store.get_preference("last_model").await.unwrap().as_deref(),
            Some("qwen2.5")
        );
        assert_eq!(store.get_preference("missing").await.unwrap(), None);
        assert_eq!(store.get_all_preferences().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn model_usage_counts_turns() {
        let store = store().await;
        store.create_session("s1", None).await.unwrap();
        for _ in 0..3 {
            store
                .append_turn("s1", "q", "a", Some("ministral-3b"), None)
                .await
                .unwrap();
        }
        store
            .append_turn("s1", "q", "a", Some("llama-3.2"), None)
            .await
            .unwrap();

        let usage = store.get_model_usage().await.unwrap();
        assert_eq!(usage[0], ("ministral-3b".to_string(), 3));
        assert_eq!(usage[1], ("llama-3.2".to_string(), 1));
    }

    #[tokio::test]
    async fn best_effort_logging_swallows_errors() {
        let store = store().await;
        // unknown session id is fine for the events table, the point is the
        // call never panics or propagates
        store
            .log_event_best_effort("nope", EventKind::RuptureLogged, json!({}))
            .await;
    }
}
