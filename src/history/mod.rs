//! Chat sessions and their messages, persisted in SQLite.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;

pub const ROLE_HUMAN: &str = "human";
pub const ROLE_AI: &str = "ai";
pub const ROLE_SYSTEM: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub session_id: String,
    pub message_type: String,
    pub content: String,
    pub created_at: String,
}

impl HistoryMessage {
    pub fn to_chat_message(&self) -> ChatMessage {
        match self.message_type.as_str() {
            ROLE_AI => ChatMessage::assistant(self.content.clone()),
            ROLE_SYSTEM => ChatMessage::system(self.content.clone()),
            _ => ChatMessage::user(self.content.clone()),
        }
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

fn session_from_row(row: &SqliteRow, message_count: i64) -> SessionInfo {
    SessionInfo {
        id: row.try_get::<String, _>("id").unwrap_or_default(),
        title: row.try_get::<Option<String>, _>("title").unwrap_or(None),
        created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
        updated_at: row.try_get::<String, _>("updated_at").unwrap_or_default(),
        message_count,
    }
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to history db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    /// Shared with the feedback table, which lives in the same database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<String, ApiError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&session_id)
            .bind(title)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create session: {}", e)))?;

        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionInfo>, ApiError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        match row {
            Some(row) => {
                let count = self.message_count(session_id).await?;
                Ok(Some(session_from_row(&row, count)))
            }
            None => Ok(None),
        }
    }

    /// The 100 most recently active sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.created_at, s.updated_at, \
             COUNT(m.id) as msg_count \
             FROM sessions s \
             LEFT JOIN messages m ON s.id = m.session_id \
             GROUP BY s.id \
             ORDER BY s.updated_at DESC \
             LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| session_from_row(row, row.try_get::<i64, _>("msg_count").unwrap_or(0)))
            .collect())
    }

    /// Returns whether a session was removed. Its messages go with it.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    /// Appends a message, creating the session on first use.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> Result<i64, ApiError> {
        let ids = self.append(session_id, &[(role, content)]).await?;
        ids.first()
            .copied()
            .ok_or_else(|| ApiError::Internal("Message was not stored".to_string()))
    }

    /// Stores a user turn and its answer together: either both are written
    /// or neither is.
    pub async fn add_exchange(
        &self,
        session_id: &str,
        human: &str,
        ai: &str,
    ) -> Result<(), ApiError> {
        self.append(session_id, &[(ROLE_HUMAN, human), (ROLE_AI, ai)])
            .await?;
        Ok(())
    }

    async fn append(&self, session_id: &str, turns: &[(&str, &str)]) -> Result<Vec<i64>, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let mut ids = Vec::with_capacity(turns.len());
        for (role, content) in turns {
            let result = sqlx::query(
                "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(*role)
            .bind(*content)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(ids)
    }

    /// Messages in chronological order; only the last `limit` when `limit > 0`.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryMessage>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(rows
            .iter()
            .map(|row| HistoryMessage {
                id: row.try_get::<i64, _>("id").unwrap_or_default(),
                session_id: row.try_get::<String, _>("session_id").unwrap_or_default(),
                message_type: row.try_get::<String, _>("role").unwrap_or_default(),
                content: row.try_get::<String, _>("content").unwrap_or_default(),
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
            })
            .collect())
    }

    pub async fn message_count(&self, session_id: &str) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    pub async fn total_message_count(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    /// `{"session_id", "messages": [{"type", "data": {"content"}}]}`.
    pub async fn export_transcript(&self, session_id: &str) -> Result<Value, ApiError> {
        let messages: Vec<Value> = self
            .get_history(session_id, 0)
            .await?
            .into_iter()
            .map(|m| json!({ "type": m.message_type, "data": { "content": m.content } }))
            .collect();
        Ok(json!({ "session_id": session_id, "messages": messages }))
    }
}
