//! User feedback, stored next to the chat history.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

pub const FEEDBACK_SAVED: &str = "Feedback saved successfully.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Plain chat messages carry their text here instead of `feedback`.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub logs: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub session_id: String,
    pub feedback: String,
    pub logs: Option<Value>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                feedback TEXT NOT NULL,
                logs TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init feedback table: {}", e)))?;
        Ok(Self { pool })
    }

    pub async fn save(&self, entry: FeedbackEntry) -> Result<&'static str, ApiError> {
        let feedback = entry
            .feedback
            .filter(|f| !f.trim().is_empty())
            .or(entry.content.filter(|c| !c.trim().is_empty()))
            .ok_or_else(|| ApiError::BadRequest("Missing feedback content.".to_string()))?;
        let session_id = entry
            .session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let logs = entry
            .logs
            .filter(|l| !l.is_null())
            .map(|l| l.to_string());

        sqlx::query(
            "INSERT INTO feedback (session_id, feedback, logs, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session_id)
        .bind(&feedback)
        .bind(logs)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        tracing::info!("Saved feedback for session {}", session_id);
        Ok(FEEDBACK_SAVED)
    }

    pub async fn list(&self, session_id: Option<&str>) -> Result<Vec<FeedbackRecord>, ApiError> {
        let rows = match session_id {
            Some(id) => sqlx::query("SELECT * FROM feedback WHERE session_id = ? ORDER BY id ASC")
                .bind(id)
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT * FROM feedback ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| FeedbackRecord {
                id: row.try_get::<i64, _>("id").unwrap_or_default(),
                session_id: row.try_get::<String, _>("session_id").unwrap_or_default(),
                feedback: row.try_get::<String, _>("feedback").unwrap_or_default(),
                logs: row
                    .try_get::<Option<String>, _>("logs")
                    .unwrap_or(None)
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
            })
            .collect())
    }
}
