//! SQLite chat history repository implementation.
//!
//! Implements `ChatHistoryRepository` from `parley-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, one transaction per append.

use chrono::{DateTime, Utc};
use parley_core::chat::repository::ChatHistoryRepository;
use parley_types::chat::{ChatHistory, HistoryMessage, MessageRole, RatingCounts, Thumb};
use parley_types::context::ContextVars;
use parley_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatHistoryRepository`.
pub struct SqliteChatHistoryRepository {
    pool: DatabasePool,
}

impl SqliteChatHistoryRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatHistoryRow {
    id: String,
    template_name: String,
    context_vars: String,
    created_at: String,
    updated_at: String,
}

impl ChatHistoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            template_name: row.try_get("template_name")?,
            context_vars: row.try_get("context_vars")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_history(self, messages: Vec<HistoryMessage>) -> Result<ChatHistory, RepositoryError> {
        Ok(ChatHistory {
            id: parse_uuid(&self.id, "history id")?,
            template_name: self.template_name,
            messages,
            context_vars: parse_json(&self.context_vars, "context_vars")?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

/// Message joined with its rating, if any.
struct HistoryMessageRow {
    id: String,
    role: String,
    content: String,
    created_at: String,
    context_vars: Option<String>,
    config_name: Option<String>,
    generation_ms: Option<i64>,
    tool_data: Option<String>,
    is_initial: bool,
    thumb: Option<String>,
}

impl HistoryMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            context_vars: row.try_get("context_vars")?,
            config_name: row.try_get("config_name")?,
            generation_ms: row.try_get("generation_ms")?,
            tool_data: row.try_get("tool_data")?,
            is_initial: row.try_get("is_initial")?,
            thumb: row.try_get("thumb")?,
        })
    }

    fn into_message(self) -> Result<HistoryMessage, RepositoryError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let thumb = self
            .thumb
            .as_deref()
            .map(|t| t.parse::<Thumb>().map_err(RepositoryError::Query))
            .transpose()?;

        Ok(HistoryMessage {
            id: parse_uuid(&self.id, "message id")?,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            context_vars: self
                .context_vars
                .as_deref()
                .map(|s| parse_json(s, "message context_vars"))
                .transpose()?,
            config_name: self.config_name,
            generation_ms: self.generation_ms.map(|v| v as u64),
            tool_data: self
                .tool_data
                .as_deref()
                .map(|s| parse_json(s, "tool_data"))
                .transpose()?,
            initial: self.is_initial,
            thumb,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

async fn insert_message(
    conn: &mut sqlx::SqliteConnection,
    history_id: &Uuid,
    seq: i64,
    message: &HistoryMessage,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"INSERT INTO chat_history_messages
               (id, history_id, seq, role, content, created_at, context_vars, config_name, generation_ms, tool_data, is_initial)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(message.id.to_string())
    .bind(history_id.to_string())
    .bind(seq)
    .bind(message.role.to_string())
    .bind(&message.content)
    .bind(format_datetime(&message.created_at))
    .bind(message.context_vars.as_ref().map(to_json).transpose()?)
    .bind(&message.config_name)
    .bind(message.generation_ms.map(|v| v as i64))
    .bind(message.tool_data.as_ref().map(to_json).transpose()?)
    .bind(message.initial)
    .execute(conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.message().contains("UNIQUE") {
                return RepositoryError::Conflict(format!("message {} already stored", message.id));
            }
        }
        RepositoryError::Query(e.to_string())
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ChatHistoryRepository implementation
// ---------------------------------------------------------------------------

impl ChatHistoryRepository for SqliteChatHistoryRepository {
    async fn create_history(&self, history: &ChatHistory) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO chat_histories (id, template_name, context_vars, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(history.id.to_string())
        .bind(&history.template_name)
        .bind(to_json(&history.context_vars)?)
        .bind(format_datetime(&history.created_at))
        .bind(format_datetime(&history.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::Conflict(format!(
                        "chat history {} already exists",
                        history.id
                    ));
                }
            }
            RepositoryError::Query(e.to_string())
        })?;

        for (seq, message) in history.messages.iter().enumerate() {
            insert_message(&mut tx, &history.id, seq as i64, message).await?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_history(&self, history_id: &Uuid) -> Result<Option<ChatHistory>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_histories WHERE id = ?")
            .bind(history_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let history_row =
            ChatHistoryRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let rows = sqlx::query(
            r#"SELECT m.*, r.thumb AS thumb
               FROM chat_history_messages m
               LEFT JOIN message_ratings r ON r.message_id = m.id
               WHERE m.history_id = ?
               ORDER BY m.seq ASC"#,
        )
        .bind(history_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = HistoryMessageRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }

        Ok(Some(history_row.into_history(messages)?))
    }

    async fn append_messages(
        &self,
        history_id: &Uuid,
        messages: &[HistoryMessage],
        context_vars: &ContextVars,
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE chat_histories SET context_vars = ?, updated_at = ? WHERE id = ?",
        )
        .bind(to_json(context_vars)?)
        .bind(format_datetime(&Utc::now()))
        .bind(history_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM chat_history_messages WHERE history_id = ?",
        )
        .bind(history_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for (offset, message) in messages.iter().enumerate() {
            insert_message(&mut tx, history_id, next_seq + offset as i64, message).await?;
        }

        // Dropping `tx` on any error above rolls the whole append back.
        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn rate_message(
        &self,
        history_id: &Uuid,
        message_id: &Uuid,
        thumb: Thumb,
    ) -> Result<(), RepositoryError> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM chat_history_messages WHERE id = ? AND history_id = ?",
        )
        .bind(message_id.to_string())
        .bind(history_id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"INSERT INTO message_ratings (message_id, history_id, thumb, rated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(message_id) DO UPDATE SET thumb = excluded.thumb, rated_at = excluded.rated_at"#,
        )
        .bind(message_id.to_string())
        .bind(history_id.to_string())
        .bind(thumb.to_string())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn rating_counts(&self, history_id: &Uuid) -> Result<RatingCounts, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT
                   COALESCE(SUM(CASE WHEN thumb = 'up' THEN 1 ELSE 0 END), 0) AS up,
                   COALESCE(SUM(CASE WHEN thumb = 'down' THEN 1 ELSE 0 END), 0) AS down
               FROM message_ratings WHERE history_id = ?"#,
        )
        .bind(history_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let up: i64 = row
            .try_get("up")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let down: i64 = row
            .try_get("down")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(RatingCounts {
            thumbs_up: up as u32,
            thumbs_down: down as u32,
        })
    }
}
