// src/history.rs
//! Per-user append-only conversation log.

use crate::db::StoreError;
use crate::models::chat::{ChatMessage, HistoryPage, MessageType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const PAGE_SIZE: i64 = 20;

/// Offset and limit of page `page` (zero-based).
pub fn page_window(page: u32) -> (i64, i64) {
    (i64::from(page) * PAGE_SIZE, PAGE_SIZE)
}

pub fn has_more(page: u32, total: i64) -> bool {
    (i64::from(page) + 1) * PAGE_SIZE < total
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, user_id: Uuid, content: &str, kind: MessageType) -> Result<ChatMessage, StoreError>;

    /// Messages of `user_id` ordered by creation time, oldest first.
    async fn page(&self, user_id: Uuid, page: u32) -> Result<HistoryPage, StoreError>;

    /// Deletes one message if it belongs to `user_id`.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes every message of `user_id`, returning how many were removed.
    async fn clear(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, FromRow)]
struct ChatMessageRow {
    id: Uuid,
    content: String,
    #[sqlx(rename = "type")]
    kind: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: ChatMessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            kind: row.kind.parse().map_err(StoreError::CorruptRow)?,
            id: row.id,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, user_id: Uuid, content: &str, kind: MessageType) -> Result<ChatMessage, StoreError> {
        let row: ChatMessageRow = sqlx::query_as(
            "INSERT INTO chat_histories (id, user_id, content, type, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING id, content, type, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(content)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn page(&self, user_id: Uuid, page: u32) -> Result<HistoryPage, StoreError> {
        let (offset, limit) = page_window(page);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_histories WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<ChatMessageRow> = sqlx::query_as(
            "SELECT id, content, type, created_at FROM chat_histories
             WHERE user_id = $1
             ORDER BY created_at ASC, id ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryPage {
            messages,
            page,
            has_more: has_more(page, total),
            total,
        })
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_histories WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_histories WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
