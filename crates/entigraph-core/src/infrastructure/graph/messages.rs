//! SQLite-backed message store used for conversation replay

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::graph::{Message, MessageSource};
use crate::error::Result;

/// Reads and writes the `messages` table
#[derive(Clone)]
pub struct SqliteMessageSource {
    pool: SqlitePool,
}

impl SqliteMessageSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a message, replacing any stored message with the same id
    pub async fn store_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, content, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                content = excluded.content,
                created_at = excluded.created_at
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.content)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(message_id = %message.id, conversation_id = %message.conversation_id, "Message stored");
        Ok(())
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_message()))
    }

    /// Conversation ids with their message counts
    pub async fn list_conversations(&self) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT conversation_id, COUNT(*) FROM messages GROUP BY conversation_id ORDER BY conversation_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id, n)| (id, n as u64)).collect())
    }
}

#[async_trait]
impl MessageSource for SqliteMessageSource {
    async fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows.into_iter().map(|r| r.into_message()).collect();
        // text order of timestamps is not chronological across offsets
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Message {
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            content: self.content,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteMessageSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteMessageSource::new(pool)
    }

    #[tokio::test]
    async fn test_messages_come_back_in_time_order() {
        let source = setup_test_db().await;
        let t = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();

        source.store_message(&Message::new("b", "c1", "second", t(11))).await.unwrap();
        source.store_message(&Message::new("a", "c1", "first", t(10))).await.unwrap();
        source.store_message(&Message::new("z", "c2", "other", t(9))).await.unwrap();

        let messages = source.messages_for_conversation("c1").await.unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(messages[0].timestamp, t(10));

        assert!(source.messages_for_conversation("none").await.unwrap().is_empty());
        assert_eq!(
            source.list_conversations().await.unwrap(),
            vec![("c1".to_string(), 2), ("c2".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_store_replaces_same_id() {
        let source = setup_test_db().await;
        let now = Utc::now();

        source.store_message(&Message::new("m1", "c1", "draft", now)).await.unwrap();
        source.store_message(&Message::new("m1", "c1", "final", now)).await.unwrap();

        let stored = source.get_message("m1").await.unwrap().unwrap();
        assert_eq!(stored.content, "final");
    }
}
