use async_trait::async_trait;
use ballast_llm::provider::Role;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoredMessage};

/// Conversation turns in the `conversation_messages` table.
#[derive(Debug, Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append(
        &self,
        session_id: Uuid,
        role: Role,
        text: &str,
        token_count: Option<u32>,
        model_tag: Option<&str>,
    ) -> Result<(), StoreError> {
        let token_count = token_count.map(|n| i32::try_from(n).unwrap_or(i32::MAX));
        sqlx::query(
            "INSERT INTO conversation_messages (session_id, role, content, token_count, model_tag) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(text)
        .bind(token_count)
        .bind(model_tag)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, session_id: Uuid) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT role, content, token_count, model_tag, created_at \
             FROM conversation_messages WHERE session_id = $1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn recent(&self, session_id: Uuid, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            "SELECT role, content, token_count, model_tag, created_at \
             FROM conversation_messages WHERE session_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
    token_count: Option<i32>,
    model_tag: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            text: row.content,
            token_count: row.token_count.and_then(|n| u32::try_from(n).ok()),
            model_tag: row.model_tag,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(role: &str) -> MessageRow {
        MessageRow {
            role: role.into(),
            content: "hello".into(),
            token_count: Some(-1),
            model_tag: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_conversion() {
        let m = StoredMessage::try_from(row("assistant")).unwrap();
        assert_eq!(m.role, Role::Assistant);
        // negative counts are dropped rather than wrapped
        assert_eq!(m.token_count, None);
    }

    #[test]
    fn unknown_role_is_corrupt() {
        assert!(matches!(StoredMessage::try_from(row("robot")), Err(StoreError::Corrupt(_))));
    }
}
