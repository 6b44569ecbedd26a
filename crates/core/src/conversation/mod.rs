//! Conversation persistence.
//!
//! The engine reads a session's history before a query and appends the
//! user turn and the reply after it. Failures here are logged by the
//! caller and never fail the query.

mod memory;
mod pg;

pub use memory::MemoryConversationStore;
pub use pg::PgConversationStore;

use async_trait::async_trait;
use ballast_llm::provider::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// One persisted conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub role: Role,
    pub text: String,
    pub token_count: Option<u32>,
    pub model_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(m: StoredMessage) -> Self {
        ChatMessage::new(m.role, m.text)
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(
        &self,
        session_id: Uuid,
        role: Role,
        text: &str,
        token_count: Option<u32>,
        model_tag: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Turns of one session, oldest first.
    async fn history(&self, session_id: Uuid) -> Result<Vec<StoredMessage>, StoreError>;

    /// The last `limit` turns of one session, oldest first.
    async fn recent(&self, session_id: Uuid, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let mut turns = self.history(session_id).await?;
        let skip = turns.len().saturating_sub(limit);
        turns.drain(..skip);
        Ok(turns)
    }
}
