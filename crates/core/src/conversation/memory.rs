use std::collections::HashMap;

use async_trait::async_trait;
use ballast_llm::provider::Role;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoredMessage};

/// In-process store used when no database is configured. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    sessions: RwLock<HashMap<Uuid, Vec<StoredMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(
        &self,
        session_id: Uuid,
        role: Role,
        text: &str,
        token_count: Option<u32>,
        model_tag: Option<&str>,
    ) -> Result<(), StoreError> {
        self.sessions.write().entry(session_id).or_default().push(StoredMessage {
            role,
            text: text.to_owned(),
            token_count,
            model_tag: model_tag.map(str::to_owned),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn history(&self, session_id: Uuid) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self.sessions.read().get(&session_id).cloned().unwrap_or_default())
    }

    async fn recent(&self, session_id: Uuid, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let sessions = self.sessions.read();
        let Some(turns) = sessions.get(&session_id) else { return Ok(Vec::new()) };
        Ok(turns[turns.len().saturating_sub(limit)..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sessions_are_isolated_and_ordered() {
        let store = MemoryConversationStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(a, Role::User, "hello", Some(1), None).await.unwrap();
        store.append(b, Role::User, "other", None, None).await.unwrap();
        store.append(a, Role::Assistant, "hi there", Some(2), Some("offline")).await.unwrap();

        let hist = store.history(a).await.unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].role, Role::User);
        assert_eq!(hist[1].text, "hi there");
        assert_eq!(hist[1].model_tag.as_deref(), Some("offline"));
        assert_eq!(store.session_count(), 2);
    }

    #[tokio::test]
    async fn recent_keeps_the_newest_turns() {
        let store = MemoryConversationStore::new();
        let s = Uuid::new_v4();
        for i in 0..6 {
            store.append(s, Role::User, &format!("turn {i}"), None, None).await.unwrap();
        }
        let texts: Vec<String> = store.recent(s, 2).await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["turn 4", "turn 5"]);
        assert_eq!(store.recent(s, 100).await.unwrap().len(), 6);
        assert!(store.recent(s, 0).await.unwrap().is_empty());
        assert!(store.recent(Uuid::new_v4(), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = MemoryConversationStore::new();
        assert!(store.history(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
