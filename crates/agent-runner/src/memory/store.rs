use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::{SessionRecord, UserMemory};
use crate::error::Result;

/// Persistent user memories
#[async_trait]
pub trait MemoryDb: Send + Sync {
    /// Memories for a user, oldest first
    async fn list_memories(&self, user_id: &str) -> Result<Vec<UserMemory>>;

    /// Insert a memory or replace the one with the same id
    async fn upsert_memory(&self, memory: &UserMemory) -> Result<()>;

    /// Delete a memory; `false` if it did not exist
    async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<bool>;
}

/// Persistent session history
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    async fn save_session(&self, session: &SessionRecord) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryMemoryDb {
    items: RwLock<HashMap<String, Vec<UserMemory>>>,
}

impl InMemoryMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryDb for InMemoryMemoryDb {
    async fn list_memories(&self, user_id: &str) -> Result<Vec<UserMemory>> {
        let items = self.items.read().await;
        Ok(items.get(user_id).cloned().unwrap_or_default())
    }

    async fn upsert_memory(&self, memory: &UserMemory) -> Result<()> {
        let mut items = self.items.write().await;
        let entries = items.entry(memory.user_id.clone()).or_default();
        match entries.iter_mut().find(|m| m.memory_id == memory.memory_id) {
            Some(existing) => *existing = memory.clone(),
            None => entries.push(memory.clone()),
        }
        Ok(())
    }

    async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<bool> {
        let mut items = self.items.write().await;
        let Some(entries) = items.get_mut(user_id) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|m| m.memory_id != memory_id);
        Ok(entries.len() != before)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for InMemoryStorage {
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}
