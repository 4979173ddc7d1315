use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fact the agent remembers about a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemory {
    pub memory_id: String,
    pub user_id: String,
    pub memory: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserMemory {
    pub fn new(user_id: impl Into<String>, memory: impl Into<String>, topics: Vec<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            memory_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            memory: memory.into(),
            topics,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One completed exchange in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub user_message: String,
    pub response: String,
    pub created_at: i64,
}

/// Stored conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub runs: Vec<RunRecord>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SessionRecord {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            runs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The last `n` runs, oldest first
    pub fn recent_runs(&self, n: usize) -> &[RunRecord] {
        let start = self.runs.len().saturating_sub(n);
        &self.runs[start..]
    }

    pub fn push_run(&mut self, run: RunRecord) {
        self.updated_at = run.created_at.max(self.updated_at);
        self.runs.push(run);
    }
}
