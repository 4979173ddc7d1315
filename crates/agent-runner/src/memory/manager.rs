//! Model-driven memory maintenance
//!
//! After each run the model is shown the user's message and the memories
//! already stored, and answers with a JSON list of operations.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use super::store::MemoryDb;
use super::types::UserMemory;
use crate::error::{AgentError, Result};
use crate::model::{ChatModel, Content, GenerateRequest};

const MEMORY_MANAGER_PROMPT: &str = "\
You are a memory manager. Your job is to keep a short list of durable facts about the user \
that will help personalise future conversations: their name, preferred programming language, \
coding platforms, repository layout preferences, note format preferences and learning goals.

Given the existing memories and the user's latest message, decide what to change:
- `add` a memory for new durable information
- `update` a memory when the message refines or contradicts it
- `delete` a memory that the user asks to forget or that is no longer true

Do not store secrets, tokens, one-off requests or the content of solutions.
Respond with JSON only, in the form:
{\"operations\": [{\"op\": \"add\", \"memory\": \"...\", \"topics\": [\"...\"]}, \
{\"op\": \"update\", \"memory_id\": \"...\", \"memory\": \"...\"}, \
{\"op\": \"delete\", \"memory_id\": \"...\"}]}
Return {\"operations\": []} when nothing should change.";

/// A single change proposed by the model
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MemoryOperation {
    Add {
        memory: String,
        #[serde(default)]
        topics: Vec<String>,
    },
    Update {
        memory_id: String,
        memory: String,
        #[serde(default)]
        topics: Option<Vec<String>>,
    },
    Delete {
        memory_id: String,
    },
}

#[derive(Deserialize)]
struct OperationList {
    #[serde(default)]
    operations: Vec<MemoryOperation>,
}

/// Counts of applied operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUpdate {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Parse the model's answer, tolerating a fenced code block around the JSON
pub fn parse_operations(text: &str) -> Result<Vec<MemoryOperation>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let list: OperationList = serde_json::from_str(body)?;
    Ok(list.operations)
}

fn render_memories(memories: &[UserMemory]) -> String {
    if memories.is_empty() {
        return "(none)".to_string();
    }
    memories
        .iter()
        .map(|m| format!("- [{}] {}", m.memory_id, m.memory))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct MemoryManager {
    model: Arc<dyn ChatModel>,
    db: Arc<dyn MemoryDb>,
}

impl MemoryManager {
    pub fn new(model: Arc<dyn ChatModel>, db: Arc<dyn MemoryDb>) -> Self {
        Self { model, db }
    }

    /// Ask the model for memory operations and apply them
    pub async fn update(&self, user_id: &str, message: &str) -> Result<MemoryUpdate> {
        let existing = self.db.list_memories(user_id).await?;
        let prompt = format!(
            "Existing memories:\n{}\n\nUser message:\n{}",
            render_memories(&existing),
            message
        );

        let turn = self
            .model
            .generate(GenerateRequest {
                system_instruction: Some(MEMORY_MANAGER_PROMPT.to_string()),
                contents: vec![Content::user(prompt)],
                tools: Vec::new(),
                json_output: true,
            })
            .await?;

        let operations = parse_operations(&turn.text)
            .map_err(|e| AgentError::model(format!("Unusable memory operations: {}", e)))?;
        debug!("Applying {} memory operations for {}", operations.len(), user_id);

        self.apply(user_id, &existing, operations).await
    }

    async fn apply(
        &self,
        user_id: &str,
        existing: &[UserMemory],
        operations: Vec<MemoryOperation>,
    ) -> Result<MemoryUpdate> {
        let mut summary = MemoryUpdate::default();
        for operation in operations {
            match operation {
                MemoryOperation::Add { memory, topics } => {
                    self.db
                        .upsert_memory(&UserMemory::new(user_id, memory, topics))
                        .await?;
                    summary.added += 1;
                }
                MemoryOperation::Update {
                    memory_id,
                    memory,
                    topics,
                } => {
                    let Some(current) = existing.iter().find(|m| m.memory_id == memory_id) else {
                        warn!("Model tried to update unknown memory {}", memory_id);
                        continue;
                    };
                    let updated = UserMemory {
                        memory,
                        topics: topics.unwrap_or_else(|| current.topics.clone()),
                        updated_at: Utc::now().timestamp(),
                        ..current.clone()
                    };
                    self.db.upsert_memory(&updated).await?;
                    summary.updated += 1;
                }
                MemoryOperation::Delete { memory_id } => {
                    if self.db.delete_memory(user_id, &memory_id).await? {
                        summary.deleted += 1;
                    } else {
                        warn!("Model tried to delete unknown memory {}", memory_id);
                    }
                }
            }
        }
        Ok(summary)
    }
}
