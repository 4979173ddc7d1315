//! Chat session state

use std::time::Duration;

use dsa_core::run::ToolCredentials;
use dsa_core::user_id::generate_user_id;
use uuid::Uuid;

use crate::streamer::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub execution_status: Option<ExecutionStatus>,
}

/// Aggregates over the assistant messages of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub total_messages: usize,
    pub total_responses: usize,
    pub total_tools: usize,
    pub total_events: usize,
    pub avg_execution_time: Option<Duration>,
}

/// Messages and ids for the lifetime of the chat process
#[derive(Debug)]
pub struct ChatSession {
    user_id: String,
    session_id: String,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(credentials: &ToolCredentials) -> Self {
        Self {
            user_id: generate_user_id(&credentials.leetcode_session, &credentials.github_token),
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.into(),
            execution_status: None,
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, status: ExecutionStatus) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.into(),
            execution_status: Some(status),
        });
    }

    /// Start a new conversation: fresh session id, no messages
    pub fn reset(&mut self) {
        self.session_id = Uuid::new_v4().to_string();
        self.messages.clear();
    }

    pub fn clear_execution_status(&mut self) {
        for message in &mut self.messages {
            message.execution_status = None;
        }
    }

    /// `None` until the agent has answered at least once
    pub fn statistics(&self) -> Option<SessionStats> {
        let responses: Vec<&ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Assistant)
            .collect();
        if responses.is_empty() {
            return None;
        }

        let statuses: Vec<&ExecutionStatus> = responses
            .iter()
            .filter_map(|m| m.execution_status.as_ref())
            .collect();
        let timed: Vec<Duration> = statuses
            .iter()
            .map(|s| s.execution_time)
            .filter(|t| !t.is_zero())
            .collect();
        let avg_execution_time = if timed.is_empty() {
            None
        } else {
            Some(timed.iter().sum::<Duration>() / timed.len() as u32)
        };

        Some(SessionStats {
            total_messages: self.messages.len(),
            total_responses: responses.len(),
            total_tools: statuses.iter().map(|s| s.tools_used.len()).sum(),
            total_events: statuses.iter().map(|s| s.total_events).sum(),
            avg_execution_time,
        })
    }
}
