//! Events emitted by the agent runtime during a run

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool invocation as seen by the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Model-assigned call id, when the model provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    pub tool_name: String,

    #[serde(default)]
    pub tool_args: Value,

    /// Result text, filled once the call has finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Whether the tool itself reported a failure
    #[serde(default)]
    pub tool_call_error: bool,
}

impl ToolExecution {
    pub fn new(tool_name: impl Into<String>, tool_args: Value) -> Self {
        Self {
            tool_call_id: None,
            tool_name: tool_name.into(),
            tool_args,
            result: None,
            tool_call_error: false,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>, is_error: bool) -> Self {
        self.result = Some(result.into());
        self.tool_call_error = is_error;
        self
    }
}

/// Lifecycle stage of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEventKind {
    /// The run has been accepted by the model
    RunStarted {
        model: String,
        model_provider: String,
    },

    /// A chunk of streamed response content
    RunResponseContent {
        content: Option<String>,
        content_type: String,
        thinking: Option<String>,
    },

    /// The run finished with its full content
    RunCompleted {
        content: Option<String>,
        content_type: String,
        reasoning_content: Option<String>,
        thinking: Option<String>,
    },

    /// The run is waiting for the listed tools to be confirmed
    RunPaused { tools: Vec<ToolExecution> },

    /// A paused run resumed
    RunContinued,

    /// The run failed
    RunError { content: Option<String> },

    /// The run was cancelled before finishing
    RunCancelled { reason: Option<String> },

    ReasoningStarted,

    ReasoningStep {
        content: Option<String>,
        content_type: String,
        reasoning_content: String,
    },

    ReasoningCompleted {
        content: Option<String>,
        content_type: String,
    },

    ToolCallStarted { tool: Option<ToolExecution> },

    ToolCallCompleted { tool: Option<ToolExecution> },

    MemoryUpdateStarted,

    MemoryUpdateCompleted,

    /// Anything without a dedicated variant
    Other { tag: String, content: Option<Value> },
}

impl RunEventKind {
    /// Upstream tag name, e.g. `ToolCallCompleted`
    pub fn tag(&self) -> &str {
        match self {
            Self::RunStarted { .. } => "RunStarted",
            Self::RunResponseContent { .. } => "RunResponseContent",
            Self::RunCompleted { .. } => "RunCompleted",
            Self::RunPaused { .. } => "RunPaused",
            Self::RunContinued => "RunContinued",
            Self::RunError { .. } => "RunError",
            Self::RunCancelled { .. } => "RunCancelled",
            Self::ReasoningStarted => "ReasoningStarted",
            Self::ReasoningStep { .. } => "ReasoningStep",
            Self::ReasoningCompleted { .. } => "ReasoningCompleted",
            Self::ToolCallStarted { .. } => "ToolCallStarted",
            Self::ToolCallCompleted { .. } => "ToolCallCompleted",
            Self::MemoryUpdateStarted => "MemoryUpdateStarted",
            Self::MemoryUpdateCompleted => "MemoryUpdateCompleted",
            Self::Other { tag, .. } => tag,
        }
    }

    /// Check if the event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunError { .. } | Self::RunCancelled { .. }
        )
    }
}

/// Run event with its envelope
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    /// Unix timestamp in seconds
    pub created_at: i64,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    pub session_id: Option<String>,
    pub kind: RunEventKind,
}

impl RunEvent {
    /// Create an event stamped with the current time and no envelope ids
    pub fn new(kind: RunEventKind) -> Self {
        Self {
            created_at: Utc::now().timestamp(),
            agent_id: None,
            run_id: None,
            session_id: None,
            kind,
        }
    }

    pub fn with_ids(
        mut self,
        agent_id: impl Into<String>,
        run_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        self.agent_id = Some(agent_id.into());
        self.run_id = Some(run_id.into());
        self.session_id = Some(session_id.into());
        self
    }

    pub fn tag(&self) -> &str {
        self.kind.tag()
    }

    /// Create a content chunk event
    pub fn content(text: impl Into<String>) -> Self {
        Self::new(RunEventKind::RunResponseContent {
            content: Some(text.into()),
            content_type: "str".to_string(),
            thinking: None,
        })
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(RunEventKind::RunError {
            content: Some(message.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_match_upstream_names() {
        assert_eq!(RunEvent::content("x").tag(), "RunResponseContent");
        assert_eq!(RunEvent::new(RunEventKind::RunContinued).tag(), "RunContinued");
        let other = RunEventKind::Other {
            tag: "CustomEvent".to_string(),
            content: None,
        };
        assert_eq!(other.tag(), "CustomEvent");
    }

    #[test]
    fn terminal_kinds() {
        assert!(RunEvent::error("boom").kind.is_terminal());
        assert!(RunEventKind::RunCancelled { reason: None }.is_terminal());
        assert!(!RunEventKind::MemoryUpdateCompleted.is_terminal());
    }

    #[test]
    fn tool_execution_serializes_compactly() {
        let tool = ToolExecution::new("create_file", json!({"path": "a.md"}));
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(
            value,
            json!({"tool_name": "create_file", "tool_args": {"path": "a.md"}, "tool_call_error": false})
        );
        let done = tool.with_result("ok", false);
        assert_eq!(done.result.as_deref(), Some("ok"));
    }

    #[test]
    fn envelope_ids_are_attached() {
        let event = RunEvent::new(RunEventKind::ReasoningStarted).with_ids("agent", "run", "sess");
        assert_eq!(event.agent_id.as_deref(), Some("agent"));
        assert_eq!(event.run_id.as_deref(), Some("run"));
        assert_eq!(event.session_id.as_deref(), Some("sess"));
    }
}
