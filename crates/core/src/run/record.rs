//! Client-facing event records
//!
//! [`translate`] turns a [`RunEvent`] into a plain record: a snake_case event
//! name plus a flat `data` object holding the envelope and the fields that
//! matter for that stage. Fields without a mapping are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::event::{RunEvent, RunEventKind, ToolExecution};

/// Record names sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    RunStarted,
    Content,
    RunCompleted,
    RunPaused,
    RunContinued,
    RunError,
    RunCancelled,
    ReasoningStarted,
    ReasoningStep,
    ReasoningCompleted,
    ToolCallStarted,
    ToolCallCompleted,
    MemoryUpdateStarted,
    MemoryUpdateCompleted,
    #[serde(other)]
    Unknown,
}

/// Serializable `{ "event": ..., "data": {...} }` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: RecordKind,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl EventRecord {
    /// String field of `data`, if present and a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Terminal `run_error` record for failures outside the agent loop
    pub fn stream_error(message: impl Into<String>, session_id: Option<&str>) -> Self {
        let mut event = RunEvent::error(message);
        event.session_id = session_id.map(str::to_string);
        translate(&event)
    }
}

/// `{name, args}` view of a tool call
fn tool_info(tool: Option<&ToolExecution>) -> Value {
    match tool {
        Some(tool) => json!({
            "name": tool.tool_name,
            "args": tool.tool_args,
        }),
        None => Value::Null,
    }
}

fn opt_str(value: &Option<String>) -> Value {
    value.as_deref().map_or(Value::Null, |s| Value::String(s.to_string()))
}

/// Map a run event to its client record
pub fn translate(event: &RunEvent) -> EventRecord {
    let mut data = Map::new();
    data.insert("event_type".into(), json!(event.tag()));
    data.insert("timestamp".into(), json!(event.created_at));
    data.insert("agent_id".into(), opt_str(&event.agent_id));
    data.insert("run_id".into(), opt_str(&event.run_id));
    data.insert("session_id".into(), opt_str(&event.session_id));

    let kind = match &event.kind {
        RunEventKind::RunStarted {
            model,
            model_provider,
        } => {
            data.insert("model".into(), json!(model));
            data.insert("model_provider".into(), json!(model_provider));
            RecordKind::RunStarted
        }
        RunEventKind::RunResponseContent {
            content,
            content_type,
            thinking,
        } => {
            data.insert("content".into(), opt_str(content));
            data.insert("content_type".into(), json!(content_type));
            data.insert("thinking".into(), opt_str(thinking));
            RecordKind::Content
        }
        RunEventKind::RunCompleted {
            content,
            content_type,
            reasoning_content,
            thinking,
        } => {
            data.insert("content".into(), opt_str(content));
            data.insert("content_type".into(), json!(content_type));
            data.insert("reasoning_content".into(), opt_str(reasoning_content));
            data.insert("thinking".into(), opt_str(thinking));
            RecordKind::RunCompleted
        }
        RunEventKind::RunPaused { tools } => {
            data.insert(
                "tools".into(),
                serde_json::to_value(tools).unwrap_or(Value::Null),
            );
            RecordKind::RunPaused
        }
        RunEventKind::RunContinued => RecordKind::RunContinued,
        RunEventKind::RunError { content } => {
            data.insert("error_message".into(), opt_str(content));
            RecordKind::RunError
        }
        RunEventKind::RunCancelled { reason } => {
            data.insert("reason".into(), opt_str(reason));
            RecordKind::RunCancelled
        }
        RunEventKind::ReasoningStarted => RecordKind::ReasoningStarted,
        RunEventKind::ReasoningStep {
            content,
            content_type,
            reasoning_content,
        } => {
            data.insert("content".into(), opt_str(content));
            data.insert("content_type".into(), json!(content_type));
            data.insert("reasoning_content".into(), json!(reasoning_content));
            RecordKind::ReasoningStep
        }
        RunEventKind::ReasoningCompleted {
            content,
            content_type,
        } => {
            data.insert("content".into(), opt_str(content));
            data.insert("content_type".into(), json!(content_type));
            RecordKind::ReasoningCompleted
        }
        RunEventKind::ToolCallStarted { tool } => {
            data.insert("tool".into(), tool_info(tool.as_ref()));
            RecordKind::ToolCallStarted
        }
        RunEventKind::ToolCallCompleted { tool } => {
            data.insert("tool".into(), tool_info(tool.as_ref()));
            data.insert(
                "result".into(),
                tool.as_ref().map_or(Value::Null, |t| opt_str(&t.result)),
            );
            RecordKind::ToolCallCompleted
        }
        RunEventKind::MemoryUpdateStarted => RecordKind::MemoryUpdateStarted,
        RunEventKind::MemoryUpdateCompleted => RecordKind::MemoryUpdateCompleted,
        RunEventKind::Other { content, .. } => {
            data.insert("raw_content".into(), content.clone().unwrap_or(Value::Null));
            RecordKind::Unknown
        }
    };

    EventRecord { event: kind, data }
}

impl From<&RunEvent> for EventRecord {
    fn from(event: &RunEvent) -> Self {
        translate(event)
    }
}
