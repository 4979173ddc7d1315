//! Tool seams used by the agent loop

use std::sync::Arc;

use async_trait::async_trait;
use dsa_core::run::ToolExecution;
use dsa_core::tool_url::ToolEndpoint;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::FunctionDeclaration;

/// Output of one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    /// The tool itself reported a failure; `content` holds its message
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A set of callable tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Declarations handed to the model
    fn declarations(&self) -> Vec<FunctionDeclaration>;

    /// Invoke a tool by name
    async fn call(&self, name: &str, args: Value) -> Result<ToolOutput>;

    /// Release any connections held by the provider
    async fn close(&self) {}
}

/// Tools acquired for one agent invocation
pub type ToolSession = Arc<dyn ToolProvider>;

/// Opens a tool session over a set of remote endpoints
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn connect(&self, endpoints: &[ToolEndpoint]) -> Result<ToolSession>;
}

/// Decides whether paused tool calls may run
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// One decision per tool, in order; `true` lets the call run
    async fn confirm(&self, tools: &[ToolExecution]) -> Vec<bool>;
}

/// Name of the built-in scratchpad tool
pub const THINK_TOOL: &str = "think";

pub const THINKING_INSTRUCTIONS: &str = "\
## Using the think tool
Before taking any action or responding to the user after receiving tool results, use the think tool as a scratchpad to:
- List the specific rules that apply to the current request
- Check if all required information is collected
- Verify that the planned action complies with all policies
- Iterate over tool results for correctness

## Rules
- Its expected that you will use the think tool generously to jot down thoughts and ideas.
- Use the think tool before creating or updating files in the repository.";

/// Declaration of the `think` tool
pub fn think_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: THINK_TOOL.to_string(),
        description: "Use the tool to think about something. It will not obtain new information \
                      or take any actions, but just append the thought to the log and return the \
                      result. Use it when complex reasoning or some cache memory or a scratchpad \
                      is needed."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "A thought to think about and log."
                }
            },
            "required": ["thought"]
        }),
    }
}

/// Text of a `think` call, or the raw arguments when the field is missing
pub fn thought_text(args: &Value) -> String {
    match args.get("thought").and_then(Value::as_str) {
        Some(thought) => thought.to_string(),
        None => args.to_string(),
    }
}

/// Message returned to the model for a call the user declined
pub fn rejection_message(tool_name: &str) -> String {
    format!("Tool call to {} was rejected by the user", tool_name)
}
