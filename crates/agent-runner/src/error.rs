//! Error types for agent-runner

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while building or running an agent
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration is incomplete or invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Core library error (settings, URL building)
    #[error(transparent)]
    Core(#[from] dsa_core::Error),

    /// Model API returned an error
    #[error("Model request failed: {message}")]
    Model { message: String },

    /// MCP protocol or transport failure
    #[error("MCP error: {message}")]
    Mcp { message: String },

    /// Tool call could not be routed
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Model kept calling tools past the round limit
    #[error("Tool call limit of {limit} rounds reached")]
    ToolRoundsExceeded { limit: usize },

    /// Database failure
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled
    #[error("Run cancelled: {reason}")]
    Cancelled { reason: String },

    /// Event channel closed
    #[error("Event channel closed")]
    ChannelClosed,
}

impl AgentError {
    /// Create a Model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create an Mcp error
    pub fn mcp(message: impl Into<String>) -> Self {
        Self::Mcp {
            message: message.into(),
        }
    }

    /// Create a Cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Whether the error stems from bad input rather than a failing dependency
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Core(_))
    }
}
