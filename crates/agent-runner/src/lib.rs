//! Agent Runner - runtime for the DSA notes agent
//!
//! This crate provides a small agent runtime: a Gemini chat-model client,
//! an MCP client for remote tools, memory and session storage, and the loop
//! that ties them together into streamed runs.

pub mod agent;
pub mod dsa;
mod error;
pub mod mcp;
pub mod memory;
pub mod model;
pub mod tools;

pub use agent::{Agent, AgentConfig, EVENT_CHANNEL_CAPACITY};
pub use dsa::{AgentBackends, DsaAgent};
pub use error::{AgentError, Result};
pub use tools::{ConfirmationHandler, ToolConnector, ToolOutput, ToolProvider, ToolSession};
