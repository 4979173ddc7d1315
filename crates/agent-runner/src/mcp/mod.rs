//! Model Context Protocol client
//!
//! Streamable HTTP transport only: the LeetCode and GitHub tools are reached
//! through a hosted gateway.

mod client;
mod jsonrpc;
mod toolkit;
mod transport;

pub use client::{McpClient, McpToolDefinition, ToolCallResult, PROTOCOL_VERSION};
pub use jsonrpc::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use toolkit::{McpConnector, McpToolkit};
pub use transport::StreamableHttpTransport;
