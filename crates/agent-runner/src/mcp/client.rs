use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::jsonrpc::JsonRpcRequest;
use super::transport::StreamableHttpTransport;
use crate::error::{AgentError, Result};
use crate::model::FunctionDeclaration;

pub const PROTOCOL_VERSION: &str = "2025-03-26";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

impl From<&McpToolDefinition> for FunctionDeclaration {
    fn from(tool: &McpToolDefinition) -> Self {
        FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Text items joined by newlines; other items are kept as JSON
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text")) {
                (Some("text"), Some(Value::String(text))) => text.clone(),
                _ => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpToolDefinition>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

/// One initialized MCP server connection
pub struct McpClient {
    name: String,
    transport: StreamableHttpTransport,
    tools: Vec<McpToolDefinition>,
}

impl McpClient {
    /// Run the initialize handshake and load the server's tool list
    pub async fn connect(name: impl Into<String>, url: &str) -> Result<Self> {
        let name = name.into();
        let transport = StreamableHttpTransport::new(url)?;

        let init = transport
            .request(JsonRpcRequest::new(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "dsa-agent",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            ))
            .await?
            .into_result()?;
        debug!(
            "MCP server {} initialized (protocol {})",
            name,
            init.get("protocolVersion")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
        );

        transport
            .notify(JsonRpcRequest::notification("notifications/initialized"))
            .await?;

        let mut client = Self {
            name,
            transport,
            tools: Vec::new(),
        };
        client.tools = client.list_tools().await?;
        info!("Connected to MCP server {} ({} tools)", client.name, client.tools.len());
        Ok(client)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .transport
                .request(JsonRpcRequest::new("tools/list", params))
                .await?
                .into_result()?;
            let page: ListToolsResult = serde_json::from_value(result)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .transport
            .request(JsonRpcRequest::new(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            ))
            .await?
            .into_result()?;
        serde_json::from_value(result)
            .map_err(|e| AgentError::mcp(format!("Invalid tools/call result from {}: {}", self.name, e)))
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
