use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dsa_core::tool_url::ToolEndpoint;
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use super::client::McpClient;
use crate::error::{AgentError, Result};
use crate::model::FunctionDeclaration;
use crate::tools::{ToolConnector, ToolOutput, ToolProvider, ToolSession};

/// Tools from several MCP servers behind one provider
pub struct McpToolkit {
    clients: Vec<McpClient>,
    routes: HashMap<String, usize>,
}

impl McpToolkit {
    /// Connect to every endpoint; fails if any server cannot be reached
    pub async fn connect(endpoints: &[ToolEndpoint]) -> Result<Self> {
        let attempts = join_all(
            endpoints
                .iter()
                .map(|endpoint| McpClient::connect(endpoint.name.clone(), &endpoint.url)),
        )
        .await;

        let mut clients = Vec::with_capacity(attempts.len());
        let mut failure = None;
        for (endpoint, attempt) in endpoints.iter().zip(attempts) {
            match attempt {
                Ok(client) => clients.push(client),
                Err(e) => {
                    warn!("Failed to connect to MCP server {}: {}", endpoint.name, e);
                    failure.get_or_insert(AgentError::mcp(format!(
                        "Failed to connect to {}: {}",
                        endpoint.name, e
                    )));
                }
            }
        }

        let toolkit = Self::from_clients(clients);
        if let Some(err) = failure {
            toolkit.close_all().await;
            return Err(err);
        }
        info!(
            "Connected {} tools from {} MCP servers",
            toolkit.tool_count(),
            toolkit.clients.len()
        );
        Ok(toolkit)
    }

    fn from_clients(clients: Vec<McpClient>) -> Self {
        let mut routes = HashMap::new();
        for (idx, client) in clients.iter().enumerate() {
            for tool in client.tools() {
                if routes.contains_key(&tool.name) {
                    warn!(
                        "Tool {} from {} shadowed by an earlier server",
                        tool.name,
                        client.name()
                    );
                    continue;
                }
                routes.insert(tool.name.clone(), idx);
            }
        }
        Self { clients, routes }
    }

    pub fn tool_count(&self) -> usize {
        self.routes.len()
    }

    async fn close_all(&self) {
        for client in &self.clients {
            if let Err(e) = client.close().await {
                warn!("Failed to close MCP session {}: {}", client.name(), e);
            }
        }
    }
}

#[async_trait]
impl ToolProvider for McpToolkit {
    fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.clients
            .iter()
            .enumerate()
            .flat_map(|(idx, client)| {
                client
                    .tools()
                    .iter()
                    .filter(move |tool| self.routes.get(&tool.name) == Some(&idx))
                    .map(FunctionDeclaration::from)
            })
            .collect()
    }

    async fn call(&self, name: &str, args: Value) -> Result<ToolOutput> {
        let client = self
            .routes
            .get(name)
            .and_then(|idx| self.clients.get(*idx))
            .ok_or_else(|| AgentError::UnknownTool {
                name: name.to_string(),
            })?;

        let result = client.call_tool(name, args).await?;
        Ok(ToolOutput {
            content: result.text(),
            is_error: result.is_error,
        })
    }

    async fn close(&self) {
        self.close_all().await;
    }
}

/// Connects [`McpToolkit`]s for each run
#[derive(Debug, Default, Clone)]
pub struct McpConnector;

#[async_trait]
impl ToolConnector for McpConnector {
    async fn connect(&self, endpoints: &[ToolEndpoint]) -> Result<ToolSession> {
        Ok(Arc::new(McpToolkit::connect(endpoints).await?))
    }
}
