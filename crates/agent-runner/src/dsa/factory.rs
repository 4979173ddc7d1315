use std::sync::Arc;

use dsa_core::config::GatewaySettings;
use dsa_core::run::{translate, EventRecord, RunConfig};
use dsa_core::tool_url::ToolEndpoint;
use futures::StreamExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::monitor::timed;
use super::prompt::{AGENT_DESCRIPTION, AGENT_INSTRUCTION};
use crate::agent::{Agent, AgentConfig, EVENT_CHANNEL_CAPACITY};
use crate::error::{AgentError, Result};
use crate::mcp::McpConnector;
use crate::memory::{
    InMemoryMemoryDb, InMemoryStorage, MemoryDb, PostgresMemoryDb, PostgresStorage,
    SessionStorage, MEMORY_TABLE, SESSION_TABLE,
};
use crate::model::{ChatModel, GeminiProvider, ModelProvider};
use crate::tools::{ConfirmationHandler, ToolConnector, ToolSession};

pub const AGENT_NAME: &str = "DSA Agent";
pub const NUM_HISTORY_RUNS: usize = 10;

/// Services an agent run depends on
#[derive(Clone)]
pub struct AgentBackends {
    pub model_provider: Arc<dyn ModelProvider>,
    pub tool_connector: Arc<dyn ToolConnector>,
    pub memory_db: Arc<dyn MemoryDb>,
    pub storage: Arc<dyn SessionStorage>,
}

impl AgentBackends {
    /// Gemini, the MCP gateway and the Postgres tables
    pub fn postgres(pool: PgPool) -> Result<Self> {
        Ok(Self {
            model_provider: Arc::new(GeminiProvider::default()),
            tool_connector: Arc::new(McpConnector),
            memory_db: Arc::new(PostgresMemoryDb::new(pool.clone(), MEMORY_TABLE)?),
            storage: Arc::new(PostgresStorage::new(pool, SESSION_TABLE)?),
        })
    }

    /// Gemini and the MCP gateway, with memories and history kept in process
    pub fn in_memory() -> Self {
        Self {
            model_provider: Arc::new(GeminiProvider::default()),
            tool_connector: Arc::new(McpConnector),
            memory_db: Arc::new(InMemoryMemoryDb::new()),
            storage: Arc::new(InMemoryStorage::new()),
        }
    }
}

/// One configured DSA agent invocation
///
/// Construction validates credentials and builds the tool endpoints; each
/// run opens its own tool session and releases it when the run ends.
pub struct DsaAgent {
    config: RunConfig,
    endpoints: Vec<ToolEndpoint>,
    model: Arc<dyn ChatModel>,
    backends: AgentBackends,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
    confirm_tools: Vec<String>,
}

impl DsaAgent {
    pub fn new(gateway: &GatewaySettings, config: RunConfig, backends: AgentBackends) -> Result<Self> {
        info!(
            "Initializing DSA Agent for user_id={}, session_id={}, model_id={}, debug_mode={}",
            config.user_id, config.session_id, config.model, config.debug_mode
        );

        let missing = config.missing_credentials();
        if !missing.is_empty() {
            return Err(AgentError::Config(format!(
                "Missing required credentials: {}",
                missing.join(", ")
            )));
        }

        let credentials = &config.credentials;
        let endpoints = vec![
            gateway.leetcode_endpoint(credentials.site, &credentials.leetcode_session)?,
            gateway.github_endpoint(&credentials.github_token)?,
        ];
        for endpoint in &endpoints {
            match endpoint.config_keys() {
                Ok(keys) => debug!("Tool endpoint {:?} with config keys {:?}", endpoint, keys),
                Err(e) => debug!("Tool endpoint {:?} with unreadable config: {}", endpoint, e),
            }
        }

        let model = backends
            .model_provider
            .create(config.model, &config.model_api_key)?;

        Ok(Self {
            config,
            endpoints,
            model,
            backends,
            confirmation: None,
            confirm_tools: Vec::new(),
        })
    }

    /// Pause before running any of `tools` and ask `handler`
    pub fn with_confirmation(
        mut self,
        handler: Arc<dyn ConfirmationHandler>,
        tools: Vec<String>,
    ) -> Self {
        self.confirmation = Some(handler);
        self.confirm_tools = tools;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &[ToolEndpoint] {
        &self.endpoints
    }

    fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(AGENT_NAME, &self.config.user_id, &self.config.session_id);
        config.description = AGENT_DESCRIPTION.to_string();
        config.instructions = vec![AGENT_INSTRUCTION.to_string()];
        config.markdown = true;
        config.add_datetime_to_instructions = true;
        config.num_history_runs = NUM_HISTORY_RUNS;
        config.enable_user_memories = true;
        config.debug_mode = self.config.debug_mode;
        config.confirm_tools = self.confirm_tools.clone();
        config
    }

    fn build_agent(&self, tools: ToolSession) -> Agent {
        let agent = Agent::new(self.agent_config(), Arc::clone(&self.model))
            .with_tools(tools)
            .with_memory_db(Arc::clone(&self.backends.memory_db))
            .with_storage(Arc::clone(&self.backends.storage));
        match &self.confirmation {
            Some(handler) => agent.with_confirmation(Arc::clone(handler)),
            None => agent,
        }
    }

    async fn connect_tools(&self) -> Result<ToolSession> {
        timed(
            "connect_tools",
            self.backends.tool_connector.connect(&self.endpoints),
        )
        .await
    }

    /// Stream translated event records for one message
    ///
    /// Failures before the agent starts arrive as a single `run_error` record.
    pub fn stream(self, message: impl Into<String>, cancel: CancellationToken) -> ReceiverStream<EventRecord> {
        let message = message.into();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            info!(
                "Starting streaming run for user {}, session {}",
                self.config.user_id, self.config.session_id
            );
            debug!("Message length: {} characters", message.len());

            let tools = match self.connect_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    error!("Failed to open tool session: {}", e);
                    let record = EventRecord::stream_error(e.to_string(), Some(&self.config.session_id));
                    let _ = tx.send(record).await;
                    return;
                }
            };

            let run_cancel = cancel.child_token();
            let agent = Arc::new(self.build_agent(Arc::clone(&tools)));
            let mut events = agent.run_stream(message, run_cancel.clone());

            let mut count = 0usize;
            let mut finished = false;
            while let Some(event) = events.next().await {
                count += 1;
                let terminal = event.kind.is_terminal();
                let record = translate(&event);
                if self.config.debug_mode {
                    debug!("Event #{}: {:?}", count, record.event);
                }
                if tx.send(record).await.is_err() {
                    info!("Client went away, cancelling run");
                    run_cancel.cancel();
                    finished = true;
                    break;
                }
                finished |= terminal;
            }

            // The client always sees the run end.
            if !finished {
                error!("Run stream ended without a final event after {} events", count);
                let record = EventRecord::stream_error(
                    "Agent run ended unexpectedly",
                    Some(&self.config.session_id),
                );
                let _ = tx.send(record).await;
            }

            tools.close().await;
            info!("Streaming run finished after {} events", count);
        });

        ReceiverStream::new(rx)
    }

    /// Run one message to completion and return the response content
    pub async fn run(&self, message: &str) -> Result<String> {
        info!(
            "Starting run for user {}, session {}",
            self.config.user_id, self.config.session_id
        );
        let tools = self.connect_tools().await?;
        let agent = self.build_agent(Arc::clone(&tools));
        let result = timed("agent_run", agent.run(message)).await;
        tools.close().await;

        if let Ok(content) = &result {
            info!("Run completed, response length {} characters", content.len());
        }
        result
    }
}
