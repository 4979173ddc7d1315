//! Agent runtime
//!
//! An [`Agent`] drives one conversational turn: it loads memories and
//! history, alternates model turns with tool calls, updates memories, stores
//! the run and reports every stage as a [`RunEvent`].

mod prompt;
mod run;

use std::sync::Arc;

use dsa_core::run::{RunEvent, RunEventKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::memory::{MemoryDb, SessionStorage};
use crate::model::ChatModel;
use crate::tools::{ConfirmationHandler, ToolSession};

pub use prompt::system_message;
use run::Emitter;

/// Events buffered between the run task and its consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Static configuration of an agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub agent_id: String,
    pub description: String,
    pub instructions: Vec<String>,
    pub user_id: String,
    pub session_id: String,
    /// Ask the model to answer in markdown
    pub markdown: bool,
    pub add_datetime_to_instructions: bool,
    /// Past runs replayed to the model
    pub num_history_runs: usize,
    /// Load memories into the prompt and update them after each run
    pub enable_user_memories: bool,
    /// Model turns with tool calls allowed per run
    pub max_tool_rounds: usize,
    pub debug_mode: bool,
    /// Tools that need a confirmation before they run
    pub confirm_tools: Vec<String>,
}

impl AgentConfig {
    pub fn new(
        name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agent_id: Uuid::new_v4().to_string(),
            description: String::new(),
            instructions: Vec::new(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            markdown: false,
            add_datetime_to_instructions: false,
            num_history_runs: 10,
            enable_user_memories: false,
            max_tool_rounds: 25,
            debug_mode: false,
            confirm_tools: Vec::new(),
        }
    }
}

pub struct Agent {
    config: AgentConfig,
    model: Arc<dyn ChatModel>,
    tools: Option<ToolSession>,
    memory_db: Option<Arc<dyn MemoryDb>>,
    storage: Option<Arc<dyn SessionStorage>>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
}

impl Agent {
    pub fn new(config: AgentConfig, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            model,
            tools: None,
            memory_db: None,
            storage: None,
            confirmation: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolSession) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_memory_db(mut self, db: Arc<dyn MemoryDb>) -> Self {
        self.memory_db = Some(db);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_confirmation(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run in the background and stream its events
    ///
    /// The stream ends after `RunCompleted`, `RunError` or `RunCancelled`.
    /// Dropping the stream stops the run at its next event.
    pub fn run_stream(
        self: Arc<Self>,
        message: impl Into<String>,
        cancel: CancellationToken,
    ) -> ReceiverStream<RunEvent> {
        let message = message.into();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let emitter = Emitter::new(Some(tx), &self.config);
            info!(
                "Starting run {} for session {}",
                emitter.run_id, self.config.session_id
            );

            let result = tokio::select! {
                result = self.execute(&emitter, &message) => result,
                _ = cancel.cancelled() => Err(AgentError::cancelled("Run cancelled by the client")),
            };

            match result {
                Ok(content) => info!(
                    "Run {} completed ({} characters)",
                    emitter.run_id,
                    content.len()
                ),
                Err(AgentError::ChannelClosed) => {
                    debug!("Event receiver dropped, run {} stopped", emitter.run_id)
                }
                Err(AgentError::Cancelled { reason }) => {
                    info!("Run {} cancelled: {}", emitter.run_id, reason);
                    let _ = emitter
                        .emit(RunEventKind::RunCancelled {
                            reason: Some(reason),
                        })
                        .await;
                }
                Err(e) => {
                    error!("Run {} failed: {}", emitter.run_id, e);
                    let _ = emitter
                        .emit(RunEventKind::RunError {
                            content: Some(e.to_string()),
                        })
                        .await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Run to completion and return the response content
    pub async fn run(&self, message: &str) -> Result<String> {
        let emitter = Emitter::new(None, &self.config);
        self.execute(&emitter, message).await
    }
}
