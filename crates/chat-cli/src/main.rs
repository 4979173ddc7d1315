//! DSA Notes Agent chat client
//!
//! Runs the agent in process and shows its progress as it works.

mod config;
mod confirm;
mod render;
mod session;
mod streamer;

use std::sync::Arc;
use std::time::Instant;

use agent_runner::{AgentBackends, DsaAgent};
use anyhow::{Context, Result};
use clap::Parser;
use dsa_core::config::Settings;
use dsa_core::model::{LeetCodeSite, ModelId};
use dsa_core::run::RunConfig;
use futures::StreamExt;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ChatConfig, Overrides, INPUT_PROMPT, MAIN_DESCRIPTION, PAGE_TITLE, USAGE_INSTRUCTIONS};
use crate::confirm::{Input, TerminalConfirmation};
use crate::render::Renderer;
use crate::session::ChatSession;
use crate::streamer::ResponseStreamer;

#[derive(Parser)]
#[command(name = "dsa-chat")]
#[command(about = "Chat with the DSA Notes Agent", long_about = None)]
struct Cli {
    /// Model to use
    #[arg(long, default_value = "gemini-2.5-flash")]
    model: ModelId,

    /// Turn off agent debug logging
    #[arg(long)]
    no_debug: bool,

    /// Print every event record as it arrives
    #[arg(long)]
    show_events: bool,

    /// LeetCode site region (global or cn)
    #[arg(long)]
    lc_site: Option<LeetCodeSite>,

    /// LEETCODE_SESSION cookie value
    #[arg(long)]
    lc_session: Option<String>,

    /// GitHub personal access token
    #[arg(long)]
    gh_token: Option<String>,

    /// Gemini API key
    #[arg(long)]
    gemini_api_key: Option<String>,

    /// Ask before running this tool (repeatable)
    #[arg(long = "confirm-tool", value_name = "NAME")]
    confirm_tools: Vec<String>,

    /// Keep memories and history in this process instead of Postgres
    #[arg(long)]
    ephemeral: bool,
}

enum Command {
    New,
    Clear,
    Stats,
    History,
    Info,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let name = line.strip_prefix('/')?.split_whitespace().next().unwrap_or_default();
        Some(match name {
            "new" => Self::New,
            "clear" => Self::Clear,
            "stats" => Self::Stats,
            "history" => Self::History,
            "info" => Self::Info,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

struct ChatApp {
    settings: Settings,
    backends: AgentBackends,
    config: ChatConfig,
    session: ChatSession,
    input: Arc<Input>,
}

impl ChatApp {
    async fn run(&mut self) -> Result<()> {
        println!("🧠 {}", PAGE_TITLE);
        println!("{}", MAIN_DESCRIPTION);
        println!();
        render::print_missing(&self.config);
        println!("Type /help for commands.");

        loop {
            println!();
            // Ctrl-C at the prompt quits like /quit.
            let interrupt = tokio::signal::ctrl_c();
            let Some(line) = self.input.read_line_or(INPUT_PROMPT, interrupt).await? else {
                println!();
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::parse(line) {
                Some(Command::Quit) => break,
                Some(command) => self.command(command),
                None => self.send(line).await?,
            }
        }

        println!("Bye!");
        Ok(())
    }

    fn command(&mut self, command: Command) {
        match command {
            Command::New => {
                self.session.reset();
                println!("🔄 New session {}", self.session.session_id());
            }
            Command::Clear => {
                self.session.clear_execution_status();
                println!("🧹 Cleared execution status from all messages");
            }
            Command::Stats => render::print_stats(self.session.statistics()),
            Command::History => render::print_history(&self.session),
            Command::Info => render::print_info(&self.session, &self.config),
            Command::Help => println!("{}", USAGE_INSTRUCTIONS),
            Command::Unknown(name) => println!("Unknown command /{} (try /help)", name),
            Command::Quit => {}
        }
    }

    fn build_agent(&self) -> agent_runner::Result<DsaAgent> {
        let run_config = RunConfig {
            user_id: self.session.user_id().to_string(),
            session_id: self.session.session_id().to_string(),
            model: self.config.model,
            debug_mode: self.config.debug_mode,
            model_api_key: self.config.gemini_api_key.clone(),
            credentials: self.config.credentials.clone(),
        };
        let agent = DsaAgent::new(&self.settings.gateway, run_config, self.backends.clone())?;
        if self.config.confirm_tools.is_empty() {
            return Ok(agent);
        }
        let handler = Arc::new(TerminalConfirmation::new(Arc::clone(&self.input)));
        Ok(agent.with_confirmation(handler, self.config.confirm_tools.clone()))
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        if !self.config.is_valid() {
            render::print_missing(&self.config);
            return Ok(());
        }

        self.session.push_user(message);
        let mut streamer = ResponseStreamer::new(self.config.show_events, Instant::now());
        let mut renderer = Renderer::default();

        let agent = match self.build_agent() {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!("Failed to build agent: {}", e);
                renderer.show(&streamer.fail(e, Instant::now()))?;
                return self.finish(streamer, renderer);
            }
        };

        let cancel = CancellationToken::new();
        let mut records = agent.stream(message, cancel.clone());

        println!("🔄 Processing steps:");
        loop {
            tokio::select! {
                record = records.next() => match record {
                    Some(record) => {
                        let updates = streamer.handle(&record, Instant::now());
                        renderer.show(&updates)?;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    tracing::info!("Cancelling run on interrupt");
                    let waiting = streamer.active_tools();
                    if waiting.is_empty() {
                        println!("\n⏹️ Cancelling...");
                    } else {
                        println!("\n⏹️ Cancelling (waiting on {})...", waiting.join(", "));
                    }
                    cancel.cancel();
                }
            }
        }

        self.finish(streamer, renderer)
    }

    fn finish(&mut self, streamer: ResponseStreamer, mut renderer: Renderer) -> Result<()> {
        let (response, status, updates) = streamer.finish(Instant::now());
        renderer.show(&updates)?;
        renderer.summary(&status);
        self.session.push_assistant(response, status);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to load settings")?;

    // Agent logs go to stderr so they stay out of the conversation.
    let default_filter = if std::env::var("LOG_LEVEL").is_ok() {
        settings.log_filter()
    } else {
        "warn".to_string()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backends = if cli.ephemeral {
        AgentBackends::in_memory()
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(&settings.database.url())
            .context("Invalid database settings")?;
        AgentBackends::postgres(pool)?
    };

    let config = ChatConfig::resolve(
        Overrides {
            model: cli.model,
            no_debug: cli.no_debug,
            show_events: cli.show_events,
            lc_site: cli.lc_site,
            lc_session: cli.lc_session,
            gh_token: cli.gh_token,
            gemini_api_key: cli.gemini_api_key,
            confirm_tools: cli.confirm_tools,
        },
        &settings,
    );
    let session = ChatSession::new(&config.credentials);

    let mut app = ChatApp {
        settings,
        backends,
        config,
        session,
        input: Arc::new(Input::stdin()),
    };
    app.run().await
}
