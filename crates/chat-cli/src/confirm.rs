//! Terminal input and tool confirmation prompts

use std::future::Future;
use std::io::Write;

use agent_runner::ConfirmationHandler;
use async_trait::async_trait;
use dsa_core::run::ToolExecution;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Line reader shared by the chat loop and the confirmation prompt
pub struct Input<R = BufReader<Stdin>> {
    lines: Mutex<Lines<R>>,
}

impl Input {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> Input<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
        }
    }

    /// Print `prompt` and read one line; `None` at end of input
    pub async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        self.lines.lock().await.next_line().await
    }

    /// Like [`Input::read_line`], but `None` as soon as `interrupt` resolves
    pub async fn read_line_or<F>(&self, prompt: &str, interrupt: F) -> std::io::Result<Option<String>>
    where
        F: Future,
    {
        tokio::select! {
            line = self.read_line(prompt) => line,
            _ = interrupt => Ok(None),
        }
    }
}

/// `y` or `yes`, any case
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks on the terminal before each paused tool call
pub struct TerminalConfirmation<R = BufReader<Stdin>> {
    input: std::sync::Arc<Input<R>>,
}

impl<R> TerminalConfirmation<R> {
    pub fn new(input: std::sync::Arc<Input<R>>) -> Self {
        Self { input }
    }
}

#[async_trait]
impl<R> ConfirmationHandler for TerminalConfirmation<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn confirm(&self, tools: &[ToolExecution]) -> Vec<bool> {
        let mut decisions = Vec::with_capacity(tools.len());
        for tool in tools {
            println!();
            println!("⏸️  The agent wants to run {}", tool.tool_name);
            println!("   args: {}", tool.tool_args);
            let approved = match self.input.read_line("   Allow? [y/N] ").await {
                Ok(Some(answer)) => is_yes(&answer),
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!("Failed to read confirmation: {}", e);
                    false
                }
            };
            decisions.push(approved);
        }
        decisions
    }
}
