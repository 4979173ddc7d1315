//! Terminal output

use std::io::{self, Write};

use crate::config::ChatConfig;
use crate::session::{ChatRole, ChatSession, SessionStats};
use crate::streamer::{ExecutionStatus, RunOutcome, Update};

/// Prints streamer updates, keeping step lines off the response text
#[derive(Debug, Default)]
pub struct Renderer {
    mid_line: bool,
}

impl Renderer {
    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    pub fn show(&mut self, updates: &[Update]) -> io::Result<()> {
        for update in updates {
            match update {
                Update::Text(text) => {
                    print!("{}", text);
                    io::stdout().flush()?;
                    self.mid_line = !text.ends_with('\n');
                }
                Update::Step(step) => {
                    self.break_line();
                    println!("  {}", step);
                }
                Update::Record(record) => {
                    self.break_line();
                    let data = serde_json::to_string_pretty(&record.data).unwrap_or_default();
                    println!("  🐛 Event: {:?}\n{}", record.event, data);
                }
            }
        }
        Ok(())
    }

    /// One-line summary under a finished response
    pub fn summary(&mut self, status: &ExecutionStatus) {
        self.break_line();
        println!("{}", status_line(status));
    }
}

pub fn status_line(status: &ExecutionStatus) -> String {
    let outcome = match &status.outcome {
        RunOutcome::Completed => "✅ done".to_string(),
        RunOutcome::Cancelled => "⏹️ cancelled".to_string(),
        RunOutcome::Failed(message) => format!("❌ {}", message),
    };
    let mut parts = vec![outcome];
    if let Some(model) = &status.model_used {
        parts.push(model.clone());
    }
    parts.push(format!("{} events", status.total_events));
    if !status.tools_used.is_empty() {
        parts.push(format!("{} tool(s)", status.tools_used.len()));
    }
    if status.reasoning_steps > 0 {
        parts.push(format!("{} reasoning steps", status.reasoning_steps));
    }
    parts.push(format!("{:.2}s", status.execution_time.as_secs_f64()));
    format!("── {} ──", parts.join(" · "))
}

/// Past messages, with the processing log of each response unless it was cleared
pub fn history_lines(session: &ChatSession) -> Vec<String> {
    let mut lines = Vec::new();
    for message in session.messages() {
        match message.role {
            ChatRole::User => lines.push(format!("🧑 {}", message.content)),
            ChatRole::Assistant => {
                if let Some(status) = &message.execution_status {
                    lines.push("🔄 Processing steps:".to_string());
                    lines.extend(status.event_log.iter().map(|step| format!("  {}", step)));
                }
                lines.push(format!("🧠 {}", message.content));
                if let Some(status) = &message.execution_status {
                    for tool in &status.tools_used {
                        match &tool.result_preview {
                            Some(result) => lines.push(format!("  🔧 {} → {}", tool.name, result)),
                            None => lines.push(format!("  🔧 {}", tool.name)),
                        }
                    }
                    if let Some(thinking) = &status.thinking {
                        lines.push(format!("  💭 {}", thinking));
                    }
                    lines.push(status_line(status));
                }
            }
        }
    }
    lines
}

pub fn print_history(session: &ChatSession) {
    let lines = history_lines(session);
    if lines.is_empty() {
        println!("No messages yet.");
        return;
    }
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_stats(stats: Option<SessionStats>) {
    let Some(stats) = stats else {
        println!("No responses yet.");
        return;
    };
    println!("Messages: {}", stats.total_messages);
    println!("Responses: {}", stats.total_responses);
    if stats.total_tools > 0 {
        println!("Total Tools Used: {}", stats.total_tools);
    }
    if stats.total_events > 0 {
        println!("Total Events: {}", stats.total_events);
    }
    if let Some(avg) = stats.avg_execution_time {
        println!("Avg Execution Time: {:.2}s", avg.as_secs_f64());
    }
}

pub fn print_info(session: &ChatSession, config: &ChatConfig) {
    println!("User ID: {}", session.user_id());
    println!("Session ID: {}", session.session_id());
    println!("Model: {}", config.model);
    println!("LeetCode site: {}", config.credentials.site);
    println!("Debug mode: {}", config.debug_mode);
    println!("Show events: {}", config.show_events);
    if !config.confirm_tools.is_empty() {
        println!("Confirm before: {}", config.confirm_tools.join(", "));
    }
    print_missing(config);
}

pub fn print_missing(config: &ChatConfig) {
    let missing = config.missing();
    if missing.is_empty() {
        println!("✅ All required configurations provided!");
        return;
    }
    println!("❌ Missing required configurations:");
    for item in missing {
        println!("  • {}", item);
    }
    println!("Please provide all required values to start chatting (see /help).");
}
