//! Progress tracking for one streamed response
//!
//! [`ResponseStreamer`] folds translated event records into a step log, the
//! response text and an [`ExecutionStatus`] summary. It does no I/O; every
//! call returns the [`Update`]s the terminal should show.

use std::fmt;
use std::time::{Duration, Instant};

use dsa_core::run::{EventRecord, RecordKind};
use serde_json::Value;

const RESULT_PREVIEW_CHARS: usize = 100;

/// What a step belongs to, used to find the step a later record closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Run,
    Paused,
    Reasoning,
    Tool(String),
    Memory,
    Failure,
}

/// One line of the processing log
#[derive(Debug, Clone)]
pub struct EventStep {
    pub kind: StepKind,
    pub title: String,
    pub details: String,
    pub completed: bool,
    pub started: Instant,
    pub duration: Option<Duration>,
}

impl EventStep {
    fn open(kind: StepKind, title: impl Into<String>, details: impl Into<String>, now: Instant) -> Self {
        Self {
            kind,
            title: title.into(),
            details: details.into(),
            completed: false,
            started: now,
            duration: None,
        }
    }

    fn done(kind: StepKind, title: impl Into<String>, details: impl Into<String>, now: Instant) -> Self {
        Self {
            completed: true,
            ..Self::open(kind, title, details, now)
        }
    }

    fn complete(&mut self, now: Instant) {
        self.completed = true;
        self.duration = Some(now.saturating_duration_since(self.started));
    }
}

impl fmt::Display for EventStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.completed { "✅" } else { "🔄" };
        write!(f, "{} {}", icon, self.title)?;
        if !self.details.is_empty() {
            write!(f, " - {}", self.details)?;
        }
        match self.duration {
            Some(duration) if self.completed && !duration.is_zero() => {
                write!(f, " ({:.2}s)", duration.as_secs_f64())
            }
            _ => Ok(()),
        }
    }
}

/// A tool the agent called during the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUse {
    pub name: String,
    pub result_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Summary kept with each assistant message
#[derive(Debug, Clone)]
pub struct ExecutionStatus {
    pub event_log: Vec<EventStep>,
    pub tools_used: Vec<ToolUse>,
    pub total_events: usize,
    pub execution_time: Duration,
    pub reasoning_steps: usize,
    pub model_used: Option<String>,
    pub thinking: Option<String>,
    pub outcome: RunOutcome,
}

/// Something the terminal should show
#[derive(Debug, Clone)]
pub enum Update {
    /// Response text to append
    Text(String),
    /// A step that was added or changed
    Step(EventStep),
    /// Raw record, when event details are on
    Record(EventRecord),
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(RESULT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn args_text(args: Option<&Value>) -> String {
    match args {
        Some(Value::Null) | None => "No Args".to_string(),
        Some(value) => value.to_string(),
    }
}

pub struct ResponseStreamer {
    started: Instant,
    show_events: bool,
    steps: Vec<EventStep>,
    response: String,
    thinking: String,
    tools_used: Vec<ToolUse>,
    active_tools: Vec<String>,
    reasoning_steps: usize,
    total_events: usize,
    model_used: Option<String>,
    outcome: RunOutcome,
}

impl ResponseStreamer {
    pub fn new(show_events: bool, now: Instant) -> Self {
        Self {
            started: now,
            show_events,
            steps: Vec::new(),
            response: String::new(),
            thinking: String::new(),
            tools_used: Vec::new(),
            active_tools: Vec::new(),
            reasoning_steps: 0,
            total_events: 0,
            model_used: None,
            outcome: RunOutcome::Completed,
        }
    }

    /// Tools started but not yet completed
    pub fn active_tools(&self) -> &[String] {
        &self.active_tools
    }

    fn push(&mut self, step: EventStep, updates: &mut Vec<Update>) {
        updates.push(Update::Step(step.clone()));
        self.steps.push(step);
    }

    /// Complete the newest open step matching `matches`
    fn close_latest<F>(&mut self, now: Instant, matches: F) -> Option<&mut EventStep>
    where
        F: Fn(&EventStep) -> bool,
    {
        let step = self
            .steps
            .iter_mut()
            .rev()
            .find(|step| !step.completed && matches(step))?;
        step.complete(now);
        Some(step)
    }

    fn close_last(&mut self, now: Instant, updates: &mut Vec<Update>) {
        if let Some(step) = self.steps.last_mut() {
            if !step.completed {
                step.complete(now);
                updates.push(Update::Step(step.clone()));
            }
        }
    }

    fn append_text(&mut self, text: &str, updates: &mut Vec<Update>) {
        if text.is_empty() {
            return;
        }
        self.response.push_str(text);
        updates.push(Update::Text(text.to_string()));
    }

    /// Fold one record into the log
    pub fn handle(&mut self, record: &EventRecord, now: Instant) -> Vec<Update> {
        let mut updates = Vec::new();
        self.total_events += 1;
        if self.show_events {
            updates.push(Update::Record(record.clone()));
        }

        match record.event {
            RecordKind::RunStarted => {
                let model = record.str_field("model").unwrap_or("Unknown Model").to_string();
                let step = EventStep::done(
                    StepKind::Run,
                    format!("Starting execution with {}", model),
                    "Initializing agent and tools",
                    now,
                );
                self.model_used = Some(model);
                self.push(step, &mut updates);
            }
            RecordKind::Content => {
                if let Some(thinking) = record.str_field("thinking") {
                    self.thinking.push_str(thinking);
                }
                if let Some(content) = record.str_field("content") {
                    self.append_text(content, &mut updates);
                }
            }
            RecordKind::RunCompleted => {
                if self.response.is_empty() {
                    if let Some(content) = record.str_field("content") {
                        self.append_text(content, &mut updates);
                    }
                }
                if self.thinking.is_empty() {
                    if let Some(thinking) = record.str_field("thinking") {
                        self.thinking.push_str(thinking);
                    }
                }
                self.close_last(now, &mut updates);
                let step = EventStep::done(
                    StepKind::Run,
                    "Execution completed successfully",
                    "Response generation finished",
                    now,
                );
                self.push(step, &mut updates);
            }
            RecordKind::RunError => {
                let message = record
                    .str_field("error_message")
                    .unwrap_or("Unknown error")
                    .to_string();
                let step = EventStep::done(StepKind::Failure, "❌ Error occurred", message.clone(), now);
                self.push(step, &mut updates);
                self.response = format!("**Error**: {}", message);
                updates.push(Update::Text(self.response.clone()));
                self.outcome = RunOutcome::Failed(message);
            }
            RecordKind::RunCancelled => {
                let reason = record.str_field("reason").unwrap_or("No reason provided");
                let step = EventStep::done(StepKind::Run, "⏹️ Execution cancelled", reason, now);
                self.push(step, &mut updates);
                self.outcome = RunOutcome::Cancelled;
            }
            RecordKind::RunPaused => {
                let count = record
                    .data
                    .get("tools")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                let step = EventStep::open(
                    StepKind::Paused,
                    "⏸️ Execution paused",
                    format!("{} tools need confirmation", count),
                    now,
                );
                self.push(step, &mut updates);
            }
            RecordKind::RunContinued => {
                self.close_last(now, &mut updates);
                let step = EventStep::done(
                    StepKind::Run,
                    "▶️ Execution resumed",
                    "Continuing with approved actions",
                    now,
                );
                self.push(step, &mut updates);
            }
            RecordKind::ReasoningStarted => {
                self.reasoning_steps = 0;
                let step = EventStep::open(
                    StepKind::Reasoning,
                    "🧠 Starting reasoning process",
                    "Analyzing and planning response",
                    now,
                );
                self.push(step, &mut updates);
            }
            RecordKind::ReasoningStep => {
                self.reasoning_steps += 1;
                let n = self.reasoning_steps;
                match self.steps.last_mut() {
                    Some(step) if step.kind == StepKind::Reasoning && !step.completed => {
                        step.details = format!("Step {}: Processing...", n);
                        updates.push(Update::Step(step.clone()));
                    }
                    _ => {
                        let step = EventStep::open(
                            StepKind::Reasoning,
                            format!("🧠 Reasoning step {}", n),
                            "Processing logical connections",
                            now,
                        );
                        self.push(step, &mut updates);
                    }
                }
            }
            RecordKind::ReasoningCompleted => {
                let n = self.reasoning_steps;
                if let Some(step) = self.close_latest(now, |s| s.kind == StepKind::Reasoning) {
                    step.details = format!("Completed {} reasoning steps", n);
                    updates.push(Update::Step(step.clone()));
                }
            }
            RecordKind::ToolCallStarted => {
                if let Some(tool) = record.data.get("tool").and_then(Value::as_object) {
                    let name = tool
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown Tool")
                        .to_string();
                    let step = EventStep::open(
                        StepKind::Tool(name.clone()),
                        format!("🔧 Using tool: {}", name),
                        format!("Executing with args: {}", args_text(tool.get("args"))),
                        now,
                    );
                    self.active_tools.push(name);
                    self.push(step, &mut updates);
                }
            }
            RecordKind::ToolCallCompleted => {
                if let Some(tool) = record.data.get("tool").and_then(Value::as_object) {
                    let name = tool
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown Tool")
                        .to_string();
                    let result = record.str_field("result").map(preview);
                    if let Some(pos) = self.active_tools.iter().position(|t| *t == name) {
                        self.active_tools.remove(pos);
                    }
                    let kind = StepKind::Tool(name.clone());
                    if let Some(step) = self.close_latest(now, |s| s.kind == kind) {
                        step.details = format!(
                            "Completed with args: {} and result: {}",
                            args_text(tool.get("args")),
                            result.as_deref().unwrap_or("none")
                        );
                        updates.push(Update::Step(step.clone()));
                    }
                    self.tools_used.push(ToolUse {
                        name,
                        result_preview: result,
                    });
                }
            }
            RecordKind::MemoryUpdateStarted => {
                let step = EventStep::open(
                    StepKind::Memory,
                    "💾 Updating memory",
                    "Storing conversation context",
                    now,
                );
                self.push(step, &mut updates);
            }
            RecordKind::MemoryUpdateCompleted => {
                if let Some(step) = self.close_latest(now, |s| s.kind == StepKind::Memory) {
                    step.details = "Memory updated successfully".to_string();
                    updates.push(Update::Step(step.clone()));
                }
            }
            RecordKind::Unknown => {
                if let Some(raw) = record.data.get("raw_content").and_then(Value::as_str) {
                    self.append_text(raw, &mut updates);
                }
            }
        }

        updates
    }

    /// The stream itself failed; the response becomes the error
    pub fn fail(&mut self, error: impl fmt::Display, now: Instant) -> Vec<Update> {
        let mut updates = Vec::new();
        let message = error.to_string();
        self.response = format!("**Streaming Error**: {}", message);
        updates.push(Update::Text(self.response.clone()));
        let step = EventStep::done(StepKind::Failure, "❌ Processing failed", message.clone(), now);
        self.push(step, &mut updates);
        self.outcome = RunOutcome::Failed(message);
        updates
    }

    /// Close every open step and add the closing summary
    pub fn finish(mut self, now: Instant) -> (String, ExecutionStatus, Vec<Update>) {
        let mut updates = Vec::new();
        let execution_time = now.saturating_duration_since(self.started);

        if !self.steps.is_empty() {
            for step in self.steps.iter_mut().filter(|s| !s.completed) {
                step.complete(now);
                updates.push(Update::Step(step.clone()));
            }
            let step = EventStep::done(
                StepKind::Run,
                "🎉 All processing completed",
                format!("Total execution time: {:.2}s", execution_time.as_secs_f64()),
                now,
            );
            self.push(step, &mut updates);
        }

        let status = ExecutionStatus {
            event_log: self.steps,
            tools_used: self.tools_used,
            total_events: self.total_events,
            execution_time,
            reasoning_steps: self.reasoning_steps,
            model_used: self.model_used,
            thinking: (!self.thinking.is_empty()).then_some(self.thinking),
            outcome: self.outcome,
        };
        (self.response, status, updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(event: RecordKind, data: Value) -> EventRecord {
        let data: Map<String, Value> = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        EventRecord { event, data }
    }

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    fn texts(updates: &[Update]) -> String {
        updates
            .iter()
            .filter_map(|u| match u {
                Update::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn full_run_builds_log_and_status() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        let records = vec![
            record(RecordKind::RunStarted, json!({"model": "gemini-2.5-flash"})),
            record(RecordKind::ReasoningStarted, json!({})),
            record(RecordKind::ReasoningStep, json!({"content": "plan"})),
            record(RecordKind::ReasoningStep, json!({"content": "check"})),
            record(RecordKind::ReasoningCompleted, json!({})),
            record(
                RecordKind::ToolCallStarted,
                json!({"tool": {"name": "get_problem", "args": {"id": 1}}}),
            ),
            record(
                RecordKind::ToolCallCompleted,
                json!({"tool": {"name": "get_problem", "args": {"id": 1}}, "result": "Two Sum"}),
            ),
            record(RecordKind::Content, json!({"content": "Notes "})),
            record(RecordKind::Content, json!({"content": "saved."})),
            record(RecordKind::MemoryUpdateStarted, json!({})),
            record(RecordKind::MemoryUpdateCompleted, json!({})),
            record(RecordKind::RunCompleted, json!({"content": "Notes saved."})),
        ];

        let mut shown = Vec::new();
        for (i, r) in records.iter().enumerate() {
            shown.extend(streamer.handle(r, at(t0, i as u64 * 100)));
        }
        assert_eq!(texts(&shown), "Notes saved.");
        assert!(streamer.active_tools().is_empty());

        let (response, status, _) = streamer.finish(at(t0, 2000));
        assert_eq!(response, "Notes saved.");
        assert_eq!(status.total_events, 12);
        assert_eq!(status.reasoning_steps, 2);
        assert_eq!(status.model_used.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(status.execution_time, Duration::from_secs(2));
        assert_eq!(status.outcome, RunOutcome::Completed);
        assert_eq!(
            status.tools_used,
            vec![ToolUse {
                name: "get_problem".to_string(),
                result_preview: Some("Two Sum".to_string()),
            }]
        );
        assert!(status.event_log.iter().all(|s| s.completed));

        let titles: Vec<&str> = status.event_log.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Starting execution with gemini-2.5-flash",
                "🧠 Starting reasoning process",
                "🔧 Using tool: get_problem",
                "💾 Updating memory",
                "Execution completed successfully",
                "🎉 All processing completed",
            ]
        );
        assert_eq!(status.event_log[1].details, "Completed 2 reasoning steps");
        assert_eq!(status.event_log[1].duration, Some(Duration::from_millis(300)));
    }

    #[test]
    fn reasoning_step_without_open_reasoning_adds_a_step() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        streamer.handle(&record(RecordKind::RunStarted, json!({"model": "m"})), t0);
        streamer.handle(&record(RecordKind::ReasoningStep, json!({})), t0);
        let last = streamer.steps.last().unwrap();
        assert_eq!(last.title, "🧠 Reasoning step 1");
        assert!(!last.completed);
    }

    #[test]
    fn completed_content_is_used_when_nothing_streamed() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        let updates = streamer.handle(
            &record(RecordKind::RunCompleted, json!({"content": "final"})),
            t0,
        );
        assert_eq!(texts(&updates), "final");
        assert_eq!(streamer.response, "final");
    }

    #[test]
    fn run_error_replaces_response() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        streamer.handle(&record(RecordKind::Content, json!({"content": "partial"})), t0);
        streamer.handle(
            &record(RecordKind::RunError, json!({"error_message": "gateway down"})),
            t0,
        );
        let (response, status, _) = streamer.finish(t0);
        assert_eq!(response, "**Error**: gateway down");
        assert_eq!(status.outcome, RunOutcome::Failed("gateway down".to_string()));
    }

    #[test]
    fn pause_is_closed_by_continue() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        streamer.handle(
            &record(RecordKind::RunPaused, json!({"tools": [{"tool_name": "create_file"}]})),
            t0,
        );
        assert_eq!(streamer.steps[0].details, "1 tools need confirmation");
        streamer.handle(&record(RecordKind::RunContinued, json!({})), at(t0, 500));
        assert!(streamer.steps[0].completed);
        assert_eq!(streamer.steps[0].duration, Some(Duration::from_millis(500)));
        assert_eq!(streamer.steps[1].title, "▶️ Execution resumed");
    }

    #[test]
    fn unknown_raw_text_is_appended() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        streamer.handle(&record(RecordKind::Unknown, json!({"raw_content": "extra"})), t0);
        streamer.handle(&record(RecordKind::Unknown, json!({"raw_content": {"x": 1}})), t0);
        assert_eq!(streamer.response, "extra");
    }

    #[test]
    fn show_events_forwards_raw_records() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(true, t0);
        let updates = streamer.handle(&record(RecordKind::MemoryUpdateStarted, json!({})), t0);
        assert!(matches!(updates[0], Update::Record(_)));
    }

    #[test]
    fn stream_failure_becomes_the_response() {
        let t0 = Instant::now();
        let mut streamer = ResponseStreamer::new(false, t0);
        streamer.fail("connection reset", t0);
        let (response, status, _) = streamer.finish(t0);
        assert_eq!(response, "**Streaming Error**: connection reset");
        assert_eq!(status.event_log[0].title, "❌ Processing failed");
    }

    #[test]
    fn long_results_are_previewed() {
        let long = "x".repeat(150);
        assert_eq!(preview(&long).chars().count(), RESULT_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn step_display_shows_duration_once_completed() {
        let t0 = Instant::now();
        let mut step = EventStep::open(StepKind::Memory, "💾 Updating memory", "Storing", t0);
        assert_eq!(step.to_string(), "🔄 💾 Updating memory - Storing");
        step.complete(at(t0, 1250));
        assert_eq!(step.to_string(), "✅ 💾 Updating memory - Storing (1.25s)");
    }
}
