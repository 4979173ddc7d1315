use std::sync::Arc;

use chrono::Utc;
use dsa_core::run::{RunEvent, RunEventKind, ToolExecution};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{system_message, Agent, AgentConfig};
use crate::error::{AgentError, Result};
use crate::memory::{MemoryManager, RunRecord, SessionRecord, UserMemory};
use crate::model::{Content, FunctionCall, GenerateRequest, Part, Role};
use crate::tools::{rejection_message, think_declaration, thought_text, THINK_TOOL};

const CONTENT_TYPE: &str = "str";

/// Stamps events with the run envelope and forwards them
///
/// A silent emitter (no sender) backs non-streaming runs.
pub(super) struct Emitter {
    tx: Option<mpsc::Sender<RunEvent>>,
    pub(super) agent_id: String,
    pub(super) run_id: String,
    pub(super) session_id: String,
}

impl Emitter {
    pub(super) fn new(tx: Option<mpsc::Sender<RunEvent>>, config: &AgentConfig) -> Self {
        Self {
            tx,
            agent_id: config.agent_id.clone(),
            run_id: Uuid::new_v4().to_string(),
            session_id: config.session_id.clone(),
        }
    }

    pub(super) async fn emit(&self, kind: RunEventKind) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let event = RunEvent::new(kind).with_ids(&self.agent_id, &self.run_id, &self.session_id);
        tx.send(event).await.map_err(|_| AgentError::ChannelClosed)
    }
}

/// `think` calls collected during a run
#[derive(Debug, Default)]
struct Reasoning {
    open: bool,
    steps: Vec<String>,
}

impl Reasoning {
    fn content(&self) -> String {
        self.steps.join("\n")
    }

    async fn close(&mut self, emitter: &Emitter) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        emitter
            .emit(RunEventKind::ReasoningCompleted {
                content: Some(self.content()),
                content_type: CONTENT_TYPE.to_string(),
            })
            .await
    }
}

fn execution(call: &FunctionCall) -> ToolExecution {
    let mut execution = ToolExecution::new(&call.name, call.args.clone());
    execution.tool_call_id = call.id.clone();
    execution
}

impl Agent {
    async fn load_memories(&self) -> Vec<UserMemory> {
        let Some(db) = self.memory_db.as_ref().filter(|_| self.config.enable_user_memories) else {
            return Vec::new();
        };
        db.list_memories(&self.config.user_id)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to load memories for {}: {}", self.config.user_id, e);
                Vec::new()
            })
    }

    async fn load_session(&self) -> SessionRecord {
        let stored = match &self.storage {
            Some(storage) => storage
                .load_session(&self.config.session_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("Failed to load session {}: {}", self.config.session_id, e);
                    None
                }),
            None => None,
        };
        stored.unwrap_or_else(|| {
            SessionRecord::new(
                &self.config.session_id,
                &self.config.user_id,
                &self.config.agent_id,
            )
        })
    }

    fn needs_confirmation(&self, name: &str) -> bool {
        self.confirmation.is_some() && self.config.confirm_tools.iter().any(|t| t == name)
    }

    pub(super) async fn execute(&self, emitter: &Emitter, message: &str) -> Result<String> {
        let config = &self.config;
        emitter
            .emit(RunEventKind::RunStarted {
                model: self.model.id().to_string(),
                model_provider: self.model.provider().to_string(),
            })
            .await?;

        let memories = self.load_memories().await;
        let mut session = self.load_session().await;

        let mut contents = Vec::new();
        for run in session.recent_runs(config.num_history_runs) {
            contents.push(Content::user(run.user_message.clone()));
            // Gemini rejects empty text parts.
            if !run.response.is_empty() {
                contents.push(Content::model(run.response.clone()));
            }
        }
        contents.push(Content::user(message));

        let mut declarations = vec![think_declaration()];
        if let Some(tools) = &self.tools {
            declarations.extend(tools.declarations());
        }

        let mut request = GenerateRequest {
            system_instruction: Some(system_message(config, &memories, Utc::now())),
            contents,
            tools: declarations,
            json_output: false,
        };
        if config.debug_mode {
            debug!(
                "Run {}: {} history messages, {} memories, {} tools",
                emitter.run_id,
                request.contents.len() - 1,
                memories.len(),
                request.tools.len()
            );
        }

        let mut content = String::new();
        let mut thinking = String::new();
        let mut reasoning = Reasoning::default();
        let mut rounds = 0;

        loop {
            let mut stream = self.model.stream(request.clone()).await?;
            let mut model_parts = Vec::new();
            let mut calls = Vec::new();

            while let Some(chunk) = stream.next().await {
                for part in chunk?.parts {
                    if let Some(call) = &part.function_call {
                        calls.push(call.clone());
                        model_parts.push(part);
                        continue;
                    }
                    let Some(text) = part.text.clone().filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    if part.thought {
                        thinking.push_str(&text);
                        emitter
                            .emit(RunEventKind::RunResponseContent {
                                content: None,
                                content_type: CONTENT_TYPE.to_string(),
                                thinking: Some(text),
                            })
                            .await?;
                    } else {
                        content.push_str(&text);
                        model_parts.push(part);
                        emitter
                            .emit(RunEventKind::RunResponseContent {
                                content: Some(text),
                                content_type: CONTENT_TYPE.to_string(),
                                thinking: None,
                            })
                            .await?;
                    }
                }
            }

            if calls.is_empty() {
                break;
            }
            if rounds >= config.max_tool_rounds {
                return Err(AgentError::ToolRoundsExceeded {
                    limit: config.max_tool_rounds,
                });
            }
            rounds += 1;

            request.contents.push(Content {
                role: Role::Model,
                parts: model_parts,
            });
            let responses = self.call_tools(emitter, &calls, &mut reasoning).await?;
            request.contents.push(Content {
                role: Role::User,
                parts: responses,
            });
        }

        reasoning.close(emitter).await?;

        if let Some(db) = self.memory_db.as_ref().filter(|_| config.enable_user_memories) {
            emitter.emit(RunEventKind::MemoryUpdateStarted).await?;
            let manager = MemoryManager::new(Arc::clone(&self.model), Arc::clone(db));
            match manager.update(&config.user_id, message).await {
                Ok(update) => debug!("Memory update for {}: {:?}", config.user_id, update),
                Err(e) => warn!("Memory update failed for {}: {}", config.user_id, e),
            }
            emitter.emit(RunEventKind::MemoryUpdateCompleted).await?;
        }

        if let Some(storage) = &self.storage {
            session.push_run(RunRecord {
                run_id: emitter.run_id.clone(),
                user_message: message.to_string(),
                response: content.clone(),
                created_at: Utc::now().timestamp(),
            });
            if let Err(e) = storage.save_session(&session).await {
                warn!("Failed to save session {}: {}", session.session_id, e);
            }
        }

        emitter
            .emit(RunEventKind::RunCompleted {
                content: Some(content.clone()),
                content_type: CONTENT_TYPE.to_string(),
                reasoning_content: (!reasoning.steps.is_empty()).then(|| reasoning.content()),
                thinking: (!thinking.is_empty()).then_some(thinking),
            })
            .await?;

        Ok(content)
    }

    /// Execute one round of calls in order and build the responses for the model
    async fn call_tools(
        &self,
        emitter: &Emitter,
        calls: &[FunctionCall],
        reasoning: &mut Reasoning,
    ) -> Result<Vec<Part>> {
        let mut approved = vec![true; calls.len()];
        if let Some(handler) = &self.confirmation {
            let pending: Vec<usize> = calls
                .iter()
                .enumerate()
                .filter(|(_, call)| self.needs_confirmation(&call.name))
                .map(|(idx, _)| idx)
                .collect();

            if !pending.is_empty() {
                let tools: Vec<ToolExecution> = pending.iter().map(|&idx| execution(&calls[idx])).collect();
                emitter
                    .emit(RunEventKind::RunPaused {
                        tools: tools.clone(),
                    })
                    .await?;
                let decisions = handler.confirm(&tools).await;
                for (pos, &idx) in pending.iter().enumerate() {
                    approved[idx] = decisions.get(pos).copied().unwrap_or(false);
                }
                emitter.emit(RunEventKind::RunContinued).await?;
            }
        }

        let mut responses = Vec::with_capacity(calls.len());
        for (call, approved) in calls.iter().zip(approved) {
            if call.name == THINK_TOOL {
                let thought = thought_text(&call.args);
                if !reasoning.open {
                    reasoning.open = true;
                    emitter.emit(RunEventKind::ReasoningStarted).await?;
                }
                reasoning.steps.push(thought.clone());
                emitter
                    .emit(RunEventKind::ReasoningStep {
                        content: Some(thought),
                        content_type: CONTENT_TYPE.to_string(),
                        reasoning_content: reasoning.content(),
                    })
                    .await?;
                responses.push(Part::function_response(call, &reasoning.content()));
                continue;
            }

            reasoning.close(emitter).await?;

            if !approved {
                info!("Tool call {} rejected", call.name);
                responses.push(Part::function_response(call, &rejection_message(&call.name)));
                continue;
            }

            let started = execution(call);
            emitter
                .emit(RunEventKind::ToolCallStarted {
                    tool: Some(started.clone()),
                })
                .await?;

            let (result, is_error) = match &self.tools {
                Some(tools) => match tools.call(&call.name, call.args.clone()).await {
                    Ok(output) => (output.content, output.is_error),
                    Err(e) => {
                        warn!("Tool {} failed: {}", call.name, e);
                        (e.to_string(), true)
                    }
                },
                None => (
                    AgentError::UnknownTool {
                        name: call.name.clone(),
                    }
                    .to_string(),
                    true,
                ),
            };

            responses.push(Part::function_response(call, &result));
            emitter
                .emit(RunEventKind::ToolCallCompleted {
                    tool: Some(started.with_result(result, is_error)),
                })
                .await?;
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryMemoryDb, InMemoryStorage, MemoryDb, SessionStorage};
    use crate::model::{ChatModel, ChunkStream, ModelChunk, ModelTurn};
    use crate::tools::{ConfirmationHandler, ToolOutput, ToolProvider};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Plays back one scripted turn per call; hangs once the script runs out
    struct ScriptedModel {
        turns: Mutex<VecDeque<Vec<Part>>>,
        requests: Mutex<Vec<GenerateRequest>>,
        memory_answer: String,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Vec<Part>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                requests: Mutex::new(Vec::new()),
                memory_answer: r#"{"operations": []}"#.to_string(),
            })
        }

        fn request(&self, idx: usize) -> GenerateRequest {
            self.requests.lock().unwrap()[idx].clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn id(&self) -> &str {
            "gemini-2.5-flash"
        }

        fn provider(&self) -> &str {
            "Google"
        }

        async fn stream(&self, request: GenerateRequest) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(request);
            let turn = self.turns.lock().unwrap().pop_front();
            match turn {
                Some(parts) => Ok(Box::pin(futures::stream::iter(parts.into_iter().map(
                    |part| {
                        Ok(ModelChunk {
                            parts: vec![part],
                            finish_reason: None,
                        })
                    },
                )))),
                None => Ok(Box::pin(futures::stream::pending())),
            }
        }

        async fn generate(&self, _request: GenerateRequest) -> Result<ModelTurn> {
            Ok(ModelTurn {
                text: self.memory_answer.clone(),
                function_calls: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ToolProvider for RecordingTools {
        fn declarations(&self) -> Vec<crate::model::FunctionDeclaration> {
            ["create_file", "get_problem", "explode"]
                .iter()
                .map(|name| crate::model::FunctionDeclaration {
                    name: name.to_string(),
                    description: String::new(),
                    parameters: json!({"type": "object"}),
                })
                .collect()
        }

        async fn call(&self, name: &str, args: Value) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push((name.to_string(), args));
            if name == "explode" {
                return Err(AgentError::mcp("gateway timeout"));
            }
            Ok(ToolOutput::ok(format!("{} done", name)))
        }
    }

    struct FixedAnswer {
        answer: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConfirmationHandler for FixedAnswer {
        async fn confirm(&self, tools: &[ToolExecution]) -> Vec<bool> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(tools.iter().map(|t| t.tool_name.clone()));
            vec![self.answer; tools.len()]
        }
    }

    fn text(s: &str) -> Part {
        Part::text(s)
    }

    fn call(name: &str, args: Value) -> Part {
        Part {
            function_call: Some(FunctionCall {
                id: None,
                name: name.to_string(),
                args,
            }),
            ..Default::default()
        }
    }

    fn config() -> AgentConfig {
        AgentConfig::new("DSA Agent", "user-1", "session-1")
    }

    async fn collect(agent: Agent, message: &str) -> Vec<RunEvent> {
        Arc::new(agent)
            .run_stream(message, CancellationToken::new())
            .collect()
            .await
    }

    fn tags(events: &[RunEvent]) -> Vec<&str> {
        events.iter().map(|e| e.tag()).collect()
    }

    fn completed(events: &[RunEvent]) -> &RunEventKind {
        &events.last().unwrap().kind
    }

    #[tokio::test]
    async fn plain_answer_updates_memory_and_history() {
        let mut model = ScriptedModel::new(vec![vec![text("Hello "), text("world")]]);
        Arc::get_mut(&mut model).unwrap().memory_answer =
            r#"{"operations": [{"op": "add", "memory": "keeps notes on github"}]}"#.to_string();
        let db = Arc::new(InMemoryMemoryDb::new());
        let storage = Arc::new(InMemoryStorage::new());
        let mut config = config();
        config.enable_user_memories = true;

        let agent = Agent::new(config, model.clone())
            .with_memory_db(db.clone())
            .with_storage(storage.clone());
        let events = collect(agent, "hi").await;

        assert_eq!(
            tags(&events),
            vec![
                "RunStarted",
                "RunResponseContent",
                "RunResponseContent",
                "MemoryUpdateStarted",
                "MemoryUpdateCompleted",
                "RunCompleted"
            ]
        );
        let run_id = events[0].run_id.clone();
        assert!(run_id.is_some());
        assert!(events.iter().all(|e| e.run_id == run_id));
        assert!(events.iter().all(|e| e.session_id.as_deref() == Some("session-1")));
        match completed(&events) {
            RunEventKind::RunCompleted { content, thinking, reasoning_content, .. } => {
                assert_eq!(content.as_deref(), Some("Hello world"));
                assert!(thinking.is_none());
                assert!(reasoning_content.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        let memories = db.list_memories("user-1").await.unwrap();
        assert_eq!(memories.len(), 1);
        let session = storage.load_session("session-1").await.unwrap().unwrap();
        assert_eq!(session.runs.len(), 1);
        assert_eq!(session.runs[0].response, "Hello world");
        assert_eq!(session.runs[0].run_id, run_id.unwrap());
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_to_the_model() {
        let model = ScriptedModel::new(vec![
            vec![call("create_file", json!({"path": "1_two_sum.md"}))],
            vec![text("Saved")],
        ]);
        let tools = Arc::new(RecordingTools::default());
        let agent = Agent::new(config(), model.clone()).with_tools(tools.clone());
        let events = collect(agent, "save it").await;

        assert_eq!(
            tags(&events),
            vec![
                "RunStarted",
                "ToolCallStarted",
                "ToolCallCompleted",
                "RunResponseContent",
                "RunCompleted"
            ]
        );
        match &events[2].kind {
            RunEventKind::ToolCallCompleted { tool: Some(tool) } => {
                assert_eq!(tool.tool_name, "create_file");
                assert_eq!(tool.result.as_deref(), Some("create_file done"));
                assert!(!tool.tool_call_error);
            }
            other => panic!("unexpected {:?}", other),
        }

        let first = model.request(0);
        let names: Vec<&str> = first.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["think", "create_file", "get_problem", "explode"]);

        let second = model.request(1);
        let n = second.contents.len();
        assert_eq!(second.contents[n - 2].role, Role::Model);
        assert!(second.contents[n - 2].parts[0].function_call.is_some());
        let response = second.contents[n - 1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "create_file");
        assert_eq!(response.response, json!({"result": "create_file done"}));
        assert_eq!(tools.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn think_calls_become_reasoning_events() {
        let model = ScriptedModel::new(vec![
            vec![call("think", json!({"thought": "check template"}))],
            vec![
                call("think", json!({"thought": "plan file"})),
                call("get_problem", json!({"slug": "two-sum"})),
            ],
            vec![text("Done")],
        ]);
        let agent = Agent::new(config(), model).with_tools(Arc::new(RecordingTools::default()));
        let events = collect(agent, "note two sum").await;

        assert_eq!(
            tags(&events),
            vec![
                "RunStarted",
                "ReasoningStarted",
                "ReasoningStep",
                "ReasoningStep",
                "ReasoningCompleted",
                "ToolCallStarted",
                "ToolCallCompleted",
                "RunResponseContent",
                "RunCompleted"
            ]
        );
        match &events[3].kind {
            RunEventKind::ReasoningStep { content, reasoning_content, .. } => {
                assert_eq!(content.as_deref(), Some("plan file"));
                assert_eq!(reasoning_content, "check template\nplan file");
            }
            other => panic!("unexpected {:?}", other),
        }
        match completed(&events) {
            RunEventKind::RunCompleted { reasoning_content, .. } => {
                assert_eq!(reasoning_content.as_deref(), Some("check template\nplan file"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn reasoning_left_open_closes_before_completion() {
        let model = ScriptedModel::new(vec![
            vec![call("think", json!({"thought": "nothing to do"}))],
            vec![text("ok")],
        ]);
        let events = collect(Agent::new(config(), model), "hi").await;
        assert_eq!(
            tags(&events),
            vec![
                "RunStarted",
                "ReasoningStarted",
                "ReasoningStep",
                "RunResponseContent",
                "ReasoningCompleted",
                "RunCompleted"
            ]
        );
    }

    #[tokio::test]
    async fn thought_parts_stream_as_thinking() {
        let thought = Part {
            text: Some("weighing options".to_string()),
            thought: true,
            ..Default::default()
        };
        let model = ScriptedModel::new(vec![vec![thought, text("Answer")]]);
        let events = collect(Agent::new(config(), model.clone()), "hi").await;

        match &events[1].kind {
            RunEventKind::RunResponseContent { content, thinking, .. } => {
                assert!(content.is_none());
                assert_eq!(thinking.as_deref(), Some("weighing options"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match completed(&events) {
            RunEventKind::RunCompleted { content, thinking, .. } => {
                assert_eq!(content.as_deref(), Some("Answer"));
                assert_eq!(thinking.as_deref(), Some("weighing options"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn tool_failures_are_passed_through_as_results() {
        let model = ScriptedModel::new(vec![vec![call("explode", json!({}))], vec![text("sorry")]]);
        let agent = Agent::new(config(), model).with_tools(Arc::new(RecordingTools::default()));
        let events = collect(agent, "go").await;

        match &events[2].kind {
            RunEventKind::ToolCallCompleted { tool: Some(tool) } => {
                assert!(tool.tool_call_error);
                assert!(tool.result.as_deref().unwrap().contains("gateway timeout"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events.last().unwrap().tag(), "RunCompleted");
    }

    #[tokio::test]
    async fn rejected_confirmation_skips_the_tool() {
        let model = ScriptedModel::new(vec![
            vec![call("create_file", json!({"path": "a.md"})), call("get_problem", json!({}))],
            vec![text("ok")],
        ]);
        let tools = Arc::new(RecordingTools::default());
        let handler = Arc::new(FixedAnswer {
            answer: false,
            seen: Mutex::new(Vec::new()),
        });
        let mut config = config();
        config.confirm_tools = vec!["create_file".to_string()];

        let agent = Agent::new(config, model.clone())
            .with_tools(tools.clone())
            .with_confirmation(handler.clone());
        let events = collect(agent, "save").await;

        assert_eq!(
            tags(&events),
            vec![
                "RunStarted",
                "RunPaused",
                "RunContinued",
                "ToolCallStarted",
                "ToolCallCompleted",
                "RunResponseContent",
                "RunCompleted"
            ]
        );
        match &events[1].kind {
            RunEventKind::RunPaused { tools } => {
                assert_eq!(tools.len(), 1);
                assert_eq!(tools[0].tool_name, "create_file");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(handler.seen.lock().unwrap().clone(), vec!["create_file"]);

        let called: Vec<String> = tools.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(called, vec!["get_problem"]);

        let second = model.request(1);
        let responses = &second.contents.last().unwrap().parts;
        assert_eq!(
            responses[0].function_response.as_ref().unwrap().response,
            json!({"result": rejection_message("create_file")})
        );
    }

    #[tokio::test]
    async fn confirm_tools_without_handler_run_directly() {
        let model = ScriptedModel::new(vec![vec![call("create_file", json!({}))], vec![text("ok")]]);
        let mut config = config();
        config.confirm_tools = vec!["create_file".to_string()];
        let agent = Agent::new(config, model).with_tools(Arc::new(RecordingTools::default()));
        let events = collect(agent, "save").await;
        assert!(!tags(&events).contains(&"RunPaused"));
        assert!(tags(&events).contains(&"ToolCallCompleted"));
    }

    #[tokio::test]
    async fn cancellation_ends_with_run_cancelled() {
        let model = ScriptedModel::new(Vec::new());
        let token = CancellationToken::new();
        let mut stream = Arc::new(Agent::new(config(), model)).run_stream("hi", token.clone());

        let first = stream.next().await.unwrap();
        assert_eq!(first.tag(), "RunStarted");
        token.cancel();

        let rest: Vec<RunEvent> = stream.collect().await;
        assert_eq!(tags(&rest), vec!["RunCancelled"]);
        assert!(rest[0].kind.is_terminal());
    }

    #[tokio::test]
    async fn tool_round_limit_ends_with_run_error() {
        let looping = (0..3).map(|_| vec![call("get_problem", json!({}))]).collect();
        let model = ScriptedModel::new(looping);
        let mut config = config();
        config.max_tool_rounds = 2;
        let agent = Agent::new(config, model).with_tools(Arc::new(RecordingTools::default()));
        let events = collect(agent, "loop").await;

        assert_eq!(events.len(), 6);
        match completed(&events) {
            RunEventKind::RunError { content } => {
                assert!(content.as_deref().unwrap().contains("limit of 2"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn history_is_replayed_up_to_the_limit() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut session = SessionRecord::new("session-1", "user-1", "agent");
        for n in 0..3 {
            session.push_run(RunRecord {
                run_id: format!("r{}", n),
                user_message: format!("q{}", n),
                response: format!("a{}", n),
                created_at: n,
            });
        }
        storage.save_session(&session).await.unwrap();

        let model = ScriptedModel::new(vec![vec![text("hi")]]);
        let mut config = config();
        config.num_history_runs = 1;
        let agent = Agent::new(config, model.clone()).with_storage(storage.clone());
        let events = collect(agent, "q3").await;
        assert_eq!(events.last().unwrap().tag(), "RunCompleted");

        let texts: Vec<(Role, String)> = model
            .request(0)
            .contents
            .iter()
            .map(|c| (c.role, c.parts[0].text.clone().unwrap()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Role::User, "q2".to_string()),
                (Role::Model, "a2".to_string()),
                (Role::User, "q3".to_string())
            ]
        );
        let saved = storage.load_session("session-1").await.unwrap().unwrap();
        assert_eq!(saved.runs.len(), 4);
    }

    #[tokio::test]
    async fn empty_answers_are_not_replayed() {
        let storage = Arc::new(InMemoryStorage::new());
        let first = ScriptedModel::new(vec![vec![call("get_problem", json!({"id": 1}))], vec![]]);
        let agent = Agent::new(config(), first)
            .with_tools(Arc::new(RecordingTools::default()))
            .with_storage(storage.clone());
        let events = collect(agent, "save two sum").await;
        assert_eq!(events.last().unwrap().tag(), "RunCompleted");

        let second = ScriptedModel::new(vec![vec![text("done")]]);
        let agent = Agent::new(config(), second.clone()).with_storage(storage.clone());
        let events = collect(agent, "next").await;
        assert_eq!(events.last().unwrap().tag(), "RunCompleted");

        let request = second.request(0);
        assert!(request
            .contents
            .iter()
            .flat_map(|c| &c.parts)
            .all(|p| p.text.as_deref() != Some("")));
        let roles: Vec<Role> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User]);

        let saved = storage.load_session("session-1").await.unwrap().unwrap();
        assert_eq!(saved.runs.len(), 2);
        assert_eq!(saved.runs[0].response, "");
    }

    #[tokio::test]
    async fn run_returns_content_and_errors_directly() {
        let model = ScriptedModel::new(vec![vec![text("four")]]);
        let agent = Agent::new(config(), model);
        assert_eq!(agent.run("2 + 2").await.unwrap(), "four");

        let model = ScriptedModel::new(vec![vec![call("get_problem", json!({}))]; 2]);
        let mut config = config();
        config.max_tool_rounds = 1;
        let agent = Agent::new(config, model).with_tools(Arc::new(RecordingTools::default()));
        let err = agent.run("loop").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolRoundsExceeded { limit: 1 }));
    }
}
