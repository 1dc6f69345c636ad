use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use indoc::formatdoc;

use crate::gateway::ModelGateway;
use crate::preflight::PreflightChecker;
use crate::queue::{Checkpoint, TaskPacket, TaskQueue};
use crate::schemas::{AgentMode, AgentState, Message, Step, ToolResult};
use crate::tools::{default_rule_engine, RuleEngine, ToolError, ToolExecutor, ToolRegistry};

use super::{AgentError, AgentJudge, TraceLog};

const MAX_STEPS_ANSWER: &str =
    "I've reached the maximum number of reasoning steps. Please try a simpler request.";
const GENERIC_FAILURE_ANSWER: &str = "I encountered an error and cannot complete the request.";

/// Result of one agent loop execution.
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub success: bool,
    pub final_answer: String,
    pub steps_taken: usize,
    pub error: Option<String>,
}

/// The reasoning driver: propose, preflight, execute, observe, judge.
///
/// The loop owns the per-conversation circuit breaker and drives a single
/// turn to completion. It enforces the step limit, the per-step tool budget
/// (checked before each proposal, so a batch stops mid-way), and the budget
/// of whatever task packet is active.
pub struct AgentLoop {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<ToolRegistry>,
    rule_engine: RuleEngine,
    executor: ToolExecutor,
    preflight: PreflightChecker,
    judge: Option<AgentJudge>,
    task_queue: Option<TaskQueue>,
}

impl AgentLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            gateway,
            registry,
            rule_engine: default_rule_engine(),
            executor: ToolExecutor::new(),
            preflight: PreflightChecker::new(),
            judge: Some(AgentJudge::new()),
            task_queue: None,
        }
    }

    pub fn with_rule_engine(mut self, rule_engine: RuleEngine) -> Self {
        self.rule_engine = rule_engine;
        self
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn without_judge(mut self) -> Self {
        self.judge = None;
        self
    }

    pub fn with_task_queue(mut self, task_queue: TaskQueue) -> Self {
        self.task_queue = Some(task_queue);
        self
    }

    pub fn task_queue(&self) -> Option<&TaskQueue> {
        self.task_queue.as_ref()
    }

    pub fn preflight(&self) -> &PreflightChecker {
        &self.preflight
    }

    /// Run the loop for one user message. Never panics and never raises:
    /// a failed turn is reported through `LoopResult`, with the step list
    /// reflecting exactly what ran.
    pub async fn run(&mut self, state: &mut AgentState, user_message: &str) -> LoopResult {
        log::info!(
            "Starting agent loop for message: {}",
            crate::utils::helper::truncate(user_message, 50)
        );

        state
            .conversation
            .add_message(Message::new_user_message(user_message));

        match self.reasoning_loop(state).await {
            Ok(final_answer) => LoopResult {
                success: true,
                final_answer,
                steps_taken: state.execution.current_step,
                error: None,
            },
            Err(e) => {
                log::error!("Agent loop error: {}", e);
                LoopResult {
                    success: false,
                    final_answer: GENERIC_FAILURE_ANSWER.into(),
                    steps_taken: state.execution.current_step,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn reasoning_loop(&mut self, state: &mut AgentState) -> Result<String, AgentError> {
        let tracer = TraceLog::new(state.execution.run_id.clone());
        let active_task: Option<TaskPacket> =
            self.task_queue.as_ref().and_then(|q| q.active_task());
        let mut task_tool_calls: usize = 0;
        let mut emitted_guidance: HashSet<String> = HashSet::new();

        while state.execution.should_continue() {
            tracer.log_step(state.execution.current_step + 1, state.execution.max_steps);

            let tools = self.registry.definitions();
            let response = self.gateway.complete(state.messages(), &tools).await?;

            // The think step is the step boundary: the per-step tool counter
            // resets here, so every continue below starts a fresh budget.
            let mut think = Step::think(&response.content);
            if response.has_tool_calls() {
                think.tool_calls = Some(response.tool_calls.clone());
            }
            state.execution.add_step(think);

            if !response.has_tool_calls() {
                state
                    .conversation
                    .add_message(Message::new_assistant_message(&response.content));
                log::debug!("Agent finished with result: {}", response.content);
                return Ok(response.content);
            }

            log::info!("Model requested {} tool calls", response.tool_calls.len());

            self.preflight.circuit_breaker.current_step = state.execution.current_step;
            let preflight = self.preflight.check(
                &response.tool_calls,
                state.execution.mode,
                Some(&response.content),
            );

            if !preflight.passed {
                let mut guidance = formatdoc! {"
                    Tool calls blocked by preflight:
                    - {}",
                    preflight.failures.join("\n- ")
                };
                if !preflight.warnings.is_empty() {
                    guidance.push_str(&format!("\nHints:\n- {}", preflight.warnings.join("\n- ")));
                }
                append_guidance(state, &mut emitted_guidance, guidance);

                if preflight.forced_plan_mode {
                    state.execution.set_mode(AgentMode::Planner);
                    append_guidance(
                        state,
                        &mut emitted_guidance,
                        "Planner mode engaged: write out a plan before any further tool use."
                            .to_string(),
                    );
                }
                continue;
            }

            if !state.execution.can_use_tool() {
                append_guidance(
                    state,
                    &mut emitted_guidance,
                    "Tool budget exhausted. Summarize what you've learned and replan your next step."
                        .to_string(),
                );
                continue;
            }

            // Execute the batch, checking the budget before each proposal:
            // a budget of 2 with a batch of 5 runs exactly 2.
            let mut results: Vec<ToolResult> = Vec::new();
            let mut budget_hit = false;

            for tool_call in &response.tool_calls {
                if !state.execution.can_use_tool() {
                    budget_hit = true;
                    break;
                }
                state.execution.record_tool_use();
                tracer.log_tool_call(tool_call);
                let started = Instant::now();

                let (allowed, violations) = self.rule_engine.evaluate(tool_call);
                let result = if !allowed {
                    let violation = &violations[0];
                    log::warn!("Tool call blocked: {}", violation.reason);
                    ToolResult::err(
                        &tool_call.id,
                        ToolError::RuleBlocked {
                            rule: violation.rule_name.clone(),
                            reason: violation.reason.clone(),
                        }
                        .to_envelope()
                        .to_string(),
                    )
                } else if let Some(tool) = self.registry.get(&tool_call.name) {
                    self.executor
                        .execute(tool, tool_call, preflight.rewrites.get(&tool_call.id))
                        .await
                } else {
                    log::error!("Tool not found: {}", tool_call.name);
                    ToolResult::err(
                        &tool_call.id,
                        ToolError::ToolNotFound(tool_call.name.clone())
                            .to_envelope()
                            .to_string(),
                    )
                };

                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                tracer.log_tool_result(&result, elapsed_ms, &tool_call.name);

                if result.success {
                    self.preflight.circuit_breaker.record_success(tool_call);
                } else {
                    self.preflight
                        .circuit_breaker
                        .record_failure(tool_call, result.error.as_deref().unwrap_or(""));
                }

                if let Some(judge) = &self.judge {
                    let judgment = judge.check_tool_result(&result);
                    if !judgment.passed {
                        log::warn!("Tool result issue: {}", judgment.reason);
                    }
                }

                task_tool_calls += 1;
                results.push(result);
            }

            for result in &results {
                let content = if result.success {
                    result.output.clone()
                } else {
                    format!("Error: {}", result.error.as_deref().unwrap_or("unknown"))
                };
                state
                    .conversation
                    .add_message(Message::new_tool_message(&result.tool_call_id, content));
            }

            // One observation per batch; appending it is the next step
            // boundary.
            state.execution.add_step(Step::observe(
                format!("{} tool result(s)", results.len()),
                results.clone(),
            ));

            if budget_hit {
                let skipped_calls = &response.tool_calls[results.len()..];
                tracer.log_budget_exhausted(skipped_calls.len());
                append_guidance(
                    state,
                    &mut emitted_guidance,
                    budget_nudge(&response.tool_calls[..results.len()], skipped_calls),
                );
            }

            if let Some(judge) = &self.judge {
                for judgment in [
                    judge.check_progress(state.steps()),
                    judge.check_tool_loop(state.steps()),
                ] {
                    if !judgment.passed {
                        if let Some(suggestion) = judgment.suggestion {
                            append_guidance(
                                state,
                                &mut emitted_guidance,
                                format!("Guidance: {}", suggestion),
                            );
                        }
                    }
                }

                let workflow = judge.check_workflow_discipline(state.steps());
                if !workflow.passed {
                    if let Some(suggestion) = workflow.suggestion {
                        append_guidance(
                            state,
                            &mut emitted_guidance,
                            format!("Workflow guidance: {}", suggestion),
                        );
                    }
                }

                let patch = judge.check_patch_discipline(state.steps());
                if !patch.passed {
                    if let Some(suggestion) = patch.suggestion {
                        append_guidance(
                            state,
                            &mut emitted_guidance,
                            format!("Patch protocol: {}", suggestion),
                        );
                    }
                }
            }

            if let Some(task) = &active_task {
                let tools_exhausted = task_tool_calls >= task.budget.max_tool_calls;
                let steps_exhausted = state.execution.current_step >= task.budget.max_steps;
                if tools_exhausted || steps_exhausted {
                    return self
                        .fail_active_task(task, task_tool_calls, state.execution.current_step)
                        .map_err(AgentError::from);
                }
            }
        }

        log::warn!("Max steps ({}) reached", state.execution.max_steps);
        Ok(MAX_STEPS_ANSWER.into())
    }

    /// The budget applied to this task, not to the conversation: the task
    /// becomes terminal, the conversation may continue.
    fn fail_active_task(
        &mut self,
        task: &TaskPacket,
        tool_calls_used: usize,
        steps_used: usize,
    ) -> Result<String, crate::queue::QueueError> {
        let checkpoint = Checkpoint::new(&task.task_id)
            .with_done(format!(
                "Stopped after {} tool calls and {} steps against a budget of {} calls / {} steps",
                tool_calls_used, steps_used, task.budget.max_tool_calls, task.budget.max_steps
            ))
            .with_next("Requeue the remaining work as a new task")
            .with_blockers(["Task budget exhausted"]);

        if let Some(queue) = &mut self.task_queue {
            queue.mark_failed(
                &task.task_id,
                &format!(
                    "BUDGET_EXHAUSTED: used {} tool calls / {} steps",
                    tool_calls_used, steps_used
                ),
                Some(&checkpoint),
            )?;
        }

        Ok(format!(
            "Task {} exhausted its budget; it was checkpointed and marked failed.",
            task.task_id
        ))
    }
}

/// Each trigger's guidance is appended at most once per turn.
fn append_guidance(state: &mut AgentState, emitted: &mut HashSet<String>, text: String) {
    if emitted.insert(text.clone()) {
        log::info!("Guidance: {}", text);
        state
            .conversation
            .add_message(Message::new_system_message(text));
    }
}

fn budget_nudge(
    executed: &[crate::schemas::ToolCall],
    skipped: &[crate::schemas::ToolCall],
) -> String {
    const WRITE_TOOLS: [&str; 3] = ["write_file", "edit_file", "create_file"];
    const TEST_MARKERS: [&str; 6] = [
        "pytest", "unittest", "cargo test", "npm test", "yarn test", "go test",
    ];

    let wrote_code = executed
        .iter()
        .any(|tc| WRITE_TOOLS.contains(&tc.name.as_str()));
    let tests_skipped = skipped.iter().any(|tc| {
        let command = tc
            .arg_str("command")
            .or_else(|| tc.arg_str("cmd"))
            .unwrap_or_default()
            .to_lowercase();
        matches!(tc.name.as_str(), "shell" | "bash")
            && TEST_MARKERS.iter().any(|kw| command.contains(kw))
    });

    if wrote_code && tests_skipped {
        format!(
            "Tests were skipped due to tool budget ({} tool(s)). Run tests in the next step.",
            skipped.len()
        )
    } else {
        format!(
            "Tool budget hit mid-batch. {} tool(s) skipped. Replan next step with remaining work.",
            skipped.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayResponse, ScriptedGateway};
    use crate::queue::TaskSpec;
    use crate::schemas::{MessageRole, ToolCall};
    use crate::tools::register_file_tools;
    use crate::workspace::Workspace;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry_for(tmp: &TempDir) -> Arc<ToolRegistry> {
        let workspace = Arc::new(
            Workspace::new(tmp.path().join("workspace"))
                .unwrap()
                .with_min_free_memory_percent(0.0),
        );
        let mut registry = ToolRegistry::new();
        register_file_tools(&mut registry, workspace).unwrap();
        Arc::new(registry)
    }

    fn write_call(id: &str, path: &str) -> ToolCall {
        ToolCall::new(
            id,
            "write_file",
            json!({"path": path, "content": "payload"}),
        )
    }

    fn count_role(state: &AgentState, role: MessageRole) -> usize {
        state
            .messages()
            .iter()
            .filter(|m| m.role == role)
            .count()
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let tmp = TempDir::new().unwrap();
        let gateway = Arc::new(ScriptedGateway::new([GatewayResponse::text("All done.")]));
        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));

        let mut state = AgentState::new();
        let result = agent.run(&mut state, "hello").await;

        assert!(result.success);
        assert_eq!(result.final_answer, "All done.");
        assert_eq!(result.steps_taken, 1);
        assert_eq!(count_role(&state, MessageRole::Assistant), 1);
    }

    #[tokio::test]
    async fn test_budget_hard_stop_mid_batch() {
        let tmp = TempDir::new().unwrap();
        let batch: Vec<ToolCall> = (0..5)
            .map(|i| write_call(&format!("c{}", i), &format!("data/file{}.txt", i)))
            .collect();
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("writing five files", batch),
            GatewayResponse::text("done"),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));
        let mut state = AgentState::new();
        state.execution.max_tools_per_step = 2;

        let result = agent.run(&mut state, "write the files").await;
        assert!(result.success);
        assert_eq!(result.final_answer, "done");

        // Exactly 2 executed, 3 skipped.
        assert_eq!(count_role(&state, MessageRole::Tool), 2);
        let budget_messages: Vec<&Message> = state
            .messages()
            .iter()
            .filter(|m| m.role == MessageRole::System && m.content.contains("budget"))
            .collect();
        assert_eq!(budget_messages.len(), 1);
        assert!(budget_messages[0].content.contains("3 tool(s) skipped"));

        // The counter was reset at the next step boundary; the loop went on
        // to a second gateway turn and finished.
        assert!(state.execution.current_step >= 2);
        assert_eq!(
            tmp.path().join("workspace/data").read_dir().unwrap().count(),
            2
        );
    }

    #[tokio::test]
    async fn test_intent_exhaustion_forces_planner_mode() {
        let tmp = TempDir::new().unwrap();
        let read = |id: &str, path: &str| {
            ToolCall::new(id, "read_file", json!({ "path": path }))
        };
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("reading a", [read("c1", "a.txt")]),
            GatewayResponse::with_tool_calls("reading b", [read("c2", "b.txt")]),
            GatewayResponse::with_tool_calls("reading c", [read("c3", "c.txt")]),
            GatewayResponse::text("giving up"),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));
        let mut state = AgentState::new();

        let result = agent.run(&mut state, "read the files").await;
        assert!(result.success);

        // Two not-found failures exhaust the inspect_file intent; the third
        // proposal is blocked and forces planner mode.
        assert_eq!(state.execution.mode, AgentMode::Planner);
        assert!(state
            .messages()
            .iter()
            .any(|m| m.role == MessageRole::System && m.content.contains("INTENT EXHAUSTED")));
        assert_eq!(count_role(&state, MessageRole::Tool), 2);
    }

    #[tokio::test]
    async fn test_rule_engine_denies_before_execution() {
        let tmp = TempDir::new().unwrap();
        let call = ToolCall::new(
            "c1",
            "write_file",
            json!({"path": "data/x.txt", "content": "rm -rf / is fun"}),
        );
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("writing", [call]),
            GatewayResponse::text("done"),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));
        let mut state = AgentState::new();
        agent.run(&mut state, "write it").await;

        let tool_message = state
            .messages()
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert!(tool_message.content.contains("RULE_BLOCKED"));
        assert!(tool_message.content.contains("Blocked by: rules"));
        assert!(!tmp.path().join("workspace/data/x.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_tool_yields_error_result() {
        let tmp = TempDir::new().unwrap();
        let call = ToolCall::new("c1", "teleport", json!({"to": "mars"}));
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("teleporting", [call]),
            GatewayResponse::text("done"),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));
        let mut state = AgentState::new();
        agent.run(&mut state, "go").await;

        let tool_message = state
            .messages()
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert!(tool_message.content.contains("TOOL_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_active_task_budget_enforcement() {
        let tmp = TempDir::new().unwrap();
        let mut queue = TaskQueue::new(tmp.path().join("workspace")).unwrap();
        let task_id = queue
            .add_task(TaskSpec::new("bounded work").with_budget(2, 20))
            .unwrap();
        queue.get_next().unwrap();

        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("first", [write_call("c1", "data/a.txt")]),
            GatewayResponse::with_tool_calls("second", [write_call("c2", "data/b.txt")]),
            GatewayResponse::with_tool_calls("third", [write_call("c3", "data/c.txt")]),
            GatewayResponse::text("should not be reached"),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp)).with_task_queue(queue);
        let mut state = AgentState::new();
        let result = agent.run(&mut state, "do the task").await;

        assert!(result.success);
        assert!(result.final_answer.contains("budget"));

        let queue = agent.task_queue().unwrap();
        let task = queue.get_task(&task_id).unwrap();
        assert_eq!(task.status, crate::queue::TaskStatus::Failed);
        assert!(task
            .metadata
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("BUDGET_EXHAUSTED"));
        assert!(queue.checkpoint_path(&task_id).exists());
        assert!(!tmp
            .path()
            .join("workspace/queue/active_task.json")
            .exists());

        // Exactly the budgeted two calls ran.
        assert_eq!(count_role(&state, MessageRole::Tool), 2);
    }

    #[tokio::test]
    async fn test_gateway_error_yields_failed_result() {
        struct BrokenGateway;

        #[async_trait::async_trait]
        impl ModelGateway for BrokenGateway {
            fn model(&self) -> &str {
                "broken"
            }
            async fn complete(
                &self,
                _messages: &[Message],
                _tools: &[crate::schemas::ToolDefinition],
            ) -> Result<GatewayResponse, crate::gateway::GatewayError> {
                Err(crate::gateway::GatewayError::RequestFailed(
                    "connection refused".into(),
                ))
            }
        }

        let tmp = TempDir::new().unwrap();
        let mut agent = AgentLoop::new(Arc::new(BrokenGateway), registry_for(&tmp));
        let mut state = AgentState::new();

        let result = agent.run(&mut state, "hello").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection refused"));
        // The step list reflects exactly what ran: nothing.
        assert_eq!(result.steps_taken, 0);
    }

    #[tokio::test]
    async fn test_max_steps_reached() {
        let tmp = TempDir::new().unwrap();
        // Endless tool proposals; the script provides three, the limit is 2.
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayResponse::with_tool_calls("w1", [write_call("c1", "data/a.txt")]),
            GatewayResponse::with_tool_calls("w2", [write_call("c2", "data/b.txt")]),
            GatewayResponse::with_tool_calls("w3", [write_call("c3", "data/c.txt")]),
        ]));

        let mut agent = AgentLoop::new(gateway, registry_for(&tmp));
        let mut state = AgentState::new();
        state.execution.max_steps = 2;

        let result = agent.run(&mut state, "loop forever").await;
        assert!(result.success);
        assert!(result.final_answer.contains("maximum number of reasoning steps"));
    }
}
