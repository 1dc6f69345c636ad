use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Message, Step};

/// Generate a run id of the form `run_<timestamp>_<uuid8>`, grep-able in
/// trace logs.
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().timestamp();
    let short = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", timestamp, &short[..8])
}

pub fn generate_conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}

/// Enum `AgentMode` gates tool execution: `Planner` disables tools entirely,
/// `Builder` allows them.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum AgentMode {
    #[serde(rename = "planner")]
    Planner,
    #[serde(rename = "builder")]
    Builder,
}

/// State of a conversation: the full message history plus bookkeeping.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: generate_conversation_id(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Context for a single agent execution run.
///
/// Invariants: `current_step <= max_steps`, `tools_used_this_step <=
/// max_tools_per_step`, and appending a step resets the per-step tool
/// counter. In planner mode no tool may execute.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub conversation_id: String,
    pub current_step: usize,
    pub max_steps: usize,
    pub max_tools_per_step: usize,
    pub tools_used_this_step: usize,
    pub mode: AgentMode,
    pub steps: Vec<Step>,
    pub started_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            run_id: generate_run_id(),
            conversation_id: conversation_id.into(),
            current_step: 0,
            max_steps: 50,
            max_tools_per_step: 10,
            tools_used_this_step: 0,
            mode: AgentMode::Builder,
            steps: Vec::new(),
            started_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_tools_per_step(mut self, max_tools_per_step: usize) -> Self {
        self.max_tools_per_step = max_tools_per_step;
        self
    }

    /// Append a step to the history. This is the step boundary: the per-step
    /// tool counter resets here and nowhere else.
    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
        self.current_step += 1;
        self.tools_used_this_step = 0;
    }

    pub fn should_continue(&self) -> bool {
        self.current_step < self.max_steps
    }

    pub fn can_use_tool(&self) -> bool {
        self.tools_used_this_step < self.max_tools_per_step
    }

    pub fn record_tool_use(&mut self) {
        self.tools_used_this_step += 1;
    }

    pub fn is_planner_mode(&self) -> bool {
        self.mode == AgentMode::Planner
    }

    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }
}

/// Main state object handed to the agent loop: one conversation plus the
/// execution context for the current turn.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub conversation: ConversationState,
    pub execution: ExecutionContext,
}

impl AgentState {
    pub fn new() -> Self {
        let conversation = ConversationState::new();
        let execution = ExecutionContext::new(conversation.id.clone());
        Self {
            conversation,
            execution,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn steps(&self) -> &[Step] {
        &self.execution.steps
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::StepKind;

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id();
        assert!(id.starts_with("run_"));
        assert_eq!(id.split('_').count(), 3);
    }

    #[test]
    fn test_step_boundary_resets_tool_counter() {
        let mut ctx = ExecutionContext::new("conv_test").with_max_tools_per_step(2);
        ctx.record_tool_use();
        ctx.record_tool_use();
        assert!(!ctx.can_use_tool());

        ctx.add_step(Step::new(StepKind::Think, "replanning"));
        assert_eq!(ctx.tools_used_this_step, 0);
        assert!(ctx.can_use_tool());
    }

    #[test]
    fn test_should_continue_honors_step_limit() {
        let mut ctx = ExecutionContext::new("conv_test").with_max_steps(1);
        assert!(ctx.should_continue());
        ctx.add_step(Step::new(StepKind::Think, ""));
        assert!(!ctx.should_continue());
    }

    #[test]
    fn test_planner_mode() {
        let mut ctx = ExecutionContext::new("conv_test");
        assert!(!ctx.is_planner_mode());
        ctx.set_mode(AgentMode::Planner);
        assert!(ctx.is_planner_mode());
    }
}
