use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Task execution status. `Done` and `Failed` are terminal.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum TaskStatus {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "done")]
    Done,
    #[serde(rename = "failed")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Hard limits a task carries into the loop.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TaskBudget {
    pub max_tool_calls: usize,
    pub max_steps: usize,
}

impl Default for TaskBudget {
    fn default() -> Self {
        Self {
            max_tool_calls: 30,
            max_steps: 50,
        }
    }
}

/// A bounded unit of work: the atomic thing the queue distributes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskPacket {
    pub task_id: String,
    pub parent_id: Option<String>,
    pub objective: String,
    pub inputs: Vec<String>,
    pub acceptance: String,
    pub budget: TaskBudget,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
    pub metadata: Map<String, Value>,
}

/// Builder for a new task; everything except the objective is optional.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub objective: String,
    pub inputs: Vec<String>,
    pub acceptance: String,
    pub parent_id: Option<String>,
    pub budget: TaskBudget,
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            inputs: Vec::new(),
            acceptance: "Task completed successfully".into(),
            parent_id: None,
            budget: TaskBudget::default(),
            metadata: Map::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_acceptance(mut self, acceptance: impl Into<String>) -> Self {
        self.acceptance = acceptance.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_budget(mut self, max_tool_calls: usize, max_steps: usize) -> Self {
        self.budget = TaskBudget {
            max_tool_calls,
            max_steps,
        };
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
