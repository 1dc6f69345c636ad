use std::sync::Arc;

use async_trait::async_trait;
use indoc::formatdoc;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::queue::{Checkpoint, TaskBudget, TaskQueue, TaskSpec};

use super::{ToolError, ToolFunction};

fn default_max_tool_calls() -> usize {
    TaskBudget::default().max_tool_calls
}

fn default_max_steps() -> usize {
    TaskBudget::default().max_steps
}

/// Add a task to the execution queue.
pub struct QueueAdd {
    queue: Arc<Mutex<TaskQueue>>,
}

impl QueueAdd {
    pub fn new(queue: Arc<Mutex<TaskQueue>>) -> Self {
        Self { queue }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueueAddInput {
    #[schemars(description = "Clear statement of what to accomplish")]
    pub objective: String,
    #[serde(default)]
    #[schemars(description = "Input references: chunk IDs, file paths, data sources")]
    pub inputs: Vec<String>,
    #[serde(default)]
    #[schemars(description = "Acceptance criteria for task completion")]
    pub acceptance: Option<String>,
    #[serde(default)]
    #[schemars(description = "Parent task ID, for subtasks")]
    pub parent_id: Option<String>,
    #[serde(default = "default_max_tool_calls")]
    #[schemars(description = "Maximum tool calls allowed, defaults to 30")]
    pub max_tool_calls: usize,
    #[serde(default = "default_max_steps")]
    #[schemars(description = "Maximum steps allowed, defaults to 50")]
    pub max_steps: usize,
}

#[async_trait]
impl ToolFunction for QueueAdd {
    type Input = QueueAddInput;
    type Result = String;

    fn name(&self) -> String {
        "queue_add".into()
    }

    fn description(&self) -> String {
        "Add a new task to the execution queue. Use this to break down complex \
         work into bounded, resumable units."
            .into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let mut spec = TaskSpec::new(&input.objective)
            .with_inputs(input.inputs)
            .with_budget(input.max_tool_calls, input.max_steps);
        if let Some(acceptance) = input.acceptance {
            spec = spec.with_acceptance(acceptance);
        }
        if let Some(parent_id) = input.parent_id {
            spec = spec.with_parent(parent_id);
        }

        let task_id = self.queue.lock().await.add_task(spec)?;
        Ok(formatdoc! {"
            Task added to queue.

            Task ID: {task_id}
            Objective: {objective}
            Budget: {max_tool_calls} tool calls, {max_steps} steps
            Status: queued

            Use queue_next to retrieve and execute this task.",
            task_id = task_id,
            objective = input.objective,
            max_tool_calls = input.max_tool_calls,
            max_steps = input.max_steps,
        })
    }
}

/// Pop the next queued task and mark it running.
pub struct QueueNext {
    queue: Arc<Mutex<TaskQueue>>,
}

impl QueueNext {
    pub fn new(queue: Arc<Mutex<TaskQueue>>) -> Self {
        Self { queue }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueueNextInput {}

#[async_trait]
impl ToolFunction for QueueNext {
    type Input = QueueNextInput;
    type Result = String;

    fn name(&self) -> String {
        "queue_next".into()
    }

    fn description(&self) -> String {
        "Get the next queued task and mark it running. Execute ONE task, then \
         checkpoint with queue_done or queue_fail."
            .into()
    }

    async fn run(&self, _input: Self::Input) -> Result<Self::Result, ToolError> {
        let Some(task) = self.queue.lock().await.get_next()? else {
            return Ok("No queued tasks available.".into());
        };

        Ok(formatdoc! {"
            Now executing task {task_id}.

            Objective: {objective}
            Acceptance: {acceptance}
            Inputs: {inputs}
            Budget: {max_tool_calls} tool calls, {max_steps} steps

            Complete the objective, then call queue_done with a checkpoint.",
            task_id = task.task_id,
            objective = task.objective,
            acceptance = task.acceptance,
            inputs = if task.inputs.is_empty() { "none".to_string() } else { task.inputs.join(", ") },
            max_tool_calls = task.budget.max_tool_calls,
            max_steps = task.budget.max_steps,
        })
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueueDoneInput {
    #[schemars(description = "The task being completed")]
    pub task_id: String,
    #[schemars(description = "Summary of the completed work")]
    pub what_was_done: String,
    #[serde(default)]
    #[schemars(description = "Artifacts that changed: files, patch IDs")]
    pub what_changed: Vec<String>,
    #[schemars(
        description = "Next pointer: 'Next: <task_id>', 'Spawned: <task_id>', or a done marker"
    )]
    pub what_next: String,
    #[serde(default)]
    #[schemars(description = "Blockers encountered, if any")]
    pub blockers: Vec<String>,
    #[serde(default)]
    #[schemars(description = "Chunk IDs cited while doing the work")]
    pub citations: Vec<String>,
}

/// Mark a task done and write its checkpoint.
pub struct QueueDone {
    queue: Arc<Mutex<TaskQueue>>,
}

impl QueueDone {
    pub fn new(queue: Arc<Mutex<TaskQueue>>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ToolFunction for QueueDone {
    type Input = QueueDoneInput;
    type Result = String;

    fn name(&self) -> String {
        "queue_done".into()
    }

    fn description(&self) -> String {
        "Mark a task as done and save its checkpoint. All checkpoint fields are \
         required for resumability; what_next must point at the follow-up work \
         or state an explicit done marker."
            .into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let checkpoint = Checkpoint::new(&input.task_id)
            .with_done(&input.what_was_done)
            .with_changed(input.what_changed)
            .with_next(&input.what_next)
            .with_blockers(input.blockers)
            .with_citations(input.citations);

        self.queue
            .lock()
            .await
            .mark_done(&input.task_id, Some(&checkpoint))?;
        Ok(format!(
            "Task {} marked done; checkpoint saved.",
            input.task_id
        ))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueueFailInput {
    #[schemars(description = "The task being failed")]
    pub task_id: String,
    #[schemars(description = "What went wrong")]
    pub error: String,
    #[serde(default)]
    #[schemars(description = "Partial progress made before failing")]
    pub what_was_done: String,
    #[serde(default)]
    #[schemars(description = "Blockers that caused the failure")]
    pub blockers: Vec<String>,
}

/// Mark a task failed, checkpointing partial progress.
pub struct QueueFail {
    queue: Arc<Mutex<TaskQueue>>,
}

impl QueueFail {
    pub fn new(queue: Arc<Mutex<TaskQueue>>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ToolFunction for QueueFail {
    type Input = QueueFailInput;
    type Result = String;

    fn name(&self) -> String {
        "queue_fail".into()
    }

    fn description(&self) -> String {
        "Mark a task as failed, recording the error and checkpointing partial \
         progress so the work can be resumed."
            .into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let checkpoint = Checkpoint::new(&input.task_id)
            .with_done(&input.what_was_done)
            .with_next("Resolve the blockers, then requeue this work")
            .with_blockers(input.blockers);

        self.queue
            .lock()
            .await
            .mark_failed(&input.task_id, &input.error, Some(&checkpoint))?;
        Ok(format!(
            "Task {} marked failed; checkpoint saved.",
            input.task_id
        ))
    }
}

/// Register the four queue tools against one shared queue.
pub fn register_queue_tools(
    registry: &mut super::ToolRegistry,
    queue: Arc<Mutex<TaskQueue>>,
) -> Result<(), ToolError> {
    registry.register(QueueAdd::new(queue.clone()).into_boxed_tool())?;
    registry.register(QueueNext::new(queue.clone()).into_boxed_tool())?;
    registry.register(QueueDone::new(queue.clone()).into_boxed_tool())?;
    registry.register(QueueFail::new(queue).into_boxed_tool())?;
    Ok(())
}
