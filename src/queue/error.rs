use thiserror::Error;

use super::TaskStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {task_id} is already terminal ({status})")]
    AlreadyTerminal { task_id: String, status: TaskStatus },

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}
