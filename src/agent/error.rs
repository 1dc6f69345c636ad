use thiserror::Error;

use crate::gateway::GatewayError;
use crate::queue::QueueError;
use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Error: {0}")]
    Other(String),
}
