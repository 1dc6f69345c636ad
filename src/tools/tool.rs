use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::schemas::{ToolDefinition, ToolResult};

use super::ToolError;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A named handler the agent can invoke.
///
/// Handlers execute and return data; they never reason. The executor
/// validates arguments against `parameters()` (root type must be `object`)
/// before `execute` runs, and stamps the call id onto the result afterwards.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> String;

    /// What the tool does, shown to the model.
    fn description(&self) -> String;

    /// JSON schema of the parameters; root type must be `object`.
    fn parameters(&self) -> Value;

    /// Wall-clock budget for one invocation.
    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    /// Execute with validated arguments. Errors are converted to failed
    /// results by the executor, never propagated to the loop.
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError>;

    /// The wire definition handed to the gateway each turn.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}
