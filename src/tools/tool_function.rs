use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use schemars::{gen::SchemaGenerator, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::schemas::ToolResult;

use super::{Tool, ToolError, DEFAULT_TOOL_TIMEOUT};

/// Typed flavor of [`Tool`]: declare an input struct deriving
/// `Deserialize` + `JsonSchema` and the parameter schema and argument
/// parsing come for free.
///
/// Example implementation:
/// ```rust,ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct Input { path: String }
///
/// #[async_trait]
/// impl ToolFunction for ReadFile {
///     type Input = Input;
///     type Result = String;
///     fn name(&self) -> String { "read_file".into() }
///     fn description(&self) -> String { "Read a workspace file".into() }
///     async fn run(&self, input: Input) -> Result<String, ToolError> { ... }
/// }
/// ```
#[async_trait]
pub trait ToolFunction: Send + Sync
where
    Self: Sized + 'static,
{
    type Input: DeserializeOwned + JsonSchema + Send + Sync;
    type Result: Display + Send + Sync;

    fn name(&self) -> String;

    fn description(&self) -> String;

    fn parameters(&self) -> Value {
        let schema = SchemaGenerator::default().into_root_schema_for::<Self::Input>();
        serde_json::to_value(schema).unwrap_or_else(|_| {
            serde_json::json!({ "type": "object", "properties": {} })
        })
    }

    fn timeout(&self) -> Duration {
        DEFAULT_TOOL_TIMEOUT
    }

    /// Executes the core functionality of the tool.
    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError>;

    fn into_boxed_tool(self) -> Box<dyn Tool> {
        Box::new(ToolWrapper::new(self))
    }
}

#[repr(transparent)]
pub struct ToolWrapper<T>
where
    T: ToolFunction,
{
    tool: T,
}

impl<T> ToolWrapper<T>
where
    T: ToolFunction,
{
    pub fn new(tool: T) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl<T> Tool for ToolWrapper<T>
where
    T: ToolFunction,
{
    fn name(&self) -> String {
        self.tool.name()
    }

    fn description(&self) -> String {
        self.tool.description()
    }

    fn parameters(&self) -> Value {
        self.tool.parameters()
    }

    fn timeout(&self) -> Duration {
        self.tool.timeout()
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let input: T::Input = serde_json::from_value(Value::Object(arguments.clone()))?;
        let output = self.tool.run(input).await?;
        Ok(ToolResult::ok("", output.to_string()))
    }
}
