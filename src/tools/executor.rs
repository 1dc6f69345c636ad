use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::preflight::PathRewrite;
use crate::schemas::{ToolCall, ToolResult};

use super::{Tool, ToolError};

/// Configuration for tool execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Overrides each tool's own timeout when set.
    pub timeout_override: Option<Duration>,
    pub log_args: bool,
    pub log_results: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_override: None,
            log_args: true,
            log_results: true,
        }
    }
}

/// Safe tool executor: validates arguments, enforces timeouts, converts
/// every failure into a result envelope, and stamps the proposal's call id
/// onto the result. Never panics or propagates into the model call path.
#[derive(Default)]
pub struct ToolExecutor {
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub async fn execute(
        &self,
        tool: &dyn Tool,
        tool_call: &ToolCall,
        rewrite: Option<&PathRewrite>,
    ) -> ToolResult {
        // Preflight computes rewrites; only the executor applies them, and
        // only the SAFE ones.
        let effective = match rewrite {
            Some(rewrite) if rewrite.is_safe() => rewrite.apply(tool_call),
            _ => tool_call.clone(),
        };

        if self.config.log_args {
            log::info!(
                "Executing {} with args: {}",
                tool.name(),
                crate::utils::helper::truncate(&effective.arguments.to_string(), 200)
            );
        }

        let Some(arguments) = effective.arguments.as_object() else {
            return ToolResult::err(
                &tool_call.id,
                ToolError::InvalidArguments("arguments must be a JSON object".into())
                    .to_envelope()
                    .to_string(),
            );
        };

        if let Some(error) = validate_arguments(&tool.parameters(), arguments) {
            return ToolResult::err(
                &tool_call.id,
                ToolError::InvalidArguments(error).to_envelope().to_string(),
            );
        }

        let timeout = self.config.timeout_override.unwrap_or_else(|| tool.timeout());
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, tool.execute(arguments)).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(Ok(mut result)) => {
                // Handlers may omit the back-reference; the executor owns it.
                result.tool_call_id = tool_call.id.clone();
                result
            }
            Ok(Err(error)) => ToolResult::err(&tool_call.id, error.to_envelope().to_string()),
            Err(_) => {
                log::error!(
                    "Tool {} timed out after {}s",
                    tool.name(),
                    timeout.as_secs()
                );
                ToolResult::err(
                    &tool_call.id,
                    ToolError::Timeout(timeout.as_secs())
                        .to_envelope()
                        .to_string(),
                )
            }
        };

        if self.config.log_results {
            if result.success {
                log::info!(
                    "Tool {} succeeded ({:.1}ms)",
                    tool.name(),
                    elapsed_ms
                );
            } else {
                log::warn!(
                    "Tool {} failed ({:.1}ms): {}",
                    tool.name(),
                    elapsed_ms,
                    result.error.as_deref().unwrap_or("")
                );
            }
        }

        result
    }
}

/// Generic argument validation against the declared schema. Returns the
/// first violation, or `None` when the arguments conform.
fn validate_arguments(schema: &Value, arguments: &Map<String, Value>) -> Option<String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            log::warn!("Skipping validation, schema failed to compile: {}", e);
            return None;
        }
    };

    let instance = Value::Object(arguments.clone());
    validator
        .validate(&instance)
        .err()
        .map(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::RewriteSafety;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> String {
            "echo".into()
        }
        fn description(&self) -> String {
            "Echo the text argument".into()
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
            let text = arguments.get("text").and_then(Value::as_str).unwrap_or("");
            // Deliberately leaves the call id blank; the executor stamps it.
            Ok(ToolResult::ok("", text))
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> String {
            "slow".into()
        }
        fn description(&self) -> String {
            "Sleeps".into()
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }
        async fn execute(&self, _arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::ok("", "never"))
        }
    }

    struct Exploding;

    #[async_trait]
    impl Tool for Exploding {
        fn name(&self) -> String {
            "exploding".into()
        }
        fn description(&self) -> String {
            "Always fails".into()
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionError("kaboom".into()))
        }
    }

    #[tokio::test]
    async fn test_success_stamps_call_id() {
        let executor = ToolExecutor::new();
        let call = ToolCall::new("call_42", "echo", json!({"text": "hi"}));
        let result = executor.execute(&Echo, &call, None).await;

        assert!(result.success);
        assert_eq!(result.tool_call_id, "call_42");
        assert_eq!(result.output, "hi");
    }

    #[tokio::test]
    async fn test_missing_required_argument_fails_validation() {
        let executor = ToolExecutor::new();
        let call = ToolCall::new("call_1", "echo", json!({}));
        let result = executor.execute(&Echo, &call, None).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("Invalid arguments"));
        assert_eq!(result.tool_call_id, "call_1");
    }

    #[tokio::test]
    async fn test_timeout_synthesizes_result() {
        let executor = ToolExecutor::new();
        let call = ToolCall::new("call_1", "slow", json!({}));
        let result = executor.execute(&Slow, &call, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("TIMED_OUT"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_envelope() {
        let executor = ToolExecutor::new();
        let call = ToolCall::new("call_1", "exploding", json!({}));
        let result = executor.execute(&Exploding, &call, None).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("EXECUTION_ERROR"));
        assert!(error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_safe_rewrite_is_applied() {
        let executor = ToolExecutor::new();
        let call = ToolCall::new(
            "call_1",
            "echo",
            json!({"text": "x", "path": "workspace/workspace/a.txt"}),
        );
        let rewrite = PathRewrite::new(
            "workspace/workspace/a.txt",
            "a.txt",
            RewriteSafety::Safe,
            "redundant workspace prefix",
        );
        let result = executor.execute(&Echo, &call, Some(&rewrite)).await;
        assert!(result.success);
        // The original proposal is untouched.
        assert_eq!(call.arg_str("path"), Some("workspace/workspace/a.txt"));
    }
}
