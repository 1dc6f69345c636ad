use crate::schemas::{ToolCall, ToolResult};
use crate::utils::helper::truncate;

/// Grep-able tool-call tracing keyed by run id and call id.
///
/// Format:
/// `[run_id=X] [tool_call_id=Y] CALL Tool={name} Args={...}`
/// `[run_id=X] [tool_call_id=Y] RESULT success Tool={name} elapsed={ms}ms`
pub struct TraceLog {
    run_id: String,
}

impl TraceLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn log_tool_call(&self, tool_call: &ToolCall) {
        let args = truncate(&tool_call.arguments.to_string(), 200);
        log::info!(
            "[run_id={}] [tool_call_id={}] CALL Tool={} Args={}",
            self.run_id,
            tool_call.id,
            tool_call.name,
            args
        );
    }

    pub fn log_tool_result(&self, result: &ToolResult, elapsed_ms: f64, tool_name: &str) {
        if result.success {
            log::info!(
                "[run_id={}] [tool_call_id={}] RESULT success Tool={} elapsed={:.1}ms output_len={}",
                self.run_id,
                result.tool_call_id,
                tool_name,
                elapsed_ms,
                result.output.len()
            );
        } else {
            let error = result
                .error
                .as_deref()
                .map(|e| truncate(&e.replace('\n', " "), 100))
                .unwrap_or_default();
            log::info!(
                "[run_id={}] [tool_call_id={}] RESULT error Tool={} elapsed={:.1}ms error=\"{}\"",
                self.run_id,
                result.tool_call_id,
                tool_name,
                elapsed_ms,
                error
            );
        }
    }

    pub fn log_budget_exhausted(&self, skipped_tools: usize) {
        log::warn!(
            "[run_id={}] BUDGET_EXHAUSTED skipped={} tools",
            self.run_id,
            skipped_tools
        );
    }

    pub fn log_step(&self, step_num: usize, max_steps: usize) {
        log::debug!("[run_id={}] STEP {}/{}", self.run_id, step_num, max_steps);
    }
}
