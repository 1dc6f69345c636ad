use std::fmt;

use crate::preflight::call_path;
use crate::schemas::{Step, StepKind, ToolResult};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Result of a verification check. Advisory; judgments never block.
#[derive(Debug, Clone)]
pub struct Judgment {
    pub passed: bool,
    pub reason: String,
    pub severity: Severity,
    pub suggestion: Option<String>,
}

impl Judgment {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
            severity: Severity::Info,
            suggestion: None,
        }
    }

    fn advise(
        reason: impl Into<String>,
        severity: Severity,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            severity,
            suggestion: Some(suggestion.into()),
        }
    }
}

const WRITE_TOOLS: [&str; 3] = ["write_file", "edit_file", "create_file"];
const TEST_MARKERS: [&str; 6] = [
    "pytest", "unittest", "cargo test", "npm test", "yarn test", "go test",
];

/// Pure inspection over the step list after each tool batch. The judge
/// never executes and never blocks; it only produces advisory judgments
/// that the loop turns into system messages.
#[derive(Default)]
pub struct AgentJudge;

impl AgentJudge {
    pub fn new() -> Self {
        Self
    }

    /// Repeated failures in the last few observations mean the agent is
    /// spinning.
    pub fn check_progress(&self, steps: &[Step]) -> Judgment {
        if steps.is_empty() {
            return Judgment::pass("Just started");
        }

        let recent_errors = steps
            .iter()
            .rev()
            .take(3)
            .filter(|s| {
                s.kind == StepKind::Observe
                    && s.tool_results
                        .as_ref()
                        .and_then(|r| r.first())
                        .map(|r| !r.success)
                        .unwrap_or(false)
            })
            .count();

        if recent_errors >= 2 {
            return Judgment::advise(
                "Multiple tool failures in a row",
                Severity::Warning,
                "Consider trying a different approach",
            );
        }
        Judgment::pass("Making progress")
    }

    /// The same tool three times in a row is usually a loop.
    pub fn check_tool_loop(&self, steps: &[Step]) -> Judgment {
        let tool_names: Vec<&str> = steps
            .iter()
            .filter_map(|s| s.tool_calls.as_ref())
            .flatten()
            .map(|tc| tc.name.as_str())
            .collect();

        if tool_names.len() >= 3 {
            let recent = &tool_names[tool_names.len() - 3..];
            if recent.iter().all(|name| *name == recent[0]) {
                return Judgment::advise(
                    format!("Repeating same tool: {}", recent[0]),
                    Severity::Warning,
                    "Try a different tool or approach",
                );
            }
        }
        Judgment::pass("No loops detected")
    }

    /// Sanity-check one tool result.
    pub fn check_tool_result(&self, result: &ToolResult) -> Judgment {
        if !result.success {
            return Judgment::advise(
                format!("Tool failed: {}", result.error.as_deref().unwrap_or("")),
                Severity::Warning,
                "Read the error before retrying",
            );
        }
        if result.output.trim().is_empty() {
            return Judgment {
                passed: true,
                reason: "Tool returned empty output".into(),
                severity: Severity::Info,
                suggestion: Some("Verify this was expected".into()),
            };
        }
        Judgment::pass("Tool result looks good")
    }

    /// Code written without a test run afterwards.
    pub fn check_workflow_discipline(&self, steps: &[Step]) -> Judgment {
        let mut last_write = None;
        let mut last_test = None;

        for (i, step) in steps.iter().enumerate() {
            let Some(calls) = &step.tool_calls else {
                continue;
            };
            for call in calls {
                if WRITE_TOOLS.contains(&call.name.as_str()) && is_code_path(call_path(call)) {
                    last_write = Some(i);
                }
                let command = call
                    .arg_str("command")
                    .or_else(|| call.arg_str("cmd"))
                    .unwrap_or_default()
                    .to_lowercase();
                if TEST_MARKERS.iter().any(|kw| command.contains(kw)) {
                    last_test = Some(i);
                }
            }
        }

        match (last_write, last_test) {
            (Some(write), Some(test)) if test > write => Judgment::pass("Tests follow writes"),
            (Some(_), _) => Judgment::advise(
                "Code was written but no tests were run afterwards",
                Severity::Warning,
                "Run the test suite before building on this change",
            ),
            _ => Judgment::pass("No code writes yet"),
        }
    }

    /// Direct writes aimed outside the workspace must go through the patch
    /// flow instead.
    pub fn check_patch_discipline(&self, steps: &[Step]) -> Judgment {
        for step in steps {
            let Some(calls) = &step.tool_calls else {
                continue;
            };
            for call in calls {
                if !WRITE_TOOLS.contains(&call.name.as_str()) {
                    continue;
                }
                let Some(path) = call_path(call) else {
                    continue;
                };
                if path.starts_with("..") || path.starts_with('/') {
                    return Judgment::advise(
                        format!("Direct write attempted outside the workspace: {}", path),
                        Severity::Warning,
                        "Propose project changes with create_patch instead of writing directly",
                    );
                }
            }
        }
        Judgment::pass("Patch discipline respected")
    }

    /// Quality check over the final answer.
    pub fn check_final_answer(&self, answer: &str, steps: &[Step]) -> Judgment {
        if answer.trim().len() < 10 {
            return Judgment::advise(
                "Answer is very short",
                Severity::Warning,
                "Consider providing more detail",
            );
        }
        let used_tools = steps.iter().any(|s| s.kind == StepKind::Observe);
        if used_tools && !answer.to_lowercase().contains("tool") {
            return Judgment {
                passed: true,
                reason: "Answer doesn't mention tool usage".into(),
                severity: Severity::Info,
                suggestion: Some("Consider explaining how you used tools".into()),
            };
        }
        Judgment::pass("Answer quality looks good")
    }
}

fn is_code_path(path: Option<String>) -> bool {
    const CODE_EXTENSIONS: [&str; 6] = [".py", ".rs", ".js", ".ts", ".go", ".sh"];
    path.map(|p| {
        let lower = p.to_lowercase();
        CODE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    })
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ToolCall;
    use serde_json::json;

    fn observe_failure() -> Step {
        Step::observe("err", vec![ToolResult::err("c", "boom")])
    }

    fn call_step(name: &str, args: serde_json::Value) -> Step {
        Step::call_tool("", vec![ToolCall::new("c", name, args)])
    }

    #[test]
    fn test_progress_flags_repeated_failures() {
        let judge = AgentJudge::new();
        let steps = vec![observe_failure(), observe_failure()];
        let judgment = judge.check_progress(&steps);
        assert!(!judgment.passed);
        assert_eq!(judgment.severity, Severity::Warning);
    }

    #[test]
    fn test_tool_loop_detection() {
        let judge = AgentJudge::new();
        let steps = vec![
            call_step("read_file", json!({"path": "a"})),
            call_step("read_file", json!({"path": "b"})),
            call_step("read_file", json!({"path": "c"})),
        ];
        let judgment = judge.check_tool_loop(&steps);
        assert!(!judgment.passed);
        assert!(judgment.reason.contains("read_file"));

        let varied = vec![
            call_step("read_file", json!({})),
            call_step("list_files", json!({})),
            call_step("read_file", json!({})),
        ];
        assert!(judge.check_tool_loop(&varied).passed);
    }

    #[test]
    fn test_empty_output_is_advisory_only() {
        let judge = AgentJudge::new();
        let judgment = judge.check_tool_result(&ToolResult::ok("c", "  "));
        assert!(judgment.passed);
        assert!(judgment.suggestion.is_some());
    }

    #[test]
    fn test_workflow_discipline_wants_tests_after_writes() {
        let judge = AgentJudge::new();

        let write_only = vec![call_step(
            "write_file",
            json!({"path": "lib.rs", "content": "fn x() {}"}),
        )];
        let judgment = judge.check_workflow_discipline(&write_only);
        assert!(!judgment.passed);

        let write_then_test = vec![
            call_step("write_file", json!({"path": "lib.rs", "content": ""})),
            call_step("shell", json!({"command": "cargo test"})),
        ];
        assert!(judge.check_workflow_discipline(&write_then_test).passed);

        let doc_write = vec![call_step(
            "write_file",
            json!({"path": "notes.md", "content": "x"}),
        )];
        assert!(judge.check_workflow_discipline(&doc_write).passed);
    }

    #[test]
    fn test_patch_discipline_flags_escapes() {
        let judge = AgentJudge::new();
        let steps = vec![call_step(
            "write_file",
            json!({"path": "../engine/core.rs", "content": "x"}),
        )];
        let judgment = judge.check_patch_discipline(&steps);
        assert!(!judgment.passed);
        assert!(judgment.suggestion.as_deref().unwrap().contains("create_patch"));
    }
}
