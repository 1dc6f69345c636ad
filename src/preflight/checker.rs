use std::collections::HashMap;

use crate::schemas::{AgentMode, ToolCall};

use super::{
    call_path, capability_warning, classify_intent, recovery_action, CircuitBreakerState,
    PathResolver, PathRewrite,
};

pub const PLANNER_MODE_REASON: &str = "Planner mode is active; tools disabled.";

/// Outcome of one preflight pass over a batch of proposals.
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub passed: bool,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
    pub forced_plan_mode: bool,
    /// Safe rewrites keyed by proposal id; applied by the executor.
    pub rewrites: HashMap<String, PathRewrite>,
}

/// Pre-execution validation for a batch of proposed tool calls.
///
/// Checks run in escalation order: planner mode, intent exhaustion (with
/// the OVERRIDE escape hatch), exact-repeat fingerprints, the bad-path
/// gate; the rest (rewrites, capability, recovery ladder) only produce
/// warnings.
pub struct PreflightChecker {
    pub circuit_breaker: CircuitBreakerState,
    path_resolver: PathResolver,
}

impl Default for PreflightChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl PreflightChecker {
    pub fn new() -> Self {
        Self {
            circuit_breaker: CircuitBreakerState::new(),
            path_resolver: PathResolver::new(),
        }
    }

    pub fn check(
        &mut self,
        proposals: &[ToolCall],
        mode: AgentMode,
        model_output: Option<&str>,
    ) -> PreflightResult {
        let mut result = PreflightResult::default();

        if mode == AgentMode::Planner {
            for proposal in proposals {
                result
                    .failures
                    .push(format!("{} ({})", PLANNER_MODE_REASON, proposal.name));
            }
            result.passed = result.failures.is_empty();
            return result;
        }

        let override_requested = model_output
            .map(|text| text.contains("OVERRIDE:"))
            .unwrap_or(false);

        for proposal in proposals {
            let intent = classify_intent(proposal);

            if override_requested && self.circuit_breaker.intent_failures(intent) > 0 {
                if self.circuit_breaker.use_override(intent) {
                    result
                        .warnings
                        .push(format!("OVERRIDE accepted for intent '{}'", intent));
                } else {
                    result.warnings.push(format!(
                        "OVERRIDE rejected: intent '{}' already consumed its one-shot override",
                        intent
                    ));
                }
            }

            let (exhausted, reason, _) = self.circuit_breaker.is_intent_exhausted(proposal);
            if exhausted {
                result.failures.push(format!(
                    "INTENT EXHAUSTED: {}. Stop and plan a different approach.",
                    reason.unwrap_or_default()
                ));
                result.forced_plan_mode = true;
                continue;
            }

            let (tripped, reason) = self.circuit_breaker.is_tripped(proposal);
            if tripped {
                result.failures.push(format!(
                    "CIRCUIT BREAKER: {}",
                    reason.unwrap_or_default()
                ));
                continue;
            }

            if let Some(path) = call_path(proposal) {
                if self.circuit_breaker.is_bad_path(&path) {
                    result.failures.push(format!(
                        "PATH GATE: '{}' previously failed with not-found; do not request it again",
                        path
                    ));
                    continue;
                }

                let analysis = self.path_resolver.analyze_path(&path, &proposal.name);
                if let Some(rewrite) = analysis.rewrite {
                    if rewrite.is_safe() {
                        result.warnings.push(format!(
                            "Path '{}' normalized to '{}'",
                            rewrite.original, rewrite.rewritten
                        ));
                        result.rewrites.insert(proposal.id.clone(), rewrite);
                    } else {
                        result.warnings.push(format!(
                            "Path '{}' looks off ({}); consider '{}'",
                            rewrite.original, rewrite.reason, rewrite.rewritten
                        ));
                    }
                }

                if let Some(warning) = capability_warning(&proposal.name, &path) {
                    result.warnings.push(warning);
                }
            }

            let failures = self.circuit_breaker.intent_failures(intent);
            if failures > 0 {
                let (action, advice) = recovery_action(failures);
                result
                    .warnings
                    .push(format!("Recovery ladder [{}]: {}", action, advice));
            }
        }

        result.passed = result.failures.is_empty();
        result
    }

    /// Suggest verification steps for writes that target high-impact files.
    pub fn check_verification_needed(
        &self,
        proposals: &[ToolCall],
        high_impact_only: bool,
    ) -> Vec<String> {
        const HIGH_IMPACT_MARKERS: [&str; 6] =
            [".yaml", ".yml", ".toml", ".ini", "config", "settings"];

        let mut suggestions = Vec::new();
        for proposal in proposals {
            if !matches!(proposal.name.as_str(), "write_file" | "edit_file" | "create_file") {
                continue;
            }
            let Some(path) = call_path(proposal) else {
                continue;
            };
            let lower = path.to_lowercase();
            let high_impact = HIGH_IMPACT_MARKERS.iter().any(|m| lower.contains(m));
            if high_impact || !high_impact_only {
                suggestions.push(format!(
                    "After writing '{}', read it back or run a check to verify the change",
                    path
                ));
            }
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_call(id: &str, path: &str) -> ToolCall {
        ToolCall::new(id, "read_file", json!({ "path": path }))
    }

    #[test]
    fn test_planner_mode_blocks_everything() {
        let mut checker = PreflightChecker::new();
        let calls = [
            ToolCall::new("1", "shell", json!({"command": "ls"})),
            ToolCall::new("2", "write_file", json!({"path": "x.txt", "content": ""})),
            ToolCall::new("3", "list_files", json!({"path": "."})),
        ];

        for call in &calls {
            let result = checker.check(std::slice::from_ref(call), AgentMode::Planner, None);
            assert!(!result.passed, "{} should be blocked in planner mode", call.name);
            assert!(result.failures[0].contains("Planner mode is active"));
        }
    }

    #[test]
    fn test_builder_mode_allows_clean_calls() {
        let mut checker = PreflightChecker::new();
        let result = checker.check(&[read_call("1", "test.txt")], AgentMode::Builder, None);
        assert!(result.passed);
    }

    #[test]
    fn test_fingerprint_trip_blocks() {
        let mut checker = PreflightChecker::new();
        let call = read_call("1", "test.txt");
        checker.circuit_breaker.record_failure(&call, "Error 1");
        checker.circuit_breaker.record_failure(&call, "Error 2");

        let result = checker.check(&[call], AgentMode::Builder, None);
        assert!(!result.passed);
        assert!(result.failures[0].contains("CIRCUIT BREAKER"));
    }

    #[test]
    fn test_path_gate_blocks_known_bad_path() {
        let mut checker = PreflightChecker::new();
        let call = read_call("1", "missing.txt");
        checker.circuit_breaker.record_failure(&call, "File not found");

        // Same path, different call shape: still gated.
        let other = ToolCall::new("2", "data_view", json!({"path": "missing.txt"}));
        let result = checker.check(&[other], AgentMode::Builder, None);
        assert!(!result.passed);
        assert!(result.failures[0].contains("PATH GATE"));
    }

    #[test]
    fn test_intent_exhaustion_forces_plan_mode() {
        let mut checker = PreflightChecker::new();
        for (i, path) in ["a.py", "b.py", "c.py"].iter().enumerate() {
            checker.circuit_breaker.current_step = i + 1;
            checker
                .circuit_breaker
                .record_failure(&read_call(&i.to_string(), path), "not found");
        }

        checker.circuit_breaker.current_step = 4;
        let result = checker.check(&[read_call("4", "another.py")], AgentMode::Builder, None);

        assert!(!result.passed);
        assert!(result.forced_plan_mode);
        assert!(result.failures[0].contains("INTENT EXHAUSTED"));
    }

    #[test]
    fn test_override_reenables_intent_once() {
        let mut checker = PreflightChecker::new();
        for (i, path) in ["a.py", "b.py", "c.py"].iter().enumerate() {
            checker.circuit_breaker.current_step = i + 1;
            checker
                .circuit_breaker
                .record_failure(&read_call(&i.to_string(), path), "not found");
        }

        checker.circuit_breaker.current_step = 4;
        let result = checker.check(
            &[read_call("4", "another.py")],
            AgentMode::Builder,
            Some("OVERRIDE: found the correct directory listing"),
        );
        assert!(
            result.passed
                || result
                    .warnings
                    .iter()
                    .any(|w| w.contains("OVERRIDE accepted"))
        );

        // Exhaust again; a second OVERRIDE must not clear it.
        for (i, path) in ["d.py", "e.py", "f.py"].iter().enumerate() {
            checker.circuit_breaker.current_step = 5 + i;
            checker
                .circuit_breaker
                .record_failure(&read_call(&(10 + i).to_string(), path), "not found");
        }
        let result = checker.check(
            &[read_call("20", "yet_another.py")],
            AgentMode::Builder,
            Some("OVERRIDE: please"),
        );
        assert!(!result.passed);
        assert!(result.forced_plan_mode);
    }

    #[test]
    fn test_capability_warning_emitted() {
        let mut checker = PreflightChecker::new();
        let call = ToolCall::new("1", "data_view", json!({"path": "data.json"}));
        let result = checker.check(&[call], AgentMode::Builder, None);

        assert!(result.passed);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.to_lowercase().contains("alternative")));
    }

    #[test]
    fn test_safe_rewrite_attached_not_applied() {
        let mut checker = PreflightChecker::new();
        let call = ToolCall::new(
            "call_7",
            "write_file",
            json!({"path": "workspace/workspace/out.txt", "content": "x"}),
        );
        let result = checker.check(std::slice::from_ref(&call), AgentMode::Builder, None);

        assert!(result.passed);
        let rewrite = result.rewrites.get("call_7").unwrap();
        assert!(rewrite.is_safe());
        assert_eq!(rewrite.rewritten, "workspace/out.txt");
        // The proposal itself is untouched.
        assert_eq!(call.arg_str("path"), Some("workspace/workspace/out.txt"));
    }

    #[test]
    fn test_verification_selective_for_high_impact() {
        let checker = PreflightChecker::new();

        let config = ToolCall::new("1", "write_file", json!({"path": "config.yaml"}));
        let suggestions = checker.check_verification_needed(&[config], true);
        assert_eq!(suggestions.len(), 1);

        let scratch = ToolCall::new("2", "write_file", json!({"path": "temp.txt"}));
        let suggestions = checker.check_verification_needed(&[scratch], true);
        assert!(suggestions.is_empty());
    }
}
