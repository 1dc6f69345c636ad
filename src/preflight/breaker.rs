use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schemas::ToolCall;

use super::{call_path, classify_intent};

/// A fingerprint trips after this many failures of the exact same call.
pub const FINGERPRINT_TRIP_THRESHOLD: u32 = 2;
/// An intent is exhausted once its accrued weight reaches this.
pub const INTENT_EXHAUSTION_THRESHOLD: u32 = 3;
/// A global error class trips after this many occurrences.
const ERROR_CLASS_TRIP_THRESHOLD: u32 = 3;

/// Failure classes whose recurrence is predictable from the arguments
/// alone; these weigh double in the intent breaker.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum ErrorClass {
    PathNotFound,
    PermissionDenied,
    ValidationError,
    SyntaxError,
    Other,
}

impl ErrorClass {
    pub fn is_deterministic(self) -> bool {
        self != ErrorClass::Other
    }

    fn label(self) -> &'static str {
        match self {
            ErrorClass::PathNotFound => "PATH_NOT_FOUND",
            ErrorClass::PermissionDenied => "PERMISSION_DENIED",
            ErrorClass::ValidationError => "VALIDATION_ERROR",
            ErrorClass::SyntaxError => "SYNTAX_ERROR",
            ErrorClass::Other => "OTHER",
        }
    }
}

/// Classify an error message by text pattern.
pub fn classify_error(error: &str) -> ErrorClass {
    let lower = error.to_lowercase();
    if lower.contains("not found")
        || lower.contains("no such file")
        || lower.contains("does not exist")
    {
        ErrorClass::PathNotFound
    } else if lower.contains("permission denied") || lower.contains("access denied") {
        ErrorClass::PermissionDenied
    } else if lower.contains("invalid argument") || lower.contains("validation") {
        ErrorClass::ValidationError
    } else if lower.contains("syntax error") {
        ErrorClass::SyntaxError
    } else {
        ErrorClass::Other
    }
}

/// Identity of an exact proposal: tool name plus canonical arguments.
pub fn fingerprint(tool_call: &ToolCall) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_call.name.as_bytes());
    hasher.update(canonical_json(&tool_call.arguments).as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// JSON rendering with object keys sorted at every depth, so argument
/// ordering never changes a fingerprint.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

/// Per-intent accounting.
#[derive(Debug, Default, Clone)]
pub struct IntentState {
    pub failure_count: u32,
    pub last_failure_step: usize,
    pub override_used: bool,
}

/// Failure tracking for the preflight breaker: exact-repeat loops via
/// fingerprints, "same thing ten ways" loops via intents, and a gate over
/// paths that already came back not-found.
#[derive(Debug, Default)]
pub struct CircuitBreakerState {
    pub current_step: usize,
    fingerprint_failures: HashMap<String, (u32, String)>,
    pub intent_states: HashMap<String, IntentState>,
    error_class_counts: HashMap<ErrorClass, u32>,
    bad_paths: HashSet<String>,
}

impl CircuitBreakerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed call. Returns the fingerprint failure count.
    pub fn record_failure(&mut self, tool_call: &ToolCall, error: &str) -> u32 {
        let class = classify_error(error);

        let entry = self
            .fingerprint_failures
            .entry(fingerprint(tool_call))
            .or_insert((0, String::new()));
        entry.0 += 1;
        entry.1 = error.to_string();
        let count = entry.0;

        let weight = if class.is_deterministic() { 2 } else { 1 };
        let intent = classify_intent(tool_call);
        let state = self.intent_states.entry(intent.to_string()).or_default();
        state.failure_count += weight;
        state.last_failure_step = self.current_step;

        *self.error_class_counts.entry(class).or_default() += 1;

        if class == ErrorClass::PathNotFound {
            if let Some(path) = call_path(tool_call) {
                self.bad_paths.insert(path);
            }
        }

        count
    }

    /// A success on a fingerprint resets its counter.
    pub fn record_success(&mut self, tool_call: &ToolCall) {
        self.fingerprint_failures.remove(&fingerprint(tool_call));
    }

    /// Exact-repeat check: has this precise call failed enough to block?
    pub fn is_tripped(&self, tool_call: &ToolCall) -> (bool, Option<String>) {
        if let Some((count, last_error)) = self.fingerprint_failures.get(&fingerprint(tool_call)) {
            if *count >= FINGERPRINT_TRIP_THRESHOLD {
                return (
                    true,
                    Some(format!(
                        "This exact call failed {} times (last error: {})",
                        count, last_error
                    )),
                );
            }
        }

        for (class, count) in &self.error_class_counts {
            if class.is_deterministic() && *count >= ERROR_CLASS_TRIP_THRESHOLD {
                return (
                    true,
                    Some(format!(
                        "Repeated {} errors ({} so far); change approach",
                        class.label(),
                        count
                    )),
                );
            }
        }

        (false, None)
    }

    /// Intent check: has this category of action burned its budget?
    pub fn is_intent_exhausted(
        &self,
        tool_call: &ToolCall,
    ) -> (bool, Option<String>, Option<String>) {
        let intent = classify_intent(tool_call);
        if let Some(state) = self.intent_states.get(intent) {
            if state.failure_count >= INTENT_EXHAUSTION_THRESHOLD {
                return (
                    true,
                    Some(format!(
                        "Intent '{}' has failed {} times recently (last at step {})",
                        intent, state.failure_count, state.last_failure_step
                    )),
                    Some(intent.to_string()),
                );
            }
        }
        (false, None, None)
    }

    /// One-shot escape hatch: reset an intent's weight. Returns false once
    /// the intent has already consumed its override in this conversation.
    pub fn use_override(&mut self, intent: &str) -> bool {
        let state = self.intent_states.entry(intent.to_string()).or_default();
        if state.override_used {
            return false;
        }
        state.failure_count = 0;
        state.override_used = true;
        log::info!("OVERRIDE consumed for intent '{}'", intent);
        true
    }

    pub fn is_bad_path(&self, path: &str) -> bool {
        self.bad_paths.contains(path)
    }

    pub fn intent_failures(&self, intent: &str) -> u32 {
        self.intent_states
            .get(intent)
            .map(|s| s.failure_count)
            .unwrap_or(0)
    }
}

/// The recovery ladder, surfaced as advisory warnings: retry, switch tool,
/// switch approach, then stop and plan.
pub fn recovery_action(failure_count: u32) -> (&'static str, &'static str) {
    match failure_count {
        0 | 1 => ("retry_once", "Retry once; transient failures happen."),
        2 => (
            "switch_tool",
            "Second failure: switch to a different tool for this goal.",
        ),
        3 | 4 => (
            "switch_approach",
            "Third failure: the approach is wrong; change strategy, not just arguments.",
        ),
        _ => (
            "stop_and_plan",
            "Too many failures: stop acting and write a plan before any further tool use.",
        ),
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
    fn test_fingerprint_stable_under_key_order() {
        let a = ToolCall::new("1", "t", json!({"a": 1, "b": 2}));
        let b = ToolCall::new("2", "t", json!({"b": 2, "a": 1}));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_record_failure_increments_and_success_clears() {
        let mut cb = CircuitBreakerState::new();
        let tc = read_call("1", "test.txt");

        assert_eq!(cb.record_failure(&tc, "boom"), 1);
        assert_eq!(cb.record_failure(&tc, "boom"), 2);
        let (tripped, reason) = cb.is_tripped(&tc);
        assert!(tripped);
        assert!(reason.unwrap().contains("failed 2 times"));

        cb.record_success(&tc);
        let (tripped, _) = cb.is_tripped(&tc);
        assert!(!tripped);
    }

    #[test]
    fn test_error_class_trip_across_arguments() {
        let mut cb = CircuitBreakerState::new();
        cb.record_failure(&read_call("1", "a.txt"), "File not found");
        cb.record_failure(&read_call("2", "b.txt"), "No such file");
        cb.record_failure(&read_call("3", "c.txt"), "Path does not exist");

        let (tripped, reason) = cb.is_tripped(&read_call("4", "d.txt"));
        assert!(tripped);
        assert!(reason.unwrap().contains("PATH_NOT_FOUND"));
    }

    #[test]
    fn test_intent_exhaustion_after_three_plain_failures() {
        let mut cb = CircuitBreakerState::new();
        for (i, path) in ["a.py", "b.py", "c.py"].iter().enumerate() {
            cb.current_step = i + 1;
            cb.record_failure(&read_call(&i.to_string(), path), "some error");
        }

        cb.current_step = 4;
        let (exhausted, reason, intent) = cb.is_intent_exhausted(&read_call("4", "d.py"));
        assert!(exhausted);
        assert_eq!(intent.as_deref(), Some("inspect_file"));
        assert!(reason.unwrap().to_lowercase().contains("failed"));
    }

    #[test]
    fn test_deterministic_errors_count_double() {
        let mut cb = CircuitBreakerState::new();
        cb.current_step = 1;
        cb.record_failure(&read_call("1", "missing1.py"), "file not found");
        cb.current_step = 2;
        cb.record_failure(&read_call("2", "missing2.py"), "no such file");

        let state = cb.intent_states.get("inspect_file").unwrap();
        assert!(state.failure_count >= 4);

        let (exhausted, _, _) = cb.is_intent_exhausted(&read_call("3", "missing3.py"));
        assert!(exhausted, "two not-found failures alone exhaust the intent");
    }

    #[test]
    fn test_override_resets_once() {
        let mut cb = CircuitBreakerState::new();
        for i in 0..3 {
            cb.current_step = i + 1;
            cb.record_failure(&read_call(&i.to_string(), &format!("f{}.py", i)), "err");
        }

        assert!(cb.use_override("inspect_file"));
        let (exhausted, _, _) = cb.is_intent_exhausted(&read_call("9", "new.py"));
        assert!(!exhausted);

        assert!(!cb.use_override("inspect_file"), "override is one-shot");
    }

    #[test]
    fn test_bad_path_tracking() {
        let mut cb = CircuitBreakerState::new();
        cb.record_failure(&read_call("1", "missing.txt"), "File not found");
        assert!(cb.is_bad_path("missing.txt"));
        assert!(!cb.is_bad_path("other.txt"));
    }

    #[test]
    fn test_recovery_ladder() {
        assert_eq!(recovery_action(1).0, "retry_once");
        assert_eq!(recovery_action(2).0, "switch_tool");
        assert_eq!(recovery_action(3).0, "switch_approach");
        assert_eq!(recovery_action(5).0, "stop_and_plan");
    }
}
