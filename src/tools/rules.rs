use serde_json::Value;

use crate::schemas::ToolCall;

/// Outcome of one rule against one proposal.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RuleDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone)]
pub struct RuleViolation {
    pub rule_name: String,
    pub reason: String,
}

/// A pure, fast check over a proposal's name and arguments. Rules never
/// execute anything.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, tool_call: &ToolCall) -> RuleDecision;

    fn violation(&self, tool_call: &ToolCall) -> RuleViolation;
}

/// Denies a proposal when any forbidden substring appears in the tool name
/// or any string argument, at any nesting depth.
pub struct ForbiddenPatternRule {
    name: String,
    patterns: Vec<String>,
}

impl ForbiddenPatternRule {
    pub fn new(name: impl Into<String>, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    fn value_matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.patterns.iter().any(|p| s.contains(p.as_str())),
            Value::Array(items) => items.iter().any(|v| self.value_matches(v)),
            Value::Object(map) => map.values().any(|v| self.value_matches(v)),
            _ => false,
        }
    }
}

impl Rule for ForbiddenPatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, tool_call: &ToolCall) -> RuleDecision {
        let name_hit = self
            .patterns
            .iter()
            .any(|p| tool_call.name.contains(p.as_str()));
        if name_hit || self.value_matches(&tool_call.arguments) {
            RuleDecision::Deny
        } else {
            RuleDecision::Allow
        }
    }

    fn violation(&self, tool_call: &ToolCall) -> RuleViolation {
        RuleViolation {
            rule_name: self.name.clone(),
            reason: format!(
                "Tool call '{}' matches forbidden pattern",
                tool_call.name
            ),
        }
    }
}

/// Evaluates every rule against a proposal; any deny-vote blocks it.
#[derive(Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn evaluate(&self, tool_call: &ToolCall) -> (bool, Vec<RuleViolation>) {
        let violations: Vec<RuleViolation> = self
            .rules
            .iter()
            .filter(|rule| rule.evaluate(tool_call) == RuleDecision::Deny)
            .map(|rule| rule.violation(tool_call))
            .collect();
        (violations.is_empty(), violations)
    }
}

/// The stock safety rules every loop starts with.
pub fn default_rule_engine() -> RuleEngine {
    RuleEngine::new(vec![
        Box::new(ForbiddenPatternRule::new(
            "no_dangerous_commands",
            ["rm -rf /", "dd if=", "mkfs", "> /dev/"],
        )),
        Box::new(ForbiddenPatternRule::new(
            "no_sensitive_files",
            ["/etc/passwd", "/etc/shadow", ".ssh/id_rsa", ".env"],
        )),
    ])
}
