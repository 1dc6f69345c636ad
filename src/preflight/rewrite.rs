use serde_json::Value;

use crate::schemas::ToolCall;

/// How safe it is to apply a computed rewrite automatically. Anything other
/// than `Safe` is advisory only.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RewriteSafety {
    Safe,
    Advisory,
}

/// A path normalization computed at preflight and applied by the executor.
/// Preflight never mutates the model's arguments directly.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pub original: String,
    pub rewritten: String,
    pub safety: RewriteSafety,
    pub reason: String,
}

impl PathRewrite {
    pub fn new(
        original: impl Into<String>,
        rewritten: impl Into<String>,
        safety: RewriteSafety,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            original: original.into(),
            rewritten: rewritten.into(),
            safety,
            reason: reason.into(),
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safety == RewriteSafety::Safe
    }

    /// Produce a copy of the proposal with the rewrite applied to whichever
    /// path-bearing argument matches the original value.
    pub fn apply(&self, tool_call: &ToolCall) -> ToolCall {
        let mut rewritten = tool_call.clone();
        if let Value::Object(map) = &mut rewritten.arguments {
            for key in ["path", "file_path", "file"] {
                if map.get(key).and_then(Value::as_str) == Some(self.original.as_str()) {
                    map.insert(key.into(), Value::String(self.rewritten.clone()));
                }
            }
        }
        rewritten
    }
}

/// Analysis of one requested path.
#[derive(Debug, Clone)]
pub struct PathAnalysis {
    pub original: String,
    pub normalized_path: String,
    pub needs_rewrite: bool,
    pub rewrite: Option<PathRewrite>,
}

/// Computes normalizable forms of requested paths: redundant
/// `workspace/workspace/` collapse, backslash and duplicate-slash
/// normalization.
#[derive(Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_path(&self, path: &str, _tool_name: &str) -> PathAnalysis {
        let mut normalized = path.replace('\\', "/");
        while normalized.contains("//") {
            normalized = normalized.replace("//", "/");
        }
        while normalized.starts_with("workspace/workspace/") {
            normalized = normalized["workspace/".len()..].to_string();
        }

        if normalized == path {
            return PathAnalysis {
                original: path.to_string(),
                normalized_path: normalized,
                needs_rewrite: false,
                rewrite: None,
            };
        }

        let rewrite = PathRewrite::new(
            path,
            normalized.clone(),
            RewriteSafety::Safe,
            "path normalization (slashes, redundant workspace prefix)",
        );
        PathAnalysis {
            original: path.to_string(),
            normalized_path: normalized,
            needs_rewrite: true,
            rewrite: Some(rewrite),
        }
    }
}
