use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ToolCall, ToolResult};

/// Enum `StepKind` classifies a step in agent execution.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum StepKind {
    #[serde(rename = "think")]
    Think,
    #[serde(rename = "call_tool")]
    CallTool,
    #[serde(rename = "observe")]
    Observe,
    #[serde(rename = "respond")]
    Respond,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Think => write!(f, "think"),
            StepKind::CallTool => write!(f, "call_tool"),
            StepKind::Observe => write!(f, "observe"),
            StepKind::Respond => write!(f, "respond"),
            StepKind::Error => write!(f, "error"),
        }
    }
}

/// A single step in agent execution. Ordered and append-only within an
/// execution context.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
}

impl Step {
    pub fn new(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
        }
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::new(StepKind::Think, content)
    }

    pub fn respond(content: impl Into<String>) -> Self {
        Self::new(StepKind::Respond, content)
    }

    pub fn call_tool(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            kind: StepKind::CallTool,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_results: None,
        }
    }

    pub fn observe(content: impl Into<String>, tool_results: Vec<ToolResult>) -> Self {
        Self {
            kind: StepKind::Observe,
            content: content.into(),
            tool_calls: None,
            tool_results: Some(tool_results),
        }
    }
}
