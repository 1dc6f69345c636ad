use serde::{Deserialize, Serialize};

use crate::schemas::ToolCall;

/// Token accounting reported by the gateway, when available.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completion from the model: text plus any proposed tool calls.
///
/// An empty `tool_calls` list means the text is a final answer.
#[derive(Debug, Default, Clone)]
pub struct GatewayResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl GatewayResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".into()),
            usage: None,
        }
    }

    pub fn with_tool_calls(
        content: impl Into<String>,
        tool_calls: impl IntoIterator<Item = ToolCall>,
    ) -> Self {
        Self {
            content: content.into(),
            tool_calls: tool_calls.into_iter().collect(),
            finish_reason: Some("tool_calls".into()),
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
