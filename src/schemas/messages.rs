use std::fmt;

use serde::{Deserialize, Serialize};

use super::{MessageRole, ToolCall};

/// Struct `Message` represents a single message in a conversation.
///
/// Messages are immutable once appended to a conversation: mutation happens
/// by appending new messages, never by editing history.
///
/// # Usage
/// ```rust,ignore
/// let user_message = Message::new_user_message("Hello");
/// let system_message = Message::new_system_message("System alert");
/// let assistant_message = Message::new_assistant_message("Response");
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// For tool messages, the id of the call this message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For assistant messages, the calls the model proposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn new<T: fmt::Display>(role: MessageRole, content: T) -> Self {
        Message {
            role,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn new_system_message<T: fmt::Display>(content: T) -> Self {
        Message::new(MessageRole::System, content)
    }

    pub fn new_user_message<T: fmt::Display>(content: T) -> Self {
        Message::new(MessageRole::User, content)
    }

    pub fn new_assistant_message<T: fmt::Display>(content: T) -> Self {
        Message::new(MessageRole::Assistant, content)
    }

    pub fn new_tool_message<T: fmt::Display, S: Into<String>>(id: S, content: T) -> Self {
        Message {
            role: MessageRole::Tool,
            content: content.to_string(),
            tool_call_id: Some(id.into()),
            tool_calls: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: impl IntoIterator<Item = ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls.into_iter().collect());
        self
    }

    pub fn messages_to_string(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<String>>()
            .join("\n")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tool_calls) = &self.tool_calls {
            write!(
                f,
                "Tool call:\n{}",
                serde_json::to_string_pretty(&tool_calls)
                    .unwrap_or("Tool call details unknown".into())
            )
        } else {
            write!(f, "{}: {}", self.role, self.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_keeps_call_id() {
        let message = Message::new_tool_message("call_1", "output text");
        assert_eq!(message.role, MessageRole::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content, "output text");
    }

    #[test]
    fn test_display_plain_message() {
        let message = Message::new_user_message("hi");
        assert_eq!(message.to_string(), "user: hi");
    }
}
