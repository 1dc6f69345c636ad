use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation proposed by the model.
///
/// Produced by the gateway from the wire representation and never mutated
/// afterwards; safe rewrites are carried alongside the proposal, not written
/// into it.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Argument lookup that tolerates a missing or non-object argument map.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Wire shape of the `function` member of a proposal: the arguments arrive as
/// a JSON-encoded string.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Wire shape of a tool-call proposal as sent by OpenAI-style gateways.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolCallWire {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl TryFrom<ToolCallWire> for ToolCall {
    type Error = serde_json::Error;

    fn try_from(value: ToolCallWire) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            name: value.function.name,
            arguments: serde_json::from_str(&value.function.arguments)?,
        })
    }
}

impl TryFrom<ToolCall> for ToolCallWire {
    type Error = serde_json::Error;

    fn try_from(value: ToolCall) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            call_type: "function".into(),
            function: FunctionCall {
                name: value.name,
                arguments: serde_json::to_string(&value.arguments)?,
            },
        })
    }
}

impl Serialize for ToolCall {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire: ToolCallWire = self
            .clone()
            .try_into()
            .map_err(serde::ser::Error::custom)?;
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ToolCall {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = ToolCallWire::deserialize(deserializer)?;
        wire.try_into().map_err(serde::de::Error::custom)
    }
}

impl Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.name,
            serde_json::to_string(&self.arguments).unwrap_or_else(|_| self.arguments.to_string())
        )
    }
}

/// The result of executing a tool call.
///
/// `tool_call_id` always equals the originating proposal's id on the success
/// path; the executor enforces this, handlers may leave it empty.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            error: None,
            success: true,
        }
    }

    pub fn err(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: String::new(),
            error: Some(error.into()),
            success: false,
        }
    }
}
