use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workspace::WorkspaceError;

/// Who can fix the failure: the taxonomy surfaced to the model in every
/// tool error message.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum BlockedBy {
    #[serde(rename = "rules")]
    Rules,
    #[serde(rename = "workspace")]
    Workspace,
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "permission")]
    Permission,
}

impl fmt::Display for BlockedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockedBy::Rules => write!(f, "rules"),
            BlockedBy::Workspace => write!(f, "workspace"),
            BlockedBy::Missing => write!(f, "missing"),
            BlockedBy::Runtime => write!(f, "runtime"),
            BlockedBy::Permission => write!(f, "permission"),
        }
    }
}

impl From<&WorkspaceError> for BlockedBy {
    fn from(error: &WorkspaceError) -> Self {
        match error {
            WorkspaceError::NotFound { .. } => BlockedBy::Missing,
            WorkspaceError::WorkspaceSizeExceeded { .. } | WorkspaceError::LowMemory { .. } => {
                BlockedBy::Runtime
            }
            WorkspaceError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                BlockedBy::Permission
            }
            WorkspaceError::Io(_) => BlockedBy::Runtime,
            _ => BlockedBy::Workspace,
        }
    }
}

/// The structured error surfaced to the model in tool messages.
#[derive(Serialize, Debug, Clone)]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub blocked_by: BlockedBy,
    pub message: String,
    pub context: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(
        error_code: impl Into<String>,
        blocked_by: BlockedBy,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            blocked_by,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ERROR [{}]\nBlocked by: {}\nMessage: {}",
            self.error_code, self.blocked_by, self.message
        )?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {}", context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_format() {
        let envelope = ErrorEnvelope::new("NOT_FOUND", BlockedBy::Missing, "no such file")
            .with_context(json!({"path": "a.txt"}));
        let text = envelope.to_string();
        assert!(text.starts_with("ERROR [NOT_FOUND]\n"));
        assert!(text.contains("Blocked by: missing\n"));
        assert!(text.contains("Message: no such file"));
        assert!(text.contains("Context: {\"path\":\"a.txt\"}"));
    }

    #[test]
    fn test_workspace_error_taxonomy() {
        let not_found = WorkspaceError::NotFound { path: "x".into() };
        assert_eq!(BlockedBy::from(&not_found), BlockedBy::Missing);

        let outside = WorkspaceError::PathOutsideWorkspace {
            requested: "x".into(),
            root: "/w".into(),
        };
        assert_eq!(BlockedBy::from(&outside), BlockedBy::Workspace);

        let low_mem = WorkspaceError::LowMemory {
            free_percent: 2.0,
            min_percent: 10.0,
        };
        assert_eq!(BlockedBy::from(&low_mem), BlockedBy::Runtime);
    }
}
