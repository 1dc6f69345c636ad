use thiserror::Error;

use crate::patch::PatchError;
use crate::queue::QueueError;
use crate::workspace::WorkspaceError;

use super::{BlockedBy, ErrorEnvelope};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Blocked by rule '{rule}': {reason}")]
    RuleBlocked { rule: String, reason: String },

    #[error("Tool execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("Error while running tool: {0}")]
    ExecutionError(String),

    #[error("Input parsing error: {0}")]
    InputParseError(#[from] serde_json::Error),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Render this error as the envelope surfaced to the model.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            ToolError::Workspace(e) => {
                let code = match e {
                    WorkspaceError::PathOutsideWorkspace { .. }
                    | WorkspaceError::PathOutsideProject { .. } => "PATH_OUTSIDE_WORKSPACE",
                    WorkspaceError::BlockedFile { .. } => "BLOCKED_FILE",
                    WorkspaceError::SensitiveFile { .. } => "SENSITIVE_FILE",
                    WorkspaceError::DeniedDirectory { .. } => "DENIED_DIRECTORY",
                    WorkspaceError::NotFound { .. } => "NOT_FOUND",
                    WorkspaceError::NotADirectory { .. } => "NOT_A_DIRECTORY",
                    WorkspaceError::ProjectReadDisabled => "PROJECT_READ_DISABLED",
                    WorkspaceError::WorkspaceSizeExceeded { .. }
                    | WorkspaceError::LowMemory { .. } => "RESOURCE_LIMIT",
                    WorkspaceError::Io(_) => "IO_ERROR",
                };
                ErrorEnvelope::new(code, BlockedBy::from(e), e.to_string())
            }
            ToolError::Queue(QueueError::TaskNotFound(_)) => {
                ErrorEnvelope::new("TASK_NOT_FOUND", BlockedBy::Missing, self.to_string())
            }
            ToolError::Queue(_) => {
                ErrorEnvelope::new("QUEUE_ERROR", BlockedBy::Runtime, self.to_string())
            }
            ToolError::Patch(PatchError::PatchNotFound(_)) => {
                ErrorEnvelope::new("PATCH_NOT_FOUND", BlockedBy::Missing, self.to_string())
            }
            ToolError::Patch(_) => {
                ErrorEnvelope::new("PATCH_ERROR", BlockedBy::Runtime, self.to_string())
            }
            ToolError::InvalidArguments(msg) => ErrorEnvelope::new(
                "INVALID_ARGUMENTS",
                BlockedBy::Runtime,
                format!("Invalid arguments: {}", msg),
            ),
            ToolError::DuplicateTool(_) | ToolError::ToolNotFound(_) => {
                ErrorEnvelope::new("TOOL_NOT_FOUND", BlockedBy::Runtime, self.to_string())
            }
            ToolError::RuleBlocked { .. } => {
                ErrorEnvelope::new("RULE_BLOCKED", BlockedBy::Rules, self.to_string())
            }
            ToolError::Timeout(_) => {
                ErrorEnvelope::new("TIMED_OUT", BlockedBy::Runtime, self.to_string())
            }
            ToolError::ExecutionError(_) | ToolError::InputParseError(_) => {
                ErrorEnvelope::new("EXECUTION_ERROR", BlockedBy::Runtime, self.to_string())
            }
            ToolError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorEnvelope::new("PERMISSION_DENIED", BlockedBy::Permission, self.to_string())
            }
            ToolError::Io(_) => {
                ErrorEnvelope::new("IO_ERROR", BlockedBy::Runtime, self.to_string())
            }
        }
    }
}
