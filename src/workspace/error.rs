use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Path outside workspace\n  requested: {requested}\n  workspace_root: {root}")]
    PathOutsideWorkspace { requested: String, root: PathBuf },

    #[error("Path outside project\n  requested: {requested}\n  project_root: {project_root}")]
    PathOutsideProject {
        requested: String,
        project_root: PathBuf,
    },

    #[error("Access to '{path}' is blocked for safety")]
    BlockedFile { path: String },

    #[error("Access to '{path}' is blocked (sensitive file)")]
    SensitiveFile { path: String },

    #[error("Access to '{path}' is blocked (denied directory)")]
    DeniedDirectory { path: String },

    #[error("Path does not exist: {path}")]
    NotFound { path: String },

    #[error("Path is not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Project read access is disabled")]
    ProjectReadDisabled,

    #[error(
        "Workspace size ({used_gb:.2}GB) exceeds limit ({limit_gb:.2}GB). \
         Clean up files before continuing."
    )]
    WorkspaceSizeExceeded { used_gb: f64, limit_gb: f64 },

    #[error(
        "Low system memory: only {free_percent:.1}% free (minimum: {min_percent:.1}%). \
         Close other applications or increase memory."
    )]
    LowMemory {
        free_percent: f32,
        min_percent: f32,
    },

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Whether this error is a resource circuit-breaker trip rather than a
    /// path violation.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            WorkspaceError::WorkspaceSizeExceeded { .. } | WorkspaceError::LowMemory { .. }
        )
    }
}
