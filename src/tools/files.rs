use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::workspace::{Workspace, WorkspaceError};

use super::{ToolError, ToolFunction};

fn default_path() -> String {
    ".".into()
}

/// List a workspace directory.
pub struct ListFiles {
    workspace: Arc<Workspace>,
}

impl ListFiles {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(description = "Directory to list, relative to the workspace root")]
pub struct ListFilesInput {
    #[serde(default = "default_path")]
    #[schemars(description = "Directory path, defaults to the workspace root")]
    pub path: String,
}

#[async_trait]
impl ToolFunction for ListFiles {
    type Input = ListFilesInput;
    type Result = String;

    fn name(&self) -> String {
        "list_files".into()
    }

    fn description(&self) -> String {
        "List files and directories inside the workspace".into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let entries = self
            .workspace
            .list_contents(Some(std::path::Path::new(&input.path)))?;

        if entries.is_empty() {
            return Ok("(empty)".into());
        }

        let lines: Vec<String> = entries
            .iter()
            .map(|entry| {
                let name = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| entry.to_string_lossy().into_owned());
                if entry.is_dir() {
                    format!("{}/", name)
                } else {
                    name
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Read a file from the workspace, falling back to read-only project
/// source access for paths the workspace does not contain. Denied
/// directories and sensitive files stay unreadable either way.
pub struct ReadFile {
    workspace: Arc<Workspace>,
}

impl ReadFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReadFileInput {
    #[schemars(
        description = "File path, relative to the workspace root or to the project root"
    )]
    pub path: String,
}

#[async_trait]
impl ToolFunction for ReadFile {
    type Input = ReadFileInput;
    type Result = String;

    fn name(&self) -> String {
        "read_file".into()
    }

    fn description(&self) -> String {
        "Read a text file from the workspace, or from project source (read-only)".into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let resolved = match self.workspace.resolve_read(&input.path) {
            Ok(resolved) => resolved,
            Err(
                WorkspaceError::NotFound { .. } | WorkspaceError::PathOutsideWorkspace { .. },
            ) => self.workspace.resolve_project_read(&input.path)?,
            Err(e) => return Err(e.into()),
        };
        Ok(fs::read_to_string(resolved)?)
    }
}

/// Write a file into the workspace. Runs the resource circuit breaker
/// before touching disk.
pub struct WriteFile {
    workspace: Arc<Workspace>,
}

impl WriteFile {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WriteFileInput {
    #[schemars(description = "File path relative to the workspace root")]
    pub path: String,
    #[schemars(description = "Full file content to write")]
    pub content: String,
}

#[async_trait]
impl ToolFunction for WriteFile {
    type Input = WriteFileInput;
    type Result = String;

    fn name(&self) -> String {
        "write_file".into()
    }

    fn description(&self) -> String {
        "Write a text file inside the workspace".into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        self.workspace.check_resources()?;
        let resolved = self.workspace.resolve_write(&input.path)?;
        fs::write(&resolved, &input.content)?;

        let shown = self
            .workspace
            .relative_path(&input.path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(input.path);
        Ok(format!("Wrote {} bytes to {}", input.content.len(), shown))
    }
}

/// Register the three file tools against one workspace.
pub fn register_file_tools(
    registry: &mut super::ToolRegistry,
    workspace: Arc<Workspace>,
) -> Result<(), ToolError> {
    registry.register(ListFiles::new(workspace.clone()).into_boxed_tool())?;
    registry.register(ReadFile::new(workspace.clone()).into_boxed_tool())?;
    registry.register(WriteFile::new(workspace).into_boxed_tool())?;
    Ok(())
}
