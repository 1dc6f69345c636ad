use std::sync::Arc;

use async_trait::async_trait;
use indoc::formatdoc;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::patch::PatchManager;

use super::{ToolError, ToolFunction};

/// Propose a change to project files via the patch flow.
///
/// The agent never edits project files directly: it writes a plan, a unified
/// diff, and test instructions under `patches/<patch_id>/`, and a human
/// reviews and applies them.
pub struct CreatePatch {
    patches: Arc<Mutex<PatchManager>>,
}

impl CreatePatch {
    pub fn new(patches: Arc<Mutex<PatchManager>>) -> Self {
        Self { patches }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreatePatchInput {
    #[schemars(description = "Short title for the patch")]
    pub title: String,
    #[schemars(description = "What the change does and why")]
    pub description: String,
    #[schemars(description = "Project files the diff touches")]
    pub target_files: Vec<String>,
    #[schemars(description = "Markdown plan for plan.md")]
    pub plan_content: String,
    #[schemars(description = "Unified diff for patch.diff")]
    pub diff_content: String,
    #[schemars(description = "Test instructions for tests.md")]
    pub tests_content: String,
}

#[async_trait]
impl ToolFunction for CreatePatch {
    type Input = CreatePatchInput;
    type Result = String;

    fn name(&self) -> String {
        "create_patch".into()
    }

    fn description(&self) -> String {
        "Propose a change to project files. Writes plan.md, patch.diff, and \
         tests.md into the patches bin for human review; never modifies \
         project files directly."
            .into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let metadata = self.patches.lock().await.create_patch(
            &input.title,
            &input.description,
            input.target_files,
            &input.plan_content,
            &input.diff_content,
            &input.tests_content,
        )?;

        Ok(formatdoc! {"
            Patch proposed: {patch_id}

            Title: {title}
            Targets: {targets}
            Status: proposed

            A human must review and apply the diff; do not claim the change is
            made until the patch is applied and its tests pass.",
            patch_id = metadata.patch_id,
            title = metadata.title,
            targets = metadata.target_files.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchStatus;
    use crate::schemas::ToolCall;
    use crate::tools::ToolExecutor;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_patch_via_tool() {
        let tmp = TempDir::new().unwrap();
        let manager = PatchManager::new(tmp.path().join("patches")).unwrap();
        let patches = Arc::new(Mutex::new(manager));
        let tool = CreatePatch::new(patches.clone()).into_boxed_tool();
        let executor = ToolExecutor::new();

        let call = ToolCall::new(
            "c1",
            "create_patch",
            json!({
                "title": "Fix retry logic",
                "description": "Cap retries at three",
                "target_files": ["src/retry.rs"],
                "plan_content": "# Plan\n1. Add cap\n",
                "diff_content": "--- a/src/retry.rs\n+++ b/src/retry.rs\n",
                "tests_content": "cargo test retry\n"
            }),
        );
        let result = executor.execute(tool.as_ref(), &call, None).await;

        assert!(result.success, "{:?}", result.error);
        assert!(result.output.contains("Patch proposed"));
        assert!(result.output.contains("Fix retry logic"));

        let patches = patches.lock().await;
        let listed = patches.list_patches(Some(PatchStatus::Proposed));
        assert_eq!(listed.len(), 1);
        assert!(tmp
            .path()
            .join("patches")
            .join(&listed[0].patch_id)
            .join("patch.diff")
            .exists());
    }

    #[tokio::test]
    async fn test_missing_fields_fail_validation() {
        let tmp = TempDir::new().unwrap();
        let manager = PatchManager::new(tmp.path().join("patches")).unwrap();
        let tool = CreatePatch::new(Arc::new(Mutex::new(manager))).into_boxed_tool();
        let executor = ToolExecutor::new();

        let call = ToolCall::new("c1", "create_patch", json!({"title": "incomplete"}));
        let result = executor.execute(tool.as_ref(), &call, None).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid arguments"));
    }
}
