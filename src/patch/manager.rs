use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::PatchError;

/// Lifecycle of a proposed patch.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum PatchStatus {
    #[serde(rename = "proposed")]
    Proposed,
    #[serde(rename = "applied")]
    Applied,
    #[serde(rename = "tested")]
    Tested,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "rejected")]
    Rejected,
}

/// Manifest persisted next to each patch's three files.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PatchMetadata {
    pub patch_id: String,
    pub title: String,
    pub created_at: String,
    pub status: PatchStatus,
    pub plan_file: String,
    pub diff_file: String,
    pub tests_file: String,
    pub target_files: Vec<String>,
    pub description: String,
    pub error_message: Option<String>,
}

/// Workspace-first change proposals: the agent never edits project files
/// directly; it writes `plan.md`, `patch.diff`, and `tests.md` under
/// `patches/<patch_id>/` and a human applies the diff.
pub struct PatchManager {
    patches_dir: PathBuf,
    patches: BTreeMap<String, PatchMetadata>,
}

impl PatchManager {
    pub fn new(patches_dir: impl Into<PathBuf>) -> Result<Self, PatchError> {
        let patches_dir = patches_dir.into();
        fs::create_dir_all(&patches_dir)?;

        let mut manager = Self {
            patches_dir,
            patches: BTreeMap::new(),
        };
        manager.load_patches()?;
        Ok(manager)
    }

    fn load_patches(&mut self) -> Result<(), PatchError> {
        for entry in fs::read_dir(&self.patches_dir)? {
            let entry = entry?;
            let metadata_file = entry.path().join("metadata.json");
            if !metadata_file.is_file() {
                continue;
            }
            match fs::read(&metadata_file)
                .map_err(PatchError::from)
                .and_then(|bytes| serde_json::from_slice::<PatchMetadata>(&bytes).map_err(Into::into))
            {
                Ok(metadata) => {
                    self.patches.insert(metadata.patch_id.clone(), metadata);
                }
                Err(e) => log::warn!("Skipping unreadable patch manifest {:?}: {}", metadata_file, e),
            }
        }
        Ok(())
    }

    /// Create a patch directory with plan, diff, tests, and manifest.
    pub fn create_patch(
        &mut self,
        title: &str,
        description: &str,
        target_files: Vec<String>,
        plan_content: &str,
        diff_content: &str,
        tests_content: &str,
    ) -> Result<PatchMetadata, PatchError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let slug: String = title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let patch_id = format!("{}_{}", timestamp, slug);

        let patch_dir = self.patches_dir.join(&patch_id);
        fs::create_dir_all(&patch_dir)?;

        let plan_file = patch_dir.join("plan.md");
        fs::write(&plan_file, plan_content)?;
        let diff_file = patch_dir.join("patch.diff");
        fs::write(&diff_file, diff_content)?;
        let tests_file = patch_dir.join("tests.md");
        fs::write(&tests_file, tests_content)?;

        let metadata = PatchMetadata {
            patch_id: patch_id.clone(),
            title: title.to_string(),
            created_at: Utc::now().to_rfc3339(),
            status: PatchStatus::Proposed,
            plan_file: plan_file.to_string_lossy().into_owned(),
            diff_file: diff_file.to_string_lossy().into_owned(),
            tests_file: tests_file.to_string_lossy().into_owned(),
            target_files,
            description: description.to_string(),
            error_message: None,
        };

        self.write_manifest(&patch_dir, &metadata)?;
        self.patches.insert(patch_id.clone(), metadata.clone());

        log::info!("Created patch: {}", patch_id);
        Ok(metadata)
    }

    fn write_manifest(&self, patch_dir: &Path, metadata: &PatchMetadata) -> Result<(), PatchError> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        fs::write(patch_dir.join("metadata.json"), bytes)?;
        Ok(())
    }

    /// Update a patch's lifecycle status, recording the error message on
    /// failures.
    pub fn set_status(
        &mut self,
        patch_id: &str,
        status: PatchStatus,
        error_message: Option<&str>,
    ) -> Result<(), PatchError> {
        let metadata = self
            .patches
            .get_mut(patch_id)
            .ok_or_else(|| PatchError::PatchNotFound(patch_id.to_string()))?;
        metadata.status = status;
        metadata.error_message = error_message.map(str::to_string);

        let metadata = metadata.clone();
        self.write_manifest(&self.patches_dir.join(patch_id), &metadata)?;
        Ok(())
    }

    pub fn get_patch(&self, patch_id: &str) -> Option<&PatchMetadata> {
        self.patches.get(patch_id)
    }

    pub fn list_patches(&self, status: Option<PatchStatus>) -> Vec<&PatchMetadata> {
        self.patches
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_patch_writes_all_artifacts() {
        let tmp = TempDir::new().unwrap();
        let mut manager = PatchManager::new(tmp.path().join("patches")).unwrap();

        let metadata = manager
            .create_patch(
                "Fix login bug",
                "Reject empty usernames",
                vec!["auth.rs".into()],
                "# Plan\n1. Add guard\n",
                "--- a/auth.rs\n+++ b/auth.rs\n",
                "cargo test auth\n",
            )
            .unwrap();

        assert_eq!(metadata.status, PatchStatus::Proposed);
        assert!(metadata.patch_id.ends_with("Fix_login_bug"));

        let patch_dir = tmp.path().join("patches").join(&metadata.patch_id);
        assert!(patch_dir.join("plan.md").is_file());
        assert!(patch_dir.join("patch.diff").is_file());
        assert!(patch_dir.join("tests.md").is_file());

        let manifest: PatchMetadata =
            serde_json::from_slice(&fs::read(patch_dir.join("metadata.json")).unwrap()).unwrap();
        assert_eq!(manifest.target_files, vec!["auth.rs".to_string()]);
        assert!(manifest.error_message.is_none());
    }

    #[test]
    fn test_status_transitions_and_reload() {
        let tmp = TempDir::new().unwrap();
        let patches_dir = tmp.path().join("patches");
        let patch_id;
        {
            let mut manager = PatchManager::new(&patches_dir).unwrap();
            let metadata = manager
                .create_patch("Tweak", "desc", vec![], "plan", "diff", "tests")
                .unwrap();
            patch_id = metadata.patch_id;
            manager
                .set_status(&patch_id, PatchStatus::Failed, Some("tests failed"))
                .unwrap();
        }

        let manager = PatchManager::new(&patches_dir).unwrap();
        let reloaded = manager.get_patch(&patch_id).unwrap();
        assert_eq!(reloaded.status, PatchStatus::Failed);
        assert_eq!(reloaded.error_message.as_deref(), Some("tests failed"));

        assert_eq!(manager.list_patches(Some(PatchStatus::Failed)).len(), 1);
        assert!(manager.list_patches(Some(PatchStatus::Applied)).is_empty());
    }
}
