use chrono::Utc;

/// A markdown record of a task's terminal or mid-state.
///
/// `what_next` is contractual at the orchestration layer: `Next: <task_id>`,
/// `Spawned: <task_id>[, ...]`, or an explicit done marker. The queue stores
/// what it is given.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub task_id: String,
    pub what_was_done: String,
    pub what_changed: Vec<String>,
    pub what_next: String,
    pub blockers: Vec<String>,
    pub citations: Vec<String>,
    pub created_at: String,
}

impl Checkpoint {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            what_was_done: String::new(),
            what_changed: Vec::new(),
            what_next: String::new(),
            blockers: Vec::new(),
            citations: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_done(mut self, what_was_done: impl Into<String>) -> Self {
        self.what_was_done = what_was_done.into();
        self
    }

    pub fn with_changed(mut self, changed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.what_changed = changed.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_next(mut self, what_next: impl Into<String>) -> Self {
        self.what_next = what_next.into();
        self
    }

    pub fn with_blockers(mut self, blockers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blockers = blockers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_citations(
        mut self,
        citations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.citations = citations.into_iter().map(Into::into).collect();
        self
    }

    /// Render the fixed markdown layout.
    pub fn to_markdown(&self) -> String {
        format!(
            "# Checkpoint: {}\n\n\
             **Created:** {}\n\n\
             ## What Was Done\n\n{}\n\n\
             ## What Changed\n\n{}\n\n\
             ## What's Next\n\n{}\n\n\
             ## Blockers/Errors\n\n{}\n\n\
             ## Citations Used\n\n{}\n",
            self.task_id,
            self.created_at,
            self.what_was_done,
            bullet_list(&self.what_changed, "- No changes"),
            self.what_next,
            bullet_list(&self.blockers, "- None"),
            bullet_list(&self.citations, "- None"),
        )
    }
}

fn bullet_list(items: &[String], empty_marker: &str) -> String {
    if items.is_empty() {
        return empty_marker.to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_layout() {
        let checkpoint = Checkpoint::new("task_0001")
            .with_done("Implemented endpoints 1-3")
            .with_changed(["api/a.rs", "api/b.rs"])
            .with_next("Next: task_0002")
            .with_citations(["chunk_abc123"]);

        let md = checkpoint.to_markdown();
        assert!(md.starts_with("# Checkpoint: task_0001\n"));
        assert!(md.contains("## What Was Done\n\nImplemented endpoints 1-3"));
        assert!(md.contains("## What Changed\n\n- api/a.rs\n- api/b.rs"));
        assert!(md.contains("## What's Next\n\nNext: task_0002"));
        assert!(md.contains("## Blockers/Errors\n\n- None"));
        assert!(md.contains("## Citations Used\n\n- chunk_abc123"));
    }

    #[test]
    fn test_empty_lists_use_markers() {
        let md = Checkpoint::new("task_0002").with_next("DONE").to_markdown();
        assert!(md.contains("## What Changed\n\n- No changes"));
        assert!(md.contains("## Blockers/Errors\n\n- None"));
        assert!(md.contains("## Citations Used\n\n- None"));
    }
}
