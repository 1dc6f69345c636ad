use crate::schemas::ToolCall;

/// Coarse categories of what a proposed tool call is trying to do; the
/// identity used by the per-intent circuit breaker.
pub const INTENT_OTHER: &str = "other_action";

const DOCUMENT_EXTENSIONS: [&str; 4] = [".md", ".txt", ".rst", ".adoc"];
const TEST_COMMANDS: [&str; 6] = [
    "pytest", "unittest", "cargo test", "npm test", "yarn test", "go test",
];

/// Rule-based, deterministic mapping from (tool name, canonical argument
/// shape) to an intent tag. Unrecognized cases fall to `other_action`.
pub fn classify_intent(tool_call: &ToolCall) -> &'static str {
    let path = call_path(tool_call).unwrap_or_default().to_lowercase();

    match tool_call.name.as_str() {
        "read_file" | "data_view" | "view_file" => "inspect_file",
        "list_files" | "list_dir" => {
            if path.contains("data") {
                "find_data"
            } else {
                "explore_directory"
            }
        }
        "write_file" | "edit_file" | "create_file" => {
            if DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
                "write_document"
            } else {
                "write_code"
            }
        }
        "search_chunks" | "search_code" | "grep" => "search_code",
        "fetch" | "http_get" | "github_ingest" => "network_fetch",
        "shell" | "bash" | "cmd" => classify_shell(tool_call),
        _ => INTENT_OTHER,
    }
}

fn classify_shell(tool_call: &ToolCall) -> &'static str {
    let command = tool_call
        .arg_str("command")
        .or_else(|| tool_call.arg_str("cmd"))
        .unwrap_or_default()
        .to_lowercase();

    if TEST_COMMANDS.iter().any(|kw| command.contains(kw)) {
        "run_tests"
    } else if command.starts_with("mkdir") || command.contains(" mkdir ") {
        "create_structure"
    } else if command.starts_with("find") || command.starts_with("grep") {
        "find_data"
    } else if command.starts_with("ls") || command.starts_with("dir") {
        "explore_directory"
    } else {
        INTENT_OTHER
    }
}

/// The path argument of a proposal, under its common names.
pub fn call_path(tool_call: &ToolCall) -> Option<String> {
    for key in ["path", "file_path", "file"] {
        if let Some(value) = tool_call.arg_str(key) {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_file_is_inspect() {
        let tc = ToolCall::new("1", "read_file", json!({"path": "test.py"}));
        assert_eq!(classify_intent(&tc), "inspect_file");

        let tc = ToolCall::new("1", "data_view", json!({"path": "data.csv"}));
        assert_eq!(classify_intent(&tc), "inspect_file");
    }

    #[test]
    fn test_list_files_splits_on_data() {
        let tc = ToolCall::new("1", "list_files", json!({"path": "workspace/data/"}));
        assert_eq!(classify_intent(&tc), "find_data");

        let tc = ToolCall::new("1", "list_files", json!({"path": "workspace/"}));
        assert_eq!(classify_intent(&tc), "explore_directory");
    }

    #[test]
    fn test_shell_commands() {
        let tc = ToolCall::new("1", "shell", json!({"command": "find . -name '*.csv'"}));
        assert_eq!(classify_intent(&tc), "find_data");

        let tc = ToolCall::new("1", "shell", json!({"command": "mkdir new_folder"}));
        assert_eq!(classify_intent(&tc), "create_structure");

        let tc = ToolCall::new("1", "shell", json!({"command": "cargo test -p core"}));
        assert_eq!(classify_intent(&tc), "run_tests");
    }

    #[test]
    fn test_write_splits_on_extension() {
        let tc = ToolCall::new("1", "write_file", json!({"path": "notes.md"}));
        assert_eq!(classify_intent(&tc), "write_document");

        let tc = ToolCall::new("1", "write_file", json!({"path": "script.py"}));
        assert_eq!(classify_intent(&tc), "write_code");
    }

    #[test]
    fn test_unknown_falls_to_other() {
        let tc = ToolCall::new("1", "mystery_tool", json!({}));
        assert_eq!(classify_intent(&tc), INTENT_OTHER);
    }
}
