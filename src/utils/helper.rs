pub fn normalize_tool_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Truncate a string for log output, appending an ellipsis when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
