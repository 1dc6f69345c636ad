use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::ChunkKind;

/// A chunk cut from a file, before the manager assigns it an identity.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub language: String,
}

/// File extensions the chunk store ingests.
pub const SUPPORTED_EXTENSIONS: [&str; 10] = [
    "py", "rs", "js", "ts", "go", "md", "txt", "json", "yaml", "yml",
];

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

struct BoundaryRule {
    pattern: Regex,
    kind: ChunkKind,
}

fn source_rules(language: &str) -> Option<&'static [BoundaryRule]> {
    static PYTHON: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    static RUST: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    static JS: OnceLock<Vec<BoundaryRule>> = OnceLock::new();
    static GO: OnceLock<Vec<BoundaryRule>> = OnceLock::new();

    let rules = match language {
        "python" => PYTHON.get_or_init(|| {
            vec![
                rule(r"^\s*def\s+(\w+)\s*\(", ChunkKind::Function),
                rule(r"^\s*class\s+(\w+)", ChunkKind::Class),
            ]
        }),
        "rust" => RUST.get_or_init(|| {
            vec![
                rule(
                    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)",
                    ChunkKind::Function,
                ),
                rule(
                    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)",
                    ChunkKind::Class,
                ),
            ]
        }),
        "javascript" | "typescript" => JS.get_or_init(|| {
            vec![
                rule(
                    r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)",
                    ChunkKind::Function,
                ),
                rule(r"^\s*(?:export\s+)?class\s+(\w+)", ChunkKind::Class),
            ]
        }),
        "go" => GO.get_or_init(|| {
            vec![
                rule(r"^func\s+(?:\([^)]*\)\s*)?(\w+)", ChunkKind::Function),
                rule(r"^type\s+(\w+)", ChunkKind::Class),
            ]
        }),
        _ => return None,
    };
    Some(rules.as_slice())
}

fn rule(pattern: &str, kind: ChunkKind) -> BoundaryRule {
    BoundaryRule {
        pattern: Regex::new(pattern).expect("static chunker pattern"),
        kind,
    }
}

fn language_of(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("py") => "python".into(),
        Some("rs") => "rust".into(),
        Some("js") => "javascript".into(),
        Some("ts") => "typescript".into(),
        Some("go") => "go".into(),
        Some("md") => "markdown".into(),
        Some(other) => other.into(),
        None => "text".into(),
    }
}

/// Cut a file into chunks at structural boundaries: functions and classes
/// for source code, section headers for markup, the whole file when no
/// boundary is found.
pub fn chunk_file(content: &str, source_path: &Path) -> Vec<RawChunk> {
    let language = language_of(source_path);

    let chunks = if language == "markdown" {
        chunk_markup(content, &language)
    } else if let Some(rules) = source_rules(&language) {
        chunk_source(content, rules, &language)
    } else {
        Vec::new()
    };

    if chunks.is_empty() {
        return vec![whole_file_chunk(content, &language)];
    }
    chunks
}

fn chunk_source(content: &str, rules: &[BoundaryRule], language: &str) -> Vec<RawChunk> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut chunks = Vec::new();
    let mut current: Option<(usize, ChunkKind, String)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let matched = rules.iter().find_map(|r| {
            r.pattern
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|name| (r.kind, name.as_str().to_string()))
        });

        if let Some((kind, name)) = matched {
            if let Some((start, prev_kind, prev_name)) = current.take() {
                chunks.push(make_chunk(
                    &lines, start, line_no - 1, prev_kind, Some(prev_name), language,
                ));
            }
            current = Some((line_no, kind, name));
        }
    }

    if let Some((start, kind, name)) = current {
        chunks.push(make_chunk(&lines, start, lines.len(), kind, Some(name), language));
    }

    chunks
}

fn chunk_markup(content: &str, language: &str) -> Vec<RawChunk> {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    let header = HEADER.get_or_init(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("header pattern"));

    let lines: Vec<&str> = content.split('\n').collect();
    let mut chunks = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if let Some(caps) = header.captures(line) {
            if let Some((start, name)) = current.take() {
                chunks.push(make_chunk(
                    &lines,
                    start,
                    line_no - 1,
                    ChunkKind::Section,
                    Some(name),
                    language,
                ));
            }
            current = Some((line_no, caps[1].trim().to_string()));
        }
    }

    if let Some((start, name)) = current {
        chunks.push(make_chunk(
            &lines,
            start,
            lines.len(),
            ChunkKind::Section,
            Some(name),
            language,
        ));
    }

    chunks
}

fn whole_file_chunk(content: &str, language: &str) -> RawChunk {
    RawChunk {
        content: content.to_string(),
        start_line: 1,
        end_line: content.split('\n').count(),
        kind: ChunkKind::File,
        name: None,
        language: language.to_string(),
    }
}

fn make_chunk(
    lines: &[&str],
    start_line: usize,
    end_line: usize,
    kind: ChunkKind,
    name: Option<String>,
    language: &str,
) -> RawChunk {
    RawChunk {
        content: lines[start_line - 1..end_line].join("\n"),
        start_line,
        end_line,
        kind,
        name,
        language: language.to_string(),
    }
}
