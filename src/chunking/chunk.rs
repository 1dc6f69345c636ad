use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Enum `ChunkKind` names the structural unit a chunk was cut at.
#[derive(PartialEq, Eq, Serialize, Deserialize, JsonSchema, Debug, Clone, Copy)]
pub enum ChunkKind {
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "class")]
    Class,
    #[serde(rename = "section")]
    Section,
    #[serde(rename = "file")]
    File,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Function => write!(f, "function"),
            ChunkKind::Class => write!(f, "class"),
            ChunkKind::Section => write!(f, "section"),
            ChunkKind::File => write!(f, "file"),
        }
    }
}

/// Hash the exact chunk text into its content address. Identical text
/// anywhere in the repository collapses to the same id.
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let hex = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    hex[..16].to_string()
}

pub fn chunk_id(content: &str) -> String {
    format!("chunk_{}", hash_content(content))
}

/// Metadata for one chunk. Immutable; identity is the hash of the content.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChunkMetadata {
    pub id: String,
    pub source_path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub hash: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A chunk hydrated with its content, as returned by lookups and search.
#[derive(Serialize, Debug, Clone)]
pub struct ChunkView {
    pub chunk_id: String,
    pub source_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub content: String,
}
