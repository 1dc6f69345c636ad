use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::atomic::write_atomic;

use super::{chunk_file, chunk_id, hash_content, is_supported_extension, ChunkError, ChunkKind, ChunkMetadata, ChunkView};

/// Path fragments that exclude a file from ingestion entirely.
const SENSITIVE_PATTERNS: [&str; 9] = [
    r"\.env",
    r"\.ssh",
    r"\.git(/|\\|$)",
    r"secret",
    r"credentials",
    r"\.pem$",
    r"\.key$",
    r"__pycache__",
    r"node_modules",
];

/// Optional narrowing of a chunk search.
#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub path_prefix: Option<String>,
    pub extension: Option<String>,
    pub kind: Option<ChunkKind>,
    pub tag: Option<String>,
}

/// One search result: identity, location, and a context snippet of the
/// first match.
#[derive(Serialize, Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub snippet: String,
    pub content: String,
    pub occurrences: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub source_files: usize,
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    version: String,
    chunk_count: usize,
    last_updated: String,
    chunks: Vec<ChunkMetadata>,
    sources: BTreeMap<String, BTreeSet<String>>,
}

/// The chunk store: content-addressed chunks, a per-source id map for
/// incremental re-ingestion, and an inverted keyword index.
///
/// Chunk contents are cached in memory during a session and re-derived from
/// source files on demand after a manifest reload.
pub struct ChunkManager {
    manifest_path: PathBuf,
    chunks: BTreeMap<String, ChunkMetadata>,
    contents: HashMap<String, String>,
    sources: BTreeMap<String, BTreeSet<String>>,
    inverted_index: HashMap<String, HashSet<String>>,
    index_dirty: bool,
    stale_chunk_ids: BTreeSet<String>,
}

impl ChunkManager {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        let mut manager = Self {
            manifest_path: manifest_path.into(),
            chunks: BTreeMap::new(),
            contents: HashMap::new(),
            sources: BTreeMap::new(),
            inverted_index: HashMap::new(),
            index_dirty: false,
            stale_chunk_ids: BTreeSet::new(),
        };
        if let Err(e) = manager.load_manifest() {
            log::warn!("Failed to load chunk manifest: {}", e);
        }
        manager
    }

    fn is_sensitive(path: &str) -> bool {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            SENSITIVE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                .collect()
        });
        patterns.iter().any(|p| p.is_match(path))
    }

    /// Ingest one file. Unreadable, unsupported, and sensitive files are
    /// skipped, not errors. Returns the number of chunk ids newly added to
    /// the index.
    pub fn ingest_file(&mut self, path: &Path) -> Result<usize, ChunkError> {
        let source_path = path.to_string_lossy().to_string();

        if !path.exists() {
            log::warn!("File not found, skipping: {}", source_path);
            return Ok(0);
        }
        if Self::is_sensitive(&source_path) {
            log::info!("Skipping sensitive file: {}", source_path);
            return Ok(0);
        }
        if !is_supported_extension(path) {
            log::debug!("Skipping unsupported file type: {}", source_path);
            return Ok(0);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read {}: {}", source_path, e);
                return Ok(0);
            }
        };

        let raw_chunks = chunk_file(&content, path);
        let created_at = Utc::now().to_rfc3339();

        let new_ids: BTreeSet<String> =
            raw_chunks.iter().map(|c| chunk_id(&c.content)).collect();
        let old_ids = self.sources.get(&source_path).cloned().unwrap_or_default();

        // Evict chunks this source no longer produces, unless another source
        // still references the same content.
        for removed in old_ids.difference(&new_ids) {
            let referenced_elsewhere = self
                .sources
                .iter()
                .any(|(src, ids)| src != &source_path && ids.contains(removed));
            if referenced_elsewhere {
                continue;
            }
            self.chunks.remove(removed);
            self.contents.remove(removed);
            self.stale_chunk_ids.insert(removed.clone());
            self.index_dirty = true;
        }

        let mut added = 0;
        for raw in raw_chunks {
            let id = chunk_id(&raw.content);
            if self.chunks.contains_key(&id) {
                self.contents.entry(id).or_insert(raw.content);
                continue;
            }

            let metadata = ChunkMetadata {
                id: id.clone(),
                source_path: source_path.clone(),
                start_line: raw.start_line,
                end_line: raw.end_line,
                hash: hash_content(&raw.content),
                tags: vec![raw.language.clone(), raw.kind.to_string()],
                created_at: created_at.clone(),
                kind: raw.kind,
                name: raw.name,
            };

            self.index_chunk_tokens(&id, &raw.content);
            self.chunks.insert(id.clone(), metadata);
            self.contents.insert(id, raw.content);
            added += 1;
        }

        self.sources.insert(source_path.clone(), new_ids);
        log::info!("Ingested {} new chunks from {}", added, source_path);
        Ok(added)
    }

    /// Ingest every supported file under a directory, in sorted order for
    /// deterministic ids-per-run.
    pub fn ingest_directory(&mut self, dir: &Path, recursive: bool) -> Result<usize, ChunkError> {
        if !dir.exists() {
            log::warn!("Directory not found: {}", dir.display());
            return Ok(0);
        }

        let mut total = 0;
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in entries {
            if entry.is_dir() {
                if recursive {
                    total += self.ingest_directory(&entry, true)?;
                }
            } else {
                total += self.ingest_file(&entry)?;
            }
        }
        Ok(total)
    }

    /// Split text into index tokens: non-alphanumeric boundaries, then
    /// `snake_case` and `CamelCase` constituents, all lowercased.
    pub fn tokenize(text: &str) -> Vec<String> {
        static WORD: OnceLock<Regex> = OnceLock::new();
        static CAMEL: OnceLock<Regex> = OnceLock::new();
        let word = WORD.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("word pattern"));
        let camel =
            CAMEL.get_or_init(|| Regex::new(r"[A-Z]+[a-z0-9]*|[a-z0-9]+").expect("camel pattern"));

        let mut tokens = Vec::new();
        let mut seen = HashSet::new();
        for m in word.find_iter(text) {
            let whole = m.as_str().to_lowercase();
            if seen.insert(whole.clone()) {
                tokens.push(whole);
            }
            for part in camel.find_iter(m.as_str()) {
                let part = part.as_str().to_lowercase();
                if seen.insert(part.clone()) {
                    tokens.push(part);
                }
            }
        }
        tokens
    }

    fn index_chunk_tokens(&mut self, id: &str, content: &str) {
        for token in Self::tokenize(content) {
            self.inverted_index
                .entry(token)
                .or_default()
                .insert(id.to_string());
        }
    }

    /// Rebuild the inverted index from scratch and clear the dirty flag.
    pub fn build_inverted_index(&mut self) {
        self.inverted_index.clear();
        let entries: Vec<(String, String)> = self
            .chunks
            .keys()
            .filter_map(|id| self.content_of(id).map(|c| (id.clone(), c)))
            .collect();
        for (id, content) in entries {
            self.index_chunk_tokens(&id, &content);
        }
        self.index_dirty = false;
    }

    pub fn is_index_dirty(&self) -> bool {
        self.index_dirty
    }

    /// Keyword search: tokenize the query, intersect posting lists (AND
    /// semantics), rank by query-substring occurrences with chunk-id
    /// tie-break, and cap at `k`.
    pub fn search_chunks(&mut self, query: &str, k: usize, filters: &SearchFilters) -> Vec<SearchHit> {
        if self.index_dirty {
            self.build_inverted_index();
        }

        let tokens = Self::tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut candidates: Option<HashSet<String>> = None;
        for token in &tokens {
            let Some(postings) = self.inverted_index.get(token) else {
                return Vec::new();
            };
            candidates = Some(match candidates {
                None => postings.clone(),
                Some(existing) => existing.intersection(postings).cloned().collect(),
            });
        }
        let candidates = candidates.unwrap_or_default();

        let query_lower = query.to_lowercase();
        let mut hits: Vec<SearchHit> = Vec::new();

        let mut sorted_ids: Vec<&String> = candidates.iter().collect();
        sorted_ids.sort();

        for id in sorted_ids {
            let Some(meta) = self.chunks.get(id) else {
                continue;
            };

            if let Some(prefix) = &filters.path_prefix {
                if !meta.source_path.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if let Some(ext) = &filters.extension {
                if !meta.source_path.ends_with(ext.as_str()) {
                    continue;
                }
            }
            if let Some(kind) = filters.kind {
                if meta.kind != kind {
                    continue;
                }
            }
            if let Some(tag) = &filters.tag {
                if !meta.tags.iter().any(|t| t == tag) {
                    continue;
                }
            }

            let Some(content) = self.content_of(id) else {
                continue;
            };
            let occurrences = content.to_lowercase().matches(&query_lower).count();

            hits.push(SearchHit {
                chunk_id: id.clone(),
                source_path: meta.source_path.clone(),
                start_line: meta.start_line,
                end_line: meta.end_line,
                kind: meta.kind,
                name: meta.name.clone(),
                snippet: get_snippet(&content, &query_lower, 100),
                content,
                occurrences,
            });
        }

        hits.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        hits
    }

    /// Look up a chunk with its content.
    pub fn get_chunk(&self, id: &str) -> Option<ChunkView> {
        let meta = self.chunks.get(id)?;
        let content = self.content_of(id)?;
        Some(ChunkView {
            chunk_id: meta.id.clone(),
            source_path: meta.source_path.clone(),
            start_line: meta.start_line,
            end_line: meta.end_line,
            kind: meta.kind,
            name: meta.name.clone(),
            tags: meta.tags.clone(),
            content,
        })
    }

    /// Content from the session cache, or re-derived from the source file's
    /// recorded line range.
    fn content_of(&self, id: &str) -> Option<String> {
        if let Some(content) = self.contents.get(id) {
            return Some(content.clone());
        }
        let meta = self.chunks.get(id)?;
        let file = fs::read_to_string(&meta.source_path).ok()?;
        let lines: Vec<&str> = file.split('\n').collect();
        if meta.start_line == 0 || meta.end_line > lines.len() {
            return None;
        }
        Some(lines[meta.start_line - 1..meta.end_line].join("\n"))
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.keys().cloned().collect()
    }

    pub fn metadata(&self, id: &str) -> Option<&ChunkMetadata> {
        self.chunks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn stale_ids(&self) -> Vec<String> {
        self.stale_chunk_ids.iter().cloned().collect()
    }

    /// Drain the stale set; the caller evicts the matching vectors.
    pub fn take_stale(&mut self) -> Vec<String> {
        let drained = self.stale_chunk_ids.iter().cloned().collect();
        self.stale_chunk_ids.clear();
        drained
    }

    pub fn stats(&self) -> ChunkStats {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for meta in self.chunks.values() {
            *by_kind.entry(meta.kind.to_string()).or_default() += 1;
        }
        ChunkStats {
            total_chunks: self.chunks.len(),
            by_kind,
            source_files: self.sources.len(),
        }
    }

    pub fn save_manifest(&self) -> Result<(), ChunkError> {
        let manifest = Manifest {
            version: "1.0".into(),
            chunk_count: self.chunks.len(),
            last_updated: Utc::now().to_rfc3339(),
            chunks: self.chunks.values().cloned().collect(),
            sources: self.sources.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.manifest_path, &bytes)?;
        log::info!("Saved {} chunks to manifest", self.chunks.len());
        Ok(())
    }

    fn load_manifest(&mut self) -> Result<(), ChunkError> {
        if !self.manifest_path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.manifest_path)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;

        self.chunks = manifest
            .chunks
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        self.sources = manifest.sources;
        self.index_dirty = true;
        log::info!("Loaded {} chunks from manifest", self.chunks.len());
        Ok(())
    }
}

fn get_snippet(content: &str, query_lower: &str, context: usize) -> String {
    let content_lower = content.to_lowercase();
    let Some(idx) = content_lower.find(query_lower) else {
        let end = floor_char_boundary(content, content.len().min(200));
        let mut snippet = content[..end].to_string();
        if content.len() > 200 {
            snippet.push_str("...");
        }
        return snippet;
    };

    let start = floor_char_boundary(content, idx.saturating_sub(context));
    let end = floor_char_boundary(content, (idx + query_lower.len() + context).min(content.len()));

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&content[start..end]);
    if end < content.len() {
        snippet.push_str("...");
    }
    snippet
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
