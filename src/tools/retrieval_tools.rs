use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::chunking::{ChunkKind, SearchFilters};
use crate::retrieval::RetrievalIndex;

use super::{ToolError, ToolFunction};

fn default_k() -> usize {
    10
}

/// Search code chunks with citations.
///
/// Returns chunk ids, source paths, line numbers, and snippets so the model
/// can cite what it read instead of answering from memory.
pub struct SearchChunks {
    index: Arc<Mutex<RetrievalIndex>>,
}

impl SearchChunks {
    pub fn new(index: Arc<Mutex<RetrievalIndex>>) -> Self {
        Self { index }
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchChunksInput {
    #[schemars(description = "Keywords or concept to find")]
    pub query: String,
    #[serde(default = "default_k")]
    #[schemars(description = "Maximum number of results, defaults to 10")]
    pub k: usize,
    #[serde(default)]
    #[schemars(description = "Filter by source path prefix, e.g. 'src/'")]
    pub path_prefix: Option<String>,
    #[serde(default)]
    #[schemars(description = "Filter by file extension, e.g. '.rs'")]
    pub file_type: Option<String>,
    #[serde(default)]
    #[schemars(description = "Filter by chunk kind: function, class, section, or file")]
    pub chunk_type: Option<ChunkKind>,
    #[serde(default)]
    #[schemars(description = "Filter by tag, e.g. 'python'")]
    pub tag: Option<String>,
}

#[async_trait]
impl ToolFunction for SearchChunks {
    type Input = SearchChunksInput;
    type Result = String;

    fn name(&self) -> String {
        "search_chunks".into()
    }

    fn description(&self) -> String {
        "Search indexed code chunks with citations. Returns chunk IDs, source paths, \
         line numbers, and snippets. Use this BEFORE read_file to find relevant code."
            .into()
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Result, ToolError> {
        let filters = SearchFilters {
            path_prefix: input.path_prefix,
            extension: input.file_type,
            kind: input.chunk_type,
            tag: input.tag,
        };

        let mut index = self.index.lock().await;
        let hits = index
            .chunk_manager_mut()
            .search_chunks(&input.query, input.k, &filters);

        if hits.is_empty() {
            return Ok(format!(
                "No chunks found for '{}'. Try different keywords or ingest more sources.",
                input.query
            ));
        }

        let mut out = format!("Found {} chunk(s) for '{}':\n", hits.len(), input.query);
        for hit in hits {
            let _ = write!(
                out,
                "\n[CITATION {}] {}:L{}-L{} ({}{})\n  {}\n",
                hit.chunk_id,
                hit.source_path,
                hit.start_line,
                hit.end_line,
                hit.kind,
                hit.name
                    .as_deref()
                    .map(|n| format!(" {}", n))
                    .unwrap_or_default(),
                hit.snippet.replace('\n', "\n  "),
            );
        }
        Ok(out)
    }
}
