use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::chunking::{ChunkKind, ChunkManager, SearchFilters};
use crate::gateway::EmbeddingGateway;
use crate::vectorstore::VectorStore;

use super::RetrievalError;

/// A retrieval result from either search path. `score` is present for
/// semantic hits and absent for keyword hits.
#[derive(Serialize, Debug, Clone)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub source_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub snippet: String,
    pub content: String,
    pub score: Option<f32>,
}

/// The durable retrieval index: deterministic chunking plus a vector store,
/// kept in sync incrementally and able to rebuild itself after corruption.
///
/// On disk, everything lives under `<workspace>/<index_name>/`:
/// `manifest.json` for chunk metadata and `vectors/` for the embedding
/// store.
pub struct RetrievalIndex {
    index_dir: PathBuf,
    chunk_manager: ChunkManager,
    vector_store: VectorStore,
    corruption_detected: bool,
}

impl RetrievalIndex {
    /// Open (or create) an index under the workspace.
    ///
    /// With `auto_heal`, a corrupted vector store degrades to empty and is
    /// flagged for rebuild on the next embed operation instead of failing
    /// the open.
    pub fn open(
        workspace_root: impl AsRef<Path>,
        index_name: &str,
        auto_heal: bool,
    ) -> Result<Self, RetrievalError> {
        let index_dir = workspace_root.as_ref().join(index_name);
        let chunk_manager = ChunkManager::new(index_dir.join("manifest.json"));
        let vectors_dir = index_dir.join("vectors");

        let (vector_store, corruption_detected) = if auto_heal {
            let store = VectorStore::try_load(&vectors_dir)?;
            let had_manifest = vectors_dir.join("vectors_manifest.json").exists();
            let corrupted = store.is_empty() && had_manifest;
            if corrupted {
                log::warn!("Auto-healing: will rebuild vectors on next embed operation");
            }
            (store, corrupted)
        } else {
            let mut store = VectorStore::new(&vectors_dir)?;
            store.load()?;
            (store, false)
        };

        Ok(Self {
            index_dir,
            chunk_manager,
            vector_store,
            corruption_detected,
        })
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn corruption_detected(&self) -> bool {
        self.corruption_detected
    }

    pub fn chunk_manager(&self) -> &ChunkManager {
        &self.chunk_manager
    }

    pub fn chunk_manager_mut(&mut self) -> &mut ChunkManager {
        &mut self.chunk_manager
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Ingest a file or directory into the chunk index only (keyword
    /// search). Returns the number of new chunks.
    pub fn ingest(&mut self, repo_path: impl AsRef<Path>) -> Result<usize, RetrievalError> {
        let path = repo_path.as_ref();
        if !path.exists() {
            return Err(RetrievalError::NotFound(path.display().to_string()));
        }

        let count = if path.is_file() {
            self.chunk_manager.ingest_file(path)?
        } else {
            self.chunk_manager.ingest_directory(path, true)?
        };
        self.chunk_manager.save_manifest()?;
        log::info!("Ingestion complete. Total chunks: {}", count);
        Ok(count)
    }

    /// Ingest and then bring the vector store up to date: rebuild after
    /// corruption, prune removed chunks, evict stale rows, embed what is
    /// missing.
    pub async fn ingest_with_embeddings(
        &mut self,
        repo_path: impl AsRef<Path>,
        gateway: &dyn EmbeddingGateway,
    ) -> Result<usize, RetrievalError> {
        let count = self.ingest(repo_path)?;

        if self.corruption_detected {
            log::warn!("Corruption detected, rebuilding vectors...");
            self.rebuild_vectors(gateway).await?;
            return Ok(count);
        }

        let active_ids = self.chunk_manager.chunk_ids();
        if self.vector_store.prune(&active_ids) {
            self.vector_store.save()?;
        }

        let stale = self.chunk_manager.take_stale();
        if !stale.is_empty() && self.vector_store.remove_ids(&stale) {
            self.vector_store.save()?;
        }

        let missing = self.vector_store.missing(&active_ids);
        self.embed_ids(&missing, gateway).await?;
        Ok(count)
    }

    /// Erase the vector store and re-embed every chunk in the index.
    ///
    /// This is the self-healing path; the triggering corruption has already
    /// been logged by the open/load path.
    pub async fn rebuild_vectors(
        &mut self,
        gateway: &dyn EmbeddingGateway,
    ) -> Result<usize, RetrievalError> {
        log::info!("Starting vector rebuild from chunks...");
        self.vector_store.reset();

        let ids = self.chunk_manager.chunk_ids();
        let rebuilt = self.embed_ids(&ids, gateway).await?;
        self.corruption_detected = false;
        log::info!("Vector rebuild complete: {} vectors", rebuilt);
        Ok(rebuilt)
    }

    async fn embed_ids(
        &mut self,
        ids: &[String],
        gateway: &dyn EmbeddingGateway,
    ) -> Result<usize, RetrievalError> {
        let mut ids_to_embed = Vec::new();
        let mut texts = Vec::new();
        for id in ids {
            if let Some(view) = self.chunk_manager.get_chunk(id) {
                ids_to_embed.push(id.clone());
                texts.push(format!(
                    "{}: {}\n{}",
                    view.kind,
                    view.name.as_deref().unwrap_or(""),
                    view.content
                ));
            }
        }
        if ids_to_embed.is_empty() {
            return Ok(0);
        }

        log::info!("Embedding {} chunks...", ids_to_embed.len());
        let vectors = gateway.embed(&texts).await?;
        self.vector_store
            .add(&ids_to_embed, vectors, gateway.model())?;
        self.vector_store.save()?;
        Ok(ids_to_embed.len())
    }

    /// Keyword query against the inverted index.
    pub fn query(&mut self, query_text: &str, top_k: usize) -> Vec<RetrievalHit> {
        self.chunk_manager
            .search_chunks(query_text, top_k, &SearchFilters::default())
            .into_iter()
            .map(|hit| RetrievalHit {
                chunk_id: hit.chunk_id,
                source_path: hit.source_path,
                start_line: hit.start_line,
                end_line: hit.end_line,
                kind: hit.kind,
                name: hit.name,
                snippet: hit.snippet,
                content: hit.content,
                score: None,
            })
            .collect()
    }

    /// Semantic query via the vector store, hydrated from the chunk index,
    /// falling back to keyword search when embedding fails or returns
    /// nothing. Ordering is deterministic: score descending, id ascending.
    pub async fn query_semantic(
        &mut self,
        query_text: &str,
        gateway: &dyn EmbeddingGateway,
        top_k: usize,
    ) -> Vec<RetrievalHit> {
        match gateway.embed_single(query_text).await {
            Ok(query_vec) => {
                let scored = self.vector_store.search(&query_vec, top_k);
                let mut hits: Vec<RetrievalHit> = scored
                    .into_iter()
                    .filter_map(|(chunk_id, score)| {
                        self.chunk_manager.get_chunk(&chunk_id).map(|view| RetrievalHit {
                            chunk_id: view.chunk_id,
                            source_path: view.source_path,
                            start_line: view.start_line,
                            end_line: view.end_line,
                            kind: view.kind,
                            name: view.name,
                            snippet: String::new(),
                            content: view.content,
                            score: Some(score),
                        })
                    })
                    .collect();

                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
                });

                if !hits.is_empty() {
                    return hits;
                }
            }
            Err(e) => {
                log::warn!("Semantic search failed, falling back to keyword: {}", e);
            }
        }
        self.query(query_text, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::HashEmbedder;
    use std::fs;
    use tempfile::TempDir;

    fn write_repo(tmp: &TempDir) -> PathBuf {
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(
            repo.join("auth.py"),
            "def login(user):\n    return check(user)\n\ndef logout(session):\n    return drop(session)\n",
        )
        .unwrap();
        fs::write(
            repo.join("util.py"),
            "def format_name(name):\n    return name.title()\n",
        )
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_vector_chunk_consistency_after_ingest() {
        let tmp = TempDir::new().unwrap();
        let repo = write_repo(&tmp);
        let embedder = HashEmbedder::new(16);

        let mut index = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
        index.ingest_with_embeddings(&repo, &embedder).await.unwrap();

        let chunk_ids = index.chunk_manager().chunk_ids();
        let vector_ids = index.vector_store().chunk_ids();
        assert!(vector_ids.iter().all(|id| chunk_ids.contains(id)));
        assert_eq!(vector_ids.len(), index.vector_store().meta().count);
        assert_eq!(vector_ids.len(), chunk_ids.len());
    }

    #[tokio::test]
    async fn test_edit_evicts_stale_vectors() {
        let tmp = TempDir::new().unwrap();
        let repo = write_repo(&tmp);
        let embedder = HashEmbedder::new(16);

        let mut index = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
        index.ingest_with_embeddings(&repo, &embedder).await.unwrap();
        let before = index.vector_store().len();

        fs::write(
            repo.join("auth.py"),
            "def login(user):\n    return verify_token(user)\n\ndef logout(session):\n    return drop(session)\n",
        )
        .unwrap();
        index.ingest_with_embeddings(&repo, &embedder).await.unwrap();

        assert_eq!(index.vector_store().len(), before);
        let chunk_ids = index.chunk_manager().chunk_ids();
        assert!(index
            .vector_store()
            .chunk_ids()
            .iter()
            .all(|id| chunk_ids.contains(id)));

        let hits = index.query("verify_token", 5);
        assert_eq!(hits.len(), 1);
        let gone = index.query("check", 5);
        assert!(gone.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_query_hydrates_and_orders() {
        let tmp = TempDir::new().unwrap();
        let repo = write_repo(&tmp);
        let embedder = HashEmbedder::new(16);

        let mut index = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
        index.ingest_with_embeddings(&repo, &embedder).await.unwrap();

        let hits = index.query_semantic("login", &embedder, 3).await;
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score.is_some());
        assert!(!hits[0].content.is_empty());

        let scores: Vec<f32> = hits.iter().map(|h| h.score.unwrap()).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, sorted);
    }

    #[tokio::test]
    async fn test_corruption_self_heals_on_reopen() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(
            repo.join("m.py"),
            "def a(): return 1\n\ndef b(): return 2\n\ndef c(): return 3\n",
        )
        .unwrap();
        let embedder = HashEmbedder::new(16);

        {
            let mut index = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
            let count = index.ingest_with_embeddings(&repo, &embedder).await.unwrap();
            assert_eq!(count, 3);
            assert_eq!(index.vector_store().len(), 3);
        }

        // Truncate the matrix file to simulate a torn write.
        let matrix = tmp.path().join("index/vectors/embeddings.npz");
        let bytes = fs::read(&matrix).unwrap();
        fs::write(&matrix, &bytes[..bytes.len() / 2]).unwrap();

        let mut index = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
        assert!(index.corruption_detected());
        assert!(index.vector_store().is_empty());

        let rebuilt = index.rebuild_vectors(&embedder).await.unwrap();
        assert_eq!(rebuilt, 3);
        assert!(!index.corruption_detected());
        assert_eq!(
            index.vector_store().len(),
            index.chunk_manager().len()
        );

        // A fresh open sees the healed store and no temp siblings.
        let reopened = RetrievalIndex::open(tmp.path(), "index", true).unwrap();
        assert!(!reopened.corruption_detected());
        assert_eq!(reopened.vector_store().len(), 3);
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("index/vectors"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
