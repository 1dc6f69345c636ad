use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::utils::atomic::write_atomic;

use super::VectorStoreError;

const MATRIX_MAGIC: &[u8; 4] = b"WBV1";

/// Manifest half of the on-disk store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VectorMeta {
    pub embedding_model: String,
    pub dim: usize,
    pub count: usize,
    pub normalized: bool,
    pub updated_at: String,
    pub chunk_ids: Vec<String>,
}

impl Default for VectorMeta {
    fn default() -> Self {
        Self {
            embedding_model: "unknown".into(),
            dim: 0,
            count: 0,
            normalized: true,
            updated_at: String::new(),
            chunk_ids: Vec::new(),
        }
    }
}

/// L2-normalized embeddings of chunks, cosine similarity as dot product.
///
/// On disk the store is two files: a compressed matrix (`embeddings.npz`)
/// and a JSON manifest (`vectors_manifest.json`). Saves are atomic; loads
/// assert that matrix rows, id count, and manifest count agree and raise
/// `CorruptedIndex` when they do not.
pub struct VectorStore {
    vectors_path: PathBuf,
    manifest_path: PathBuf,
    vectors: Vec<Vec<f32>>,
    chunk_ids: Vec<String>,
    id_to_row: HashMap<String, usize>,
    meta: VectorMeta,
}

impl VectorStore {
    /// Open a store directory without reading from disk.
    pub fn new(store_path: impl AsRef<Path>) -> Result<Self, VectorStoreError> {
        let store_path = store_path.as_ref();
        fs::create_dir_all(store_path)?;
        Ok(Self {
            vectors_path: store_path.join("embeddings.npz"),
            manifest_path: store_path.join("vectors_manifest.json"),
            vectors: Vec::new(),
            chunk_ids: Vec::new(),
            id_to_row: HashMap::new(),
            meta: VectorMeta::default(),
        })
    }

    /// Open and load, degrading to an empty store when corruption is
    /// detected. The corruption is logged, never hidden.
    pub fn try_load(store_path: impl AsRef<Path>) -> Result<Self, VectorStoreError> {
        let mut store = Self::new(store_path)?;
        match store.load() {
            Ok(_) => {}
            Err(e) if e.is_corruption() => {
                log::warn!("Corruption detected, returning empty store: {}", e);
                store.reset();
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    /// Load both files. Returns `Ok(false)` when the store has never been
    /// saved. Count mismatches raise `CorruptedIndex`.
    pub fn load(&mut self) -> Result<bool, VectorStoreError> {
        if !self.vectors_path.exists() || !self.manifest_path.exists() {
            return Ok(false);
        }

        let manifest_bytes = fs::read(&self.manifest_path)?;
        let meta: VectorMeta = serde_json::from_slice(&manifest_bytes)?;
        let vectors = read_matrix(&self.vectors_path)?;

        let rows = vectors.len();
        let chunk_ids = meta.chunk_ids.len();
        if rows != chunk_ids || rows != meta.count {
            return Err(VectorStoreError::CorruptedIndex {
                manifest_count: meta.count,
                chunk_ids,
                rows,
            });
        }

        self.chunk_ids = meta.chunk_ids.clone();
        self.id_to_row = self
            .chunk_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        self.vectors = vectors;
        self.meta = meta;

        log::info!(
            "Loaded {} vectors (dim={}) model={}",
            self.chunk_ids.len(),
            self.meta.dim,
            self.meta.embedding_model
        );
        Ok(true)
    }

    /// Persist both files with the temp-file-plus-rename pattern. Returns
    /// `Ok(false)` when the store is empty and there is nothing to commit.
    pub fn save(&mut self) -> Result<bool, VectorStoreError> {
        if self.vectors.is_empty() {
            return Ok(false);
        }

        self.meta.chunk_ids = self.chunk_ids.clone();
        self.meta.count = self.chunk_ids.len();
        self.meta.dim = self.vectors.first().map(|v| v.len()).unwrap_or(0);
        self.meta.updated_at = Utc::now().to_rfc3339();

        let matrix_bytes = encode_matrix(&self.vectors, self.meta.dim)?;
        write_atomic(&self.vectors_path, &matrix_bytes)?;

        let manifest_bytes = serde_json::to_vec_pretty(&self.meta)?;
        write_atomic(&self.manifest_path, &manifest_bytes)?;

        log::info!("Saved {} vectors to disk (atomic)", self.chunk_ids.len());
        Ok(true)
    }

    /// Drop all rows and forget the established dimension.
    pub fn reset(&mut self) {
        self.vectors.clear();
        self.chunk_ids.clear();
        self.id_to_row.clear();
        self.meta = VectorMeta::default();
    }

    pub fn has(&self, chunk_id: &str) -> bool {
        self.id_to_row.contains_key(chunk_id)
    }

    /// Ids from the given list that are absent from the store.
    pub fn missing(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| !self.id_to_row.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    pub fn chunk_ids(&self) -> &[String] {
        &self.chunk_ids
    }

    pub fn meta(&self) -> &VectorMeta {
        &self.meta
    }

    /// Add a batch. Existing ids are overwritten in place; new ids append.
    /// A dimension mismatch anywhere in the batch fails the whole batch
    /// before any row is touched.
    pub fn add(
        &mut self,
        chunk_ids: &[String],
        embeddings: Vec<Vec<f32>>,
        model_name: &str,
    ) -> Result<(), VectorStoreError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        if chunk_ids.len() != embeddings.len() {
            return Err(VectorStoreError::BatchShapeMismatch {
                ids: chunk_ids.len(),
                vectors: embeddings.len(),
            });
        }

        let expected = if self.vectors.is_empty() {
            embeddings[0].len()
        } else {
            self.meta.dim
        };
        for vector in &embeddings {
            if vector.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
        }

        if self.meta.embedding_model == "unknown" {
            self.meta.embedding_model = model_name.to_string();
        } else if self.meta.embedding_model != model_name {
            log::warn!(
                "Model mismatch: existing={}, new={}",
                self.meta.embedding_model,
                model_name
            );
        }
        if self.meta.dim == 0 {
            self.meta.dim = expected;
        }

        for (id, vector) in chunk_ids.iter().zip(embeddings) {
            let normalized = l2_normalize(vector);
            match self.id_to_row.get(id) {
                Some(&row) => self.vectors[row] = normalized,
                None => {
                    self.id_to_row.insert(id.clone(), self.vectors.len());
                    self.chunk_ids.push(id.clone());
                    self.vectors.push(normalized);
                }
            }
        }
        self.meta.count = self.chunk_ids.len();
        Ok(())
    }

    /// Remove specific ids. Returns true if anything was removed.
    pub fn remove_ids(&mut self, ids_to_remove: &[String]) -> bool {
        if ids_to_remove.is_empty() || self.vectors.is_empty() {
            return false;
        }
        let remove: std::collections::HashSet<&String> = ids_to_remove.iter().collect();
        self.retain(|id| !remove.contains(id))
    }

    /// Keep only ids present in `active_ids`; used to resync with the chunk
    /// index after deletions. Returns true if anything was removed.
    pub fn prune(&mut self, active_ids: &[String]) -> bool {
        if self.vectors.is_empty() {
            return false;
        }
        let active: std::collections::HashSet<&String> = active_ids.iter().collect();
        self.retain(|id| active.contains(id))
    }

    fn retain(&mut self, keep: impl Fn(&String) -> bool) -> bool {
        let before = self.chunk_ids.len();
        let mut new_ids = Vec::with_capacity(before);
        let mut new_vectors = Vec::with_capacity(before);

        for (id, vector) in self.chunk_ids.drain(..).zip(self.vectors.drain(..)) {
            if keep(&id) {
                new_ids.push(id);
                new_vectors.push(vector);
            }
        }

        self.chunk_ids = new_ids;
        self.vectors = new_vectors;
        self.id_to_row = self
            .chunk_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        self.meta.count = self.chunk_ids.len();

        let removed = before - self.chunk_ids.len();
        if removed > 0 {
            log::info!("Removed {} stale embeddings", removed);
        }
        removed > 0
    }

    /// Top-k by cosine similarity. The returned ordering is deterministic:
    /// score descending, chunk id ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        if self.vectors.is_empty() {
            return Vec::new();
        }

        let query = l2_normalize(query.to_vec());
        let mut scored: Vec<(String, f32)> = self
            .chunk_ids
            .iter()
            .zip(&self.vectors)
            .map(|(id, row)| (id.clone(), dot(&query, row)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    for x in &mut vector {
        *x /= norm;
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Matrix file layout: 4-byte magic, u64 rows, u64 dim, then a gzip stream
/// of row-major little-endian f32 data.
fn encode_matrix(vectors: &[Vec<f32>], dim: usize) -> Result<Vec<u8>, VectorStoreError> {
    let mut out = Vec::new();
    out.extend_from_slice(MATRIX_MAGIC);
    out.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    out.extend_from_slice(&(dim as u64).to_le_bytes());

    let mut encoder = GzEncoder::new(&mut out, Compression::default());
    for row in vectors {
        for value in row {
            encoder.write_all(&value.to_le_bytes())?;
        }
    }
    encoder.finish()?;
    Ok(out)
}

fn read_matrix(path: &Path) -> Result<Vec<Vec<f32>>, VectorStoreError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 20 || &bytes[..4] != MATRIX_MAGIC {
        return Err(VectorStoreError::CorruptedMatrix(
            "missing or invalid header".into(),
        ));
    }

    let rows = u64::from_le_bytes(bytes[4..12].try_into().expect("8 bytes")) as usize;
    let dim = u64::from_le_bytes(bytes[12..20].try_into().expect("8 bytes")) as usize;

    let mut payload = Vec::new();
    GzDecoder::new(&bytes[20..])
        .read_to_end(&mut payload)
        .map_err(|e| VectorStoreError::CorruptedMatrix(e.to_string()))?;

    if payload.len() != rows * dim * 4 {
        return Err(VectorStoreError::CorruptedMatrix(format!(
            "expected {} bytes of matrix data, found {}",
            rows * dim * 4,
            payload.len()
        )));
    }

    let mut vectors = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(dim);
        for c in 0..dim {
            let offset = (r * dim + c) * 4;
            row.push(f32::from_le_bytes(
                payload[offset..offset + 4].try_into().expect("4 bytes"),
            ));
        }
        vectors.push(row);
    }
    Ok(vectors)
}
