use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error(
        "Vector store corruption detected: manifest_count={manifest_count}, \
         chunk_ids={chunk_ids}, vectors={rows}"
    )]
    CorruptedIndex {
        manifest_count: usize,
        chunk_ids: usize,
        rows: usize,
    },

    #[error("Corrupted matrix file: {0}")]
    CorruptedMatrix(String),

    #[error("Dimension mismatch: new={got}, existing={expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding batch shape mismatch: {ids} ids, {vectors} vectors")]
    BatchShapeMismatch { ids: usize, vectors: usize },

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl VectorStoreError {
    /// Both corruption shapes trigger the self-healing rebuild path.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VectorStoreError::CorruptedIndex { .. } | VectorStoreError::CorruptedMatrix(_)
        )
    }
}
