use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    NotFound(String),
}
