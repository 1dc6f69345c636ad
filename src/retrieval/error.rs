use thiserror::Error;

use crate::chunking::ChunkError;
use crate::gateway::GatewayError;
use crate::vectorstore::VectorStoreError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}
