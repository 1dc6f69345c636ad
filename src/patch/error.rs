use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Patch not found: {0}")]
    PatchNotFound(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}
