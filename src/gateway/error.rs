use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}
