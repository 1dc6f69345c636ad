use async_trait::async_trait;

use crate::schemas::{Message, ToolDefinition};

use super::{GatewayError, GatewayResponse};

/// A language-model backend, reduced to a single request/response seam.
///
/// The loop hands the full message history plus the registry's tool
/// definitions to `complete` and receives text with optional proposals back.
/// Backends normalize their own wire quirks behind this trait.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Name of the underlying model, for logs and manifests.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<GatewayResponse, GatewayError>;

    /// Whether the backend is reachable. Defaults to healthy for backends
    /// with nothing to probe.
    async fn health_check(&self) -> bool {
        true
    }
}

/// A text-embedding backend.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Name of the embedding model; recorded in the vector manifest.
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| GatewayError::InvalidResponse("empty embedding batch".into()))
    }
}
