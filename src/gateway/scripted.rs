use std::collections::VecDeque;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::schemas::{Message, ToolDefinition};

use super::{EmbeddingGateway, GatewayError, GatewayResponse, ModelGateway};

/// A gateway that replays queued responses in order.
///
/// Useful for driving the loop without a model server: push the turns you
/// want the "model" to take, and once the script is exhausted every further
/// call returns a plain final answer.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<GatewayResponse>>,
    calls_seen: Mutex<usize>,
}

impl ScriptedGateway {
    pub fn new(responses: impl IntoIterator<Item = GatewayResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls_seen: Mutex::new(0),
        }
    }

    /// Number of completions served so far.
    pub async fn calls_seen(&self) -> usize {
        *self.calls_seen.lock().await
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<GatewayResponse, GatewayError> {
        *self.calls_seen.lock().await += 1;
        let next = self.responses.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| GatewayResponse::text("Scripted responses exhausted.")))
    }
}

/// Deterministic embedder: hashes the text into a fixed-dimension vector.
///
/// Not semantically meaningful, but stable across runs, which is what the
/// rebuild and persistence paths need from a stand-in.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dim)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) - 0.5
            })
            .collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingGateway for HashEmbedder {
    fn model(&self) -> &str {
        "hash-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ToolCall;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_gateway_replays_in_order() {
        let gateway = ScriptedGateway::new([
            GatewayResponse::with_tool_calls(
                "looking",
                [ToolCall::new("c1", "list_files", json!({"path": "."}))],
            ),
            GatewayResponse::text("done"),
        ]);

        let first = gateway.complete(&[], &[]).await.unwrap();
        assert!(first.has_tool_calls());

        let second = gateway.complete(&[], &[]).await.unwrap();
        assert_eq!(second.content, "done");

        let third = gateway.complete(&[], &[]).await.unwrap();
        assert!(!third.has_tool_calls());
        assert_eq!(gateway.calls_seen().await, 3);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed_single("hello").await.unwrap();
        let b = embedder.embed_single("hello").await.unwrap();
        let c = embedder.embed_single("world").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
