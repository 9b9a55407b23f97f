//! The two model services the pipeline talks to: embeddings and text generation.
//!
//! Both are traits so the pipeline can run against Ollama or a test double.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;

    /// Embed a single string as a batch of one.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Embedding("empty response for single input".into()))
    }
}

/// Produces text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GatewayError>;
}

/// How [`embed_all`] splits work across calls.
#[derive(Debug, Clone, Copy)]
pub struct Batching {
    pub batch_size: usize,
    /// Batches in flight at once.
    pub concurrency: usize,
}

impl Default for Batching {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 4,
        }
    }
}

/// Embeds `texts` in batches, several at a time, and returns the vectors in
/// the same order as the input. Any failed batch fails the whole call.
pub async fn embed_all<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[String],
    batching: Batching,
) -> Result<Vec<Vec<f32>>, GatewayError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batching.batch_size.max(1);
    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size))
        .map(|batch| async move {
            let vectors = embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(GatewayError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            Ok::<_, GatewayError>(vectors)
        })
        // `buffered` (not `buffer_unordered`) yields results in submission order.
        .buffered(batching.concurrency.max(1))
        .try_collect()
        .await?;
    Ok(batches.into_iter().flatten().collect())
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("generation request failed: {0}")]
    Generation(String),
}
