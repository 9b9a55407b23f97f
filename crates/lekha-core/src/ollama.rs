//! Ollama client for embeddings and completion. Wraps ollama-rs with a simple API
//! and implements the pipeline's [`Embedder`] and [`Generator`] traits.

use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::OllamaConfig;
use crate::gateway::{Embedder, GatewayError, Generator};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_GENERATE_MODEL: &str = "llama3.1";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Thin wrapper around Ollama for embedding and completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    generate_model: String,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&config.base_url)?
            .with_embed_model(&config.embed_model)
            .with_generate_model(&config.generate_model))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `bge-m3`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the completion model (e.g. `llama3.1`, `qwen2.5`).
    pub fn with_generate_model(mut self, model: impl Into<String>) -> Self {
        self.generate_model = model.into();
        self
    }

    /// Embed multiple strings in one call. Returns one embedding per input.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OllamaError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings)
    }

    /// Complete a prompt, capping the reply at `max_tokens`.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, OllamaError> {
        let options = ModelOptions::default().num_predict(token_limit(max_tokens));
        let req = GenerationRequest::new(self.generate_model.clone(), prompt.to_string())
            .options(options);
        let res = self.inner.generate(req).await.map_err(OllamaError::Request)?;
        Ok(res.response)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        self.embed_texts(texts)
            .await
            .map_err(|e| GatewayError::Embedding(e.to_string()))
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GatewayError> {
        self.complete(prompt, max_tokens)
            .await
            .map_err(|e| GatewayError::Generation(e.to_string()))
    }
}

/// Ollama takes the limit as `i32`; larger values saturate.
fn token_limit(max_tokens: u32) -> i32 {
    i32::try_from(max_tokens).unwrap_or(i32::MAX)
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}
