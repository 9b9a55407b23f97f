//! Question answering over the index: embed the question, retrieve the nearest
//! chunks, and ask the model to answer from those chunks only.

use tracing::debug;

use crate::config::{RetrievalConfig, DEFAULT_REFUSAL};
use crate::gateway::{Embedder, GatewayError, Generator};
use crate::store::{SharedIndex, StoreError};
use crate::text_unit::TextUnit;

/// Characters of each retrieved chunk shown in the debug trace.
const TRACE_PREVIEW_CHARS: usize = 800;

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_tokens: u32,
    /// Exact text the model must reply with when the context is insufficient.
    pub refusal: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_tokens: 500,
            refusal: DEFAULT_REFUSAL.to_string(),
        }
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(c: &RetrievalConfig) -> Self {
        Self {
            top_k: c.top_k,
            max_tokens: c.max_tokens,
            refusal: c.refusal.clone(),
        }
    }
}

/// A generated answer and the context it was grounded on, in retrieval order.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: Vec<TextUnit>,
}

/// Long-lived question-answering service over a shared index.
pub struct RagPipeline<E, G> {
    embedder: E,
    generator: G,
    index: SharedIndex,
    settings: RetrievalSettings,
}

impl<E: Embedder, G: Generator> RagPipeline<E, G> {
    pub fn new(embedder: E, generator: G, index: SharedIndex, settings: RetrievalSettings) -> Self {
        Self {
            embedder,
            generator,
            index,
            settings,
        }
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// [`answer`](Self::answer) with the configured `top_k`.
    pub async fn ask(&self, question: &str) -> Result<Answer, QueryError> {
        self.answer(question, self.settings.top_k).await
    }

    pub async fn answer(&self, question: &str, top_k: usize) -> Result<Answer, QueryError> {
        let query = self.embedder.embed(question).await?;
        let context = self.retrieve(&query, top_k)?;
        trace_context(&context);

        let joined = context
            .iter()
            .map(TextUnit::content)
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(question, &joined, &self.settings.refusal);
        let text = self
            .generator
            .generate(&prompt, self.settings.max_tokens)
            .await?;
        Ok(Answer { text, context })
    }

    /// The read guard is dropped before any await.
    fn retrieve(&self, query: &[f32], top_k: usize) -> Result<Vec<TextUnit>, QueryError> {
        let index = self.index.read().map_err(|_| StoreError::Poisoned)?;
        Ok(index.search(query, top_k)?)
    }
}

fn trace_context(context: &[TextUnit]) {
    for (i, unit) in context.iter().enumerate() {
        let preview: String = unit.content().chars().take(TRACE_PREVIEW_CHARS).collect();
        debug!(
            rank = i + 1,
            source = unit.source().unwrap_or("?"),
            page = unit.page_number().unwrap_or_default(),
            ocr = unit.is_ocr(),
            %preview,
            "retrieved chunk"
        );
    }
}

/// The grounding prompt: same-language reply, context-only answers, and an
/// exact refusal when the context does not cover the question.
pub fn build_prompt(question: &str, context: &str, refusal: &str) -> String {
    format!(
        "You are a multilingual knowledge assistant with STRICT grounding requirements.

CRITICAL RULES:
1. LANGUAGE: Detect the language of the user's question and respond in THE SAME LANGUAGE. Do not translate or switch languages.
2. GROUNDING: You MUST answer using ONLY the information in the Context section below.
3. If the Context does not contain information to answer the question, you MUST respond with exactly:
   \"{refusal}\"
4. DO NOT use any knowledge outside the provided Context.
5. DO NOT make up or infer information that is not explicitly in the Context.

Context:
{context}

Question:
{question}

Answer (respond in the same language as the question, or say information is not available):
"
    )
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("model service error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("index error: {0}")]
    Store(#[from] StoreError),
}
