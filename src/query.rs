//! Query Engine
//!
//! Answers a question against the index: embed the question with the same
//! model version the index was built with, retrieve the top-K chunks,
//! compose a token-bounded prompt, and call the language model under the
//! caller's timeout. Each call is stateless and independent.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::embedding::{EmbedError, Embedder};
use crate::llm::{LanguageModel, LlmError};
use crate::store::{IndexError, IndexStore, SearchHit};
use crate::tokens::TokenCounter;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("index is empty or nothing matched the question")]
    NoResults,
    #[error("embedding model mismatch: index built with '{index}', query uses '{query}'; re-ingest the corpus")]
    ModelMismatch { index: String, query: String },
    #[error("language model call exceeded {0:?}")]
    Timeout(Duration),
    #[error("top_k must be positive")]
    InvalidTopK,
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A citation for one chunk used to ground the answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub doc_id: String,
    pub heading: Option<String>,
    pub score: f32,
}

/// The composed answer plus the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Stateless question-answering over one index.
pub struct QueryEngine<'a> {
    store: &'a IndexStore,
    embedder: &'a dyn Embedder,
    llm: &'a dyn LanguageModel,
    config: &'a PipelineConfig,
    counter: TokenCounter,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        store: &'a IndexStore,
        embedder: &'a dyn Embedder,
        llm: &'a dyn LanguageModel,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            config,
            counter: TokenCounter::new(),
        }
    }

    /// Answer a question. `timeout` bounds the language-model call; on
    /// expiry the caller gets a timeout error, never a partial answer.
    pub async fn answer(
        &self,
        question: &str,
        top_k: usize,
        timeout: Duration,
    ) -> Result<Answer, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }

        let index_version = self.store.model_version();
        if index_version != self.embedder.model_version() {
            return Err(QueryError::ModelMismatch {
                index: index_version,
                query: self.embedder.model_version().to_string(),
            });
        }

        if self.store.is_empty() {
            return Err(QueryError::NoResults);
        }

        let query_vector = self.embedder.embed(question).await?;
        let hits = self
            .store
            .search(&query_vector, top_k, self.config.score_floor)?;
        if hits.is_empty() {
            return Err(QueryError::NoResults);
        }

        let (prompt, sources) = self.build_prompt(question, &hits);
        debug!(hits = hits.len(), prompt_len = prompt.len(), "composed prompt");

        let text = tokio::time::timeout(
            timeout,
            self.llm.complete(&prompt, self.config.answer_max_tokens),
        )
        .await
        .map_err(|_| QueryError::Timeout(timeout))??;

        info!(sources = sources.len(), "answered question");
        Ok(Answer { text, sources })
    }

    /// Compose the prompt from retrieved chunks, highest score first,
    /// stopping once the context token budget is spent. At least one
    /// chunk is always included.
    fn build_prompt(&self, question: &str, hits: &[SearchHit]) -> (String, Vec<SourceRef>) {
        let mut context = String::new();
        let mut sources = Vec::new();
        let mut used_tokens = 0u32;

        for hit in hits {
            let block = format!(
                "Source: {}\nSection: {}\nScore: {:.4}\n{}\n---\n",
                hit.entry.chunk_id,
                hit.entry.heading.as_deref().unwrap_or("(none)"),
                hit.score,
                hit.entry.text.trim()
            );

            let block_tokens = self.counter.count(&block);
            if !sources.is_empty() && used_tokens + block_tokens > self.config.context_token_budget
            {
                break;
            }
            used_tokens += block_tokens;
            context.push_str(&block);
            sources.push(SourceRef {
                chunk_id: hit.entry.chunk_id.clone(),
                doc_id: hit.entry.doc_id.clone(),
                heading: hit.entry.heading.clone(),
                score: hit.score,
            });
        }

        let mut prompt = String::new();
        prompt.push_str(
            "You are a documentation assistant for a device plugin SDK. \
             Answer only from the supplied excerpts. Cite sources as [chunk id].\n\n",
        );
        prompt.push_str("Context:\n");
        prompt.push_str(&context);
        prompt.push_str("\nQuestion:\n");
        prompt.push_str(question);
        prompt.push_str(
            "\n\nInstructions:\n\
             1. Give a direct answer referencing citations.\n\
             2. If the excerpts do not cover the question, say so plainly.\n",
        );

        (prompt, sources)
    }
}
