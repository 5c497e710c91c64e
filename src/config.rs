//! Pipeline Configuration
//!
//! One explicit structure enumerating every recognized option, validated
//! before a run starts. No settings bag, no hidden defaults at call sites.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("top_k must be positive")]
    ZeroTopK,
    #[error("concurrency must be positive")]
    ZeroConcurrency,
}

/// Settings shared by the ingestion pipeline and the query engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum chunk length in bytes
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in bytes; must be < chunk_size
    pub chunk_overlap: usize,
    /// Result count for retrieval
    pub top_k: usize,
    /// Bound on concurrent embedding requests
    pub concurrency: usize,
    /// Abort the whole ingestion run on any embedding failure instead of
    /// skipping the failing chunk
    pub strict: bool,
    /// Drop retrieval hits scoring below this similarity; None disables
    pub score_floor: Option<f32>,
    /// Attempts per embedding request before giving up
    pub max_retries: usize,
    /// Per-request timeout for the embedding service
    pub embed_timeout: Duration,
    /// Bound on the language-model call when answering
    pub answer_timeout: Duration,
    /// Token budget for retrieved context in the composed prompt
    pub context_token_budget: u32,
    /// Maximum tokens requested from the answer model
    pub answer_max_tokens: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            chunk_overlap: 200,
            top_k: 5,
            concurrency: 4,
            strict: false,
            score_floor: None,
            max_retries: 3,
            embed_timeout: Duration::from_secs(30),
            answer_timeout: Duration::from_secs(60),
            context_token_budget: 4_000,
            answer_max_tokens: 400,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
