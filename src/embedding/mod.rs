//! Embedding Providers
//!
//! Trait seam over embedding backends. Every provider reports a model
//! version and a fixed dimensionality; entries produced under one version
//! are only comparable with queries embedded under the same version.

pub mod hashing;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// Embedding vector
pub type Embedding = Vec<f32>;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(String),
    #[error("embedding service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("embedding request timed out")]
    Timeout,
    #[error("malformed embedding response: {0}")]
    BadResponse(String),
    #[error("invalid embedder configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EmbedError::Timeout
        } else {
            EmbedError::Http(e.to_string())
        }
    }
}

/// An embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model-version identifier recorded in the index at ingestion time.
    fn model_version(&self) -> &str;

    /// Fixed output dimensionality.
    fn dimension(&self) -> usize;

    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError>;
}
