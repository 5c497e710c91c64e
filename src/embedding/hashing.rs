//! Local Embeddings using Feature Hashing
//!
//! Produces fixed-size vectors with the hashing trick: each token hashes to
//! a bucket, the term-frequency vector is L2-normalized. No vocabulary, no
//! network. Embeddings are stable: the same text always yields the same
//! vector, which makes this provider suitable for offline use and tests.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{EmbedError, Embedder, Embedding};

/// Default dimensionality of hashed vectors.
pub const DEFAULT_DIMENSION: usize = 256;

/// Deterministic offline embedding provider.
pub struct HashingEmbedder {
    dimension: usize,
    version: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            version: format!("feature-hash-{}", dimension),
        }
    }

    /// Hash a token to a bucket index in `[0, dimension)`.
    fn hash_token(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }

    /// Pure embedding function; the async trait method delegates here.
    pub fn generate(&self, text: &str) -> Embedding {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut tf = vec![0.0f32; self.dimension];
        if tokens.is_empty() {
            return tf;
        }

        for token in &tokens {
            let idx = self.hash_token(token);
            tf[idx] += 1.0;
        }

        // L2 normalize
        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }

        tf
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_version(&self) -> &str {
        &self.version
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        Ok(self.generate(text))
    }
}
