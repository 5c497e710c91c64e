// Askdocs Library
// Exports core modules for use by the CLI binary and integration tests

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod store;
pub mod tokens;

// Re-export commonly used types for the CLI
pub use config::{ConfigError, PipelineConfig};
pub use corpus::chunker::{chunk_document, Chunk};
pub use corpus::loader::{CorpusLoader, Document, LoaderError, ReadError};
pub use embedding::{EmbedError, Embedder, Embedding, HashingEmbedder, OpenAiEmbedder};
pub use ingest::{run_ingest, IngestError, IngestStats};
pub use llm::{AnthropicClient, LanguageModel, LlmError};
pub use query::{Answer, QueryEngine, QueryError, SourceRef};
pub use store::{cosine_similarity, IndexEntry, IndexError, IndexStore, SearchHit};
pub use tokens::{estimate_tokens_quick, TokenCounter};
