//! Ingestion Pipeline
//!
//! Batch job that (re)builds the vector index from the documentation
//! corpus: load documents, chunk, embed, upsert. Embedding requests for
//! one document run concurrently up to the configured bound while their
//! results arrive in source order, so chunk order in the index matches
//! chunk order in the document.

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::PipelineConfig;
use crate::corpus::chunker::{chunk_document, Chunk};
use crate::corpus::loader::CorpusLoader;
use crate::embedding::{EmbedError, Embedder, Embedding};
use crate::store::{IndexEntry, IndexError, IndexStore};

#[derive(Error, Debug)]
pub enum IngestError {
    /// Embedding failure in strict mode; the run stops here.
    #[error("embedding failed for {chunk_id}: {source}")]
    Embed {
        chunk_id: String,
        #[source]
        source: EmbedError,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Summary of one ingestion run. Per-file and per-chunk failures are
/// collected here rather than aborting the batch (unless strict mode).
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    pub run_id: String,
    pub documents_indexed: u32,
    pub chunks_indexed: u32,
    pub chunks_failed: u32,
    pub files_failed: u32,
    pub errors: Vec<String>,
    pub cancelled: bool,
    pub finished: DateTime<Utc>,
}

impl IngestStats {
    fn new() -> Self {
        Self {
            run_id: Ulid::new().to_string(),
            documents_indexed: 0,
            chunks_indexed: 0,
            chunks_failed: 0,
            files_failed: 0,
            errors: Vec::new(),
            cancelled: false,
            finished: Utc::now(),
        }
    }
}

/// Run a full ingestion pass over the loader's corpus.
///
/// Each document is replaced atomically: its chunks are embedded first,
/// then the document's prior entries are deleted and the new ones written
/// in sequence order. Cancellation is cooperative: checked between chunk
/// completions and between documents; a document interrupted mid-embedding
/// is not written, so the index never holds a partial document.
pub async fn run_ingest(
    loader: &CorpusLoader,
    embedder: Arc<dyn Embedder>,
    store: &IndexStore,
    config: &PipelineConfig,
    cancel: &AtomicBool,
) -> Result<IngestStats, IngestError> {
    let mut stats = IngestStats::new();
    info!(run_id = %stats.run_id, strict = config.strict, "ingestion run started");

    for doc_result in loader.documents() {
        if cancel.load(Ordering::Relaxed) {
            stats.cancelled = true;
            break;
        }

        let doc = match doc_result {
            Ok(doc) => doc,
            Err(err) => {
                warn!(error = %err, "skipping unreadable file");
                stats.files_failed += 1;
                stats.errors.push(err.to_string());
                continue;
            }
        };

        let chunks = chunk_document(&doc, config.chunk_size, config.chunk_overlap);

        let mut pending = stream::iter(chunks.into_iter().map(|chunk| {
            let embedder = Arc::clone(&embedder);
            async move {
                let result = embedder.embed(&chunk.text).await;
                (chunk, result)
            }
        }))
        .buffered(config.concurrency.max(1));

        let mut embedded: Vec<(Chunk, Embedding)> = Vec::new();

        while let Some((chunk, result)) = pending.next().await {
            match result {
                Ok(vector) => embedded.push((chunk, vector)),
                Err(err) => {
                    if config.strict {
                        return Err(IngestError::Embed {
                            chunk_id: chunk.id(),
                            source: err,
                        });
                    }
                    warn!(chunk = %chunk.id(), error = %err, "embedding failed; skipping chunk");
                    stats.chunks_failed += 1;
                    stats.errors.push(format!("{}: {}", chunk.id(), err));
                }
            }

            if cancel.load(Ordering::Relaxed) {
                stats.cancelled = true;
                break;
            }
        }
        drop(pending);

        if stats.cancelled {
            // The interrupted document is not written; its prior entries stay
            info!(doc = %doc.id, "cancelled during embedding");
            break;
        }

        // Replace the document's entries wholesale, in sequence order
        store.delete_by_document(&doc.id);
        let indexed = embedded.len() as u32;
        for (chunk, vector) in embedded {
            store.upsert(IndexEntry {
                chunk_id: chunk.id(),
                doc_id: chunk.doc_id,
                seq: chunk.seq,
                text: chunk.text,
                vector,
                category: doc.category.clone(),
                heading: chunk.heading,
                model_version: embedder.model_version().to_string(),
            })?;
        }

        stats.documents_indexed += 1;
        stats.chunks_indexed += indexed;
    }

    stats.finished = Utc::now();
    info!(
        run_id = %stats.run_id,
        documents = stats.documents_indexed,
        chunks = stats.chunks_indexed,
        failed_chunks = stats.chunks_failed,
        failed_files = stats.files_failed,
        cancelled = stats.cancelled,
        "ingestion run finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;

    const FAIL_MARKER: &str = "@@fail@@";

    /// Delegates to the hashing embedder but fails for marked chunks.
    struct FailingEmbedder {
        inner: HashingEmbedder,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_version(&self) -> &str {
            self.inner.model_version()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
            if text.contains(FAIL_MARKER) {
                return Err(EmbedError::Service {
                    status: 500,
                    body: "synthetic failure".to_string(),
                });
            }
            self.inner.embed(text).await
        }
    }

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            chunk_size: 200,
            chunk_overlap: 50,
            concurrency: 3,
            ..Default::default()
        }
    }

    fn hashing() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::default())
    }

    fn fresh_store(embedder: &Arc<dyn Embedder>) -> IndexStore {
        IndexStore::new(embedder.model_version(), embedder.dimension())
    }

    /// 350 visible characters of varied content.
    fn doc_350(word: &str) -> String {
        let mut text = format!("device {} ", word).repeat(40);
        text.truncate(350);
        assert_eq!(text.len(), 350);
        text
    }

    #[tokio::test]
    async fn test_three_docs_two_chunks_each() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "guides/a.md", &doc_350("alpha"));
        write_file(tmp.path(), "guides/b.md", &doc_350("beta"));
        write_file(tmp.path(), "guides/c.md", &doc_350("gamma"));

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder = hashing();
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        let stats = run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();

        assert_eq!(stats.documents_indexed, 3);
        assert_eq!(stats.chunks_indexed, 6);
        assert_eq!(store.len(), 6);
        assert!(stats.errors.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_order_matches_source_order() {
        let tmp = tempfile::tempdir().unwrap();
        let text = "first part of the guide. ".repeat(40);
        write_file(tmp.path(), "guides/long.md", &text);

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder = hashing();
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();

        let entries = store.entries();
        assert!(entries.len() > 1);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.seq as usize, i);
        }
    }

    #[tokio::test]
    async fn test_reingest_unchanged_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "guides/a.md", &doc_350("alpha"));

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder = hashing();
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        run_ingest(&loader, Arc::clone(&embedder), &store, &small_config(), &cancel)
            .await
            .unwrap();
        let first = store.entries();

        run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();
        let second = store.entries();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_reingest_changed_doc_replaces_entries() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "guides/a.md", &doc_350("alpha"));

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder = hashing();
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        run_ingest(&loader, Arc::clone(&embedder), &store, &small_config(), &cancel)
            .await
            .unwrap();
        assert_eq!(store.len(), 2);

        write_file(tmp.path(), "guides/a.md", "Rewritten, much shorter.");
        run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Rewritten, much shorter.");
        assert!(entries.iter().all(|e| !e.text.contains("alpha")));
    }

    #[tokio::test]
    async fn test_lenient_mode_skips_failed_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            let content = if i == 4 {
                format!("chunk {} {}", i, FAIL_MARKER)
            } else {
                format!("chunk {} works fine", i)
            };
            write_file(tmp.path(), &format!("guides/doc{}.md", i), &content);
        }

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder {
            inner: HashingEmbedder::default(),
        });
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        let stats = run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();

        assert_eq!(store.len(), 9);
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("doc4.md"));
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "guides/bad.md", &format!("text {}", FAIL_MARKER));

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder {
            inner: HashingEmbedder::default(),
        });
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(false);

        let config = PipelineConfig {
            strict: true,
            ..small_config()
        };
        let result = run_ingest(&loader, embedder, &store, &config, &cancel).await;

        assert!(matches!(result, Err(IngestError::Embed { .. })));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_work() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "guides/a.md", &doc_350("alpha"));

        let loader = CorpusLoader::new(vec![tmp.path().to_path_buf()]).unwrap();
        let embedder = hashing();
        let store = fresh_store(&embedder);
        let cancel = AtomicBool::new(true);

        let stats = run_ingest(&loader, embedder, &store, &small_config(), &cancel)
            .await
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.documents_indexed, 0);
        assert_eq!(store.len(), 0);
    }
}
