//! End-to-end pipeline tests: ingest a corpus with the offline embedder,
//! persist the index, reload it, and answer a question against it.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use askdocs_lib::{
    run_ingest, CorpusLoader, Embedder, HashingEmbedder, IndexStore, LanguageModel, LlmError,
    PipelineConfig, QueryEngine, QueryError,
};

struct StaticLlm {
    reply: String,
}

#[async_trait]
impl LanguageModel for StaticLlm {
    async fn complete(&self, prompt: &str, _max_tokens: usize) -> Result<String, LlmError> {
        assert!(prompt.contains("Context:"));
        Ok(self.reply.clone())
    }
}

fn write_file(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn seed_corpus(root: &Path) {
    write_file(
        root,
        "guides/install.md",
        "# Installing the SDK\n\nDownload the installer and run it. \
         The USB driver must be installed before the device is connected. \
         Restart the host application afterwards.",
    );
    write_file(
        root,
        "templates/manifest.md",
        "# Plugin Manifest\n\nEvery plugin ships a manifest declaring its \
         entry points, required SDK version, and exposed parameters.",
    );
    write_file(
        root,
        "troubleshooting/usb.md",
        "# Device Not Detected\n\nCheck the cable, then reinstall the USB \
         driver. Powered hubs are recommended for older hardware revisions.",
    );
}

#[tokio::test]
async fn ingest_persist_load_ask_round_trip() {
    let corpus = tempfile::tempdir().unwrap();
    seed_corpus(corpus.path());

    let loader = CorpusLoader::new(vec![corpus.path().to_path_buf()]).unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
    let store = IndexStore::new(embedder.model_version(), embedder.dimension());
    let config = PipelineConfig::default();
    let cancel = AtomicBool::new(false);

    let stats = run_ingest(&loader, Arc::clone(&embedder), &store, &config, &cancel)
        .await
        .unwrap();
    assert_eq!(stats.documents_indexed, 3);
    assert!(stats.errors.is_empty());
    assert_eq!(store.len(), 3);

    // Persist, reload, and verify search results are identical
    let index_dir = tempfile::tempdir().unwrap();
    let index_path = index_dir.path().join("index.json");
    store.persist(&index_path).unwrap();
    let loaded = IndexStore::load(&index_path).unwrap();

    let probe = HashingEmbedder::default().generate("usb driver install");
    let before = store.search(&probe, 3, None).unwrap();
    let after = loaded.search(&probe, 3, None).unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.entry, a.entry);
        assert_eq!(b.score, a.score);
    }

    // Ask against the reloaded index
    let llm = StaticLlm {
        reply: "Reinstall the USB driver, then reconnect the device.".to_string(),
    };
    let hashing = HashingEmbedder::default();
    let engine = QueryEngine::new(&loaded, &hashing, &llm, &config);

    let answer = engine
        .answer(
            "the device is not detected over usb, what should I do?",
            3,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert!(!answer.text.is_empty());
    assert!(!answer.sources.is_empty());
    // The troubleshooting chunk should be among the citations
    assert!(answer
        .sources
        .iter()
        .any(|s| s.doc_id.ends_with("troubleshooting/usb.md")));
}

#[tokio::test]
async fn reingest_after_edit_serves_fresh_content() {
    let corpus = tempfile::tempdir().unwrap();
    seed_corpus(corpus.path());

    let loader = CorpusLoader::new(vec![corpus.path().to_path_buf()]).unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
    let store = IndexStore::new(embedder.model_version(), embedder.dimension());
    let config = PipelineConfig::default();
    let cancel = AtomicBool::new(false);

    run_ingest(&loader, Arc::clone(&embedder), &store, &config, &cancel)
        .await
        .unwrap();

    write_file(
        corpus.path(),
        "guides/install.md",
        "# Installing the SDK\n\nThe installer is now a single signed bundle.",
    );
    run_ingest(&loader, embedder, &store, &config, &cancel)
        .await
        .unwrap();

    assert_eq!(store.len(), 3);
    let entries = store.entries();
    let install: Vec<_> = entries
        .iter()
        .filter(|e| e.doc_id.ends_with("guides/install.md"))
        .collect();
    assert_eq!(install.len(), 1);
    assert!(install[0].text.contains("signed bundle"));
    assert!(!install[0].text.contains("USB driver"));
}

#[tokio::test]
async fn querying_with_different_model_fails_before_any_call() {
    let corpus = tempfile::tempdir().unwrap();
    seed_corpus(corpus.path());

    let loader = CorpusLoader::new(vec![corpus.path().to_path_buf()]).unwrap();
    let ingest_embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
    let store = IndexStore::new(ingest_embedder.model_version(), ingest_embedder.dimension());
    let config = PipelineConfig::default();
    let cancel = AtomicBool::new(false);

    run_ingest(&loader, ingest_embedder, &store, &config, &cancel)
        .await
        .unwrap();

    // Different dimensionality means a different model version tag
    let query_embedder = HashingEmbedder::new(128);
    let llm = StaticLlm {
        reply: "unused".to_string(),
    };
    let engine = QueryEngine::new(&store, &query_embedder, &llm, &config);

    let result = engine
        .answer("how do I install?", 3, Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(QueryError::ModelMismatch { .. })));
}
