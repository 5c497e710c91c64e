//! Askdocs CLI
//!
//! Thin entry points over the ingestion pipeline and the query engine:
//! `ingest` rebuilds the vector index from documentation roots, `ask`
//! answers a question against it, `status` reports index contents.
//! All output is JSON on stdout; logs go to stderr.

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use askdocs_lib::{
    run_ingest, AnthropicClient, CorpusLoader, Embedder, HashingEmbedder, IndexStore,
    OpenAiEmbedder, PipelineConfig, QueryEngine,
};

/// Sampling temperature for answer synthesis.
const ANSWER_TEMPERATURE: f32 = 0.2;

#[derive(Parser)]
#[command(name = "askdocs")]
#[command(about = "Index plugin SDK documentation and answer questions against it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from documentation roots
    Ingest {
        /// Documentation root directories
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        /// Index file location
        #[arg(long, env = "ASKDOCS_INDEX")]
        index: Option<PathBuf>,
        /// Maximum chunk length in characters
        #[arg(long, default_value_t = 2000)]
        chunk_size: usize,
        /// Overlap between consecutive chunks in characters
        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,
        /// Bound on concurrent embedding requests
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        /// Abort the whole run on any embedding failure
        #[arg(long)]
        strict: bool,
        #[command(flatten)]
        embed: EmbedOpts,
    },
    /// Ask a question against the index
    Ask {
        /// The question to answer
        question: String,
        /// Number of chunks to retrieve
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
        /// Bound on the language-model call, in seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
        /// Drop retrieval hits scoring below this similarity
        #[arg(long)]
        score_floor: Option<f32>,
        /// Index file location
        #[arg(long, env = "ASKDOCS_INDEX")]
        index: Option<PathBuf>,
        /// Anthropic API key for answer synthesis
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        anthropic_api_key: Option<String>,
        /// Anthropic model identifier
        #[arg(long, env = "ASKDOCS_ANSWER_MODEL", default_value = "claude-3-5-sonnet-latest")]
        answer_model: String,
        #[command(flatten)]
        embed: EmbedOpts,
    },
    /// Report index contents
    Status {
        /// Index file location
        #[arg(long, env = "ASKDOCS_INDEX")]
        index: Option<PathBuf>,
    },
}

#[derive(Args)]
struct EmbedOpts {
    /// Use the offline feature-hashing embedder (no API key needed)
    #[arg(long)]
    local: bool,
    /// OpenAI-compatible embeddings endpoint base URL
    #[arg(long, env = "ASKDOCS_EMBED_URL", default_value = "https://api.openai.com/v1")]
    embed_url: String,
    /// API key for the embedding service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    embed_api_key: Option<String>,
    /// Embedding model identifier
    #[arg(long, env = "ASKDOCS_EMBED_MODEL", default_value = "text-embedding-3-small")]
    embed_model: String,
    /// Embedding dimensionality
    #[arg(long, default_value_t = 1536)]
    embed_dimension: usize,
}

impl EmbedOpts {
    fn build(&self, timeout: Duration, max_retries: usize) -> anyhow::Result<Arc<dyn Embedder>> {
        if self.local {
            return Ok(Arc::new(HashingEmbedder::default()));
        }
        let key = self
            .embed_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set (or pass --local)"))?;
        let embedder = OpenAiEmbedder::new(
            &self.embed_url,
            key,
            &self.embed_model,
            self.embed_dimension,
            timeout,
            max_retries,
        )?;
        Ok(Arc::new(embedder))
    }
}

// ============ Output Types ============

#[derive(Serialize)]
struct AskOutput {
    answer: String,
    sources: Vec<askdocs_lib::SourceRef>,
}

#[derive(Serialize)]
struct StatusOutput {
    path: String,
    entries: usize,
    documents: usize,
    model_version: String,
    dimension: usize,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ingest {
            roots,
            index,
            chunk_size,
            chunk_overlap,
            concurrency,
            strict,
            embed,
        } => {
            handle_ingest(roots, index, chunk_size, chunk_overlap, concurrency, strict, embed).await
        }
        Commands::Ask {
            question,
            top_k,
            timeout_secs,
            score_floor,
            index,
            anthropic_api_key,
            answer_model,
            embed,
        } => {
            handle_ask(
                question,
                top_k,
                timeout_secs,
                score_floor,
                index,
                anthropic_api_key,
                answer_model,
                embed,
            )
            .await
        }
        Commands::Status { index } => handle_status(index),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput {
                error: format!("{:#}", e),
            };
            println!(
                "{}",
                serde_json::to_string(&error)
                    .unwrap_or_else(|_| r#"{"error":"unreportable error"}"#.to_string())
            );
            std::process::exit(1);
        }
    }
}

/// Default index location under the platform data directory.
fn index_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("askdocs")
            .join("index.json")
    })
}

// ============ Handlers ============

async fn handle_ingest(
    roots: Vec<PathBuf>,
    index: Option<PathBuf>,
    chunk_size: usize,
    chunk_overlap: usize,
    concurrency: usize,
    strict: bool,
    embed: EmbedOpts,
) -> anyhow::Result<String> {
    let config = PipelineConfig {
        chunk_size,
        chunk_overlap,
        concurrency,
        strict,
        ..Default::default()
    };
    config.validate()?;

    let embedder = embed.build(config.embed_timeout, config.max_retries)?;
    let loader = CorpusLoader::new(roots)?;
    let store = IndexStore::new(embedder.model_version(), embedder.dimension());

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested; finishing in-flight work");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let stats = run_ingest(&loader, embedder, &store, &config, &cancel).await?;

    // Full rebuild: the previous index file is replaced on success
    let path = index_path(index);
    store
        .persist(&path)
        .with_context(|| format!("failed to persist index to {}", path.display()))?;

    Ok(serde_json::to_string(&stats)?)
}

#[allow(clippy::too_many_arguments)]
async fn handle_ask(
    question: String,
    top_k: usize,
    timeout_secs: u64,
    score_floor: Option<f32>,
    index: Option<PathBuf>,
    anthropic_api_key: Option<String>,
    answer_model: String,
    embed: EmbedOpts,
) -> anyhow::Result<String> {
    let config = PipelineConfig {
        top_k,
        score_floor,
        ..Default::default()
    };
    config.validate()?;

    let path = index_path(index);
    let store = IndexStore::load(&path).with_context(|| {
        format!(
            "failed to load index from {} (run ingest first)",
            path.display()
        )
    })?;

    let embedder = embed.build(config.embed_timeout, config.max_retries)?;
    let key = anthropic_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY must be set"))?;
    let llm = AnthropicClient::new(key, &answer_model, ANSWER_TEMPERATURE)?;

    let engine = QueryEngine::new(&store, embedder.as_ref(), &llm, &config);
    let answer = engine
        .answer(&question, top_k, Duration::from_secs(timeout_secs))
        .await?;

    let output = AskOutput {
        answer: answer.text,
        sources: answer.sources,
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_status(index: Option<PathBuf>) -> anyhow::Result<String> {
    let path = index_path(index);
    let store = IndexStore::load(&path)
        .with_context(|| format!("failed to load index from {}", path.display()))?;

    let output = StatusOutput {
        path: path.to_string_lossy().to_string(),
        entries: store.len(),
        documents: store.document_ids().len(),
        model_version: store.model_version(),
        dimension: store.dimension(),
    };
    Ok(serde_json::to_string(&output)?)
}
