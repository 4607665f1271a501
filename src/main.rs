//! # Knowledge Agent CLI (`ka`)
//!
//! The `ka` binary drives the agent: database initialization, corpus
//! ingestion, document removal, and one-shot question answering.
//!
//! ## Usage
//!
//! ```bash
//! ka --config ./config/agent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ka init` | Create the SQLite index and run schema migrations |
//! | `ka ingest --all` | Ingest every supported document under the corpus root |
//! | `ka ingest <doc>` | Ingest (or re-ingest) one document by id |
//! | `ka delete <doc>` | Remove a deleted document's chunks and state |
//! | `ka ask "<question>"` | Answer one question from the indexed corpus |
//! | `ka status` | Show corpus root health and index counts |
//!
//! API keys come from the environment (`.env` is honored):
//! `ANTHROPIC_API_KEY` for answering, `OPENAI_API_KEY` when the embedding
//! provider is enabled.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use knowledge_agent::config::{self, Config};
use knowledge_agent::db;
use knowledge_agent::embedding;
use knowledge_agent::index::SqliteIndex;
use knowledge_agent::ingest::{DeleteOutcome, IngestPipeline, UpsertOutcome};
use knowledge_agent::llm;
use knowledge_agent::pipeline::AnswerPipeline;
use knowledge_agent::source::{DocumentSource, FilesystemSource};
use knowledge_agent::state::FsStateStore;

/// Knowledge Agent — retrieval-augmented question answering over a private
/// document corpus.
#[derive(Parser)]
#[command(
    name = "ka",
    about = "Knowledge Agent — answer questions strictly from your document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/agent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the SQLite index schema. Idempotent.
    Init,

    /// Ingest documents from the corpus root.
    ///
    /// Unchanged documents (matching etag) are skipped without writes;
    /// changed documents have their old chunk set fully replaced.
    Ingest {
        /// Document id (path relative to the corpus root).
        doc: Option<String>,

        /// Ingest every supported document.
        #[arg(long)]
        all: bool,
    },

    /// Remove a document's chunks and ingestion state.
    Delete {
        /// Document id (path relative to the corpus root).
        doc: String,
    },

    /// Answer one question from the indexed corpus.
    Ask {
        /// The question, in Polish.
        question: String,
    },

    /// Show corpus root health and index counts.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { doc, all } => run_ingest(&config, doc, all).await,
        Commands::Delete { doc } => run_delete(&config, &doc).await,
        Commands::Ask { question } => run_ask(&config, &question).await,
        Commands::Status => run_status(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

fn build_ingest(config: &Config, pool: sqlx::SqlitePool) -> Result<IngestPipeline> {
    let source = Arc::new(FilesystemSource::new(&config.corpus.root));
    let states = Arc::new(FsStateStore::new(&config.corpus.state_prefix));
    let index = Arc::new(SqliteIndex::new(
        pool,
        config.retrieval.hybrid_alpha,
        config.retrieval.candidate_k,
    ));
    let embedder = embedding::create_provider(&config.embedding)?;
    Ok(IngestPipeline::new(
        source,
        states,
        index,
        embedder,
        config.chunking.clone(),
        config.embedding.batch_size,
    ))
}

async fn run_ingest(config: &Config, doc: Option<String>, all: bool) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;
    let pipeline = build_ingest(config, pool.clone())?;

    match (doc, all) {
        (Some(doc_id), false) => {
            match pipeline.upsert_document(&doc_id).await? {
                UpsertOutcome::Skipped => println!("{doc_id}: unsupported type, skipped"),
                UpsertOutcome::Unchanged => println!("{doc_id}: unchanged"),
                UpsertOutcome::Reindexed { chunks, deleted } => {
                    println!("{doc_id}: indexed {chunks} chunks ({deleted} stale removed)")
                }
            }
        }
        (None, true) => {
            let summary = pipeline.ingest_all().await?;
            println!("ingest all");
            println!("  documents: {}", summary.documents);
            println!("  unchanged: {}", summary.unchanged);
            println!("  reindexed: {}", summary.reindexed);
            println!("  chunks written: {}", summary.chunks_written);
            println!("ok");
        }
        _ => anyhow::bail!("pass a document id or --all (exactly one)"),
    }

    pool.close().await;
    Ok(())
}

async fn run_delete(config: &Config, doc_id: &str) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;
    let pipeline = build_ingest(config, pool.clone())?;

    match pipeline.delete_document(doc_id).await? {
        DeleteOutcome::Untracked => println!("{doc_id}: not tracked, nothing to delete"),
        DeleteOutcome::Removed { deleted } => println!("{doc_id}: removed {deleted} chunks"),
    }

    pool.close().await;
    Ok(())
}

async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let index = Arc::new(SqliteIndex::new(
        pool.clone(),
        config.retrieval.hybrid_alpha,
        config.retrieval.candidate_k,
    ));
    let embedder = embedding::create_provider(&config.embedding)?;
    let chat = llm::create_chat(&config.chat).context("chat model unavailable")?;

    let pipeline = AnswerPipeline::new(chat, embedder, index, &config.retrieval)?;
    let answer = pipeline.answer(question, &[]).await?;

    println!("\n{answer}\n");
    pool.close().await;
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    let root_ok = config.corpus.root.exists();
    println!(
        "corpus root: {} ({})",
        config.corpus.root.display(),
        if root_ok { "OK" } else { "MISSING" }
    );

    if root_ok {
        let source = FilesystemSource::new(&config.corpus.root);
        let docs = source.list().await?;
        println!("supported documents: {}", docs.len());
    }

    let pool = db::connect(&config.db.path).await?;
    db::run_migrations(&pool).await?;
    let index = SqliteIndex::new(pool.clone(), config.retrieval.hybrid_alpha, config.retrieval.candidate_k);
    println!("indexed chunks: {}", index.count().await?);
    println!("retrieval mode: {}", config.retrieval.mode);
    println!(
        "embeddings: {}",
        if config.embedding.is_enabled() {
            config.embedding.model.as_str()
        } else {
            "disabled"
        }
    );
    pool.close().await;
    Ok(())
}
