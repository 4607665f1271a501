use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Root directory scanned by the filesystem source connector.
    pub root: PathBuf,
    /// Directory prefix for persisted per-document ingestion state.
    #[serde(default = "default_state_prefix")]
    pub state_prefix: String,
}

fn default_state_prefix() -> String {
    "_rag_state".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Two-stage chunking parameters: a structural pass bounded in characters,
/// then a fixed-size pass bounded in (approximate) tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap_chars: default_overlap_chars(),
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_target_chars() -> usize {
    2000
}
fn default_overlap_chars() -> usize {
    200
}
fn default_target_tokens() -> usize {
    700
}
fn default_overlap_tokens() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the answering pipeline.
    #[serde(default = "default_k")]
    pub k: usize,
    /// `keyword`, `semantic`, or `hybrid`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Weight of the vector channel in hybrid mode.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    /// Candidates fetched per channel before merging.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            mode: default_mode(),
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_k() -> usize {
    6
}
fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            max_tokens: default_chat_max_tokens(),
            temperature: 0.0,
            max_retries: default_max_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_chat_max_tokens() -> u32 {
    1024
}
fn default_chat_timeout_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_chars == 0 {
        anyhow::bail!("chunking.target_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.target_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.target_chars");
    }
    if config.chunking.target_tokens == 0 {
        anyhow::bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }
    match config.retrieval.mode.as_str() {
        "keyword" | "semantic" | "hybrid" => {}
        other => anyhow::bail!(
            "Unknown retrieval mode: '{}'. Must be keyword, semantic, or hybrid.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if (config.retrieval.mode == "semantic" || config.retrieval.mode == "hybrid")
        && !config.embedding.is_enabled()
    {
        anyhow::bail!(
            "retrieval.mode '{}' requires embeddings. Set [embedding] provider in config.",
            config.retrieval.mode
        );
    }

    if config.corpus.state_prefix.trim().is_empty() {
        anyhow::bail!("corpus.state_prefix must not be empty");
    }

    Ok(config)
}
