//! Core data models used throughout the agent.
//!
//! These types represent the documents, chunks, and conversation turns that
//! flow through the ingestion and answering pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingestion unit: one source document after extraction.
///
/// `doc_id` is source-stable (the relative path / blob name) and is the key
/// for change detection and stale-chunk cleanup. `etag` is the opaque
/// version marker supplied by the source connector.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    /// Connector tag, e.g. `"filesystem"`.
    pub source: String,
    /// Display name (file name without directories).
    pub file: String,
    pub etag: String,
    /// Normalized body text.
    pub text: String,
}

/// A bounded span of normalized document text, the unit of retrieval.
///
/// `chunk_position` is contiguous and dense per `doc_id`; `content_hash` is
/// a pure function of `text`; `chunk_id` is derived deterministically from
/// `(file, content_hash, chunk_position)` so re-ingestion of identical
/// content never produces a duplicate row.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub chunk_position: usize,
    pub total_chunks: usize,
    /// SHA-256 of `text`, lowercase hex.
    pub content_hash: String,
    pub file: String,
    pub source: String,
}

/// Persisted per-document ingestion state.
///
/// One JSON object per document, keyed by a hash of `doc_id`. Created on
/// first successful index, overwritten on every re-index, deleted when the
/// source document disappears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocState {
    pub doc_id: String,
    pub etag: String,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
}

/// One role-tagged message in the session history.
///
/// History is consumed read-only per request; the core never persists it.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A ranked chunk returned by the search index.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub doc_id: String,
    /// Display name of the owning document; empty when the index row is
    /// missing one.
    pub file: String,
    pub text: String,
    pub score: f64,
}
