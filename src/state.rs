//! Persisted per-document ingestion state.
//!
//! One small JSON object per document, stored under a configurable prefix
//! and keyed by a SHA-256 hash of `doc_id` (ids are arbitrary paths; the
//! hash keeps keys flat and filesystem-safe). The record is the only
//! durable state the ingestion pipeline maintains outside the chunk store.
//!
//! A record that fails to parse is treated as absent — the next ingestion
//! run then re-indexes the document from scratch instead of failing.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::warn;

use crate::error::PipelineError;
use crate::models::DocState;

/// Storage key for a document's state record.
pub fn state_key(doc_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    format!("{:x}.json", hasher.finalize())
}

/// Durable store for [`DocState`] records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the record for `doc_id`. Missing or malformed records are `None`.
    async fn load(&self, doc_id: &str) -> Result<Option<DocState>, PipelineError>;

    /// Write (or overwrite) the record, stamping `updated_at`.
    async fn save(&self, state: &DocState) -> Result<(), PipelineError>;

    /// Remove the record. Removing an absent record is not an error.
    async fn delete(&self, doc_id: &str) -> Result<(), PipelineError>;
}

/// State store over a local directory (the blob-style prefix).
pub struct FsStateStore {
    prefix: PathBuf,
}

impl FsStateStore {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, doc_id: &str) -> PathBuf {
        self.prefix.join(state_key(doc_id))
    }
}

#[async_trait]
impl StateStore for FsStateStore {
    async fn load(&self, doc_id: &str) -> Result<Option<DocState>, PipelineError> {
        let path = self.path_for(doc_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PipelineError::Source(format!(
                    "state read failed for {}: {e}",
                    path.display()
                )))
            }
        };

        match serde_json::from_slice::<DocState>(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(doc_id, error = %e, "malformed state record, treating as absent");
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &DocState) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(&self.prefix).await.map_err(|e| {
            PipelineError::Source(format!(
                "state prefix unavailable {}: {e}",
                self.prefix.display()
            ))
        })?;

        let stamped = DocState {
            updated_at: Some(Utc::now()),
            ..state.clone()
        };
        let payload = serde_json::to_vec(&stamped)
            .map_err(|e| PipelineError::Source(format!("state encode failed: {e}")))?;

        let path = self.path_for(&state.doc_id);
        tokio::fs::write(&path, payload).await.map_err(|e| {
            PipelineError::Source(format!("state write failed for {}: {e}", path.display()))
        })
    }

    async fn delete(&self, doc_id: &str) -> Result<(), PipelineError> {
        let path = self.path_for(doc_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Source(format!(
                "state delete failed for {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStateStore::new(dir.path().join("_rag_state"));
        (dir, store)
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let (_dir, store) = store();
        let state = DocState {
            doc_id: "regulaminy/urlopy.pdf".to_string(),
            etag: "etag-1".to_string(),
            chunk_count: 7,
            updated_at: None,
        };
        store.save(&state).await.unwrap();

        let loaded = store.load("regulaminy/urlopy.pdf").await.unwrap().unwrap();
        assert_eq!(loaded.doc_id, state.doc_id);
        assert_eq!(loaded.etag, "etag-1");
        assert_eq!(loaded.chunk_count, 7);
        assert!(loaded.updated_at.is_some());
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let (_dir, store) = store();
        assert!(store.load("nieznany.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_treated_as_absent() {
        let (dir, store) = store();
        let prefix = dir.path().join("_rag_state");
        std::fs::create_dir_all(&prefix).unwrap();
        std::fs::write(prefix.join(state_key("a.txt")), b"{not json").unwrap();

        assert!(store.load("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        let state = DocState {
            doc_id: "a.txt".to_string(),
            etag: "e".to_string(),
            chunk_count: 1,
            updated_at: None,
        };
        store.save(&state).await.unwrap();

        store.delete("a.txt").await.unwrap();
        assert!(store.load("a.txt").await.unwrap().is_none());
        store.delete("a.txt").await.unwrap();
    }

    #[test]
    fn state_keys_are_flat_and_distinct() {
        let a = state_key("katalog/a.txt");
        let b = state_key("katalog/b.txt");
        assert_ne!(a, b);
        assert!(a.ends_with(".json"));
        assert!(!a.contains('/'));
    }
}
