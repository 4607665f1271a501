//! Ingestion pipeline orchestration.
//!
//! Drives one document per trigger through extract → normalize → chunk →
//! embed → index, with per-document change detection over persisted
//! [`DocState`](crate::models::DocState) records:
//!
//! - prior state exists and the connector etag matches → no writes at all;
//! - otherwise every existing chunk for the document is deleted (full
//!   replace — positional diffing would orphan chunks when boundaries
//!   shift) before the new set is written;
//! - the state record is persisted **last**, so a crash anywhere before it
//!   causes a benign re-index on retry, never a missed update.
//!
//! The delete-then-write window is not transactional across the index and
//! the state record; the caller redelivers triggers at-least-once.

use std::sync::Arc;
use tracing::{debug, info};

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::extract;
use crate::index::{IndexEntry, SearchIndex};
use crate::models::{Chunk, DocState, Document};
use crate::normalize::normalize;
use crate::source::{self, DocumentSource};
use crate::state::StateStore;

/// Result of one upsert trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Unsupported document type; nothing done.
    Skipped,
    /// Connector etag matches the stored state; zero writes performed.
    Unchanged,
    /// Document (re-)indexed: old chunks purged, new set written.
    Reindexed { chunks: usize, deleted: u64 },
}

/// Result of one delete trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// No state record existed; nothing done.
    Untracked,
    /// Chunks purged and state record removed.
    Removed { deleted: u64 },
}

/// Totals for an `ingest --all` run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub documents: usize,
    pub unchanged: usize,
    pub reindexed: usize,
    pub chunks_written: usize,
}

pub struct IngestPipeline {
    source: Arc<dyn DocumentSource>,
    states: Arc<dyn StateStore>,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingConfig,
    embed_batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        states: Arc<dyn StateStore>,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            source,
            states,
            index,
            embedder,
            chunking,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    /// Handle an upsert trigger for one document.
    pub async fn upsert_document(&self, doc_id: &str) -> Result<UpsertOutcome, PipelineError> {
        if !extract::is_supported(doc_id) {
            debug!(doc_id, "unsupported document type, skipping");
            return Ok(UpsertOutcome::Skipped);
        }

        let prev = self.states.load(doc_id).await?;
        let blob = self.source.fetch(doc_id).await?;

        if let Some(prev) = &prev {
            if prev.etag == blob.etag {
                debug!(doc_id, "etag unchanged, skipping");
                return Ok(UpsertOutcome::Unchanged);
            }
        }

        let text = extract::extract_text(&blob.bytes, doc_id)
            .map_err(|e| PipelineError::Source(e.to_string()))?;
        let doc = Document {
            doc_id: doc_id.to_string(),
            source: self.source.source_label().to_string(),
            file: source::display_name(doc_id),
            etag: blob.etag.clone(),
            text: normalize(&text),
        };

        let chunks = chunk::chunk_documents(&[doc], &self.chunking);
        let entries = self.embed_entries(chunks).await?;

        // Full replace: purge the document's old chunk set before writing
        // the new one, then advance the state record.
        let deleted = self.index.delete_document(doc_id).await?;
        self.index.upsert(&entries).await?;
        self.states
            .save(&DocState {
                doc_id: doc_id.to_string(),
                etag: blob.etag,
                chunk_count: entries.len(),
                updated_at: None,
            })
            .await?;

        info!(doc_id, chunks = entries.len(), deleted, "document indexed");
        Ok(UpsertOutcome::Reindexed {
            chunks: entries.len(),
            deleted,
        })
    }

    /// Handle a delete trigger for one document.
    pub async fn delete_document(&self, doc_id: &str) -> Result<DeleteOutcome, PipelineError> {
        if self.states.load(doc_id).await?.is_none() {
            debug!(doc_id, "no state record, nothing to delete");
            return Ok(DeleteOutcome::Untracked);
        }

        let deleted = self.index.delete_document(doc_id).await?;
        self.states.delete(doc_id).await?;

        info!(doc_id, deleted, "document removed from index");
        Ok(DeleteOutcome::Removed { deleted })
    }

    /// Ingest every supported document the connector lists.
    pub async fn ingest_all(&self) -> Result<IngestSummary, PipelineError> {
        let mut summary = IngestSummary::default();
        for doc_id in self.source.list().await? {
            summary.documents += 1;
            match self.upsert_document(&doc_id).await? {
                UpsertOutcome::Unchanged => summary.unchanged += 1,
                UpsertOutcome::Reindexed { chunks, .. } => {
                    summary.reindexed += 1;
                    summary.chunks_written += chunks;
                }
                UpsertOutcome::Skipped => {}
            }
        }
        Ok(summary)
    }

    async fn embed_entries(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>, PipelineError> {
        if !self.embedder.is_enabled() {
            return Ok(chunks
                .into_iter()
                .map(|chunk| IndexEntry {
                    chunk,
                    vector: None,
                })
                .collect());
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::ModelCall(format!(
                    "embedding count mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            entries.extend(batch.iter().cloned().zip(vectors).map(|(chunk, vector)| {
                IndexEntry {
                    chunk,
                    vector: Some(vector),
                }
            }));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledEmbeddings;
    use crate::index::SearchMode;
    use crate::models::RetrievedChunk;
    use crate::source::{content_etag, SourceBlob};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MemSource {
        files: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemSource {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
            }
        }

        fn put(&self, doc_id: &str, body: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(doc_id.to_string(), body.as_bytes().to_vec());
        }
    }

    #[async_trait]
    impl DocumentSource for MemSource {
        fn source_label(&self) -> &str {
            "memory"
        }

        async fn list(&self) -> Result<Vec<String>, PipelineError> {
            let mut ids: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }

        async fn fetch(&self, doc_id: &str) -> Result<SourceBlob, PipelineError> {
            let files = self.files.lock().unwrap();
            let bytes = files
                .get(doc_id)
                .ok_or_else(|| PipelineError::Source(format!("missing: {doc_id}")))?
                .clone();
            let etag = content_etag(&bytes);
            Ok(SourceBlob { bytes, etag })
        }
    }

    #[derive(Default)]
    struct MemStateStore {
        states: Mutex<HashMap<String, DocState>>,
    }

    #[async_trait]
    impl StateStore for MemStateStore {
        async fn load(&self, doc_id: &str) -> Result<Option<DocState>, PipelineError> {
            Ok(self.states.lock().unwrap().get(doc_id).cloned())
        }

        async fn save(&self, state: &DocState) -> Result<(), PipelineError> {
            self.states
                .lock()
                .unwrap()
                .insert(state.doc_id.clone(), state.clone());
            Ok(())
        }

        async fn delete(&self, doc_id: &str) -> Result<(), PipelineError> {
            self.states.lock().unwrap().remove(doc_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemIndex {
        rows: Mutex<HashMap<String, Chunk>>,
        upsert_calls: AtomicUsize,
        delete_calls: AtomicUsize,
    }

    impl MemIndex {
        fn chunks_for(&self, doc_id: &str) -> Vec<Chunk> {
            let mut chunks: Vec<Chunk> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.doc_id == doc_id)
                .cloned()
                .collect();
            chunks.sort_by_key(|c| c.chunk_position);
            chunks
        }
    }

    #[async_trait]
    impl SearchIndex for MemIndex {
        async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), PipelineError> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            for entry in entries {
                rows.insert(entry.chunk.chunk_id.clone(), entry.chunk.clone());
            }
            Ok(())
        }

        async fn delete_document(&self, doc_id: &str) -> Result<u64, PipelineError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, c| c.doc_id != doc_id);
            Ok((before - rows.len()) as u64)
        }

        async fn search(
            &self,
            _query: &str,
            _query_vector: Option<&[f32]>,
            _k: usize,
            _mode: SearchMode,
        ) -> Result<Vec<RetrievedChunk>, PipelineError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        source: Arc<MemSource>,
        states: Arc<MemStateStore>,
        index: Arc<MemIndex>,
        pipeline: IngestPipeline,
    }

    fn harness() -> Harness {
        let source = Arc::new(MemSource::new());
        let states = Arc::new(MemStateStore::default());
        let index = Arc::new(MemIndex::default());
        let pipeline = IngestPipeline::new(
            source.clone(),
            states.clone(),
            index.clone(),
            Arc::new(DisabledEmbeddings),
            ChunkingConfig::default(),
            64,
        );
        Harness {
            source,
            states,
            index,
            pipeline,
        }
    }

    #[tokio::test]
    async fn first_ingestion_writes_chunks_and_state() {
        let h = harness();
        h.source.put("a.txt", "Zasady pracy zdalnej obowiązują od stycznia.");

        let outcome = h.pipeline.upsert_document("a.txt").await.unwrap();
        let UpsertOutcome::Reindexed { chunks, deleted } = outcome else {
            panic!("expected reindex, got {outcome:?}");
        };
        assert!(chunks >= 1);
        assert_eq!(deleted, 0);

        let state = h.states.load("a.txt").await.unwrap().unwrap();
        assert_eq!(state.chunk_count, chunks);
        assert_eq!(h.index.chunks_for("a.txt").len(), chunks);
    }

    #[tokio::test]
    async fn unchanged_document_performs_zero_index_writes() {
        let h = harness();
        h.source.put("a.txt", "Zasady pracy zdalnej obowiązują od stycznia.");

        h.pipeline.upsert_document("a.txt").await.unwrap();
        let writes_after_first = h.index.upsert_calls.load(Ordering::SeqCst);
        let deletes_after_first = h.index.delete_calls.load(Ordering::SeqCst);

        let outcome = h.pipeline.upsert_document("a.txt").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(h.index.upsert_calls.load(Ordering::SeqCst), writes_after_first);
        assert_eq!(h.index.delete_calls.load(Ordering::SeqCst), deletes_after_first);
    }

    #[tokio::test]
    async fn content_edit_fully_replaces_the_chunk_set() {
        let h = harness();
        let long_body = (0..40)
            .map(|i| format!("Akapit numer {i} opisuje kolejną zasadę obowiązującą w firmie."))
            .collect::<Vec<_>>()
            .join("\n\n");
        h.source.put("a.txt", &long_body);

        let UpsertOutcome::Reindexed { chunks: first_count, .. } =
            h.pipeline.upsert_document("a.txt").await.unwrap()
        else {
            panic!("expected reindex");
        };
        assert!(first_count > 1);
        let old_ids: Vec<String> = h
            .index
            .chunks_for("a.txt")
            .iter()
            .map(|c| c.chunk_id.clone())
            .collect();

        h.source.put("a.txt", "Krótka nowa treść dokumentu.");
        let UpsertOutcome::Reindexed { chunks: second_count, deleted } =
            h.pipeline.upsert_document("a.txt").await.unwrap()
        else {
            panic!("expected reindex");
        };

        assert!(second_count < first_count);
        assert_eq!(deleted, first_count as u64);

        let remaining = h.index.chunks_for("a.txt");
        assert_eq!(remaining.len(), second_count);
        for chunk in &remaining {
            assert!(!old_ids.contains(&chunk.chunk_id), "stale chunk survived");
        }

        let state = h.states.load("a.txt").await.unwrap().unwrap();
        assert_eq!(state.chunk_count, second_count);
    }

    #[tokio::test]
    async fn delete_purges_chunks_and_state() {
        let h = harness();
        h.source.put("a.txt", "Treść dokumentu do usunięcia.");
        h.pipeline.upsert_document("a.txt").await.unwrap();

        let outcome = h.pipeline.delete_document("a.txt").await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::Removed { deleted } if deleted >= 1));
        assert!(h.index.chunks_for("a.txt").is_empty());
        assert!(h.states.load("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_without_state_is_a_no_op() {
        let h = harness();
        let outcome = h.pipeline.delete_document("nieznany.txt").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Untracked);
        assert_eq!(h.index.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_extension_is_skipped() {
        let h = harness();
        h.source.put("obraz.png", "nie dokument");
        let outcome = h.pipeline.upsert_document("obraz.png").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped);
    }

    #[tokio::test]
    async fn ingest_all_reports_totals() {
        let h = harness();
        h.source.put("a.txt", "Pierwszy dokument o urlopach.");
        h.source.put("b.txt", "Drugi dokument o delegacjach.");

        let summary = h.pipeline.ingest_all().await.unwrap();
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.reindexed, 2);
        assert!(summary.chunks_written >= 2);

        let summary = h.pipeline.ingest_all().await.unwrap();
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.reindexed, 0);
    }
}
