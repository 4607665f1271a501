//! Chunk search index: trait contract plus the SQLite implementation.
//!
//! The ingestion pipeline owns writes (idempotent upsert keyed by chunk id,
//! delete filtered by `doc_id`); the answering pipeline only reads. The
//! SQLite implementation serves keyword search from an FTS5 table, semantic
//! search by cosine similarity over stored embedding BLOBs, and hybrid mode
//! as a min-max-normalized weighted merge of both channels.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::PipelineError;
use crate::models::{Chunk, RetrievedChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(PipelineError::Configuration(format!(
                "unknown retrieval mode: '{other}'"
            ))),
        }
    }
}

/// One chunk plus its (optional) embedding, ready for indexing.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Option<Vec<f32>>,
}

/// The search/index collaborator contract.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Idempotent write keyed by `chunk_id`.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), PipelineError>;

    /// Remove every chunk whose metadata `doc_id` matches. Returns the
    /// number of chunks removed.
    async fn delete_document(&self, doc_id: &str) -> Result<u64, PipelineError>;

    /// Ranked retrieval. `query_vector` is required for semantic and hybrid
    /// modes; the caller owns query embedding.
    async fn search(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;
}

/// SQLite-backed index (FTS5 + embedding BLOBs).
pub struct SqliteIndex {
    pool: SqlitePool,
    hybrid_alpha: f64,
    candidate_k: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, hybrid_alpha: f64, candidate_k: usize) -> Self {
        Self {
            pool,
            hybrid_alpha,
            candidate_k,
        }
    }

    /// Total indexed chunks (used by `ka status`).
    pub async fn count(&self) -> Result<u64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Search(e.to_string()))?;
        Ok(count as u64)
    }

    async fn fetch_keyword_candidates(
        &self,
        query: &str,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT f.chunk_id, f.doc_id, f.rank, c.file, c.text
            FROM chunks_fts f
            JOIN chunks c ON c.chunk_id = f.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(self.candidate_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Search(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                Candidate {
                    chunk_id: row.get("chunk_id"),
                    doc_id: row.get("doc_id"),
                    file: row.get("file"),
                    text: row.get("text"),
                    raw_score: -rank, // negate so higher = better
                }
            })
            .collect())
    }

    async fn fetch_vector_candidates(
        &self,
        query_vector: &[f32],
    ) -> Result<Vec<Candidate>, PipelineError> {
        let rows = sqlx::query(
            "SELECT chunk_id, doc_id, file, text, embedding FROM chunks WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Search(e.to_string()))?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                Candidate {
                    chunk_id: row.get("chunk_id"),
                    doc_id: row.get("doc_id"),
                    file: row.get("file"),
                    text: row.get("text"),
                    raw_score: cosine_similarity(query_vector, &vec) as f64,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.candidate_k);
        Ok(candidates)
    }
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), PipelineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;

        for entry in entries {
            let c = &entry.chunk;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (chunk_id, doc_id, chunk_position, total_chunks, content_hash, file, source, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.chunk_id)
            .bind(&c.doc_id)
            .bind(c.chunk_position as i64)
            .bind(c.total_chunks as i64)
            .bind(&c.content_hash)
            .bind(&c.file)
            .bind(&c.source)
            .bind(&c.text)
            .bind(entry.vector.as_deref().map(vec_to_blob))
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;

            sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
                .bind(&c.chunk_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;
            sqlx::query("INSERT INTO chunks_fts (chunk_id, doc_id, text) VALUES (?, ?, ?)")
                .bind(&c.chunk_id)
                .bind(&c.doc_id)
                .bind(&c.text)
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))
    }

    async fn delete_document(&self, doc_id: &str) -> Result<u64, PipelineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;

        sqlx::query("DELETE FROM chunks_fts WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;

        let result = sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| PipelineError::IndexWrite(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let keyword_candidates = if mode != SearchMode::Semantic {
            self.fetch_keyword_candidates(query).await?
        } else {
            Vec::new()
        };

        let vector_candidates = if mode != SearchMode::Keyword {
            let vector = query_vector.ok_or_else(|| {
                PipelineError::Search("query vector required for semantic/hybrid mode".into())
            })?;
            self.fetch_vector_candidates(vector).await?
        } else {
            Vec::new()
        };

        let alpha = match mode {
            SearchMode::Keyword => 0.0,
            SearchMode::Semantic => 1.0,
            SearchMode::Hybrid => self.hybrid_alpha,
        };

        let keyword_scores = normalize_scores(&keyword_candidates);
        let vector_scores = normalize_scores(&vector_candidates);

        let mut merged: HashMap<&str, (&Candidate, f64)> = HashMap::new();
        for (cand, norm) in keyword_scores
            .iter()
            .map(|(c, s)| (*c, (1.0 - alpha) * s))
            .chain(vector_scores.iter().map(|(c, s)| (*c, alpha * s)))
        {
            merged
                .entry(cand.chunk_id.as_str())
                .and_modify(|(_, score)| *score += norm)
                .or_insert((cand, norm));
        }

        let mut results: Vec<RetrievedChunk> = merged
            .into_values()
            .map(|(cand, score)| RetrievedChunk {
                doc_id: cand.doc_id.clone(),
                file: cand.file.clone(),
                text: cand.text.clone(),
                score,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
                .then_with(|| a.text.cmp(&b.text))
        });
        results.truncate(k);
        Ok(results)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    chunk_id: String,
    doc_id: String,
    file: String,
    text: String,
    raw_score: f64,
}

/// Build an FTS5 MATCH expression from the query's word tokens. Tokens are
/// quoted so user punctuation and FTS keywords cannot break the query.
fn fts_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Min-max normalize candidate scores to [0, 1].
fn normalize_scores(candidates: &[Candidate]) -> Vec<(&Candidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}
