//! Error taxonomy shared by the ingestion and answering pipelines.
//!
//! Collaborator traits ([`crate::source`], [`crate::state`], [`crate::index`],
//! [`crate::embedding`], [`crate::llm`]) return [`PipelineError`] so callers
//! can tell a configuration problem (fatal, no retry) from a transient
//! collaborator failure (retry-safe). The CLI boundary converts into
//! `anyhow::Error` for reporting.
//!
//! A corrupt persisted document state is deliberately *not* an error: the
//! state store treats it as absent, which forces a benign full re-index on
//! the next ingestion run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required setting is missing or invalid. Fatal; never retried.
    #[error("missing or invalid setting: {0}")]
    Configuration(String),

    /// Listing or downloading a source document failed. Propagated to the
    /// caller so the triggering event can be redelivered.
    #[error("source unavailable: {0}")]
    Source(String),

    /// An embedding, completion, or judge call failed. Propagated; no local
    /// fallback answer is fabricated.
    #[error("model call failed: {0}")]
    ModelCall(String),

    /// An index upsert or delete failed. The document state record is not
    /// advanced past a failed write, so retrying the trigger is safe.
    #[error("index write failed: {0}")]
    IndexWrite(String),

    /// An index query failed while answering. Aborts the request.
    #[error("index query failed: {0}")]
    Search(String),
}
