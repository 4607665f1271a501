//! Plain-text extraction for supported source formats.
//!
//! Connectors supply raw bytes; this module returns UTF-8 text. Only `.pdf`
//! and `.txt` sources are supported — anything else is filtered out at
//! listing time via [`is_supported`].

use anyhow::{Context, Result};
use std::path::Path;

/// Extensions the ingestion pipeline accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

/// True when `doc_id` names a supported document type.
pub fn is_supported(doc_id: &str) -> bool {
    Path::new(doc_id)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Extract plain text from raw document bytes.
///
/// PDF extraction failures propagate; `.txt` content is decoded as UTF-8
/// with lossy replacement so a stray byte never fails a whole document.
pub fn extract_text(bytes: &[u8], doc_id: &str) -> Result<String> {
    let extension = Path::new(doc_id)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(bytes)
            .with_context(|| format!("PDF extraction failed for {doc_id}")),
        "txt" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => anyhow::bail!("unsupported document type: '{other}' ({doc_id})"),
    }
}
