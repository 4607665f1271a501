//! Source connector abstraction and the filesystem implementation.
//!
//! A connector lists supported documents and serves their raw bytes plus an
//! opaque `etag` version marker. The ingestion state tracker compares etags
//! to skip unchanged documents, so the marker must change whenever the
//! content does — the filesystem connector uses a content hash.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::extract;

/// Raw document bytes plus the connector's version marker.
#[derive(Debug, Clone)]
pub struct SourceBlob {
    pub bytes: Vec<u8>,
    pub etag: String,
}

/// A document source the ingestion pipeline can enumerate and download.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Connector tag stamped into chunk metadata (e.g. `"filesystem"`).
    fn source_label(&self) -> &str;

    /// All supported document ids, sorted for deterministic ingestion order.
    async fn list(&self) -> Result<Vec<String>, PipelineError>;

    /// Download one document's bytes and current etag.
    async fn fetch(&self, doc_id: &str) -> Result<SourceBlob, PipelineError>;
}

/// Connector over a local directory tree. `doc_id` is the path relative to
/// the configured root.
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, doc_id: &str) -> PathBuf {
        self.root.join(doc_id)
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn source_label(&self) -> &str {
        "filesystem"
    }

    async fn list(&self) -> Result<Vec<String>, PipelineError> {
        if !self.root.exists() {
            return Err(PipelineError::Source(format!(
                "source root does not exist: {}",
                self.root.display()
            )));
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry =
                entry.map_err(|e| PipelineError::Source(format!("scan failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            if extract::is_supported(&relative) {
                ids.push(relative);
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn fetch(&self, doc_id: &str) -> Result<SourceBlob, PipelineError> {
        let path = self.resolve(doc_id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            PipelineError::Source(format!("download failed for {}: {e}", path.display()))
        })?;
        let etag = content_etag(&bytes);
        Ok(SourceBlob { bytes, etag })
    }
}

/// Content-derived etag: SHA-256 hex of the raw bytes.
pub fn content_etag(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Display name for a document id: the file name without directories.
pub fn display_name(doc_id: &str) -> String {
    Path::new(doc_id)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| doc_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("podkatalog")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("a.txt"), "alfa").unwrap();
        std::fs::write(dir.path().join("obraz.png"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join("podkatalog/c.pdf"), "nie-pdf").unwrap();

        let source = FilesystemSource::new(dir.path());
        let ids = source.list().await.unwrap();
        assert_eq!(ids, vec!["a.txt", "b.txt", "podkatalog/c.pdf"]);
    }

    #[tokio::test]
    async fn etag_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "wersja pierwsza").unwrap();
        let source = FilesystemSource::new(dir.path());

        let first = source.fetch("a.txt").await.unwrap();
        let again = source.fetch("a.txt").await.unwrap();
        assert_eq!(first.etag, again.etag);

        std::fs::write(dir.path().join("a.txt"), "wersja druga").unwrap();
        let changed = source.fetch("a.txt").await.unwrap();
        assert_ne!(first.etag, changed.etag);
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilesystemSource::new(dir.path());
        let err = source.fetch("brak.txt").await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[test]
    fn display_name_strips_directories() {
        assert_eq!(display_name("regulaminy/urlopy.pdf"), "urlopy.pdf");
        assert_eq!(display_name("notatka.txt"), "notatka.txt");
    }
}
