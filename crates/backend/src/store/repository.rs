//! Durable mirror of locally authored documents
//!
//! One JSON file per document, named by the SHA-256 of its identity so that
//! arbitrary `nsa`/`type`/`id` strings map to safe file names.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::StoreError;
use crate::domain::document::{Document, DocumentKey};

#[derive(Debug, Clone)]
pub struct Repository {
  dir: PathBuf,
}

impl Repository {
  /// Open (creating if needed) a repository rooted at `dir`
  pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let dir = dir.into();
    tokio::fs::create_dir_all(&dir).await?;
    debug!(dir = %dir.display(), "Document repository opened");
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, key: &DocumentKey) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(key.nsa.as_bytes());
    hasher.update([0]);
    hasher.update(key.doc_type.as_bytes());
    hasher.update([0]);
    hasher.update(key.id.as_bytes());
    self.dir.join(format!("{}.json", hex::encode(hasher.finalize())))
  }

  /// Write (or overwrite) a document
  pub async fn put(&self, document: &Document) -> Result<(), StoreError> {
    let path = self.path_for(&document.key());
    // Unique per write so concurrent writers never share a staging file
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let bytes = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
  }

  /// Remove a document; returns false if it was not stored
  pub async fn remove(&self, key: &DocumentKey) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(self.path_for(key)).await {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  /// Read every stored document. Unreadable files are skipped with a warning.
  pub async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
    let mut documents = Vec::new();
    let mut entries = tokio::fs::read_dir(&self.dir).await?;

    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }

      let parsed = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice::<Document>(&bytes).map_err(StoreError::from),
        Err(e) => Err(e.into()),
      };
      match parsed {
        Ok(document) => documents.push(document),
        Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable repository entry"),
      }
    }

    Ok(documents)
  }
}
