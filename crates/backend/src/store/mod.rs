//! Versioned document store
//!
//! [`DocumentStore`] combines the in-memory [`DocumentCache`] (every known
//! document) with an optional [`Repository`] that persists documents owned
//! by this node's NSA across restarts.

mod cache;
mod repository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use cache::DocumentCache;
pub use repository::Repository;

use crate::{
  actor::PeriodicTask,
  domain::document::{Document, DocumentKey},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("Document already exists: {0}")]
  AlreadyExists(DocumentKey),
  #[error("Document not found: {0}")]
  NotFound(DocumentKey),
  #[error("Version conflict for {key}: stored {stored}, offered {offered}")]
  VersionConflict {
    key: DocumentKey,
    stored: DateTime<Utc>,
    offered: DateTime<Utc>,
  },
  #[error("Repository I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Repository encoding error: {0}")]
  Codec(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct DocumentStore {
  cache: DocumentCache,
  repository: Option<Repository>,
  local_nsa: String,
  /// Serialises cache change and file write per document, so the file on
  /// disk always ends at the version the cache holds
  write_locks: DashMap<DocumentKey, Arc<Mutex<()>>>,
}

impl DocumentStore {
  /// Create a store and reload locally authored documents from `repository`
  pub async fn open(local_nsa: impl Into<String>, repository: Option<Repository>) -> Result<Self, StoreError> {
    let store = Self {
      cache: DocumentCache::new(),
      repository,
      local_nsa: local_nsa.into(),
      write_locks: DashMap::new(),
    };

    if let Some(repo) = &store.repository {
      let documents = repo.load_all().await?;
      let count = documents.len();
      for document in documents {
        if let Err(e) = store.cache.put(document) {
          warn!(error = %e, "Duplicate document in repository");
        }
      }
      info!(count, dir = %repo.dir().display(), "Rehydrated local documents");
    }

    Ok(store)
  }

  /// Store without persistence, for tests and ephemeral nodes
  pub fn in_memory(local_nsa: impl Into<String>) -> Self {
    Self {
      cache: DocumentCache::new(),
      repository: None,
      local_nsa: local_nsa.into(),
      write_locks: DashMap::new(),
    }
  }

  pub fn local_nsa(&self) -> &str {
    &self.local_nsa
  }

  pub fn is_local(&self, document: &Document) -> bool {
    document.nsa == self.local_nsa
  }

  pub fn get(&self, key: &DocumentKey) -> Option<Document> {
    self.cache.get(key)
  }

  pub fn values(&self) -> Vec<Document> {
    self.cache.values()
  }

  pub fn len(&self) -> usize {
    self.cache.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cache.is_empty()
  }

  fn write_lock(&self, key: &DocumentKey) -> Arc<Mutex<()>> {
    self.write_locks.entry(key.clone()).or_default().clone()
  }

  /// Add a document that must not exist yet
  pub async fn put(&self, document: Document) -> Result<(), StoreError> {
    let lock = self.write_lock(&document.key());
    let _guard = lock.lock().await;
    self.cache.put(document.clone())?;
    self.persist(&document).await;
    Ok(())
  }

  /// Replace an existing document without a version check
  pub async fn update(&self, document: Document) -> Result<Document, StoreError> {
    let lock = self.write_lock(&document.key());
    let _guard = lock.lock().await;
    let previous = self.cache.update(document.clone())?;
    self.persist(&document).await;
    Ok(previous)
  }

  /// Replace an existing document if the new version is strictly greater
  pub async fn compare_and_update(&self, document: Document) -> Result<Document, StoreError> {
    let lock = self.write_lock(&document.key());
    let _guard = lock.lock().await;
    let previous = self.cache.compare_and_update(document.clone())?;
    self.persist(&document).await;
    Ok(previous)
  }

  /// The in-memory table stays authoritative; a failed write is only logged
  async fn persist(&self, document: &Document) {
    if !self.is_local(document) {
      return;
    }
    if let Some(repo) = &self.repository
      && let Err(e) = repo.put(document).await
    {
      warn!(document = %document.key(), error = %e, "Failed to persist local document");
    }
  }

  /// Drop documents past `expires + grace` from the repository.
  ///
  /// The cache keeps them as tombstones. Returns how many files were removed.
  pub async fn expire(&self, grace: TimeDelta, now: DateTime<Utc>) -> usize {
    let Some(repo) = &self.repository else {
      return 0;
    };

    let mut removed = 0;
    for document in self.cache.expired(grace, now) {
      if !self.is_local(&document) {
        continue;
      }
      let key = document.key();
      let lock = self.write_lock(&key);
      let _guard = lock.lock().await;
      // A newer version may have landed since the expired list was taken
      if self.cache.get(&key).is_some_and(|current| current.version != document.version) {
        continue;
      }
      match repo.remove(&key).await {
        Ok(true) => {
          debug!(document = %document.key(), "Expired document removed from repository");
          removed += 1;
        }
        Ok(false) => {}
        Err(e) => warn!(document = %document.key(), error = %e, "Failed to remove expired document"),
      }
    }
    removed
  }
}

// ============================================================================
// Expiry Sweep
// ============================================================================

/// Periodic removal of expired documents from the repository
pub struct ExpirySweep {
  store: Arc<DocumentStore>,
  grace: TimeDelta,
}

impl ExpirySweep {
  pub fn new(store: Arc<DocumentStore>, grace: std::time::Duration) -> Self {
    Self {
      store,
      grace: TimeDelta::from_std(grace).unwrap_or(TimeDelta::MAX),
    }
  }
}

#[async_trait]
impl PeriodicTask for ExpirySweep {
  fn name(&self) -> &'static str {
    "expiry-sweep"
  }

  async fn run_once(&mut self) {
    let removed = self.store.expire(self.grace, Utc::now()).await;
    if removed > 0 {
      info!(removed, "Expired documents swept from repository");
    }
  }
}
