//! Local document directory audit
//!
//! Documents this node publishes may be dropped into a directory as
//! `*.json` files. Each scan adds new files, applies newer versions of
//! changed ones, and deletes (expires) documents whose file disappeared.
//!
//! The files seen by the last scan are kept in a state file, so a file
//! removed while the daemon was down still expires its document.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::discovery::Discovery;
use crate::{
  actor::PeriodicTask,
  domain::document::{Document, DocumentKey},
};

pub struct LocalDirectoryAudit {
  dir: PathBuf,
  discovery: Arc<Discovery>,
  /// Documents seen in the previous scan and the file they came from
  known: HashMap<DocumentKey, PathBuf>,
  state_path: Option<PathBuf>,
  loaded: bool,
}

impl LocalDirectoryAudit {
  pub fn new(dir: impl Into<PathBuf>, discovery: Arc<Discovery>) -> Self {
    Self {
      dir: dir.into(),
      discovery,
      known: HashMap::new(),
      state_path: None,
      loaded: false,
    }
  }

  /// Remember the scanned files across restarts in `path`
  pub fn with_state(mut self, path: impl Into<PathBuf>) -> Self {
    self.state_path = Some(path.into());
    self
  }

  async fn load_state(&mut self) {
    if self.loaded {
      return;
    }
    self.loaded = true;
    let Some(path) = &self.state_path else {
      return;
    };

    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to read local directory state");
        return;
      }
    };
    match serde_json::from_slice::<Vec<(DocumentKey, PathBuf)>>(&bytes) {
      Ok(entries) => {
        debug!(path = %path.display(), files = entries.len(), "Loaded local directory state");
        self.known = entries.into_iter().collect();
      }
      Err(e) => warn!(path = %path.display(), error = %e, "Ignoring corrupt local directory state"),
    }
  }

  async fn save_state(&self) {
    let Some(path) = &self.state_path else {
      return;
    };
    let mut entries: Vec<(&DocumentKey, &PathBuf)> = self.known.iter().collect();
    entries.sort();

    let result = async {
      let bytes = serde_json::to_vec_pretty(&entries).map_err(std::io::Error::other)?;
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      let tmp = path.with_extension("json.tmp");
      tokio::fs::write(&tmp, bytes).await?;
      tokio::fs::rename(&tmp, path).await
    }
    .await;
    if let Err(e) = result {
      warn!(path = %path.display(), error = %e, "Failed to save local directory state");
    }
  }

  async fn read_document(path: &Path) -> Option<Document> {
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to read local document");
        return None;
      }
    };
    match serde_json::from_slice(&bytes) {
      Ok(document) => Some(document),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to parse local document");
        None
      }
    }
  }

  async fn scan(&self) -> std::io::Result<HashMap<DocumentKey, (PathBuf, Document)>> {
    let mut found = HashMap::new();
    let mut entries = tokio::fs::read_dir(&self.dir).await?;
    let local_nsa = self.discovery.store().local_nsa();

    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let Some(document) = Self::read_document(&path).await else {
        continue;
      };
      if document.nsa != local_nsa {
        warn!(path = %path.display(), nsa = %document.nsa, "Local document belongs to another NSA, skipping");
        continue;
      }
      found.insert(document.key(), (path, document));
    }
    Ok(found)
  }

  /// One full pass over the directory
  pub async fn audit(&mut self) {
    self.load_state().await;
    let found = match self.scan().await {
      Ok(found) => found,
      Err(e) => {
        warn!(dir = %self.dir.display(), error = %e, "Failed to scan local document directory");
        return;
      }
    };

    let mut changed = 0;
    let mut next = HashMap::with_capacity(found.len());
    for (key, (path, document)) in found {
      match self.discovery.upsert(document).await {
        Ok(Some(_)) => changed += 1,
        Ok(None) => {}
        Err(e) => warn!(document = %key, error = %e, "Failed to apply local document"),
      }
      next.insert(key, path);
    }

    let vanished: Vec<(DocumentKey, PathBuf)> = self
      .known
      .iter()
      .filter(|(key, _)| !next.contains_key(*key))
      .map(|(key, path)| (key.clone(), path.clone()))
      .collect();
    for (key, path) in vanished {
      let already_expired = self
        .discovery
        .store()
        .get(&key)
        .is_none_or(|d| d.is_expired(chrono::Utc::now()));
      if already_expired {
        continue;
      }
      match self.discovery.tombstone(&key).await {
        Ok(_) => info!(document = %key, path = %path.display(), "Local document file removed, document expired"),
        Err(e) => warn!(document = %key, error = %e, "Failed to expire removed local document"),
      }
    }

    self.known = next;
    self.save_state().await;
    debug!(dir = %self.dir.display(), documents = self.known.len(), changed, "Local directory audited");
  }
}

#[async_trait]
impl PeriodicTask for LocalDirectoryAudit {
  fn name(&self) -> &'static str {
    "local-audit"
  }

  async fn run_once(&mut self) {
    self.audit().await;
  }
}
