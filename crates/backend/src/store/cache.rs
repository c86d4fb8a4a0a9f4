//! In-memory document table
//!
//! Holds every document this node knows about, local or remote. Entries are
//! never removed; a deleted or expired document stays as a tombstone whose
//! `expires` lies in the past.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use super::StoreError;
use crate::domain::document::{Document, DocumentKey};

#[derive(Debug, Default)]
pub struct DocumentCache {
  documents: DashMap<DocumentKey, Document>,
}

impl DocumentCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &DocumentKey) -> Option<Document> {
    self.documents.get(key).map(|entry| entry.value().clone())
  }

  /// Insert a document that must not exist yet
  pub fn put(&self, document: Document) -> Result<(), StoreError> {
    match self.documents.entry(document.key()) {
      Entry::Occupied(entry) => Err(StoreError::AlreadyExists(entry.key().clone())),
      Entry::Vacant(entry) => {
        entry.insert(document);
        Ok(())
      }
    }
  }

  /// Replace an existing document unconditionally, returning the previous one
  pub fn update(&self, document: Document) -> Result<Document, StoreError> {
    let key = document.key();
    match self.documents.get_mut(&key) {
      Some(mut entry) => Ok(std::mem::replace(entry.value_mut(), document)),
      None => Err(StoreError::NotFound(key)),
    }
  }

  /// Replace an existing document only if `document.version` is newer.
  ///
  /// The check and the swap happen under the entry's shard lock, so two
  /// racing updates can never both succeed with the same version.
  pub fn compare_and_update(&self, document: Document) -> Result<Document, StoreError> {
    let key = document.key();
    let Some(mut entry) = self.documents.get_mut(&key) else {
      return Err(StoreError::NotFound(key));
    };

    let stored = entry.value().version;
    if document.version <= stored {
      return Err(StoreError::VersionConflict {
        key,
        stored,
        offered: document.version,
      });
    }
    Ok(std::mem::replace(entry.value_mut(), document))
  }

  pub fn values(&self) -> Vec<Document> {
    self.documents.iter().map(|entry| entry.value().clone()).collect()
  }

  /// Documents whose `expires + grace` is at or before `now`
  pub fn expired(&self, grace: TimeDelta, now: DateTime<Utc>) -> Vec<Document> {
    let Some(cutoff) = now.checked_sub_signed(grace) else {
      return Vec::new();
    };
    self
      .documents
      .iter()
      .filter(|entry| entry.value().expires <= cutoff)
      .map(|entry| entry.value().clone())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.documents.len()
  }

  pub fn is_empty(&self) -> bool {
    self.documents.is_empty()
  }
}
