//! Versioned documents and their identity

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::resource_url;

/// Identity of a document: `(nsa, type, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
  pub nsa: String,
  #[serde(rename = "type")]
  pub doc_type: String,
  pub id: String,
}

impl DocumentKey {
  pub fn new(nsa: impl Into<String>, doc_type: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      nsa: nsa.into(),
      doc_type: doc_type.into(),
      id: id.into(),
    }
  }

  /// Name of the first empty identity component, if any
  pub fn missing_component(&self) -> Option<&'static str> {
    if self.nsa.trim().is_empty() {
      Some("nsa")
    } else if self.doc_type.trim().is_empty() {
      Some("type")
    } else if self.id.trim().is_empty() {
      Some("id")
    } else {
      None
    }
  }

  /// `{base}/documents/{nsa}/{type}/{id}`
  pub fn href(&self, base: &Url) -> String {
    resource_url(base, &["documents", &self.nsa, &self.doc_type, &self.id]).to_string()
  }
}

impl fmt::Display for DocumentKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.nsa, self.doc_type, self.id)
  }
}

/// A versioned, expiring document with opaque content
///
/// `version` is the author's timestamp and orders updates (last writer wins).
/// `last_discovered` is when this node received the current version.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
  pub nsa: String,
  #[serde(rename = "type")]
  pub doc_type: String,
  pub id: String,
  pub version: DateTime<Utc>,
  pub expires: DateTime<Utc>,
  pub href: Option<String>,
  /// Opaque payload; `None` in summary views
  pub content: Option<String>,
  #[serde(default = "Utc::now")]
  pub last_discovered: DateTime<Utc>,
}

impl Document {
  pub fn key(&self) -> DocumentKey {
    DocumentKey::new(&self.nsa, &self.doc_type, &self.id)
  }

  /// Returns true if this document identity matches `key`
  pub fn has_key(&self, key: &DocumentKey) -> bool {
    self.nsa == key.nsa && self.doc_type == key.doc_type && self.id == key.id
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires <= now
  }

  /// Copy without content, for summary queries
  pub fn summary(&self) -> Self {
    Self {
      content: None,
      ..self.clone()
    }
  }
}
