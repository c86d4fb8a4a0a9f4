//! Subscriptions held on behalf of remote requesters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::Document;

pub const DEFAULT_ENCODING: &str = "application/json";

/// Kind of document change carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentEventType {
  /// Wildcard in filters; full snapshot in notifications
  All,
  New,
  Updated,
}

/// Criteria a document event must satisfy to reach a subscription
///
/// Empty lists are permissive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterCriteria {
  pub events: Vec<DocumentEventType>,
  pub nsa: Vec<String>,
  #[serde(rename = "type")]
  pub types: Vec<String>,
}

impl FilterCriteria {
  /// Filter that matches every event
  pub fn all() -> Self {
    Self {
      events: vec![DocumentEventType::All],
      ..Self::default()
    }
  }

  pub fn matches(&self, event: DocumentEventType, document: &Document) -> bool {
    let event_ok = self.events.is_empty()
      || self
        .events
        .iter()
        .any(|e| *e == DocumentEventType::All || *e == event);
    event_ok && self.admits(document)
  }

  /// Document-level criteria only, used for full snapshots
  pub fn admits(&self, document: &Document) -> bool {
    let nsa_ok = self.nsa.is_empty() || self.nsa.iter().any(|n| *n == document.nsa);
    let type_ok = self.types.is_empty() || self.types.iter().any(|t| *t == document.doc_type);
    nsa_ok && type_ok
  }
}

fn default_encoding() -> String {
  DEFAULT_ENCODING.to_string()
}

/// Body of a subscription create or edit request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
  pub requester_id: String,
  pub callback: String,
  #[serde(default = "default_encoding")]
  pub encoding: String,
  #[serde(default)]
  pub filter: FilterCriteria,
}

impl SubscriptionRequest {
  pub fn new(requester_id: impl Into<String>, callback: impl Into<String>) -> Self {
    Self {
      requester_id: requester_id.into(),
      callback: callback.into(),
      encoding: default_encoding(),
      filter: FilterCriteria::all(),
    }
  }

  /// Check the first field that is missing or malformed
  pub fn validate(&self) -> Result<(), RequestProblem> {
    if self.requester_id.trim().is_empty() {
      return Err(RequestProblem::Missing("requesterId"));
    }
    if self.callback.trim().is_empty() {
      return Err(RequestProblem::Missing("callback"));
    }
    if let Err(e) = reqwest::Url::parse(&self.callback) {
      return Err(RequestProblem::Invalid("callback", format!("not a valid URL: {}", e)));
    }
    if self.encoding.trim().is_empty() {
      return Err(RequestProblem::Missing("encoding"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestProblem {
  Missing(&'static str),
  Invalid(&'static str, String),
}

/// A subscription held by this node
///
/// `epoch` and `pending` implement the single outstanding snapshot rule:
/// every create or edit bumps the epoch and marks the subscription pending,
/// and only a snapshot carrying the current epoch may clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
  pub id: String,
  pub href: String,
  pub requester_id: String,
  pub callback: String,
  pub encoding: String,
  pub filter: FilterCriteria,
  pub created: DateTime<Utc>,
  pub last_modified: DateTime<Utc>,
  #[serde(skip)]
  pub epoch: u64,
  #[serde(skip)]
  pub pending: bool,
}
