//! Subscriptions this node holds at its peers

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::subscription::Subscription;

/// This node's subscription at one peer
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSubscription {
  pub peer_url: String,
  pub id: String,
  pub href: String,
  /// As reported by the peer; sent back as `If-Modified-Since`
  pub last_modified: DateTime<Utc>,
  pub created: DateTime<Utc>,
  pub last_audit: Option<DateTime<Utc>>,
  pub last_successful_audit: Option<DateTime<Utc>>,
}

impl RemoteSubscription {
  pub fn from_subscription(peer_url: impl Into<String>, subscription: &Subscription, now: DateTime<Utc>) -> Self {
    Self {
      peer_url: peer_url.into(),
      id: subscription.id.clone(),
      href: subscription.href.clone(),
      last_modified: subscription.last_modified,
      created: now,
      last_audit: None,
      last_successful_audit: None,
    }
  }
}

/// At most one entry per peer URL
#[derive(Debug, Default)]
pub struct RemoteSubscriptionCache {
  entries: DashMap<String, RemoteSubscription>,
}

impl RemoteSubscriptionCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, peer_url: &str) -> Option<RemoteSubscription> {
    self.entries.get(peer_url).map(|e| e.value().clone())
  }

  pub fn insert(&self, entry: RemoteSubscription) -> Option<RemoteSubscription> {
    self.entries.insert(entry.peer_url.clone(), entry)
  }

  pub fn remove(&self, peer_url: &str) -> Option<RemoteSubscription> {
    self.entries.remove(peer_url).map(|(_, entry)| entry)
  }

  /// Peers with an active registration
  pub fn peers(&self) -> BTreeSet<String> {
    self.entries.iter().map(|e| e.key().clone()).collect()
  }

  pub fn values(&self) -> Vec<RemoteSubscription> {
    self.entries.iter().map(|e| e.value().clone()).collect()
  }

  /// Returns true if a notification naming this subscription id or href
  /// comes from one of our registrations
  pub fn is_live(&self, id: &str, href: &str) -> bool {
    self.entries.iter().any(|e| e.id == id || e.href == href)
  }

  pub fn mark_audited(&self, peer_url: &str, success: bool, now: DateTime<Utc>) {
    if let Some(mut entry) = self.entries.get_mut(peer_url) {
      entry.last_audit = Some(now);
      if success {
        entry.last_successful_audit = Some(now);
      }
    }
  }

  /// Take over a newer representation returned by the peer
  pub fn absorb(&self, peer_url: &str, subscription: &Subscription) {
    if let Some(mut entry) = self.entries.get_mut(peer_url) {
      entry.id = subscription.id.clone();
      entry.href = subscription.href.clone();
      entry.last_modified = subscription.last_modified;
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
