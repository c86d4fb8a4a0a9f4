//! Subscriptions held by this node on behalf of requesters

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Url;
use uuid::Uuid;

use crate::domain::{
  document::Document,
  modified_since, resource_url,
  subscription::{DocumentEventType, Subscription, SubscriptionRequest},
};

#[derive(Debug)]
pub struct SubscriptionRegistry {
  base_url: Url,
  subscriptions: DashMap<String, Subscription>,
}

impl SubscriptionRegistry {
  pub fn new(base_url: Url) -> Self {
    Self {
      base_url,
      subscriptions: DashMap::new(),
    }
  }

  /// Register a new subscription with a fresh id.
  ///
  /// The subscription starts pending at epoch 1; document events skip it
  /// until its initial snapshot has been taken.
  pub fn add(&self, request: SubscriptionRequest) -> Subscription {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let subscription = Subscription {
      href: resource_url(&self.base_url, &["subscriptions", &id]).to_string(),
      id: id.clone(),
      requester_id: request.requester_id,
      callback: request.callback,
      encoding: request.encoding,
      filter: request.filter,
      created: now,
      last_modified: now,
      epoch: 1,
      pending: true,
    };
    self.subscriptions.insert(id, subscription.clone());
    subscription
  }

  /// Replace the mutable fields of a subscription and start a new epoch
  pub fn edit(&self, id: &str, request: SubscriptionRequest) -> Option<Subscription> {
    let mut entry = self.subscriptions.get_mut(id)?;
    let subscription = entry.value_mut();
    subscription.requester_id = request.requester_id;
    subscription.callback = request.callback;
    subscription.encoding = request.encoding;
    subscription.filter = request.filter;
    subscription.last_modified = Utc::now().max(subscription.last_modified);
    subscription.epoch += 1;
    subscription.pending = true;
    Some(subscription.clone())
  }

  pub fn delete(&self, id: &str) -> Option<Subscription> {
    self.subscriptions.remove(id).map(|(_, subscription)| subscription)
  }

  pub fn get(&self, id: &str) -> Option<Subscription> {
    self.subscriptions.get(id).map(|entry| entry.value().clone())
  }

  pub fn contains(&self, id: &str) -> bool {
    self.subscriptions.contains_key(id)
  }

  /// Subscriptions, optionally narrowed by requester and modification time,
  /// oldest first
  pub fn list(&self, requester_id: Option<&str>, since: Option<DateTime<Utc>>) -> Vec<Subscription> {
    let mut subscriptions: Vec<Subscription> = self
      .subscriptions
      .iter()
      .map(|entry| entry.value().clone())
      .filter(|s| requester_id.is_none_or(|r| s.requester_id == r))
      .filter(|s| since.is_none_or(|t| modified_since(s.last_modified, t)))
      .collect();
    subscriptions.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    subscriptions
  }

  /// Non-pending subscriptions whose filter admits this event
  pub fn matching(&self, event: DocumentEventType, document: &Document) -> Vec<Subscription> {
    self
      .subscriptions
      .iter()
      .filter(|entry| !entry.pending && entry.filter.matches(event, document))
      .map(|entry| entry.value().clone())
      .collect()
  }

  /// Claim the snapshot for `epoch`.
  ///
  /// Returns the subscription with its pending marker cleared, or `None` if
  /// it was deleted or edited since the snapshot was requested.
  pub fn begin_snapshot(&self, id: &str, epoch: u64) -> Option<Subscription> {
    let mut entry = self.subscriptions.get_mut(id)?;
    if entry.epoch != epoch {
      return None;
    }
    entry.pending = false;
    Some(entry.value().clone())
  }

  pub fn len(&self) -> usize {
    self.subscriptions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.subscriptions.is_empty()
  }
}
