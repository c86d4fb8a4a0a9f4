//! Test helpers for federation tests.
//!
//! `FakePeers` behaves like a set of remote DDS nodes: it keeps their
//! subscription tables in memory and answers conditional GETs at HTTP-date
//! resolution.

use std::{
  collections::{HashMap, HashSet},
  sync::Mutex,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  domain::{
    modified_since,
    subscription::{Subscription, SubscriptionRequest},
  },
  federation::{AuditResponse, FederationError, PeerClient},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Call {
  Subscribe(String),
  List(String),
  Audit(String),
  Unsubscribe(String),
}

#[derive(Default)]
struct State {
  /// peer url -> subscriptions held at that peer
  tables: HashMap<String, Vec<Subscription>>,
  down: HashSet<String>,
  calls: Vec<Call>,
  /// Delay before a subscribe is answered
  latency: Duration,
}

#[derive(Default)]
pub struct FakePeers {
  state: Mutex<State>,
}

impl FakePeers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every call to `peer` fail with 503
  pub fn take_down(&self, peer: &str) {
    self.state.lock().unwrap().down.insert(peer.to_string());
  }

  pub fn bring_up(&self, peer: &str) {
    self.state.lock().unwrap().down.remove(peer);
  }

  /// Answer subscribe calls only after `latency`
  pub fn slow_down(&self, latency: Duration) {
    self.state.lock().unwrap().latency = latency;
  }

  /// Insert a subscription at `peer` as if created earlier by someone
  pub fn seed(&self, peer: &str, requester_id: &str) -> Subscription {
    let subscription = new_subscription(peer, &SubscriptionRequest::new(requester_id, "http://old/notifications"));
    let mut state = self.state.lock().unwrap();
    state.tables.entry(peer.to_string()).or_default().push(subscription.clone());
    subscription
  }

  /// Drop every subscription at `peer`, as after a peer restart
  pub fn forget(&self, peer: &str) {
    self.state.lock().unwrap().tables.remove(peer);
  }

  /// Bump `last_modified` of every subscription at `peer`
  pub fn touch(&self, peer: &str, at: DateTime<Utc>) {
    if let Some(table) = self.state.lock().unwrap().tables.get_mut(peer) {
      for s in table {
        s.last_modified = at;
      }
    }
  }

  pub fn table(&self, peer: &str) -> Vec<Subscription> {
    self.state.lock().unwrap().tables.get(peer).cloned().unwrap_or_default()
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state.lock().unwrap().calls.clone()
  }

  fn peer_of(href: &str) -> String {
    href.split("/subscriptions/").next().unwrap_or(href).to_string()
  }

  fn check_up(state: &State, peer: &str) -> Result<(), FederationError> {
    if state.down.contains(peer) {
      return Err(FederationError::Status {
        url: peer.to_string(),
        status: 503,
      });
    }
    Ok(())
  }
}

fn new_subscription(peer: &str, request: &SubscriptionRequest) -> Subscription {
  let id = Uuid::new_v4().to_string();
  let now = Utc::now();
  Subscription {
    href: format!("{}/subscriptions/{}", peer, id),
    id,
    requester_id: request.requester_id.clone(),
    callback: request.callback.clone(),
    encoding: request.encoding.clone(),
    filter: request.filter.clone(),
    created: now,
    last_modified: now,
    epoch: 0,
    pending: false,
  }
}

#[async_trait]
impl PeerClient for FakePeers {
  async fn subscribe(&self, peer_url: &str, request: &SubscriptionRequest) -> Result<Subscription, FederationError> {
    let latency = self.state.lock().unwrap().latency;
    tokio::time::sleep(latency).await;

    let mut state = self.state.lock().unwrap();
    state.calls.push(Call::Subscribe(peer_url.to_string()));
    Self::check_up(&state, peer_url)?;
    let subscription = new_subscription(peer_url, request);
    state
      .tables
      .entry(peer_url.to_string())
      .or_default()
      .push(subscription.clone());
    Ok(subscription)
  }

  async fn subscriptions(&self, peer_url: &str, requester_id: &str) -> Result<Vec<Subscription>, FederationError> {
    let mut state = self.state.lock().unwrap();
    state.calls.push(Call::List(peer_url.to_string()));
    Self::check_up(&state, peer_url)?;
    Ok(
      state
        .tables
        .get(peer_url)
        .map(|t| t.iter().filter(|s| s.requester_id == requester_id).cloned().collect())
        .unwrap_or_default(),
    )
  }

  async fn audit(&self, href: &str, since: DateTime<Utc>) -> Result<AuditResponse, FederationError> {
    let peer = Self::peer_of(href);
    let mut state = self.state.lock().unwrap();
    state.calls.push(Call::Audit(peer.clone()));
    Self::check_up(&state, &peer)?;
    let found = state
      .tables
      .get(&peer)
      .and_then(|t| t.iter().find(|s| s.href == href).cloned());
    Ok(match found {
      None => AuditResponse::Gone,
      Some(s) if modified_since(s.last_modified, since) => AuditResponse::Modified(s),
      Some(_) => AuditResponse::NotModified,
    })
  }

  async fn unsubscribe(&self, href: &str) -> Result<(), FederationError> {
    let peer = Self::peer_of(href);
    let mut state = self.state.lock().unwrap();
    state.calls.push(Call::Unsubscribe(peer.clone()));
    Self::check_up(&state, &peer)?;
    if let Some(table) = state.tables.get_mut(&peer) {
      table.retain(|s| s.href != href);
    }
    Ok(())
  }
}
