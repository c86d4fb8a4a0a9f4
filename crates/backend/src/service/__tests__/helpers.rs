//! Test helpers for service-level flow tests.
//!
//! `ServiceTestContext` wires a `Discovery` to an in-memory store, a real
//! notification router and delivery pool, and a `MockTransport` that
//! records what would have been POSTed to subscribers.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
  domain::{
    config::NotificationsConfig,
    document::Document,
    subscription::{Subscription, SubscriptionRequest},
  },
  federation::{RemoteSubscription, RemoteSubscriptionCache},
  notify::{
    self, DeliveryContext, SubscriptionRegistry,
    __tests__::helpers::{Delivered, MockTransport, collect},
  },
  service::{
    Discovery, DiscoveryParts,
    access::{AccessControl, AllowAll},
  },
  store::DocumentStore,
};

pub const LOCAL_NSA: &str = "urn:ogf:network:local.net:2024:nsa";
pub const REMOTE_NSA: &str = "urn:ogf:network:remote.net:2024:nsa";
pub const TOPOLOGY: &str = "vnd.ogf.nsi.topology.v2+xml";

pub struct ServiceTestContext {
  pub discovery: Arc<Discovery>,
  pub store: Arc<DocumentStore>,
  pub registry: Arc<SubscriptionRegistry>,
  pub remote: Arc<RemoteSubscriptionCache>,
  pub deliveries: mpsc::UnboundedReceiver<Delivered>,
  cancel: CancellationToken,
}

impl ServiceTestContext {
  pub fn new() -> Self {
    Self::with(Arc::new(AllowAll), DocumentStore::in_memory(LOCAL_NSA), Duration::from_millis(20))
  }

  pub fn with_access(access: Arc<dyn AccessControl>) -> Self {
    Self::with(access, DocumentStore::in_memory(LOCAL_NSA), Duration::from_millis(20))
  }

  pub fn with_initial_delay(initial_delay: Duration) -> Self {
    Self::with(Arc::new(AllowAll), DocumentStore::in_memory(LOCAL_NSA), initial_delay)
  }

  pub fn with(access: Arc<dyn AccessControl>, store: DocumentStore, initial_delay: Duration) -> Self {
    let cancel = CancellationToken::new();
    let base_url = Url::parse("http://local:8401/dds").unwrap();
    let store = Arc::new(store);
    let registry = Arc::new(SubscriptionRegistry::new(base_url.clone()));
    let remote = Arc::new(RemoteSubscriptionCache::new());
    let transport = MockTransport::new();
    let deliveries = transport.deliveries();

    let notifier = notify::start(
      &NotificationsConfig {
        batch_size: 10,
        pool_size: 2,
        initial_delay_ms: 0,
      },
      Arc::clone(&store),
      DeliveryContext {
        provider_id: LOCAL_NSA.to_string(),
        registry: Arc::clone(&registry),
        transport,
      },
      &cancel,
    );

    let discovery = Arc::new(Discovery::new(DiscoveryParts {
      base_url,
      store: Arc::clone(&store),
      registry: Arc::clone(&registry),
      remote: Arc::clone(&remote),
      notifier,
      access,
      initial_delay,
    }));

    Self {
      discovery,
      store,
      registry,
      remote,
      deliveries,
      cancel,
    }
  }

  /// Subscribe and wait until the initial snapshot has been taken
  pub async fn ready_subscription(&self) -> Subscription {
    let sub = self
      .discovery
      .add_subscription(None, SubscriptionRequest::new("urn:requester", "http://requester/notifications"))
      .await
      .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while self.registry.get(&sub.id).is_some_and(|s| s.pending) && tokio::time::Instant::now() < deadline {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!self.registry.get(&sub.id).unwrap().pending, "snapshot taken");
    sub
  }

  /// Pretend we hold a registration at `peer` with the given handle
  pub fn register_remote(&self, peer: &str, id: &str) -> RemoteSubscription {
    let entry = RemoteSubscription {
      peer_url: peer.to_string(),
      id: id.to_string(),
      href: format!("{}/subscriptions/{}", peer, id),
      last_modified: Utc::now(),
      created: Utc::now(),
      last_audit: None,
      last_successful_audit: None,
    };
    self.remote.insert(entry.clone());
    entry
  }

  pub async fn next_deliveries(&mut self, n: usize, within: Duration) -> Vec<Delivered> {
    collect(&mut self.deliveries, n, within).await
  }
}

impl Drop for ServiceTestContext {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

pub fn doc(nsa: &str, id: &str, version: DateTime<Utc>) -> Document {
  Document {
    nsa: nsa.to_string(),
    doc_type: TOPOLOGY.to_string(),
    id: id.to_string(),
    version,
    expires: version + chrono::Duration::days(1),
    href: None,
    content: Some(format!("<topology id=\"{}\"/>", id)),
    last_discovered: version,
  }
}
