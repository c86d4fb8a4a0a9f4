use std::{sync::Arc, time::Duration};

use chrono::Duration as TimeDelta;
use pretty_assertions::assert_eq;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::helpers::{MockTransport, collect};
use crate::{
  actor::{
    ActorHandle,
    message::{DocumentEvent, NotifierMessage, SubscriptionEvent, SubscriptionEventKind},
  },
  domain::{
    config::NotificationsConfig,
    document::fixtures::{document, t0},
    subscription::{DocumentEventType, Subscription, SubscriptionRequest},
  },
  notify::{DeliveryContext, SubscriptionRegistry, start},
  store::DocumentStore,
};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
  registry: Arc<SubscriptionRegistry>,
  store: Arc<DocumentStore>,
  transport: Arc<MockTransport>,
  router: ActorHandle<NotifierMessage>,
  cancel: CancellationToken,
}

impl Harness {
  fn new() -> Self {
    let registry = Arc::new(SubscriptionRegistry::new(Url::parse("http://a:8401/dds").unwrap()));
    let store = Arc::new(DocumentStore::in_memory("urn:nsa:a"));
    let transport = MockTransport::new();
    let cancel = CancellationToken::new();
    let router = start(
      &NotificationsConfig {
        batch_size: 10,
        pool_size: 3,
        initial_delay_ms: 0,
      },
      Arc::clone(&store),
      DeliveryContext {
        provider_id: "urn:nsa:a".to_string(),
        registry: Arc::clone(&registry),
        transport: transport.clone(),
      },
      &cancel,
    );
    Self {
      registry,
      store,
      transport,
      router,
      cancel,
    }
  }

  fn subscribe(&self) -> Subscription {
    self
      .registry
      .add(SubscriptionRequest::new("urn:nsa:b", "http://b:8401/dds/notifications"))
  }

  fn snapshot(&self, subscription: &Subscription, epoch: u64) {
    self
      .router
      .send(NotifierMessage::Subscription(SubscriptionEvent {
        kind: SubscriptionEventKind::Created,
        subscription_id: subscription.id.clone(),
        epoch,
      }))
      .unwrap();
  }
}

impl Drop for Harness {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

#[tokio::test]
async fn test_snapshot_is_batched() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();
  for i in 0..25 {
    h.store
      .put(document("urn:nsa:a", &format!("{:02}", i), t0()))
      .await
      .unwrap();
  }

  let sub = h.subscribe();
  h.snapshot(&sub, sub.epoch);

  let received = collect(&mut deliveries, 3, WAIT).await;
  let mut sizes: Vec<usize> = received.iter().map(|d| d.list.notifications.len()).collect();
  sizes.sort_unstable_by(|a, b| b.cmp(a));
  assert_eq!(sizes, vec![10, 10, 5]);

  for delivered in &received {
    assert_eq!(delivered.callback, "http://b:8401/dds/notifications");
    assert_eq!(delivered.media_type, "application/json");
    assert_eq!(delivered.list.id, sub.id);
    assert_eq!(delivered.list.href, sub.href);
    assert!(
      delivered
        .list
        .notifications
        .iter()
        .all(|n| n.event == DocumentEventType::All)
    );
  }
  assert!(!h.registry.get(&sub.id).unwrap().pending);
}

#[tokio::test]
async fn test_stale_snapshot_is_ignored() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();
  h.store.put(document("urn:nsa:a", "1", t0())).await.unwrap();

  let sub = h.subscribe();
  let edited = h
    .registry
    .edit(&sub.id, SubscriptionRequest::new("urn:nsa:b", "http://b:8401/dds/notifications"))
    .unwrap();

  h.snapshot(&sub, sub.epoch);
  assert!(collect(&mut deliveries, 1, Duration::from_millis(150)).await.is_empty());
  assert!(h.registry.get(&sub.id).unwrap().pending);

  h.snapshot(&sub, edited.epoch);
  assert_eq!(collect(&mut deliveries, 1, WAIT).await.len(), 1);
}

#[tokio::test]
async fn test_document_event_reaches_only_ready_subscriptions() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();

  let ready = h.subscribe();
  h.registry.begin_snapshot(&ready.id, ready.epoch).unwrap();
  let _pending = h.subscribe();

  let doc = document("urn:nsa:a", "1", t0());
  h.router
    .send(NotifierMessage::Document(DocumentEvent::updated(doc.clone())))
    .unwrap();

  let received = collect(&mut deliveries, 2, Duration::from_millis(300)).await;
  assert_eq!(received.len(), 1);
  assert_eq!(received[0].list.id, ready.id);
  assert_eq!(received[0].list.notifications.len(), 1);
  assert_eq!(received[0].list.notifications[0].event, DocumentEventType::Updated);
  assert_eq!(received[0].list.notifications[0].document, doc);
}

#[tokio::test]
async fn test_rejected_delivery_removes_subscription() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();
  h.transport.respond_with(500);
  h.store.put(document("urn:nsa:a", "1", t0())).await.unwrap();

  let sub = h.subscribe();
  h.snapshot(&sub, sub.epoch);

  assert_eq!(collect(&mut deliveries, 1, WAIT).await.len(), 1);
  let deadline = tokio::time::Instant::now() + WAIT;
  while h.registry.get(&sub.id).is_some() && tokio::time::Instant::now() < deadline {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  assert!(h.registry.get(&sub.id).is_none());

  // Later events find nothing to deliver to
  h.router
    .send(NotifierMessage::Document(DocumentEvent::new(document(
      "urn:nsa:a",
      "2",
      t0() + TimeDelta::seconds(1),
    ))))
    .unwrap();
  assert!(collect(&mut deliveries, 1, Duration::from_millis(150)).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_callback_removes_subscription() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();
  h.transport.refuse_connections();
  h.store.put(document("urn:nsa:a", "1", t0())).await.unwrap();

  let sub = h.subscribe();
  let other = h.subscribe();
  h.snapshot(&sub, sub.epoch);

  assert_eq!(collect(&mut deliveries, 1, WAIT).await.len(), 1);
  let deadline = tokio::time::Instant::now() + WAIT;
  while h.registry.get(&sub.id).is_some() && tokio::time::Instant::now() < deadline {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  assert!(h.registry.get(&sub.id).is_none());
  assert!(h.registry.get(&other.id).is_some());
}

#[tokio::test]
async fn test_empty_snapshot_sends_nothing() {
  let h = Harness::new();
  let mut deliveries = h.transport.deliveries();

  let sub = h.subscribe();
  h.snapshot(&sub, sub.epoch);

  assert!(collect(&mut deliveries, 1, Duration::from_millis(150)).await.is_empty());
  assert!(!h.registry.get(&sub.id).unwrap().pending);
}
