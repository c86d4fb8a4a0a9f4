//! Notification router: turns events into deliveries
//!
//! Document events fan out to every matching, non-pending subscription.
//! Subscription events produce a full snapshot split into batches.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
  actor::{
    Actor, ActorContext, ActorResult, Pool,
    message::{DocumentEvent, Notification, NotifierMessage, SubscriptionEvent},
  },
  domain::{document::Document, subscription::DocumentEventType},
  notify::registry::SubscriptionRegistry,
  store::DocumentStore,
};

pub struct NotificationRouter {
  registry: Arc<SubscriptionRegistry>,
  store: Arc<DocumentStore>,
  delivery: Pool<Notification>,
  batch_size: usize,
}

impl NotificationRouter {
  pub fn new(
    registry: Arc<SubscriptionRegistry>,
    store: Arc<DocumentStore>,
    delivery: Pool<Notification>,
    batch_size: usize,
  ) -> Self {
    Self {
      registry,
      store,
      delivery,
      batch_size: batch_size.max(1),
    }
  }

  fn route(&self, notification: Notification) {
    let subscription_id = notification.subscription.id.clone();
    if let Err(e) = self.delivery.route(notification) {
      warn!(subscription_id, error = %e, "Failed to route notification");
    }
  }

  fn on_document(&self, event: DocumentEvent) {
    let matching = self.registry.matching(event.kind, &event.document);
    debug!(
      document = %event.document.key(),
      event = ?event.kind,
      subscriptions = matching.len(),
      "Dispatching document event"
    );

    for subscription in matching {
      self.route(Notification {
        event: event.kind,
        subscription,
        documents: vec![Arc::clone(&event.document)],
      });
    }
  }

  fn on_subscription(&self, event: SubscriptionEvent) {
    let Some(subscription) = self.registry.begin_snapshot(&event.subscription_id, event.epoch) else {
      debug!(
        subscription_id = %event.subscription_id,
        epoch = event.epoch,
        "Stale snapshot request ignored"
      );
      return;
    };

    let snapshot = snapshot(&self.store, |doc| subscription.filter.admits(doc));
    let batches = snapshot.len().div_ceil(self.batch_size);
    debug!(
      subscription_id = %subscription.id,
      documents = snapshot.len(),
      batches,
      "Sending snapshot"
    );

    for chunk in snapshot.chunks(self.batch_size) {
      self.route(Notification {
        event: DocumentEventType::All,
        subscription: subscription.clone(),
        documents: chunk.to_vec(),
      });
    }
  }
}

/// All stored documents passing `admit`, in key order
fn snapshot(store: &DocumentStore, admit: impl Fn(&Document) -> bool) -> Vec<Arc<Document>> {
  let mut documents: Vec<Document> = store.values().into_iter().filter(|d| admit(d)).collect();
  documents.sort_by_key(|d| d.key());
  documents.into_iter().map(Arc::new).collect()
}

#[async_trait]
impl Actor for NotificationRouter {
  type Message = NotifierMessage;

  async fn handle(&mut self, msg: NotifierMessage, _ctx: &ActorContext<NotifierMessage>) -> ActorResult {
    match msg {
      NotifierMessage::Document(event) => self.on_document(event),
      NotifierMessage::Subscription(event) => self.on_subscription(event),
    }
    Ok(())
  }

  async fn stopped(&mut self) {
    self.delivery.shutdown();
  }
}
