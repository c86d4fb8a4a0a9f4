//! Delivery worker: encode, compress and POST one notification

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
  registry::SubscriptionRegistry,
  transport::{NotificationTransport, TransportError, gzip},
};
use crate::{
  actor::{Actor, ActorContext, ActorResult, message::Notification},
  domain::notification::{NotificationList, NotificationRecord},
};

/// Status code a callback must answer with for a delivery to count
pub const ACCEPTED: u16 = 202;

/// Shared state every delivery worker needs
#[derive(Clone)]
pub struct DeliveryContext {
  pub provider_id: String,
  pub registry: Arc<SubscriptionRegistry>,
  pub transport: Arc<dyn NotificationTransport>,
}

/// Pool member sending notifications to subscriber callbacks.
///
/// A delivery that is not answered with 202 Accepted removes the
/// subscription; the subscriber has to subscribe again.
pub struct DeliveryWorker {
  ctx: DeliveryContext,
}

impl DeliveryWorker {
  pub fn new(ctx: DeliveryContext) -> Self {
    Self { ctx }
  }

  fn encode(&self, notification: &Notification) -> Result<Vec<u8>, TransportError> {
    let list = NotificationList {
      provider_id: self.ctx.provider_id.clone(),
      id: notification.subscription.id.clone(),
      href: notification.subscription.href.clone(),
      notifications: notification
        .documents
        .iter()
        .map(|document| NotificationRecord {
          event: notification.event,
          discovered: document.last_discovered,
          document: (**document).clone(),
        })
        .collect(),
    };
    Ok(gzip(&serde_json::to_vec(&list)?)?)
  }

  async fn deliver(&self, notification: &Notification) -> Result<u16, TransportError> {
    let body = self.encode(notification)?;
    let subscription = &notification.subscription;
    self
      .ctx
      .transport
      .deliver(&subscription.callback, &subscription.encoding, body)
      .await
  }
}

#[async_trait]
impl Actor for DeliveryWorker {
  type Message = Notification;

  async fn handle(&mut self, notification: Notification, _ctx: &ActorContext<Notification>) -> ActorResult {
    let subscription_id = notification.subscription.id.as_str();

    if !self.ctx.registry.contains(subscription_id) {
      debug!(subscription_id, "Subscription gone, dropping notification");
      return Ok(());
    }

    match self.deliver(&notification).await {
      Ok(ACCEPTED) => {
        debug!(
          subscription_id,
          event = ?notification.event,
          documents = notification.documents.len(),
          "Notification delivered"
        );
      }
      Ok(status) => {
        warn!(
          subscription_id,
          callback = %notification.subscription.callback,
          status,
          "Notification rejected by subscriber, removing subscription"
        );
        self.ctx.registry.delete(subscription_id);
      }
      Err(e) => {
        warn!(
          subscription_id,
          callback = %notification.subscription.callback,
          error = %e,
          "Notification delivery failed, removing subscription"
        );
        self.ctx.registry.delete(subscription_id);
      }
    }

    Ok(())
  }
}
