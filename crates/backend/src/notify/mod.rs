//! Subscription and notification engine
//!
//! ```text
//! NotifierMessage ──▶ NotificationRouter ──Notification──▶ Pool<DeliveryWorker> ──POST──▶ callback
//! ```

mod delivery;
mod registry;
mod router;
mod transport;

#[cfg(test)]
pub(crate) mod __tests__;

use std::sync::Arc;

pub use delivery::{ACCEPTED, DeliveryContext, DeliveryWorker};
pub use registry::SubscriptionRegistry;
pub use router::NotificationRouter;
pub use transport::{HttpTransport, NotificationTransport, TransportError, gzip};

use tokio_util::sync::CancellationToken;

use crate::{
  actor::{ActorHandle, Pool, message::NotifierMessage, spawn},
  domain::config::NotificationsConfig,
  store::DocumentStore,
};

/// Spawn the delivery pool and the router in front of it
pub fn start(
  config: &NotificationsConfig,
  store: Arc<DocumentStore>,
  delivery: DeliveryContext,
  cancel: &CancellationToken,
) -> ActorHandle<NotifierMessage> {
  let registry = Arc::clone(&delivery.registry);
  let pool = Pool::spawn(
    "delivery",
    config.pool_size,
    move |_| DeliveryWorker::new(delivery.clone()),
    cancel.child_token(),
  );
  spawn(
    "notification-router",
    NotificationRouter::new(registry, store, pool, config.batch_size),
    cancel.child_token(),
  )
}
