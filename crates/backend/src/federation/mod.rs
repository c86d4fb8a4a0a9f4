//! Peer federation: keeping one subscription at every configured peer
//!
//! The [`FederationAudit`] timer compares the configured [`PeerSet`] with
//! the [`RemoteSubscriptionCache`] and routes register / update / delete
//! events to a pool of [`RegistrationWorker`]s. Failures are logged through
//! a per-peer [`FailureLog`] and retried on the next cycle.

mod audit;
mod client;
mod failures;
mod peers;
mod registration;
mod remote;


use std::{sync::Arc, time::Duration};

pub use audit::{FederationAudit, plan};
pub use client::{AuditResponse, FederationError, HttpPeerClient, PeerClient};
pub use failures::FailureLog;
pub use peers::{PeerSet, normalize};
pub use registration::{RegistrationContext, RegistrationWorker};
pub use remote::{RemoteSubscription, RemoteSubscriptionCache};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  actor::{Pool, message::RegistrationMessage},
  domain::{config::FederationConfig, subscription::SubscriptionRequest},
};

/// Running federation components
pub struct Federation {
  peers: Arc<PeerSet>,
  remote: Arc<RemoteSubscriptionCache>,
  failures: Arc<FailureLog>,
  client: Arc<dyn PeerClient>,
  pool: Arc<Pool<RegistrationMessage>>,
}

impl Federation {
  /// Spawn the registration pool. Call [`Federation::audit_task`] to get
  /// the timer task that drives it.
  pub fn start(
    config: &FederationConfig,
    request: SubscriptionRequest,
    client: Arc<dyn PeerClient>,
    cancel: &CancellationToken,
  ) -> Self {
    let peers = Arc::new(PeerSet::new(&config.peers));
    let remote = Arc::new(RemoteSubscriptionCache::new());
    let failures = Arc::new(FailureLog::new(config.failure_summary_every));

    let ctx = RegistrationContext {
      client: Arc::clone(&client),
      remote: Arc::clone(&remote),
      failures: Arc::clone(&failures),
      request,
    };
    let pool = Arc::new(Pool::spawn(
      "registration",
      config.pool_size,
      move |_| RegistrationWorker::new(ctx.clone()),
      cancel.child_token(),
    ));

    info!(peers = peers.snapshot().len(), "Federation started");
    Self {
      peers,
      remote,
      failures,
      client,
      pool,
    }
  }

  pub fn audit_task(&self) -> FederationAudit {
    FederationAudit::new(Arc::clone(&self.peers), Arc::clone(&self.remote), Arc::clone(&self.pool))
  }

  pub fn peers(&self) -> &Arc<PeerSet> {
    &self.peers
  }

  pub fn remote(&self) -> &Arc<RemoteSubscriptionCache> {
    &self.remote
  }

  #[cfg(test)]
  pub(crate) fn failures(&self) -> &Arc<FailureLog> {
    &self.failures
  }

  /// Unsubscribe from every peer, best effort, within `grace`.
  ///
  /// Stops the registration pool first and waits for registrations in
  /// flight, so every registration made before shutdown is undone.
  pub async fn shutdown(&self, grace: Duration) {
    if tokio::time::timeout(grace, self.pool.stop()).await.is_err() {
      warn!(grace_secs = grace.as_secs(), "Registration workers still busy at shutdown");
    }

    let entries = self.remote.values();
    if entries.is_empty() {
      return;
    }
    info!(peers = entries.len(), "Unregistering from peers");

    let unsubscribes = entries.iter().map(|entry| async move {
      let result = self.client.unsubscribe(&entry.href).await;
      (entry, result)
    });

    match tokio::time::timeout(grace, join_all(unsubscribes)).await {
      Ok(results) => {
        for (entry, result) in results {
          match result {
            Ok(()) => {
              self.remote.remove(&entry.peer_url);
            }
            Err(e) => warn!(peer = %entry.peer_url, error = %e, "Failed to unregister from peer"),
          }
        }
      }
      Err(_) => warn!(grace_secs = grace.as_secs(), "Unregistering from peers timed out"),
    }
  }
}
