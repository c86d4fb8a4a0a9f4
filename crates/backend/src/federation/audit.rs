//! Reconciliation of configured peers against active registrations

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::{peers::PeerSet, remote::RemoteSubscriptionCache};
use crate::actor::{
  PeriodicTask, Pool,
  message::{RegistrationEvent, RegistrationEventKind, RegistrationMessage},
};

/// Events that bring `active` in line with `configured`:
/// `Delete` for peers no longer configured, `Update` for peers in both,
/// `Register` for new peers.
pub fn plan(configured: &BTreeSet<String>, active: &BTreeSet<String>) -> Vec<RegistrationEvent> {
  let deletes = active
    .difference(configured)
    .map(|peer| RegistrationEvent::new(RegistrationEventKind::Delete, peer));
  let updates = active
    .intersection(configured)
    .map(|peer| RegistrationEvent::new(RegistrationEventKind::Update, peer));
  let registers = configured
    .difference(active)
    .map(|peer| RegistrationEvent::new(RegistrationEventKind::Register, peer));
  deletes.chain(updates).chain(registers).collect()
}

/// Timer task running one reconciliation cycle per tick.
///
/// Waits for every event of the cycle to be processed before returning,
/// so the next cycle is only scheduled once this one is finished.
pub struct FederationAudit {
  peers: Arc<PeerSet>,
  remote: Arc<RemoteSubscriptionCache>,
  pool: Arc<Pool<RegistrationMessage>>,
}

impl FederationAudit {
  pub fn new(peers: Arc<PeerSet>, remote: Arc<RemoteSubscriptionCache>, pool: Arc<Pool<RegistrationMessage>>) -> Self {
    Self { peers, remote, pool }
  }
}

#[async_trait]
impl PeriodicTask for FederationAudit {
  fn name(&self) -> &'static str {
    "federation-audit"
  }

  async fn run_once(&mut self) {
    let events = plan(&self.peers.snapshot(), &self.remote.peers());
    debug!(events = events.len(), "Federation audit cycle");

    let mut acks = Vec::with_capacity(events.len());
    for event in events {
      let (msg, ack) = RegistrationMessage::with_ack(event);
      match self.pool.route(msg) {
        Ok(()) => acks.push(ack),
        Err(e) => warn!(error = %e, "Failed to route registration event"),
      }
    }

    // A worker that died mid-event drops its ack; that still ends the wait
    join_all(acks).await;
  }
}
