//! Per-peer registration state machine
//!
//! ```text
//!            Register ok
//!  (none) ─────────────▶ registered ──Audit/Update 304──▶ registered (touched)
//!     ▲                     │        ──Audit/Update 200──▶ registered (absorbed)
//!     │    404 / Delete     │
//!     └─────────────────────┘
//! ```
//!
//! A 404 on audit drops local state and registers again in the same step.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{
  client::{AuditResponse, PeerClient},
  failures::FailureLog,
  remote::{RemoteSubscription, RemoteSubscriptionCache},
};
use crate::{
  actor::{
    Actor, ActorContext, ActorResult,
    message::{RegistrationEventKind, RegistrationMessage},
  },
  domain::subscription::{Subscription, SubscriptionRequest},
};

/// Shared state every registration worker needs
#[derive(Clone)]
pub struct RegistrationContext {
  pub client: Arc<dyn PeerClient>,
  pub remote: Arc<RemoteSubscriptionCache>,
  pub failures: Arc<FailureLog>,
  /// Subscription this node asks every peer for
  pub request: SubscriptionRequest,
}

pub struct RegistrationWorker {
  ctx: RegistrationContext,
}

impl RegistrationWorker {
  pub fn new(ctx: RegistrationContext) -> Self {
    Self { ctx }
  }

  async fn register(&self, peer: &str) {
    let subscription = match self.ctx.client.subscribe(peer, &self.ctx.request).await {
      Ok(subscription) => subscription,
      Err(e) => {
        self.ctx.failures.record(peer, "register", e);
        return;
      }
    };

    info!(peer, subscription_id = %subscription.id, "Registered with peer");
    self
      .ctx
      .remote
      .insert(RemoteSubscription::from_subscription(peer, &subscription, Utc::now()));
    self.ctx.failures.clear(peer);
    self.remove_duplicates(peer, &subscription).await;
  }

  /// Unsubscribe every other registration we hold at `peer`
  async fn remove_duplicates(&self, peer: &str, ours: &Subscription) {
    let requester_id = &self.ctx.request.requester_id;
    let existing = match self.ctx.client.subscriptions(peer, requester_id).await {
      Ok(existing) => existing,
      Err(e) => {
        self.ctx.failures.record(peer, "list-subscriptions", e);
        return;
      }
    };

    for stale in existing
      .iter()
      .filter(|s| s.id != ours.id && s.requester_id == *requester_id)
    {
      match self.ctx.client.unsubscribe(&stale.href).await {
        Ok(()) => info!(peer, subscription_id = %stale.id, "Removed duplicate registration"),
        Err(e) => {
          self.ctx.failures.record(peer, "remove-duplicate", e);
        }
      }
    }
  }

  async fn audit(&self, peer: &str) {
    let Some(entry) = self.ctx.remote.get(peer) else {
      debug!(peer, "No registration to audit, registering");
      self.register(peer).await;
      return;
    };

    match self.ctx.client.audit(&entry.href, entry.last_modified).await {
      Ok(AuditResponse::NotModified) => {
        self.ctx.remote.mark_audited(peer, true, Utc::now());
        self.ctx.failures.clear(peer);
        debug!(peer, "Registration unchanged");
      }
      Ok(AuditResponse::Modified(subscription)) => {
        self.ctx.remote.absorb(peer, &subscription);
        self.ctx.remote.mark_audited(peer, true, Utc::now());
        self.ctx.failures.clear(peer);
        debug!(peer, subscription_id = %subscription.id, "Registration updated by peer");
      }
      Ok(AuditResponse::Gone) => {
        info!(peer, subscription_id = %entry.id, "Registration lost at peer, registering again");
        self.ctx.remote.remove(peer);
        self.register(peer).await;
      }
      Err(e) => {
        self.ctx.remote.mark_audited(peer, false, Utc::now());
        self.ctx.failures.record(peer, "audit", e);
      }
    }
  }

  async fn delete(&self, peer: &str) {
    let Some(entry) = self.ctx.remote.remove(peer) else {
      return;
    };
    match self.ctx.client.unsubscribe(&entry.href).await {
      Ok(()) => info!(peer, subscription_id = %entry.id, "Unregistered from peer"),
      Err(e) => {
        self.ctx.failures.record(peer, "unregister", e);
      }
    }
  }
}

#[async_trait]
impl Actor for RegistrationWorker {
  type Message = RegistrationMessage;

  async fn handle(&mut self, msg: RegistrationMessage, _ctx: &ActorContext<RegistrationMessage>) -> ActorResult {
    let peer = msg.event.peer_url.as_str();
    match msg.event.kind {
      RegistrationEventKind::Register => self.register(peer).await,
      RegistrationEventKind::Update | RegistrationEventKind::Audit => self.audit(peer).await,
      RegistrationEventKind::Delete => self.delete(peer).await,
    }

    if let Some(ack) = msg.ack {
      let _ = ack.send(());
    }
    Ok(())
  }
}
