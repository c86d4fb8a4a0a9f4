//! Pool - Round-robin router over a fixed set of supervised workers
//!
//! A pool spawns `size` identical workers from a factory and routes each
//! message to the next member in turn. A supervisor task watches every
//! member; when one terminates (error, panic, or a voluntary stop) it is
//! replaced in the same slot, so the pool size never changes while the pool
//! is running.
//!
//! # Usage
//!
//! ```ignore
//! let pool = Pool::spawn("delivery", 4, |_| DeliveryWorker::new(ctx.clone()), cancel.child_token());
//! pool.route(notification)?;
//! ```

use std::sync::{
  Arc, PoisonError, RwLock,
  atomic::{AtomicU64, AtomicUsize, Ordering},
};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
  handle::{ActorHandle, SendError, Terminated},
  runtime::{Actor, spawn},
};

/// Factory used to build a worker for a given slot
type Factory<A> = Arc<dyn Fn(usize) -> A + Send + Sync>;

/// Round-robin router over supervised workers
pub struct Pool<M: Send + 'static> {
  name: Arc<str>,
  members: Arc<RwLock<Vec<ActorHandle<M>>>>,
  next: AtomicUsize,
  restarts: Arc<AtomicU64>,
  cancel: CancellationToken,
}

impl<M: Send + 'static> Pool<M> {
  /// Spawn a pool of `size` workers (at least one)
  ///
  /// Each worker gets a child of `cancel`; cancelling it stops the whole
  /// pool including the supervisor.
  pub fn spawn<A, F>(name: impl Into<String>, size: usize, factory: F, cancel: CancellationToken) -> Self
  where
    A: Actor<Message = M>,
    F: Fn(usize) -> A + Send + Sync + 'static,
  {
    let name: Arc<str> = Arc::from(name.into());
    let size = size.max(1);
    let factory: Factory<A> = Arc::new(factory);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let members: Vec<ActorHandle<M>> = (0..size)
      .map(|slot| spawn_member(&name, slot, &factory, &notice_tx, &cancel))
      .collect();
    let members = Arc::new(RwLock::new(members));
    let restarts = Arc::new(AtomicU64::new(0));

    tokio::spawn(supervise(
      Arc::clone(&name),
      Arc::clone(&members),
      factory,
      notice_tx,
      notice_rx,
      Arc::clone(&restarts),
      cancel.clone(),
    ));

    info!(pool = %name, size, "Worker pool started");

    Self {
      name,
      members,
      next: AtomicUsize::new(0),
      restarts,
      cancel,
    }
  }

  /// Route a message to the next member in round-robin order.
  ///
  /// If the chosen member is already dead but not yet replaced, the message
  /// moves on to the following member.
  pub fn route(&self, msg: M) -> Result<(), SendError> {
    let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
    let len = members.len();
    let start = self.next.fetch_add(1, Ordering::Relaxed);

    let mut msg = msg;
    for offset in 0..len {
      match members[(start + offset) % len].try_send(msg) {
        Ok(()) => return Ok(()),
        Err(returned) => msg = returned,
      }
    }

    warn!(pool = %self.name, "No live worker available to route message");
    Err(SendError::PoolExhausted(self.name.to_string()))
  }

  /// Number of member slots
  pub fn size(&self) -> usize {
    self.members.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// Snapshot of the current member handles
  pub fn members(&self) -> Vec<ActorHandle<M>> {
    self.members.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// How many members have been replaced since the pool started
  pub fn restarts(&self) -> u64 {
    self.restarts.load(Ordering::Relaxed)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Stop every member and the supervisor
  pub fn shutdown(&self) {
    debug!(pool = %self.name, "Shutting down worker pool");
    self.cancel.cancel();
  }

  /// Stop the pool and wait until every member has finished its current
  /// message and terminated
  pub async fn stop(&self) {
    self.shutdown();
    join_all(self.members().iter().map(|m| m.terminated())).await;
    debug!(pool = %self.name, "Worker pool stopped");
  }
}

fn spawn_member<A: Actor>(
  pool: &str,
  slot: usize,
  factory: &Factory<A>,
  notices: &mpsc::UnboundedSender<Terminated>,
  cancel: &CancellationToken,
) -> ActorHandle<A::Message> {
  let handle = spawn(format!("{}-{}", pool, slot), factory(slot), cancel.child_token());
  handle.watch(notices.clone());
  handle
}

/// Replace members as their termination notices arrive
async fn supervise<A: Actor>(
  name: Arc<str>,
  members: Arc<RwLock<Vec<ActorHandle<A::Message>>>>,
  factory: Factory<A>,
  notice_tx: mpsc::UnboundedSender<Terminated>,
  mut notice_rx: mpsc::UnboundedReceiver<Terminated>,
  restarts: Arc<AtomicU64>,
  cancel: CancellationToken,
) {
  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => {
        debug!(pool = %name, "Pool supervisor shutting down (cancelled)");
        break;
      }

      notice = notice_rx.recv() => {
        let Some(notice) = notice else { break };

        if cancel.is_cancelled() {
          break;
        }

        let mut guard = members.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = guard.iter().position(|m| m.id() == notice.id) else {
          debug!(pool = %name, member = %notice.name, "Ignoring notice from unknown member");
          continue;
        };

        warn!(
          pool = %name,
          member = %notice.name,
          reason = ?notice.reason,
          "Pool member terminated, spawning replacement"
        );
        guard[slot] = spawn_member(&name, slot, &factory, &notice_tx, &cancel);
        restarts.fetch_add(1, Ordering::Relaxed);
      }
    }
  }
}
