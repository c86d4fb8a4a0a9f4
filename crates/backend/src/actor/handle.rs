//! Actor handles for communicating with actors
//!
//! Handles are cheap to clone and provide a way to send messages to actors.
//! Each handle also carries the actor's lifecycle record, which is how
//! watchers learn that an actor has terminated.

use std::{
  fmt,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// Termination
// ============================================================================

/// Why an actor stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
  /// Cancellation token fired or every sender was dropped
  Stopped,
  /// The behavior returned an error from `started` or `handle`
  Failed(String),
  /// The behavior panicked
  Panicked(String),
}

impl ExitReason {
  /// Returns true if the actor died because of a fault rather than a shutdown
  pub fn is_fault(&self) -> bool {
    matches!(self, Self::Failed(_) | Self::Panicked(_))
  }
}

/// Termination notice delivered to every watcher of an actor.
#[derive(Debug, Clone)]
pub struct Terminated {
  pub id: Uuid,
  pub name: Arc<str>,
  pub reason: ExitReason,
}

#[derive(Debug, Default)]
struct LifecycleState {
  exit: Option<ExitReason>,
  watchers: Vec<mpsc::UnboundedSender<Terminated>>,
}

/// Shared lifecycle record for one actor
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
  state: Mutex<LifecycleState>,
}

impl Lifecycle {
  fn watch(&self, notice: Terminated, watcher: mpsc::UnboundedSender<Terminated>) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    match &state.exit {
      Some(reason) => {
        // Already dead, deliver the notice right away
        let _ = watcher.send(Terminated { reason: reason.clone(), ..notice });
      }
      None => state.watchers.push(watcher),
    }
  }

  /// Record the exit reason and notify all watchers. Only the first call wins.
  pub(crate) fn terminate(&self, id: Uuid, name: Arc<str>, reason: ExitReason) {
    let watchers = {
      let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
      if state.exit.is_some() {
        return;
      }
      state.exit = Some(reason.clone());
      std::mem::take(&mut state.watchers)
    };

    for watcher in watchers {
      let _ = watcher.send(Terminated {
        id,
        name: Arc::clone(&name),
        reason: reason.clone(),
      });
    }
  }

  fn exit(&self) -> Option<ExitReason> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner).exit.clone()
  }
}

// ============================================================================
// Actor Handle
// ============================================================================

/// Handle to communicate with a running actor
///
/// Sends are asynchronous and never block: the mailbox is unbounded, and
/// messages from one sender arrive in the order they were sent.
pub struct ActorHandle<M> {
  id: Uuid,
  name: Arc<str>,
  tx: mpsc::UnboundedSender<M>,
  lifecycle: Arc<Lifecycle>,
}

impl<M> Clone for ActorHandle<M> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      name: Arc::clone(&self.name),
      tx: self.tx.clone(),
      lifecycle: Arc::clone(&self.lifecycle),
    }
  }
}

impl<M> fmt::Debug for ActorHandle<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActorHandle")
      .field("id", &self.id)
      .field("name", &self.name)
      .finish()
  }
}

impl<M> ActorHandle<M> {
  pub(crate) fn new(name: Arc<str>, tx: mpsc::UnboundedSender<M>) -> Self {
    Self {
      id: Uuid::now_v7(),
      name,
      tx,
      lifecycle: Arc::new(Lifecycle::default()),
    }
  }

  /// Unique id of this actor instance
  pub fn id(&self) -> Uuid {
    self.id
  }

  /// Human-readable actor name (used in logs)
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Send a message to the actor
  pub fn send(&self, msg: M) -> Result<(), SendError> {
    self.tx.send(msg).map_err(|_| SendError::ActorGone)
  }

  /// Send a message, handing it back if the actor is gone
  pub(crate) fn try_send(&self, msg: M) -> Result<(), M> {
    self.tx.send(msg).map_err(|e| e.0)
  }

  /// Register `watcher` to receive a [`Terminated`] notice when this actor stops.
  ///
  /// If the actor has already stopped the notice is sent immediately.
  pub fn watch(&self, watcher: mpsc::UnboundedSender<Terminated>) {
    let notice = Terminated {
      id: self.id,
      name: Arc::clone(&self.name),
      reason: ExitReason::Stopped,
    };
    self.lifecycle.watch(notice, watcher);
  }

  /// Wait for the actor to terminate. A message being handled when the
  /// actor was cancelled runs to completion first.
  pub async fn terminated(&self) -> ExitReason {
    let (tx, mut rx) = mpsc::unbounded_channel();
    self.watch(tx);
    rx.recv().await.map_or(ExitReason::Stopped, |notice| notice.reason)
  }

  /// Returns the exit reason once the actor has terminated
  pub fn exit_reason(&self) -> Option<ExitReason> {
    self.lifecycle.exit()
  }

  /// Returns true while the actor's mailbox is open
  pub fn is_alive(&self) -> bool {
    !self.tx.is_closed() && self.lifecycle.exit().is_none()
  }

  pub(crate) fn lifecycle(&self) -> Arc<Lifecycle> {
    Arc::clone(&self.lifecycle)
  }

  pub(crate) fn downgrade(&self) -> WeakActorHandle<M> {
    WeakActorHandle {
      id: self.id,
      name: Arc::clone(&self.name),
      tx: self.tx.downgrade(),
      lifecycle: Arc::clone(&self.lifecycle),
    }
  }
}

/// Non-owning handle, held by an actor to address itself without keeping
/// its own mailbox open.
pub(crate) struct WeakActorHandle<M> {
  id: Uuid,
  name: Arc<str>,
  tx: mpsc::WeakUnboundedSender<M>,
  lifecycle: Arc<Lifecycle>,
}

impl<M> WeakActorHandle<M> {
  pub(crate) fn upgrade(&self) -> Option<ActorHandle<M>> {
    self.tx.upgrade().map(|tx| ActorHandle {
      id: self.id,
      name: Arc::clone(&self.name),
      tx,
      lifecycle: Arc::clone(&self.lifecycle),
    })
  }

  pub(crate) fn name(&self) -> &str {
    &self.name
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,
  #[error("No live member in pool {0}")]
  PoolExhausted(String),
}
