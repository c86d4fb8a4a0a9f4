//! Actor behaviors and the spawn loop
//!
//! An actor is a long-lived task that owns its state and processes one
//! message at a time from its mailbox. There is no re-entrancy: `handle`
//! for the next message only starts after the previous call returned.
//!
//! # Failure semantics
//!
//! If `handle` returns an error or panics, the error is logged and the actor
//! terminates. The in-flight message is dropped, not retried. Watchers (for
//! example a [`Pool`](super::router::Pool) supervisor) receive a
//! [`Terminated`](super::handle::Terminated) notice and decide what to do.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::{
  handle::{ActorHandle, ExitReason, WeakActorHandle},
  timer::{Cancellable, schedule},
};

/// Error type returned by actor behaviors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of processing one message
pub type ActorResult = Result<(), BoxError>;

/// A message-processing behavior
#[async_trait]
pub trait Actor: Send + 'static {
  type Message: Send + 'static;

  /// Called once before the first message is processed
  async fn started(&mut self, _ctx: &ActorContext<Self::Message>) -> ActorResult {
    Ok(())
  }

  /// Process a single message
  async fn handle(&mut self, msg: Self::Message, ctx: &ActorContext<Self::Message>) -> ActorResult;

  /// Called once after the loop exits, whatever the reason
  async fn stopped(&mut self) {}
}

/// Per-actor context passed to every callback
pub struct ActorContext<M> {
  myself: WeakActorHandle<M>,
  cancel: CancellationToken,
}

impl<M: Send + 'static> ActorContext<M> {
  /// Handle to this actor, if any sender is still alive
  pub fn myself(&self) -> Option<ActorHandle<M>> {
    self.myself.upgrade()
  }

  /// Deliver `msg` to this actor after `delay`
  pub fn schedule_self(&self, msg: M, delay: Duration) -> Option<Cancellable> {
    self.myself().map(|me| schedule(&me, msg, delay))
  }

  /// Ask this actor to stop after the current message
  pub fn stop(&self) {
    self.cancel.cancel();
  }

  /// Token cancelled when this actor is told to stop
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn name(&self) -> &str {
    self.myself.name()
  }
}

/// Spawn `actor` on the tokio runtime and return a handle to it.
///
/// The actor stops when `cancel` fires, when every handle has been dropped,
/// or when its behavior fails.
pub fn spawn<A: Actor>(name: impl Into<String>, actor: A, cancel: CancellationToken) -> ActorHandle<A::Message> {
  let name: Arc<str> = Arc::from(name.into());
  let (tx, rx) = mpsc::unbounded_channel();
  let handle = ActorHandle::new(Arc::clone(&name), tx);

  let ctx = ActorContext {
    myself: handle.downgrade(),
    cancel: cancel.child_token(),
  };
  let id = handle.id();
  let lifecycle = handle.lifecycle();

  tokio::spawn(async move {
    let reason = match AssertUnwindSafe(run(actor, rx, ctx)).catch_unwind().await {
      Ok(reason) => reason,
      Err(panic) => {
        let message = panic_message(panic.as_ref());
        error!(actor = %name, panic = %message, "Actor panicked");
        ExitReason::Panicked(message)
      }
    };
    debug!(actor = %name, reason = ?reason, "Actor terminated");
    lifecycle.terminate(id, name, reason);
  });

  handle
}

/// Main actor event loop
async fn run<A: Actor>(
  mut actor: A,
  mut rx: mpsc::UnboundedReceiver<A::Message>,
  ctx: ActorContext<A::Message>,
) -> ExitReason {
  if let Err(e) = actor.started(&ctx).await {
    error!(actor = %ctx.name(), error = %e, "Actor failed to start");
    actor.stopped().await;
    return ExitReason::Failed(e.to_string());
  }

  trace!(actor = %ctx.name(), "Actor started");

  let reason = loop {
    tokio::select! {
      biased;

      _ = ctx.cancel.cancelled() => {
        trace!(actor = %ctx.name(), "Actor shutting down (cancelled)");
        break ExitReason::Stopped;
      }

      msg = rx.recv() => {
        match msg {
          Some(msg) => {
            if let Err(e) = actor.handle(msg, &ctx).await {
              error!(actor = %ctx.name(), error = %e, "Actor failed while handling message");
              break ExitReason::Failed(e.to_string());
            }
          }
          None => {
            trace!(actor = %ctx.name(), "Actor shutting down (channel closed)");
            break ExitReason::Stopped;
          }
        }
      }
    }
  };

  actor.stopped().await;
  reason
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
