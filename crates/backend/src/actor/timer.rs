//! Delayed sends and self-rescheduling timers
//!
//! [`schedule`] delivers one message after a delay and returns a
//! [`Cancellable`]. [`TimerActor`] wraps a [`PeriodicTask`] and reschedules
//! its next tick only after the current run finished, so a slow run pushes
//! the next one back instead of overlapping with it.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{
  handle::ActorHandle,
  runtime::{Actor, ActorContext, ActorResult, spawn},
};

// ============================================================================
// Delayed Send
// ============================================================================

/// A pending delayed send that can be cancelled before it fires
#[derive(Debug, Clone)]
pub struct Cancellable {
  token: CancellationToken,
}

impl Cancellable {
  /// Cancel the pending send. No-op if it already fired.
  pub fn cancel(&self) {
    self.token.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }
}

/// Send `message` to `target` after `delay`, unless cancelled first
pub fn schedule<M: Send + 'static>(target: &ActorHandle<M>, message: M, delay: Duration) -> Cancellable {
  let token = CancellationToken::new();
  let cancelled = token.clone();
  let target = target.clone();

  tokio::spawn(async move {
    tokio::select! {
      biased;

      _ = cancelled.cancelled() => {
        trace!(actor = %target.name(), "Scheduled message cancelled");
      }

      _ = tokio::time::sleep(delay) => {
        if target.send(message).is_err() {
          debug!(actor = %target.name(), "Scheduled message dropped, actor is gone");
        }
      }
    }
  });

  Cancellable { token }
}

// ============================================================================
// Periodic Timers
// ============================================================================

/// A unit of work run on a fixed delay by a [`TimerActor`]
///
/// Implementations log their own failures; a run never stops the timer.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
  /// Name used for the timer actor and in logs
  fn name(&self) -> &'static str;

  /// Run one cycle of work
  async fn run_once(&mut self);
}

/// Messages understood by a [`TimerActor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMessage {
  /// Run the task and reschedule the next tick
  Tick,
}

/// Actor that runs a [`PeriodicTask`] and then re-arms itself
pub struct TimerActor {
  task: Box<dyn PeriodicTask>,
  initial_delay: Duration,
  interval: Duration,
  next: Option<Cancellable>,
  runs: u64,
}

impl TimerActor {
  pub fn new(task: Box<dyn PeriodicTask>, initial_delay: Duration, interval: Duration) -> Self {
    Self {
      task,
      initial_delay,
      interval,
      next: None,
      runs: 0,
    }
  }

  /// Spawn the timer; the first tick fires after `initial_delay`
  pub fn spawn(
    task: Box<dyn PeriodicTask>,
    initial_delay: Duration,
    interval: Duration,
    cancel: CancellationToken,
  ) -> ActorHandle<TimerMessage> {
    let name = task.name();
    spawn(name, Self::new(task, initial_delay, interval), cancel)
  }
}

#[async_trait]
impl Actor for TimerActor {
  type Message = TimerMessage;

  async fn started(&mut self, ctx: &ActorContext<TimerMessage>) -> ActorResult {
    self.next = ctx.schedule_self(TimerMessage::Tick, self.initial_delay);
    debug!(
      timer = self.task.name(),
      interval_ms = self.interval.as_millis() as u64,
      "Timer started"
    );
    Ok(())
  }

  async fn handle(&mut self, msg: TimerMessage, ctx: &ActorContext<TimerMessage>) -> ActorResult {
    match msg {
      TimerMessage::Tick => {
        self.runs += 1;
        trace!(timer = self.task.name(), run = self.runs, "Timer tick");
        self.task.run_once().await;

        if !ctx.cancellation().is_cancelled() {
          self.next = ctx.schedule_self(TimerMessage::Tick, self.interval);
        }
      }
    }
    Ok(())
  }

  async fn stopped(&mut self) {
    if let Some(next) = self.next.take() {
      next.cancel();
    }
    debug!(timer = self.task.name(), runs = self.runs, "Timer stopped");
  }
}
