use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
  handle::ActorHandle,
  timer::{PeriodicTask, TimerActor, TimerMessage},
};

/// A periodic task and its timing
pub struct ScheduledTask {
  pub task: Box<dyn PeriodicTask>,
  pub initial_delay: Duration,
  pub interval: Duration,
}

impl ScheduledTask {
  pub fn new(task: impl PeriodicTask, initial_delay: Duration, interval: Duration) -> Self {
    Self {
      task: Box::new(task),
      initial_delay,
      interval,
    }
  }

  /// Run every `interval`, first run after one interval
  pub fn every(task: impl PeriodicTask, interval: Duration) -> Self {
    Self::new(task, interval, interval)
  }
}

/// Background task scheduler for daemon operations.
///
/// Handles:
/// - Configuration reload
/// - Document expiry sweep
/// - Local document directory audit
/// - Peer registration audit
///
/// Each task runs on its own [`TimerActor`], so a slow task never delays
/// the others.
pub struct Scheduler {
  timers: Vec<ActorHandle<TimerMessage>>,
  cancel: CancellationToken,
}

impl Scheduler {
  /// Start one timer per task. Tasks with a zero interval are skipped.
  pub fn start(tasks: Vec<ScheduledTask>, cancel: CancellationToken) -> Self {
    let timers: Vec<_> = tasks
      .into_iter()
      .filter(|t| !t.interval.is_zero())
      .map(|t| TimerActor::spawn(t.task, t.initial_delay, t.interval, cancel.child_token()))
      .collect();

    info!(timers = timers.len(), "Scheduler started");
    Self { timers, cancel }
  }

  /// Handles of the running timers
  pub fn timers(&self) -> &[ActorHandle<TimerMessage>] {
    &self.timers
  }

  /// Stop every timer and wait for runs in progress to finish
  pub async fn stop(&self) {
    info!("Scheduler stopping");
    self.cancel.cancel();
    join_all(self.timers.iter().map(|t| t.terminated())).await;
    debug!("Scheduler stopped");
  }
}
