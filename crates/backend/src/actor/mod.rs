//! Actor-based concurrency primitives
//!
//! Instead of shared-state concurrency with `Arc<Mutex<...>>`, long-lived
//! components communicate via message passing.
//!
//! # Architecture
//!
//! - Each actor runs as a tokio task with its own event loop and mailbox
//! - An actor processes one message at a time; state is owned, not shared
//! - Messages from one sender to one actor arrive in send order
//! - A failing or panicking actor terminates and notifies its watchers
//!
//! # Building Blocks
//!
//! - [`spawn`] / [`ActorHandle`]: start an [`Actor`] and talk to it
//! - [`Pool`]: round-robin router over supervised, self-replacing workers
//! - [`schedule`]: cancellable delayed send
//! - [`TimerActor`] / [`Scheduler`]: periodic tasks that re-arm after each run
//!
//! See [`message`] for the events that flow between the daemon's actors.

pub mod handle;
pub mod message;
mod router;
mod runtime;
mod scheduler;
mod timer;


pub use handle::{ActorHandle, ExitReason, SendError, Terminated};
pub use router::Pool;
pub use runtime::{Actor, ActorContext, ActorResult, BoxError, spawn};
pub use scheduler::{ScheduledTask, Scheduler};
pub use timer::{Cancellable, PeriodicTask, TimerActor, TimerMessage, schedule};
