use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::helpers::{Probe, ProbeMessage, eventually, recv_n};
use crate::actor::{ExitReason, Pool, spawn};

const WAIT: Duration = Duration::from_secs(2);

fn probe_pool(size: usize, cancel: &CancellationToken) -> (Pool<ProbeMessage>, mpsc::UnboundedReceiver<(usize, u32)>) {
  let (seen_tx, seen_rx) = mpsc::unbounded_channel();
  let pool = Pool::spawn(
    "probe",
    size,
    move |slot| Probe {
      slot,
      seen: seen_tx.clone(),
    },
    cancel.child_token(),
  );
  (pool, seen_rx)
}

#[tokio::test]
async fn test_route_is_round_robin() {
  let cancel = CancellationToken::new();
  let (pool, mut seen) = probe_pool(3, &cancel);

  for value in 0..6 {
    pool.route(ProbeMessage::Echo(value)).unwrap();
  }

  let mut received = recv_n(&mut seen, 6, WAIT).await;
  received.sort_by_key(|(_, value)| *value);
  let slots: Vec<usize> = received.iter().map(|(slot, _)| *slot).collect();
  assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);

  cancel.cancel();
}

#[tokio::test]
async fn test_failed_member_is_replaced() {
  let cancel = CancellationToken::new();
  let (pool, mut seen) = probe_pool(3, &cancel);
  let original = pool.members();

  pool.route(ProbeMessage::Fail).unwrap();
  assert!(eventually(WAIT, || pool.restarts() == 1).await);

  assert_eq!(pool.size(), 3);
  assert!(matches!(original[0].exit_reason(), Some(ExitReason::Failed(_))));
  let current = pool.members();
  assert_ne!(current[0].id(), original[0].id());
  assert_eq!(current[1].id(), original[1].id());

  // Every slot still answers
  for value in 0..3 {
    pool.route(ProbeMessage::Echo(value)).unwrap();
  }
  let mut slots: Vec<usize> = recv_n(&mut seen, 3, WAIT).await.into_iter().map(|(s, _)| s).collect();
  slots.sort();
  assert_eq!(slots, vec![0, 1, 2]);

  cancel.cancel();
}

#[tokio::test]
async fn test_panicking_member_is_replaced() {
  let cancel = CancellationToken::new();
  let (pool, _seen) = probe_pool(2, &cancel);
  let original = pool.members();

  pool.route(ProbeMessage::Panic).unwrap();
  assert!(eventually(WAIT, || pool.restarts() == 1).await);

  assert_eq!(pool.size(), 2);
  assert_eq!(
    original[0].exit_reason(),
    Some(ExitReason::Panicked("probe panic".to_string()))
  );

  cancel.cancel();
}

#[tokio::test]
async fn test_shutdown_stops_members_without_replacement() {
  let cancel = CancellationToken::new();
  let (pool, _seen) = probe_pool(2, &cancel);
  let members = pool.members();

  pool.shutdown();
  assert!(eventually(WAIT, || members.iter().all(|m| !m.is_alive())).await);
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(pool.restarts(), 0);
  assert!(pool.route(ProbeMessage::Echo(1)).is_err());
}

#[tokio::test]
async fn test_watch_reports_stop() {
  let cancel = CancellationToken::new();
  let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
  let handle = spawn("single", Probe { slot: 0, seen: seen_tx }, cancel.clone());

  let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
  handle.watch(watch_tx);
  cancel.cancel();

  let notice = tokio::time::timeout(WAIT, watch_rx.recv()).await.unwrap().unwrap();
  assert_eq!(notice.id, handle.id());
  assert_eq!(notice.reason, ExitReason::Stopped);
}
