use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::{Duration as TimeDelta, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::helpers::{Call, FakePeers};
use crate::{
  actor::PeriodicTask,
  domain::{config::FederationConfig, subscription::SubscriptionRequest},
  federation::Federation,
};

const A: &str = "http://a:8401/dds";
const B: &str = "http://b:8401/dds";
const C: &str = "http://c:8401/dds";
const ME: &str = "urn:ogf:network:me.net:2024:nsa";

struct Harness {
  fake: Arc<FakePeers>,
  federation: Federation,
  cancel: CancellationToken,
}

impl Harness {
  fn new(peers: &[&str]) -> Self {
    let fake = Arc::new(FakePeers::new());
    let cancel = CancellationToken::new();
    let config = FederationConfig {
      peers: peers.iter().map(|p| p.to_string()).collect(),
      pool_size: 2,
      ..Default::default()
    };
    let federation = Federation::start(
      &config,
      SubscriptionRequest::new(ME, "http://me:8401/dds/notifications"),
      fake.clone(),
      &cancel,
    );
    Self {
      fake,
      federation,
      cancel,
    }
  }

  async fn cycle(&self) {
    let mut task = self.federation.audit_task();
    tokio::time::timeout(Duration::from_secs(5), task.run_once())
      .await
      .expect("audit cycle finished");
  }

  fn active(&self) -> BTreeSet<String> {
    self.federation.remote().peers()
  }
}

impl Drop for Harness {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

fn set(items: &[&str]) -> BTreeSet<String> {
  items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_first_cycle_registers_every_peer() {
  let h = Harness::new(&[A, B]);
  h.cycle().await;

  assert_eq!(h.active(), set(&[A, B]));
  for peer in [A, B] {
    let table = h.fake.table(peer);
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].requester_id, ME);
    assert_eq!(table[0].callback, "http://me:8401/dds/notifications");
    assert_eq!(h.federation.remote().get(peer).unwrap().id, table[0].id);
  }
}

#[tokio::test]
async fn test_register_removes_duplicates_from_same_requester() {
  let h = Harness::new(&[A]);
  let stale = h.fake.seed(A, ME);
  let foreign = h.fake.seed(A, "urn:someone:else");

  h.cycle().await;

  let ids: Vec<String> = h.fake.table(A).into_iter().map(|s| s.id).collect();
  assert_eq!(ids.len(), 2);
  assert!(!ids.contains(&stale.id));
  assert!(ids.contains(&foreign.id));
  assert!(ids.contains(&h.federation.remote().get(A).unwrap().id));
}

#[tokio::test]
async fn test_reconcile_deletes_updates_and_registers() {
  let h = Harness::new(&[A, B]);
  h.cycle().await;

  h.federation.peers().replace([B, C]);
  let before = h.fake.calls().len();
  h.cycle().await;

  assert_eq!(h.active(), set(&[B, C]));
  assert!(h.fake.table(A).is_empty());
  assert_eq!(h.fake.table(C).len(), 1);

  // Exactly one action per peer; registering C also lists its table
  let mut calls = h.fake.calls()[before..].to_vec();
  calls.sort();
  let mut expected = vec![
    Call::Unsubscribe(A.to_string()),
    Call::Audit(B.to_string()),
    Call::Subscribe(C.to_string()),
    Call::List(C.to_string()),
  ];
  expected.sort();
  assert_eq!(calls, expected);
}

#[tokio::test]
async fn test_audit_absorbs_modified_registration() {
  let h = Harness::new(&[A]);
  h.cycle().await;
  let registered = h.federation.remote().get(A).unwrap();

  let later = registered.last_modified + TimeDelta::seconds(5);
  h.fake.touch(A, later);
  h.cycle().await;

  let audited = h.federation.remote().get(A).unwrap();
  assert_eq!(audited.id, registered.id);
  assert_eq!(audited.last_modified, later);
  assert!(audited.last_successful_audit.is_some());
}

#[tokio::test]
async fn test_audit_reregisters_after_404() {
  let h = Harness::new(&[A]);
  h.cycle().await;
  let first = h.federation.remote().get(A).unwrap();

  h.fake.forget(A);
  h.cycle().await;

  let second = h.federation.remote().get(A).unwrap();
  assert_ne!(second.id, first.id);
  assert_eq!(h.fake.table(A).len(), 1);
}

#[tokio::test]
async fn test_failing_peer_does_not_block_others() {
  let h = Harness::new(&[A, B]);
  h.fake.take_down(A);

  h.cycle().await;
  h.cycle().await;

  assert_eq!(h.active(), set(&[B]));
  assert_eq!(h.federation.failures().failures(A), 2);

  h.fake.bring_up(A);
  h.cycle().await;
  assert_eq!(h.active(), set(&[A, B]));
  assert_eq!(h.federation.failures().failures(A), 0);
}

#[tokio::test]
async fn test_failed_audit_keeps_registration() {
  let h = Harness::new(&[A]);
  h.cycle().await;
  h.fake.take_down(A);
  h.cycle().await;

  let entry = h.federation.remote().get(A).unwrap();
  assert!(entry.last_audit.is_some());
  assert!(entry.last_successful_audit.is_none());
  assert!(entry.last_audit.unwrap() <= Utc::now());
}

#[tokio::test]
async fn test_shutdown_unregisters_everywhere() {
  let h = Harness::new(&[A, B]);
  h.cycle().await;

  h.federation.shutdown(Duration::from_secs(2)).await;

  assert!(h.fake.table(A).is_empty());
  assert!(h.fake.table(B).is_empty());
  assert!(h.active().is_empty());
}

#[tokio::test]
async fn test_shutdown_undoes_registration_in_flight() {
  let h = Harness::new(&[C]);
  h.fake.slow_down(Duration::from_millis(150));

  let mut task = h.federation.audit_task();
  let cycle = tokio::spawn(async move { task.run_once().await });
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(h.federation.remote().is_empty());

  h.federation.shutdown(Duration::from_secs(5)).await;

  let calls = h.fake.calls();
  assert!(calls.contains(&Call::Subscribe(C.to_string())));
  assert!(calls.contains(&Call::Unsubscribe(C.to_string())));
  assert!(h.fake.table(C).is_empty());
  assert!(h.federation.remote().is_empty());
  cycle.await.unwrap();
}
