use std::{sync::Arc, time::Duration};

use chrono::{Duration as TimeDelta, Utc};
use pretty_assertions::assert_eq;

use super::helpers::{LOCAL_NSA, REMOTE_NSA, ServiceTestContext, TOPOLOGY, doc};
use crate::{
  domain::{
    notification::{NotificationList, NotificationRecord},
    subscription::{DocumentEventType, SubscriptionRequest},
  },
  service::{DiscoveryError, DocumentQuery, access::AllowList},
};

const QUIET: Duration = Duration::from_millis(150);
const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn test_add_duplicate_is_already_exists() {
  let ctx = ServiceTestContext::new();
  let t0 = Utc::now();
  let added = ctx.discovery.add_document(None, doc(LOCAL_NSA, "1", t0)).await.unwrap();
  assert_eq!(
    added.href.as_deref(),
    Some(format!("http://local:8401/dds/documents/{}/{}/1", LOCAL_NSA, TOPOLOGY).as_str())
  );

  let err = ctx
    .discovery
    .add_document(None, doc(LOCAL_NSA, "1", t0 + TimeDelta::seconds(1)))
    .await
    .unwrap_err();
  assert!(matches!(err, DiscoveryError::AlreadyExists { .. }));
  assert_eq!(err.status(), 409);
}

#[tokio::test]
async fn test_update_requires_newer_version() {
  let ctx = ServiceTestContext::new();
  let t0 = Utc::now();
  let added = ctx.discovery.add_document(None, doc(LOCAL_NSA, "1", t0)).await.unwrap();

  for version in [t0, t0 - TimeDelta::seconds(1)] {
    let err = ctx
      .discovery
      .update_document(None, LOCAL_NSA, TOPOLOGY, "1", doc(LOCAL_NSA, "1", version))
      .await
      .unwrap_err();
    assert!(matches!(err, DiscoveryError::VersionConflict { .. }));
  }

  let newer = t0 + TimeDelta::seconds(1);
  let updated = ctx
    .discovery
    .update_document(None, LOCAL_NSA, TOPOLOGY, "1", doc(LOCAL_NSA, "1", newer))
    .await
    .unwrap();
  assert_eq!(updated.version, newer);
  assert!(updated.last_discovered >= added.last_discovered);
}

#[tokio::test]
async fn test_update_missing_and_mismatched() {
  let ctx = ServiceTestContext::new();
  let t0 = Utc::now();

  let err = ctx
    .discovery
    .update_document(None, LOCAL_NSA, TOPOLOGY, "1", doc(LOCAL_NSA, "1", t0))
    .await
    .unwrap_err();
  assert!(matches!(err, DiscoveryError::NotFound { .. }));

  let err = ctx
    .discovery
    .update_document(None, LOCAL_NSA, TOPOLOGY, "1", doc(LOCAL_NSA, "2", t0))
    .await
    .unwrap_err();
  assert!(matches!(err, DiscoveryError::InvalidParameter { .. }));
}

#[tokio::test]
async fn test_empty_identity_is_missing_parameter() {
  let ctx = ServiceTestContext::new();
  let err = ctx
    .discovery
    .add_document(None, doc("", "1", Utc::now()))
    .await
    .unwrap_err();
  assert_eq!(err, DiscoveryError::missing_parameter("nsa", "document identity component must not be empty"));
  assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn test_delete_leaves_tombstone_and_notifies_once() {
  let mut ctx = ServiceTestContext::new();
  let sub = ctx.ready_subscription().await;

  let t0 = Utc::now() + TimeDelta::hours(1);
  ctx.discovery.add_document(None, doc(LOCAL_NSA, "1", t0)).await.unwrap();
  let added = ctx.next_deliveries(1, WAIT).await;
  assert_eq!(added.len(), 1);
  assert_eq!(added[0].list.notifications[0].event, DocumentEventType::New);

  let deleted = ctx
    .discovery
    .delete_document(None, LOCAL_NSA, TOPOLOGY, "1")
    .await
    .unwrap();
  assert!(deleted.version > t0);
  assert!(deleted.expires <= Utc::now());
  assert_eq!(deleted.content, Some("<topology id=\"1\"/>".to_string()));

  let stored = ctx
    .discovery
    .get_document(None, LOCAL_NSA, TOPOLOGY, "1", None)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.version, deleted.version);

  let updates = ctx.next_deliveries(2, QUIET).await;
  assert_eq!(updates.len(), 1);
  assert_eq!(updates[0].list.id, sub.id);
  assert_eq!(updates[0].list.notifications[0].event, DocumentEventType::Updated);
  assert_eq!(updates[0].list.notifications[0].document.version, deleted.version);
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
  let ctx = ServiceTestContext::new();
  let err = ctx
    .discovery
    .delete_document(None, LOCAL_NSA, TOPOLOGY, "absent")
    .await
    .unwrap_err();
  assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_conditional_get_document() {
  let ctx = ServiceTestContext::new();
  let added = ctx
    .discovery
    .add_document(None, doc(LOCAL_NSA, "1", Utc::now()))
    .await
    .unwrap();

  let unchanged = ctx
    .discovery
    .get_document(None, LOCAL_NSA, TOPOLOGY, "1", Some(added.last_discovered))
    .await
    .unwrap();
  assert!(unchanged.is_none());

  let older = added.last_discovered - TimeDelta::seconds(2);
  let changed = ctx
    .discovery
    .get_document(None, LOCAL_NSA, TOPOLOGY, "1", Some(older))
    .await
    .unwrap();
  assert!(changed.is_some());
}

#[tokio::test]
async fn test_queries_filter_and_summarize() {
  let ctx = ServiceTestContext::new();
  let t0 = Utc::now();
  ctx.discovery.add_document(None, doc(LOCAL_NSA, "1", t0)).await.unwrap();
  ctx.discovery.add_document(None, doc(LOCAL_NSA, "2", t0)).await.unwrap();
  ctx.discovery.add_document(None, doc(REMOTE_NSA, "3", t0)).await.unwrap();

  let all = ctx
    .discovery
    .get_documents(None, &DocumentQuery::default())
    .await
    .unwrap();
  assert_eq!(all.len(), 3);
  assert!(all.iter().all(|d| d.content.is_some()));

  let summary = ctx
    .discovery
    .get_documents(
      None,
      &DocumentQuery {
        nsa: Some(REMOTE_NSA.to_string()),
        summary: true,
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(summary.len(), 1);
  assert_eq!(summary[0].id, "3");
  assert!(summary[0].content.is_none());

  let local = ctx
    .discovery
    .get_local_documents(None, &DocumentQuery::default())
    .await
    .unwrap();
  let ids: Vec<&str> = local.iter().map(|d| d.id.as_str()).collect();
  assert_eq!(ids, vec!["1", "2"]);

  let local_remote = ctx
    .discovery
    .get_local_documents(
      None,
      &DocumentQuery {
        nsa: Some(REMOTE_NSA.to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert!(local_remote.is_empty());
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn test_subscription_gets_initial_snapshot() {
  let mut ctx = ServiceTestContext::new();
  let t0 = Utc::now();
  for i in 0..12 {
    ctx
      .discovery
      .add_document(None, doc(LOCAL_NSA, &format!("{:02}", i), t0))
      .await
      .unwrap();
  }

  let sub = ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("urn:requester", "http://requester/notifications"))
    .await
    .unwrap();
  assert!(sub.href.ends_with(&sub.id));
  assert_eq!(sub.href, format!("http://local:8401/dds/subscriptions/{}", sub.id));

  let snapshot = ctx.next_deliveries(2, WAIT).await;
  let mut sizes: Vec<usize> = snapshot.iter().map(|d| d.list.notifications.len()).collect();
  sizes.sort_unstable();
  assert_eq!(sizes, vec![2, 10]);
}

#[tokio::test]
async fn test_edit_supersedes_pending_snapshot() {
  let mut ctx = ServiceTestContext::with_initial_delay(Duration::from_millis(100));
  ctx
    .discovery
    .add_document(None, doc(LOCAL_NSA, "1", Utc::now()))
    .await
    .unwrap();

  let request = SubscriptionRequest::new("urn:requester", "http://requester/notifications");
  let sub = ctx.discovery.add_subscription(None, request.clone()).await.unwrap();
  let edited = ctx
    .discovery
    .edit_subscription(None, &sub.id, request)
    .await
    .unwrap();
  assert_eq!(edited.epoch, sub.epoch + 1);

  // The edit's snapshot goes out immediately; the create's is dropped
  let deliveries = ctx.next_deliveries(2, Duration::from_millis(300)).await;
  assert_eq!(deliveries.len(), 1);
}

#[tokio::test]
async fn test_subscription_crud_errors() {
  let ctx = ServiceTestContext::new();

  let err = ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("urn:requester", "not a url"))
    .await
    .unwrap_err();
  assert!(matches!(err, DiscoveryError::InvalidParameter { .. }));

  let err = ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("", "http://requester/"))
    .await
    .unwrap_err();
  assert!(matches!(err, DiscoveryError::MissingParameter { .. }));

  let request = SubscriptionRequest::new("urn:requester", "http://requester/notifications");
  assert!(matches!(
    ctx.discovery.edit_subscription(None, "absent", request).await,
    Err(DiscoveryError::NotFound { .. })
  ));
  assert!(matches!(
    ctx.discovery.delete_subscription(None, "absent").await,
    Err(DiscoveryError::NotFound { .. })
  ));
  assert!(matches!(
    ctx.discovery.get_subscription(None, "absent", None).await,
    Err(DiscoveryError::NotFound { .. })
  ));
}

#[tokio::test]
async fn test_subscription_queries() {
  let ctx = ServiceTestContext::new();
  let a = ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("urn:a", "http://a/notifications"))
    .await
    .unwrap();
  ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("urn:b", "http://b/notifications"))
    .await
    .unwrap();

  let only_a = ctx.discovery.get_subscriptions(None, Some("urn:a"), None).await.unwrap();
  assert_eq!(only_a.len(), 1);
  assert_eq!(only_a[0].id, a.id);

  let unchanged = ctx
    .discovery
    .get_subscription(None, &a.id, Some(a.last_modified))
    .await
    .unwrap();
  assert!(unchanged.is_none());

  ctx.discovery.delete_subscription(None, &a.id).await.unwrap();
  assert_eq!(ctx.discovery.get_subscriptions(None, None, None).await.unwrap().len(), 1);
}

// ============================================================================
// Notifications from peers
// ============================================================================

fn notification(id: &str, href: &str, documents: Vec<crate::domain::document::Document>) -> NotificationList {
  NotificationList {
    provider_id: REMOTE_NSA.to_string(),
    id: id.to_string(),
    href: href.to_string(),
    notifications: documents
      .into_iter()
      .map(|document| NotificationRecord {
        event: DocumentEventType::All,
        discovered: document.last_discovered,
        document,
      })
      .collect(),
  }
}

#[tokio::test]
async fn test_notification_from_unknown_registration_is_rejected() {
  let ctx = ServiceTestContext::new();
  let list = notification("nope", "http://peer/dds/subscriptions/nope", vec![doc(REMOTE_NSA, "1", Utc::now())]);

  let err = ctx.discovery.process_notification(None, list).await.unwrap_err();
  assert!(matches!(err, DiscoveryError::NotFound { .. }));
  assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn test_notification_applies_new_and_newer_only() {
  let ctx = ServiceTestContext::new();
  let entry = ctx.register_remote("http://peer:8401/dds", "sub-1");
  let t0 = Utc::now();

  let first = notification(
    &entry.id,
    &entry.href,
    vec![doc(REMOTE_NSA, "1", t0), doc(REMOTE_NSA, "2", t0)],
  );
  assert_eq!(ctx.discovery.process_notification(None, first).await.unwrap(), 2);

  // Matching by href alone is enough
  let second = notification(
    "other-id",
    &entry.href,
    vec![
      doc(REMOTE_NSA, "1", t0),
      doc(REMOTE_NSA, "2", t0 - TimeDelta::seconds(10)),
      doc(REMOTE_NSA, "3", t0),
      doc(REMOTE_NSA, "1", t0 + TimeDelta::seconds(1)),
    ],
  );
  assert_eq!(ctx.discovery.process_notification(None, second).await.unwrap(), 2);

  let stored = ctx
    .discovery
    .get_document(None, REMOTE_NSA, TOPOLOGY, "1", None)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.version, t0 + TimeDelta::seconds(1));
  assert_eq!(ctx.store.len(), 3);
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
async fn test_unauthorized_callers_are_rejected() {
  let ctx = ServiceTestContext::with_access(Arc::new(AllowList::new(["urn:trusted".to_string()], true)));

  let err = ctx
    .discovery
    .add_document(Some("urn:stranger"), doc(LOCAL_NSA, "1", Utc::now()))
    .await
    .unwrap_err();
  assert_eq!(err.status(), 401);
  assert_eq!(err.label(), "UNAUTHORIZED");

  ctx
    .discovery
    .add_document(Some("urn:trusted"), doc(LOCAL_NSA, "1", Utc::now()))
    .await
    .unwrap();
  let listed = ctx
    .discovery
    .get_documents(Some("urn:stranger"), &DocumentQuery::default())
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);

  let err = ctx
    .discovery
    .add_subscription(None, SubscriptionRequest::new("urn:x", "http://x/"))
    .await
    .unwrap_err();
  assert_eq!(err.status(), 401);
}
