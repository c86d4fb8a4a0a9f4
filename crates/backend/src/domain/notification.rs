//! Notification payloads pushed to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{document::Document, subscription::DocumentEventType};

/// One document change inside a notification list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
  pub event: DocumentEventType,
  pub discovered: DateTime<Utc>,
  pub document: Document,
}

/// Body POSTed to a subscriber's callback
///
/// `id` and `href` name the subscription at the sending provider; the
/// receiver uses them to check the list came from a live registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
  pub provider_id: String,
  pub id: String,
  pub href: String,
  #[serde(default)]
  pub notifications: Vec<NotificationRecord>,
}
