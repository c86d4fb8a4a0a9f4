//! Actor message types
//!
//! Events are immutable once sent and only ever travel through actor
//! mailboxes:
//!
//! ```text
//! Discovery ──DocumentEvent──────▶ NotificationRouter ──Notification──▶ delivery pool
//!           ──SubscriptionEvent──▶
//! FederationAudit ──RegistrationMessage──▶ registration pool
//! ```

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::domain::{
  document::Document,
  subscription::{DocumentEventType, Subscription},
};

// ============================================================================
// Document Events
// ============================================================================

/// A document was added or changed in the local store
#[derive(Debug, Clone)]
pub struct DocumentEvent {
  /// `New` or `Updated`
  pub kind: DocumentEventType,
  pub document: Arc<Document>,
}

impl DocumentEvent {
  pub fn new(document: Document) -> Self {
    Self {
      kind: DocumentEventType::New,
      document: Arc::new(document),
    }
  }

  pub fn updated(document: Document) -> Self {
    Self {
      kind: DocumentEventType::Updated,
      document: Arc::new(document),
    }
  }
}

// ============================================================================
// Subscription Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEventKind {
  Created,
  Edited,
}

/// A subscription needs a full snapshot
///
/// Ignored on arrival unless `epoch` still equals the subscription's epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
  pub kind: SubscriptionEventKind,
  pub subscription_id: String,
  pub epoch: u64,
}

/// Mailbox of the notification router
#[derive(Debug, Clone)]
pub enum NotifierMessage {
  Document(DocumentEvent),
  Subscription(SubscriptionEvent),
}

/// One unit of work for the delivery pool
#[derive(Debug, Clone)]
pub struct Notification {
  pub event: DocumentEventType,
  pub subscription: Subscription,
  pub documents: Vec<Arc<Document>>,
}

// ============================================================================
// Registration Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEventKind {
  Register,
  Update,
  Delete,
  Audit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEvent {
  pub kind: RegistrationEventKind,
  pub peer_url: String,
}

impl RegistrationEvent {
  pub fn new(kind: RegistrationEventKind, peer_url: impl Into<String>) -> Self {
    Self {
      kind,
      peer_url: peer_url.into(),
    }
  }
}

/// Mailbox of a registration worker
///
/// `ack` fires once the event has been processed, whatever the outcome.
#[derive(Debug)]
pub struct RegistrationMessage {
  pub event: RegistrationEvent,
  pub ack: Option<oneshot::Sender<()>>,
}

impl RegistrationMessage {
  pub fn with_ack(event: RegistrationEvent) -> (Self, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    (Self { event, ack: Some(tx) }, rx)
  }
}
