//! Discovery service: the operations the HTTP layer exposes.
//!
//! Every operation is authorized first, then validated, then applied to the
//! document store or subscription registry. Successful document mutations
//! emit a [`DocumentEvent`]; created and edited subscriptions emit a
//! [`SubscriptionEvent`] so that the subscriber gets a full snapshot.
//!
//! Conditional reads return `Ok(None)` when nothing changed since the
//! caller's `If-Modified-Since`; the HTTP layer answers those with 304.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use tracing::{debug, info, warn};

use super::{
  access::{AccessControl, Operation},
  util::DiscoveryError,
};
use crate::{
  actor::{
    ActorHandle,
    message::{DocumentEvent, NotifierMessage, SubscriptionEvent, SubscriptionEventKind},
    schedule,
  },
  domain::{
    document::{Document, DocumentKey},
    modified_since,
    notification::NotificationList,
    subscription::{DocumentEventType, RequestProblem, Subscription, SubscriptionRequest},
  },
  federation::RemoteSubscriptionCache,
  notify::SubscriptionRegistry,
  store::{DocumentStore, StoreError},
};

/// Filters for document listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
  pub nsa: Option<String>,
  pub doc_type: Option<String>,
  pub id: Option<String>,
  /// Only documents discovered after this instant (second resolution)
  pub modified_since: Option<DateTime<Utc>>,
  /// Strip content from results
  pub summary: bool,
}

impl DocumentQuery {
  fn admits(&self, document: &Document) -> bool {
    self.nsa.as_ref().is_none_or(|n| *n == document.nsa)
      && self.doc_type.as_ref().is_none_or(|t| *t == document.doc_type)
      && self.id.as_ref().is_none_or(|i| *i == document.id)
      && self
        .modified_since
        .is_none_or(|since| modified_since(document.last_discovered, since))
  }
}

/// Everything a [`Discovery`] instance is wired to
pub struct DiscoveryParts {
  pub base_url: Url,
  pub store: Arc<DocumentStore>,
  pub registry: Arc<SubscriptionRegistry>,
  pub remote: Arc<RemoteSubscriptionCache>,
  pub notifier: ActorHandle<NotifierMessage>,
  pub access: Arc<dyn AccessControl>,
  pub initial_delay: Duration,
}

pub struct Discovery {
  base_url: Url,
  store: Arc<DocumentStore>,
  registry: Arc<SubscriptionRegistry>,
  remote: Arc<RemoteSubscriptionCache>,
  notifier: ActorHandle<NotifierMessage>,
  access: Arc<dyn AccessControl>,
  initial_delay: Duration,
}

impl Discovery {
  pub fn new(parts: DiscoveryParts) -> Self {
    Self {
      base_url: parts.base_url,
      store: parts.store,
      registry: parts.registry,
      remote: parts.remote,
      notifier: parts.notifier,
      access: parts.access,
      initial_delay: parts.initial_delay,
    }
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn store(&self) -> &Arc<DocumentStore> {
    &self.store
  }

  pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
    &self.registry
  }

  fn authorize(&self, identity: Option<&str>, operation: Operation, resource: &str) -> Result<(), DiscoveryError> {
    if self.access.authorize(identity, operation, resource) {
      Ok(())
    } else {
      debug!(identity = ?identity, ?operation, resource, "Access denied");
      Err(DiscoveryError::unauthorized(
        resource,
        format!("{} may not perform {:?}", identity.unwrap_or("anonymous"), operation),
      ))
    }
  }

  fn emit(&self, event: DocumentEvent) {
    let key = event.document.key();
    if self.notifier.send(NotifierMessage::Document(event)).is_err() {
      warn!(document = %key, "Notification router is gone, event dropped");
    }
  }

  /// Stamp local fields onto an incoming document
  fn localize(&self, mut document: Document) -> Document {
    document.href = Some(document.key().href(&self.base_url));
    document.last_discovered = Utc::now();
    document
  }

  fn check_key(key: &DocumentKey) -> Result<(), DiscoveryError> {
    match key.missing_component() {
      Some(component) => Err(DiscoveryError::missing_parameter(
        component,
        "document identity component must not be empty",
      )),
      None => Ok(()),
    }
  }

  // ==========================================================================
  // Documents
  // ==========================================================================

  /// Add a document that must not exist yet
  pub async fn add_document(&self, identity: Option<&str>, document: Document) -> Result<Document, DiscoveryError> {
    self.authorize(identity, Operation::Write, "documents")?;
    Self::check_key(&document.key())?;

    let document = self.localize(document);
    self.store.put(document.clone()).await?;
    info!(document = %document.key(), version = %document.version, "Document added");
    self.emit(DocumentEvent::new(document.clone()));
    Ok(document)
  }

  /// Replace a document with a strictly newer version
  pub async fn update_document(
    &self,
    identity: Option<&str>,
    nsa: &str,
    doc_type: &str,
    id: &str,
    document: Document,
  ) -> Result<Document, DiscoveryError> {
    let key = DocumentKey::new(nsa, doc_type, id);
    self.authorize(identity, Operation::Write, &key.to_string())?;
    Self::check_key(&key)?;
    if !document.has_key(&key) {
      return Err(DiscoveryError::invalid_parameter(
        key.to_string(),
        format!("document identity {} does not match the request path", document.key()),
      ));
    }

    let document = self.localize(document);
    self.store.compare_and_update(document.clone()).await?;
    info!(document = %key, version = %document.version, "Document updated");
    self.emit(DocumentEvent::updated(document.clone()));
    Ok(document)
  }

  /// Delete a document by expiring it now.
  ///
  /// The entry stays in the store as a tombstone with a bumped version, so
  /// subscribers and peers see the deletion as an ordinary update.
  pub async fn delete_document(
    &self,
    identity: Option<&str>,
    nsa: &str,
    doc_type: &str,
    id: &str,
  ) -> Result<Document, DiscoveryError> {
    let key = DocumentKey::new(nsa, doc_type, id);
    self.authorize(identity, Operation::Write, &key.to_string())?;
    Self::check_key(&key)?;
    self.tombstone(&key).await
  }

  pub(crate) async fn tombstone(&self, key: &DocumentKey) -> Result<Document, DiscoveryError> {
    let existing = self
      .store
      .get(key)
      .ok_or_else(|| DiscoveryError::not_found(key.to_string(), "document does not exist"))?;

    let now = Utc::now();
    let mut document = existing.clone();
    document.expires = now;
    document.version = if now > existing.version {
      now
    } else {
      existing.version + TimeDelta::milliseconds(1)
    };
    document.last_discovered = now;

    self.store.compare_and_update(document.clone()).await?;
    info!(document = %key, "Document deleted");
    self.emit(DocumentEvent::updated(document.clone()));
    Ok(document)
  }

  /// Fetch one document; `Ok(None)` if unchanged since `if_modified_since`
  pub async fn get_document(
    &self,
    identity: Option<&str>,
    nsa: &str,
    doc_type: &str,
    id: &str,
    if_modified_since: Option<DateTime<Utc>>,
  ) -> Result<Option<Document>, DiscoveryError> {
    let key = DocumentKey::new(nsa, doc_type, id);
    self.authorize(identity, Operation::Read, &key.to_string())?;

    let document = self
      .store
      .get(&key)
      .ok_or_else(|| DiscoveryError::not_found(key.to_string(), "document does not exist"))?;

    match if_modified_since {
      Some(since) if !modified_since(document.last_discovered, since) => Ok(None),
      _ => Ok(Some(document)),
    }
  }

  pub async fn get_documents(
    &self,
    identity: Option<&str>,
    query: &DocumentQuery,
  ) -> Result<Vec<Document>, DiscoveryError> {
    self.authorize(identity, Operation::Read, "documents")?;
    Ok(self.select(query))
  }

  /// Documents owned by this node's NSA
  pub async fn get_local_documents(
    &self,
    identity: Option<&str>,
    query: &DocumentQuery,
  ) -> Result<Vec<Document>, DiscoveryError> {
    self.authorize(identity, Operation::Read, "local")?;
    let local_nsa = self.store.local_nsa();
    if query.nsa.as_deref().is_some_and(|n| n != local_nsa) {
      return Ok(Vec::new());
    }
    let query = DocumentQuery {
      nsa: Some(local_nsa.to_string()),
      ..query.clone()
    };
    Ok(self.select(&query))
  }

  fn select(&self, query: &DocumentQuery) -> Vec<Document> {
    let mut documents: Vec<Document> = self
      .store
      .values()
      .into_iter()
      .filter(|d| query.admits(d))
      .map(|d| if query.summary { d.summary() } else { d })
      .collect();
    documents.sort_by_key(|d| d.key());
    documents
  }

  /// Insert a first-seen document or apply a newer version.
  ///
  /// Returns the event emitted, or `None` when the offered version was not
  /// newer than the stored one.
  pub(crate) async fn upsert(&self, document: Document) -> Result<Option<DocumentEventType>, DiscoveryError> {
    let document = self.localize(document);
    let key = document.key();

    if self.store.get(&key).is_none() {
      match self.store.put(document.clone()).await {
        Ok(()) => {
          debug!(document = %key, "Discovered new document");
          self.emit(DocumentEvent::new(document));
          return Ok(Some(DocumentEventType::New));
        }
        // Lost a race with another writer, fall through to the version gate
        Err(StoreError::AlreadyExists(_)) => {}
        Err(e) => return Err(e.into()),
      }
    }

    match self.store.compare_and_update(document.clone()).await {
      Ok(_) => {
        debug!(document = %key, version = %document.version, "Discovered newer document version");
        self.emit(DocumentEvent::updated(document));
        Ok(Some(DocumentEventType::Updated))
      }
      Err(StoreError::VersionConflict { .. }) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  // ==========================================================================
  // Subscriptions
  // ==========================================================================

  fn check_request(request: &SubscriptionRequest) -> Result<(), DiscoveryError> {
    request.validate().map_err(|problem| match problem {
      RequestProblem::Missing(parameter) => DiscoveryError::missing_parameter(parameter, "must not be empty"),
      RequestProblem::Invalid(parameter, reason) => DiscoveryError::invalid_parameter(parameter, reason),
    })
  }

  /// Create a subscription; its initial snapshot follows after a short delay
  pub async fn add_subscription(
    &self,
    identity: Option<&str>,
    request: SubscriptionRequest,
  ) -> Result<Subscription, DiscoveryError> {
    self.authorize(identity, Operation::Subscribe, "subscriptions")?;
    Self::check_request(&request)?;

    let subscription = self.registry.add(request);
    info!(
      subscription_id = %subscription.id,
      requester_id = %subscription.requester_id,
      callback = %subscription.callback,
      "Subscription added"
    );

    schedule(
      &self.notifier,
      NotifierMessage::Subscription(SubscriptionEvent {
        kind: SubscriptionEventKind::Created,
        subscription_id: subscription.id.clone(),
        epoch: subscription.epoch,
      }),
      self.initial_delay,
    );
    Ok(subscription)
  }

  /// Replace a subscription's parameters and send a fresh snapshot
  pub async fn edit_subscription(
    &self,
    identity: Option<&str>,
    id: &str,
    request: SubscriptionRequest,
  ) -> Result<Subscription, DiscoveryError> {
    self.authorize(identity, Operation::Subscribe, id)?;
    Self::check_request(&request)?;

    let subscription = self
      .registry
      .edit(id, request)
      .ok_or_else(|| DiscoveryError::not_found(id, "subscription does not exist"))?;
    info!(subscription_id = %subscription.id, epoch = subscription.epoch, "Subscription edited");

    let event = NotifierMessage::Subscription(SubscriptionEvent {
      kind: SubscriptionEventKind::Edited,
      subscription_id: subscription.id.clone(),
      epoch: subscription.epoch,
    });
    if self.notifier.send(event).is_err() {
      warn!(subscription_id = %subscription.id, "Notification router is gone, snapshot dropped");
    }
    Ok(subscription)
  }

  pub async fn delete_subscription(&self, identity: Option<&str>, id: &str) -> Result<Subscription, DiscoveryError> {
    self.authorize(identity, Operation::Subscribe, id)?;
    let subscription = self
      .registry
      .delete(id)
      .ok_or_else(|| DiscoveryError::not_found(id, "subscription does not exist"))?;
    info!(subscription_id = %id, "Subscription deleted");
    Ok(subscription)
  }

  /// Fetch one subscription; `Ok(None)` if unchanged since `if_modified_since`
  pub async fn get_subscription(
    &self,
    identity: Option<&str>,
    id: &str,
    if_modified_since: Option<DateTime<Utc>>,
  ) -> Result<Option<Subscription>, DiscoveryError> {
    self.authorize(identity, Operation::Read, id)?;
    let subscription = self
      .registry
      .get(id)
      .ok_or_else(|| DiscoveryError::not_found(id, "subscription does not exist"))?;

    match if_modified_since {
      Some(since) if !modified_since(subscription.last_modified, since) => Ok(None),
      _ => Ok(Some(subscription)),
    }
  }

  pub async fn get_subscriptions(
    &self,
    identity: Option<&str>,
    requester_id: Option<&str>,
    modified_since: Option<DateTime<Utc>>,
  ) -> Result<Vec<Subscription>, DiscoveryError> {
    self.authorize(identity, Operation::Read, "subscriptions")?;
    Ok(self.registry.list(requester_id, modified_since))
  }

  // ==========================================================================
  // Notifications from peers
  // ==========================================================================

  /// Apply a notification list pushed by a peer.
  ///
  /// The list must name one of this node's live registrations. Stale
  /// versions are discarded silently; the result is the number of
  /// documents that changed the store.
  pub async fn process_notification(
    &self,
    identity: Option<&str>,
    list: NotificationList,
  ) -> Result<usize, DiscoveryError> {
    self.authorize(identity, Operation::Notify, "notifications")?;

    if !self.remote.is_live(&list.id, &list.href) {
      return Err(DiscoveryError::not_found(
        list.href,
        "notification does not belong to an active registration",
      ));
    }

    let total = list.notifications.len();
    let mut applied = 0;
    for record in list.notifications {
      let key = record.document.key();
      if let Err(e) = Self::check_key(&key) {
        warn!(provider = %list.provider_id, error = %e, "Skipping malformed document in notification");
        continue;
      }
      if self.upsert(record.document).await?.is_some() {
        applied += 1;
      }
    }

    debug!(provider = %list.provider_id, total, applied, "Processed notification");
    Ok(applied)
  }
}
