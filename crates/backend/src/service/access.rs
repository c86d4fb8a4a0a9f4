//! Access control decisions
//!
//! The daemon only asks a yes/no question; how identities are established
//! (TLS client certificates, tokens) is up to the HTTP layer in front.

use std::{collections::HashSet, sync::Arc};

use crate::domain::config::AccessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  /// Read documents or subscriptions
  Read,
  /// Add, update or delete documents
  Write,
  /// Create, edit or delete subscriptions
  Subscribe,
  /// Push a notification list
  Notify,
}

impl Operation {
  pub fn is_read(self) -> bool {
    matches!(self, Self::Read)
  }
}

pub trait AccessControl: Send + Sync + 'static {
  fn authorize(&self, identity: Option<&str>, operation: Operation, resource: &str) -> bool;
}

/// Permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
  fn authorize(&self, _identity: Option<&str>, _operation: Operation, _resource: &str) -> bool {
    true
  }
}

/// Permits listed identities; optionally lets anyone read
#[derive(Debug, Clone, Default)]
pub struct AllowList {
  allowed: HashSet<String>,
  open_reads: bool,
}

impl AllowList {
  pub fn new<I: IntoIterator<Item = String>>(allowed: I, open_reads: bool) -> Self {
    Self {
      allowed: allowed.into_iter().collect(),
      open_reads,
    }
  }
}

impl AccessControl for AllowList {
  fn authorize(&self, identity: Option<&str>, operation: Operation, _resource: &str) -> bool {
    if self.open_reads && operation.is_read() {
      return true;
    }
    identity.is_some_and(|id| self.allowed.contains(id))
  }
}

/// Build the access policy described by `config`
pub fn from_config(config: &AccessConfig) -> Arc<dyn AccessControl> {
  if config.enabled {
    Arc::new(AllowList::new(config.allowed.iter().cloned(), config.open_reads))
  } else {
    Arc::new(AllowAll)
  }
}
