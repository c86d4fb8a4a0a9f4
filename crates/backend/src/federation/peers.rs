use std::{
  collections::BTreeSet,
  sync::{PoisonError, RwLock},
};

/// Peer URL without trailing slashes, so `http://b/dds/` and `http://b/dds`
/// name the same peer
pub fn normalize(peer_url: &str) -> String {
  peer_url.trim().trim_end_matches('/').to_string()
}

/// The configured set of peers, swappable at runtime
#[derive(Debug, Default)]
pub struct PeerSet {
  peers: RwLock<BTreeSet<String>>,
}

impl PeerSet {
  pub fn new<I, S>(peers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      peers: RwLock::new(peers.into_iter().map(|p| normalize(p.as_ref())).collect()),
    }
  }

  pub fn snapshot(&self) -> BTreeSet<String> {
    self.peers.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Swap in a new peer list, returning `(added, removed)`
  pub fn replace<I, S>(&self, peers: I) -> (Vec<String>, Vec<String>)
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let next: BTreeSet<String> = peers.into_iter().map(|p| normalize(p.as_ref())).collect();
    let mut current = self.peers.write().unwrap_or_else(PoisonError::into_inner);
    let added = next.difference(&current).cloned().collect();
    let removed = current.difference(&next).cloned().collect();
    *current = next;
    (added, removed)
  }
}
