//! De-duplicating failure log for peer operations
//!
//! A peer that stays unreachable would otherwise log the same warning on
//! every audit cycle. The first failure, and any change of error, logs at
//! warn; repeats log at debug with a periodic warn summary. The first
//! success afterwards logs the recovery.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct FailureEntry {
  message: String,
  count: u64,
  since: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FailureLog {
  summary_every: u64,
  entries: DashMap<String, FailureEntry>,
}

impl FailureLog {
  pub fn new(summary_every: u64) -> Self {
    Self {
      summary_every: summary_every.max(1),
      entries: DashMap::new(),
    }
  }

  /// Record a failure for `peer` and return the consecutive count
  pub fn record(&self, peer: &str, operation: &str, error: impl ToString) -> u64 {
    let message = error.to_string();
    let mut entry = self.entries.entry(peer.to_string()).or_insert_with(|| FailureEntry {
      message: String::new(),
      count: 0,
      since: Utc::now(),
    });

    if entry.count == 0 || entry.message != message {
      warn!(peer, operation, error = %message, "Peer operation failed");
      if entry.count > 0 {
        entry.since = Utc::now();
      }
      entry.message = message;
      entry.count = 1;
      return 1;
    }

    entry.count += 1;
    if entry.count % self.summary_every == 0 {
      warn!(
        peer,
        operation,
        error = %entry.message,
        failures = entry.count,
        since = %entry.since,
        "Peer still failing"
      );
    } else {
      debug!(peer, operation, error = %entry.message, failures = entry.count, "Peer operation failed again");
    }
    entry.count
  }

  /// Forget failures for `peer`, logging the recovery if there were any
  pub fn clear(&self, peer: &str) {
    if let Some((_, entry)) = self.entries.remove(peer) {
      info!(peer, failures = entry.count, since = %entry.since, "Peer recovered");
    }
  }

  #[cfg(test)]
  pub(crate) fn failures(&self, peer: &str) -> u64 {
    self.entries.get(peer).map(|e| e.count).unwrap_or(0)
  }
}
