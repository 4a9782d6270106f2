//! Per-(entity, key) fetch lifecycle state machine.
//!
//! Every cached series moves through `Idle -> Fetching -> Populated` on
//! success, or `Fetching -> Errored` on failure. A refresh for the same key
//! re-enters `Fetching` while keeping the last good payload in the `stale`
//! slot, so a failed refresh never regresses the UI to an empty state.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A successfully fetched payload plus when it arrived.
///
/// The payload lives behind an `Arc` so projections hand out cheap,
/// pointer-stable clones instead of copying reading series around.
#[derive(Debug, Clone)]
pub struct Populated<P> {
  pub data: Arc<P>,
  pub fetched_at: DateTime<Utc>,
}

impl<P> Populated<P> {
  pub fn new(data: P) -> Self {
    Self {
      data: Arc::new(data),
      fetched_at: Utc::now(),
    }
  }
}

/// The state of one (entity kind, entity id, cache key) triple.
#[derive(Debug, Clone)]
pub enum CacheEntry<P> {
  /// Never requested.
  Idle,
  /// Request issued, response pending. `stale` holds the previous payload
  /// if this is a refresh of an already-populated key.
  Fetching { stale: Option<Populated<P>> },
  /// Last request succeeded.
  Populated(Populated<P>),
  /// Last request failed. `stale` holds the previous payload if one ever
  /// arrived for this key.
  Errored {
    reason: String,
    stale: Option<Populated<P>>,
  },
}

impl<P> Default for CacheEntry<P> {
  fn default() -> Self {
    CacheEntry::Idle
  }
}

impl<P> CacheEntry<P> {
  pub fn is_fetching(&self) -> bool {
    matches!(self, CacheEntry::Fetching { .. })
  }

  /// Whether a fetch is required to satisfy this entry.
  ///
  /// `Idle` and `Errored` are fetchable; `Errored` entries retry
  /// automatically on the next identical selection. `Fetching` is excluded
  /// to keep at most one request in flight per triple, `Populated` to avoid
  /// redundant refetches (validity is session-scoped, there is no TTL).
  pub fn needs_fetch(&self) -> bool {
    match self {
      CacheEntry::Idle | CacheEntry::Errored { .. } => true,
      CacheEntry::Fetching { .. } | CacheEntry::Populated(_) => false,
    }
  }

  /// Transition into `Fetching`, carrying the last good payload forward.
  pub fn begin_fetch(&mut self) {
    let stale = self.take_payload();
    *self = CacheEntry::Fetching { stale };
  }

  /// Transition into `Populated` with fresh data.
  pub fn resolve(&mut self, data: P) {
    *self = CacheEntry::Populated(Populated::new(data));
  }

  /// Transition into `Errored`, keeping the last good payload retrievable.
  pub fn fail(&mut self, reason: String) {
    let stale = self.take_payload();
    *self = CacheEntry::Errored { reason, stale };
  }

  /// The newest payload this entry has seen, fresh or stale.
  pub fn payload(&self) -> Option<&Populated<P>> {
    match self {
      CacheEntry::Populated(populated) => Some(populated),
      CacheEntry::Fetching { stale } | CacheEntry::Errored { stale, .. } => stale.as_ref(),
      CacheEntry::Idle => None,
    }
  }

  /// The failure reason, if the last request failed.
  pub fn error(&self) -> Option<&str> {
    match self {
      CacheEntry::Errored { reason, .. } => Some(reason),
      _ => None,
    }
  }

  fn take_payload(&mut self) -> Option<Populated<P>> {
    match std::mem::take(self) {
      CacheEntry::Populated(populated) => Some(populated),
      CacheEntry::Fetching { stale } | CacheEntry::Errored { stale, .. } => stale,
      CacheEntry::Idle => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn idle_and_errored_need_fetch() {
    let mut entry: CacheEntry<u32> = CacheEntry::Idle;
    assert!(entry.needs_fetch());

    entry.begin_fetch();
    assert!(!entry.needs_fetch());

    entry.fail("boom".to_string());
    assert!(entry.needs_fetch());
    assert_eq!(entry.error(), Some("boom"));
  }

  #[test]
  fn populated_does_not_need_fetch() {
    let mut entry: CacheEntry<u32> = CacheEntry::Idle;
    entry.begin_fetch();
    entry.resolve(7);
    assert!(!entry.needs_fetch());
    assert_eq!(entry.payload().map(|p| *p.data), Some(7));
  }

  #[test]
  fn failed_refresh_keeps_last_payload() {
    let mut entry: CacheEntry<u32> = CacheEntry::Idle;
    entry.begin_fetch();
    entry.resolve(7);

    entry.begin_fetch();
    // Payload still visible while the refresh is in flight
    assert_eq!(entry.payload().map(|p| *p.data), Some(7));

    entry.fail("server went away".to_string());
    assert!(entry.error().is_some());
    assert_eq!(entry.payload().map(|p| *p.data), Some(7));
  }

  #[test]
  fn successful_refresh_replaces_payload() {
    let mut entry: CacheEntry<u32> = CacheEntry::Idle;
    entry.begin_fetch();
    entry.resolve(7);
    entry.begin_fetch();
    entry.resolve(8);
    assert_eq!(entry.payload().map(|p| *p.data), Some(8));
  }
}
