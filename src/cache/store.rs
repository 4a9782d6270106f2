//! Normalized in-memory reading store.
//!
//! One `FamilyCache` per chart family maps entity kind -> entity id ->
//! cache key -> entry. The families are fully independent: map and radar
//! reuse the bar and line key shapes but keep their own tables, so a fetch
//! for one family never touches another's bookkeeping.
//!
//! The store itself is not synchronized; the fetch coordinator wraps it in a
//! mutex and performs every claim/merge step inside a single lock scope.

use std::collections::HashMap;
use std::hash::Hash;

use super::entry::{CacheEntry, Populated};
use super::key::{BarKey, CompareKey, LineKey, ThreeDKey};
use crate::readings::types::{CompareUsage, EntityId, EntityKind, ReadingSeries, ThreeDMatrix};

type EntryTable<K, P> = HashMap<EntityId, HashMap<K, CacheEntry<P>>>;

/// Cache table for one chart family, generic over the family's key and
/// payload types.
#[derive(Debug)]
pub struct FamilyCache<K, P> {
  meters: EntryTable<K, P>,
  groups: EntryTable<K, P>,
}

impl<K, P> Default for FamilyCache<K, P> {
  fn default() -> Self {
    Self {
      meters: HashMap::new(),
      groups: HashMap::new(),
    }
  }
}

impl<K: Clone + Eq + Hash, P> FamilyCache<K, P> {
  fn table(&self, kind: EntityKind) -> &EntryTable<K, P> {
    match kind {
      EntityKind::Meter => &self.meters,
      EntityKind::Group => &self.groups,
    }
  }

  fn table_mut(&mut self, kind: EntityKind) -> &mut EntryTable<K, P> {
    match kind {
      EntityKind::Meter => &mut self.meters,
      EntityKind::Group => &mut self.groups,
    }
  }

  fn entry(&self, kind: EntityKind, id: EntityId, key: &K) -> Option<&CacheEntry<P>> {
    self.table(kind).get(&id).and_then(|keys| keys.get(key))
  }

  /// Staleness oracle: does satisfying (kind, id, key) require a fetch?
  ///
  /// Pure read; safe to call from render paths. True when no entry exists
  /// or the entry is `Idle`/`Errored`, false while `Fetching` or once
  /// `Populated`.
  pub fn should_fetch(&self, kind: EntityKind, id: EntityId, key: &K) -> bool {
    self
      .entry(kind, id, key)
      .map(CacheEntry::needs_fetch)
      .unwrap_or(true)
  }

  /// Claim-or-skip: atomically check whether (kind, id, key) needs a fetch
  /// and, if so, mark it `Fetching`. Returns whether the caller won the
  /// claim. Check and mark happen in one call so two triggers racing on the
  /// same triple cannot both issue a request.
  pub fn claim(&mut self, kind: EntityKind, id: EntityId, key: K) -> bool {
    let entry = self
      .table_mut(kind)
      .entry(id)
      .or_default()
      .entry(key)
      .or_default();
    if !entry.needs_fetch() {
      return false;
    }
    entry.begin_fetch();
    true
  }

  /// Claim every id in `ids` that needs a fetch for `key`, returning the
  /// claimed subset in input order. The returned ids form the batch the
  /// coordinator sends as one request.
  pub fn claim_missing(&mut self, kind: EntityKind, ids: &[EntityId], key: &K) -> Vec<EntityId> {
    ids
      .iter()
      .copied()
      .filter(|&id| self.claim(kind, id, key.clone()))
      .collect()
  }

  /// Merge a batch response. Ids present in `results` transition to
  /// `Populated`; claimed ids absent from the response transition to
  /// `Errored` rather than staying stuck `Fetching`.
  ///
  /// Only entries still `Fetching` are touched: an entry that was cleared
  /// while the request was in flight no longer exists and must not be
  /// recreated from a response computed under the invalidated
  /// interpretation.
  pub fn resolve_batch(
    &mut self,
    kind: EntityKind,
    claimed: &[EntityId],
    key: &K,
    mut results: HashMap<EntityId, P>,
  ) {
    for &id in claimed {
      let entry = match self.in_flight_entry(kind, id, key) {
        Some(entry) => entry,
        None => continue,
      };
      match results.remove(&id) {
        Some(payload) => entry.resolve(payload),
        None => entry.fail("missing from server response".to_string()),
      }
    }
  }

  /// Mark every claimed id in the batch as failed with `reason`. Entries no
  /// longer `Fetching` are skipped, as in [`Self::resolve_batch`].
  pub fn fail_batch(&mut self, kind: EntityKind, claimed: &[EntityId], key: &K, reason: &str) {
    for &id in claimed {
      if let Some(entry) = self.in_flight_entry(kind, id, key) {
        entry.fail(reason.to_string());
      }
    }
  }

  fn in_flight_entry(
    &mut self,
    kind: EntityKind,
    id: EntityId,
    key: &K,
  ) -> Option<&mut CacheEntry<P>> {
    self
      .table_mut(kind)
      .get_mut(&id)
      .and_then(|keys| keys.get_mut(key))
      .filter(|entry| entry.is_fetching())
  }

  /// Whether a request is in flight for (kind, id, key).
  pub fn is_fetching(&self, kind: EntityKind, id: EntityId, key: &K) -> bool {
    self
      .entry(kind, id, key)
      .map(CacheEntry::is_fetching)
      .unwrap_or(false)
  }

  /// Whether any request is in flight anywhere in this family.
  pub fn any_fetching(&self) -> bool {
    let tables = [&self.meters, &self.groups];
    tables.iter().any(|table| {
      table
        .values()
        .any(|keys| keys.values().any(CacheEntry::is_fetching))
    })
  }

  /// The newest payload for (kind, id, key), fresh or stale.
  pub fn payload(&self, kind: EntityKind, id: EntityId, key: &K) -> Option<&Populated<P>> {
    self.entry(kind, id, key).and_then(CacheEntry::payload)
  }

  /// The failure reason for (kind, id, key), if the last fetch failed.
  pub fn error(&self, kind: EntityKind, id: EntityId, key: &K) -> Option<&str> {
    self.entry(kind, id, key).and_then(CacheEntry::error)
  }

  /// Drop every entry in this family.
  pub fn clear(&mut self) {
    self.meters.clear();
    self.groups.clear();
  }
}

/// The process-wide reading store: one independent sub-store per chart
/// family. Constructed once at startup and passed by reference (behind the
/// coordinator's mutex) to everything that reads or mutates it.
#[derive(Debug, Default)]
pub struct ReadingsStore {
  pub line: FamilyCache<LineKey, ReadingSeries>,
  pub bar: FamilyCache<BarKey, ReadingSeries>,
  pub compare: FamilyCache<CompareKey, CompareUsage>,
  pub map: FamilyCache<BarKey, ReadingSeries>,
  pub radar: FamilyCache<LineKey, ReadingSeries>,
  pub threed: FamilyCache<ThreeDKey, ThreeDMatrix>,
  generation: u64,
}

impl ReadingsStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Monotonic counter bumped by [`Self::clear_all`]. A completion claimed
  /// under an older generation belongs to an invalidated cache and must be
  /// discarded rather than merged.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Whether any family has a request in flight.
  pub fn any_fetching(&self) -> bool {
    self.line.any_fetching()
      || self.bar.any_fetching()
      || self.compare.any_fetching()
      || self.map.any_fetching()
      || self.radar.any_fetching()
      || self.threed.any_fetching()
  }

  /// Drop everything. Used when the server recomputes its unit-conversion
  /// matrix, which invalidates every cached reading interpretation at once.
  pub fn clear_all(&mut self) {
    self.line.clear();
    self.bar.clear();
    self.compare.clear();
    self.map.clear();
    self.radar.clear();
    self.threed.clear();
    self.generation += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::key::TimeInterval;
  use chrono::{TimeZone, Utc};

  fn key(unit_id: u32) -> LineKey {
    LineKey {
      interval: TimeInterval::bounded(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
      ),
      unit_id,
    }
  }

  fn series(value: f64) -> ReadingSeries {
    vec![crate::readings::types::RawReading {
      start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      end: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
      value,
    }]
  }

  #[test]
  fn claim_wins_once() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    assert!(cache.claim(EntityKind::Meter, 42, key(7)));
    // Second claim for the same untouched triple loses
    assert!(!cache.claim(EntityKind::Meter, 42, key(7)));
    assert!(cache.is_fetching(EntityKind::Meter, 42, &key(7)));
  }

  #[test]
  fn claims_are_independent_across_keys_kinds_and_ids() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    assert!(cache.claim(EntityKind::Meter, 42, key(7)));
    assert!(cache.claim(EntityKind::Meter, 42, key(8)));
    assert!(cache.claim(EntityKind::Meter, 43, key(7)));
    assert!(cache.claim(EntityKind::Group, 42, key(7)));
  }

  #[test]
  fn claim_missing_filters_satisfied_ids() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);

    let claimed = cache.claim_missing(EntityKind::Meter, &[1, 2, 3], &k);
    assert_eq!(claimed, vec![1, 2, 3]);
    cache.resolve_batch(
      EntityKind::Meter,
      &claimed,
      &k,
      HashMap::from([(1, series(1.0)), (2, series(2.0)), (3, series(3.0))]),
    );

    // Everything populated: nothing left to claim
    let claimed = cache.claim_missing(EntityKind::Meter, &[1, 2, 3, 4], &k);
    assert_eq!(claimed, vec![4]);
  }

  #[test]
  fn partial_response_errors_the_missing_ids() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);
    let claimed = cache.claim_missing(EntityKind::Meter, &[1, 2, 3], &k);

    cache.resolve_batch(
      EntityKind::Meter,
      &claimed,
      &k,
      HashMap::from([(1, series(1.0)), (3, series(3.0))]),
    );

    assert!(cache.payload(EntityKind::Meter, 1, &k).is_some());
    assert!(cache.payload(EntityKind::Meter, 3, &k).is_some());
    assert!(cache.payload(EntityKind::Meter, 2, &k).is_none());
    assert!(cache.error(EntityKind::Meter, 2, &k).is_some());
    assert!(!cache.is_fetching(EntityKind::Meter, 2, &k));
  }

  #[test]
  fn fail_batch_marks_every_claimed_id() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);
    let claimed = cache.claim_missing(EntityKind::Meter, &[1, 2], &k);
    cache.fail_batch(EntityKind::Meter, &claimed, &k, "connection refused");

    for id in [1, 2] {
      assert_eq!(
        cache.error(EntityKind::Meter, id, &k),
        Some("connection refused")
      );
      // Errored entries are fetchable again
      assert!(cache.should_fetch(EntityKind::Meter, id, &k));
    }
  }

  #[test]
  fn failed_refresh_keeps_prior_payload() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);

    let claimed = cache.claim_missing(EntityKind::Meter, &[1], &k);
    cache.resolve_batch(EntityKind::Meter, &claimed, &k, HashMap::from([(1, series(5.0))]));

    // Force a refresh of the populated entry, then fail it
    let entry = cache
      .table_mut(EntityKind::Meter)
      .get_mut(&1)
      .and_then(|keys| keys.get_mut(&k))
      .unwrap();
    entry.begin_fetch();
    cache.fail_batch(EntityKind::Meter, &[1], &k, "timeout");

    let payload = cache.payload(EntityKind::Meter, 1, &k).unwrap();
    assert_eq!(payload.data[0].value, 5.0);
    assert_eq!(cache.error(EntityKind::Meter, 1, &k), Some("timeout"));
  }

  #[test]
  fn payload_for_one_key_never_serves_another() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k7 = key(7);
    let k8 = key(8);

    let claimed = cache.claim_missing(EntityKind::Meter, &[1], &k7);
    cache.resolve_batch(EntityKind::Meter, &claimed, &k7, HashMap::from([(1, series(5.0))]));

    assert!(cache.payload(EntityKind::Meter, 1, &k8).is_none());
    assert!(cache.should_fetch(EntityKind::Meter, 1, &k8));
  }

  #[test]
  fn merge_after_clear_does_not_resurrect_entries() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);
    let claimed = cache.claim_missing(EntityKind::Meter, &[42], &k);

    // Invalidation lands while the request is in flight
    cache.clear();
    cache.resolve_batch(EntityKind::Meter, &claimed, &k, HashMap::from([(42, series(9.0))]));

    assert!(cache.payload(EntityKind::Meter, 42, &k).is_none());
    assert!(cache.should_fetch(EntityKind::Meter, 42, &k));

    // Same for the failure path
    let claimed = cache.claim_missing(EntityKind::Meter, &[42], &k);
    cache.clear();
    cache.fail_batch(EntityKind::Meter, &claimed, &k, "timeout");
    assert!(cache.error(EntityKind::Meter, 42, &k).is_none());
    assert!(cache.should_fetch(EntityKind::Meter, 42, &k));
  }

  #[test]
  fn merge_only_touches_in_flight_entries() {
    let mut cache: FamilyCache<LineKey, ReadingSeries> = FamilyCache::default();
    let k = key(7);
    let claimed = cache.claim_missing(EntityKind::Meter, &[1], &k);
    cache.resolve_batch(EntityKind::Meter, &claimed, &k, HashMap::from([(1, series(5.0))]));

    // A merge for an entry that is no longer Fetching is dropped
    cache.resolve_batch(EntityKind::Meter, &[1], &k, HashMap::from([(1, series(9.0))]));
    let payload = cache.payload(EntityKind::Meter, 1, &k).unwrap();
    assert_eq!(payload.data[0].value, 5.0);

    cache.fail_batch(EntityKind::Meter, &[1], &k, "late failure");
    assert!(cache.error(EntityKind::Meter, 1, &k).is_none());
  }

  #[test]
  fn clear_all_bumps_the_generation() {
    let mut store = ReadingsStore::new();
    let before = store.generation();
    store.clear_all();
    assert_eq!(store.generation(), before + 1);
  }

  #[test]
  fn any_fetching_reflects_in_flight_entries() {
    let mut store = ReadingsStore::new();
    assert!(!store.any_fetching());

    store.bar.claim(
      EntityKind::Group,
      9,
      BarKey {
        interval: TimeInterval::Unbounded,
        bar_duration: crate::cache::key::CanonicalDuration::days(1),
        unit_id: 2,
      },
    );
    assert!(store.any_fetching());

    store.clear_all();
    assert!(!store.any_fetching());
  }

  #[test]
  fn clear_all_resets_every_family() {
    let mut store = ReadingsStore::new();
    let k = key(7);
    let claimed = store.line.claim_missing(EntityKind::Meter, &[1], &k);
    store
      .line
      .resolve_batch(EntityKind::Meter, &claimed, &k, HashMap::from([(1, series(1.0))]));

    store.clear_all();
    assert!(store.line.payload(EntityKind::Meter, 1, &k).is_none());
    assert!(store.line.should_fetch(EntityKind::Meter, 1, &k));
  }
}
