//! Cached readings client: the fetch coordinator.
//!
//! Wraps the network client and the shared store. Every fetch runs the same
//! shape: claim the missing ids under one lock acquisition, issue a single
//! batched request for exactly that subset, then merge the completion back
//! keyed strictly by (entity kind, ids, key). A claim that comes back empty
//! means every id is already in flight or populated and no request is made.
//!
//! Failures never escape this layer; they become `Errored` entry state and a
//! tracing event. Meters and groups fan out as independent concurrent calls,
//! so one kind's transport failure cannot disturb the other's merge.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, warn};

use crate::cache::{FamilyCache, ReadingKey, ReadingsStore};
use crate::config::Config;
use crate::selection::{ChartKind, Selection};

use super::client::ReadingsClient;
use super::types::{EntityId, EntityKind};

/// Readings client with a transparent multi-dimensional cache.
#[derive(Clone)]
pub struct CachedReadingsClient {
  inner: ReadingsClient,
  store: Arc<Mutex<ReadingsStore>>,
}

impl CachedReadingsClient {
  pub fn new(config: &Config) -> Result<Self> {
    let inner = ReadingsClient::new(config)?;
    Ok(Self {
      inner,
      store: Arc::new(Mutex::new(ReadingsStore::new())),
    })
  }

  /// Read-only access to the store for readiness projections.
  pub fn read<R>(&self, f: impl FnOnce(&ReadingsStore) -> R) -> R {
    f(&self.store.lock())
  }

  /// Drop every cached entry. Called when the server recomputes its
  /// unit-conversion matrix and all cached interpretations become invalid.
  pub fn invalidate_all(&self) {
    self.store.lock().clear_all();
    debug!("reading cache cleared");
  }

  /// Fetch whatever the selection needs for its active chart family.
  ///
  /// Only the active family's key is derived and only entity kinds with at
  /// least one selected id are dispatched, so entries of other families and
  /// deselected entities are never re-triggered.
  pub async fn apply_selection(&self, selection: &Selection) {
    let meters = selection.meter_ids();
    let groups = selection.group_ids();

    match selection.chart {
      ChartKind::Line => {
        let key = selection.line_key();
        tokio::join!(
          self.fetch_line_if_needed(EntityKind::Meter, &meters, &key),
          self.fetch_line_if_needed(EntityKind::Group, &groups, &key),
        );
      }
      ChartKind::Bar => {
        let key = selection.bar_key();
        tokio::join!(
          self.fetch_bar_if_needed(EntityKind::Meter, &meters, &key),
          self.fetch_bar_if_needed(EntityKind::Group, &groups, &key),
        );
      }
      ChartKind::Compare => {
        let key = selection.compare_key();
        tokio::join!(
          self.fetch_compare_if_needed(EntityKind::Meter, &meters, &key),
          self.fetch_compare_if_needed(EntityKind::Group, &groups, &key),
        );
      }
      ChartKind::Map => {
        let key = selection.bar_key();
        tokio::join!(
          self.fetch_map_if_needed(EntityKind::Meter, &meters, &key),
          self.fetch_map_if_needed(EntityKind::Group, &groups, &key),
        );
      }
      ChartKind::Radar => {
        let key = selection.line_key();
        tokio::join!(
          self.fetch_radar_if_needed(EntityKind::Meter, &meters, &key),
          self.fetch_radar_if_needed(EntityKind::Group, &groups, &key),
        );
      }
      ChartKind::ThreeD => {
        // The 3D endpoint takes one entity per request
        let key = selection.threed_key();
        let meter_fetches = meters
          .iter()
          .map(|&id| self.fetch_threed_if_needed(EntityKind::Meter, id, &key));
        let group_fetches = groups
          .iter()
          .map(|&id| self.fetch_threed_if_needed(EntityKind::Group, id, &key));
        tokio::join!(
          futures::future::join_all(meter_fetches),
          futures::future::join_all(group_fetches),
        );
      }
    }
  }

  pub async fn fetch_line_if_needed(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &crate::cache::LineKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      ids,
      key,
      |store: &mut ReadingsStore| &mut store.line,
      |batch| async move { inner.line_readings(kind, &batch, key).await },
    )
    .await;
  }

  pub async fn fetch_bar_if_needed(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &crate::cache::BarKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      ids,
      key,
      |store: &mut ReadingsStore| &mut store.bar,
      |batch| async move { inner.bar_readings(kind, &batch, key).await },
    )
    .await;
  }

  pub async fn fetch_compare_if_needed(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &crate::cache::CompareKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      ids,
      key,
      |store: &mut ReadingsStore| &mut store.compare,
      |batch| async move { inner.compare_readings(kind, &batch, key).await },
    )
    .await;
  }

  /// Map charts consume bar-shaped readings but keep their own cache table.
  pub async fn fetch_map_if_needed(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &crate::cache::BarKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      ids,
      key,
      |store: &mut ReadingsStore| &mut store.map,
      |batch| async move { inner.bar_readings(kind, &batch, key).await },
    )
    .await;
  }

  /// Radar charts consume line-shaped readings but keep their own cache table.
  pub async fn fetch_radar_if_needed(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &crate::cache::LineKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      ids,
      key,
      |store: &mut ReadingsStore| &mut store.radar,
      |batch| async move { inner.line_readings(kind, &batch, key).await },
    )
    .await;
  }

  pub async fn fetch_threed_if_needed(
    &self,
    kind: EntityKind,
    id: EntityId,
    key: &crate::cache::ThreeDKey,
  ) {
    let inner = self.inner.clone();
    fetch_family(
      &self.store,
      kind,
      &[id],
      key,
      |store: &mut ReadingsStore| &mut store.threed,
      |batch| async move {
        // Batch is a single id by construction
        let matrix = inner.threed_readings(kind, batch[0], key).await?;
        Ok(HashMap::from([(batch[0], matrix)]))
      },
    )
    .await;
  }
}

/// One fetch round for one (family, entity kind, key).
///
/// The claim happens in a single lock scope, so concurrent rounds for the
/// same triple cannot both observe a fetchable entry. The lock is released
/// across the network await and reacquired for the merge, which is keyed by
/// the claimed (kind, ids, key) rather than by arrival order. A completion
/// claimed before a `clear_all` is discarded wholesale: the store generation
/// no longer matches and the response reflects an invalidated unit
/// interpretation.
async fn fetch_family<K, P, Sel, F, Fut>(
  store: &Mutex<ReadingsStore>,
  kind: EntityKind,
  ids: &[EntityId],
  key: &K,
  select: Sel,
  fetch: F,
) where
  K: ReadingKey,
  Sel: Fn(&mut ReadingsStore) -> &mut FamilyCache<K, P>,
  F: FnOnce(Vec<EntityId>) -> Fut,
  Fut: Future<Output = Result<HashMap<EntityId, P>>>,
{
  if ids.is_empty() {
    return;
  }

  let (claimed, generation) = {
    let mut guard = store.lock();
    let generation = guard.generation();
    (select(&mut guard).claim_missing(kind, ids, key), generation)
  };

  if claimed.is_empty() {
    debug!(%kind, key = %key.description(), "all requested entries satisfied or in flight");
    return;
  }

  debug!(
    %kind,
    ids = ?claimed,
    key = %key.cache_hash(),
    "fetching {}",
    key.description()
  );

  let outcome = fetch(claimed.clone()).await;

  let mut guard = store.lock();
  if guard.generation() != generation {
    // The cache was invalidated while the request was in flight; the
    // response was computed under the old interpretation and must not be
    // merged. Any re-claimed entries belong to a newer round.
    debug!(%kind, key = %key.cache_hash(), "discarding completion for invalidated cache");
    return;
  }

  match outcome {
    Ok(results) => {
      let received = results.len();
      select(&mut guard).resolve_batch(kind, &claimed, key, results);
      if received < claimed.len() {
        warn!(
          %kind,
          requested = claimed.len(),
          received,
          "response omitted some requested entities"
        );
      }
    }
    Err(e) => {
      warn!(%kind, error = %e, "readings fetch failed");
      select(&mut guard).fail_batch(kind, &claimed, key, &e.to_string());
    }
  }
}
