//! The user's effective selection and the keys it resolves to.
//!
//! A selection names which entities are displayed, the time window, the
//! graphing unit and the active chart family. Key derivation is per family:
//! changing a parameter that only matters to one family can never produce a
//! different key for another, so unrelated cache tables are never touched.

use std::collections::BTreeSet;

use crate::cache::{BarKey, CanonicalDuration, CompareKey, LineKey, ThreeDKey, TimeInterval};
use crate::readings::types::EntityId;

/// Chart family currently being displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
  Line,
  Bar,
  Compare,
  Map,
  Radar,
  ThreeD,
}

impl std::str::FromStr for ChartKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "line" => Ok(ChartKind::Line),
      "bar" => Ok(ChartKind::Bar),
      "compare" => Ok(ChartKind::Compare),
      "map" => Ok(ChartKind::Map),
      "radar" => Ok(ChartKind::Radar),
      "3d" | "threed" => Ok(ChartKind::ThreeD),
      other => Err(format!("unknown chart kind: {}", other)),
    }
  }
}

/// Everything the user has currently selected.
///
/// Id sets are ordered so the derived request batches are deterministic.
/// Family-specific parameters always carry a value; only the active family's
/// parameter participates in its key.
#[derive(Debug, Clone)]
pub struct Selection {
  pub meters: BTreeSet<EntityId>,
  pub groups: BTreeSet<EntityId>,
  pub interval: TimeInterval,
  pub unit_id: u32,
  pub chart: ChartKind,
  /// Bucket width for bar and map charts.
  pub bar_duration: CanonicalDuration,
  /// How far back the comparison period sits for compare charts.
  pub compare_shift: CanonicalDuration,
  /// Gap between readings for 3D charts.
  pub precision: CanonicalDuration,
}

impl Selection {
  pub fn new(interval: TimeInterval, unit_id: u32, chart: ChartKind) -> Self {
    Self {
      meters: BTreeSet::new(),
      groups: BTreeSet::new(),
      interval,
      unit_id,
      chart,
      bar_duration: CanonicalDuration::days(1),
      compare_shift: CanonicalDuration::weeks(1),
      precision: CanonicalDuration::hours(1),
    }
  }

  pub fn meter_ids(&self) -> Vec<EntityId> {
    self.meters.iter().copied().collect()
  }

  pub fn group_ids(&self) -> Vec<EntityId> {
    self.groups.iter().copied().collect()
  }

  pub fn line_key(&self) -> LineKey {
    LineKey {
      interval: self.interval,
      unit_id: self.unit_id,
    }
  }

  pub fn bar_key(&self) -> BarKey {
    BarKey {
      interval: self.interval,
      bar_duration: self.bar_duration,
      unit_id: self.unit_id,
    }
  }

  pub fn compare_key(&self) -> CompareKey {
    CompareKey {
      interval: self.interval,
      shift: self.compare_shift,
    }
  }

  pub fn threed_key(&self) -> ThreeDKey {
    ThreeDKey {
      interval: self.interval,
      unit_id: self.unit_id,
      precision: self.precision,
    }
  }
}
