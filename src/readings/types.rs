use chrono::{DateTime, Utc};

/// Identifier for a meter or group as assigned by the server.
pub type EntityId = u32;

/// The two kinds of selectable entities. Meters and groups are fetched via
/// different endpoints and never share cache tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Meter,
  Group,
}

impl EntityKind {
  /// Path segment used by the readings endpoints.
  pub fn path_segment(self) -> &'static str {
    match self {
      EntityKind::Meter => "meters",
      EntityKind::Group => "groups",
    }
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EntityKind::Meter => write!(f, "meter"),
      EntityKind::Group => write!(f, "group"),
    }
  }
}

/// One aggregated reading covering a half-open time span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
  pub value: f64,
}

/// Ordered series of readings for one entity, as consumed by the line, bar,
/// map and radar chart families.
pub type ReadingSeries = Vec<RawReading>;

/// Usage totals for the current and shifted-back periods of a compare chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareUsage {
  pub curr_usage: f64,
  pub prev_usage: f64,
}

/// Dense matrix of readings for the 3D chart: one row per y label (day), one
/// column per x label (time of day). Holes in the meter data come through as
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreeDMatrix {
  pub x_labels: Vec<String>,
  pub y_labels: Vec<String>,
  pub values: Vec<Vec<Option<f64>>>,
}
