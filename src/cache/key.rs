//! Canonical cache keys for each chart family.
//!
//! A key captures every non-entity parameter of a read request. Two logically
//! identical requests must produce identical keys, so all inputs are
//! canonicalized at construction time: durations collapse to whole seconds
//! ("7 days" and "1 week" are the same key), and an unbounded interval is a
//! distinct variant rather than a sentinel pair of timestamps.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::hash::Hash;

/// The time window of a read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeInterval {
  /// Everything the server has for the entity.
  Unbounded,
  /// A half-open `[start, end)` window.
  Bounded {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  },
}

impl TimeInterval {
  pub fn bounded(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    TimeInterval::Bounded { start, end }
  }

  /// Canonical form used in key hashes and request query strings.
  pub fn canonical(&self) -> String {
    match self {
      TimeInterval::Unbounded => "all".to_string(),
      TimeInterval::Bounded { start, end } => {
        format!("{}_{}", start.to_rfc3339(), end.to_rfc3339())
      }
    }
  }
}

/// A duration canonicalized to whole seconds, so equivalent spellings
/// ("7 days", "1 week", "168 hours") compare and hash identically.
///
/// Granularity is one second: the server aggregates readings at second
/// resolution, so sub-second components carry no meaning here and are
/// truncated toward zero on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalDuration {
  secs: i64,
}

impl CanonicalDuration {
  /// Truncates toward zero to whole seconds.
  pub fn from_duration(duration: chrono::Duration) -> Self {
    Self {
      secs: duration.num_seconds(),
    }
  }

  pub fn days(days: i64) -> Self {
    Self::from_duration(chrono::Duration::days(days))
  }

  pub fn hours(hours: i64) -> Self {
    Self::from_duration(chrono::Duration::hours(hours))
  }

  pub fn weeks(weeks: i64) -> Self {
    Self::from_duration(chrono::Duration::weeks(weeks))
  }

  pub fn as_secs(&self) -> i64 {
    self.secs
  }
}

/// Common surface of the per-family key types.
///
/// Keys are used directly as `HashMap` keys (structurally, collision-free by
/// construction); `cache_hash` gives a stable fixed-length identity for logs
/// and `description` a human-readable one.
pub trait ReadingKey: Clone + Eq + Hash {
  /// Canonical string the hash is computed over. Field order is fixed.
  fn canonical(&self) -> String;

  /// Human-readable form for trace logs.
  fn description(&self) -> String;

  /// SHA256 of the canonical form, hex encoded.
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Key for line-chart readings; the radar family uses the same shape in its
/// own sub-store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineKey {
  pub interval: TimeInterval,
  pub unit_id: u32,
}

impl ReadingKey for LineKey {
  fn canonical(&self) -> String {
    format!("line:{}:{}", self.interval.canonical(), self.unit_id)
  }

  fn description(&self) -> String {
    format!("line readings {} unit {}", self.interval.canonical(), self.unit_id)
  }
}

/// Key for bar-chart readings; the map family uses the same shape in its own
/// sub-store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarKey {
  pub interval: TimeInterval,
  pub bar_duration: CanonicalDuration,
  pub unit_id: u32,
}

impl ReadingKey for BarKey {
  fn canonical(&self) -> String {
    format!(
      "bar:{}:{}:{}",
      self.interval.canonical(),
      self.bar_duration.as_secs(),
      self.unit_id
    )
  }

  fn description(&self) -> String {
    format!(
      "bar readings {} bucket {}s unit {}",
      self.interval.canonical(),
      self.bar_duration.as_secs(),
      self.unit_id
    )
  }
}

/// Key for compare-chart readings. The compare endpoint is defined by
/// interval and shift only, so the key carries exactly those fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompareKey {
  pub interval: TimeInterval,
  pub shift: CanonicalDuration,
}

impl ReadingKey for CompareKey {
  fn canonical(&self) -> String {
    format!("compare:{}:{}", self.interval.canonical(), self.shift.as_secs())
  }

  fn description(&self) -> String {
    format!(
      "compare readings {} shift {}s",
      self.interval.canonical(),
      self.shift.as_secs()
    )
  }
}

/// Key for 3D-chart readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreeDKey {
  pub interval: TimeInterval,
  pub unit_id: u32,
  /// Gap between readings along the x axis.
  pub precision: CanonicalDuration,
}

impl ReadingKey for ThreeDKey {
  fn canonical(&self) -> String {
    format!(
      "threed:{}:{}:{}",
      self.interval.canonical(),
      self.unit_id,
      self.precision.as_secs()
    )
  }

  fn description(&self) -> String {
    format!(
      "3d readings {} unit {} precision {}s",
      self.interval.canonical(),
      self.unit_id,
      self.precision.as_secs()
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn jan() -> TimeInterval {
    TimeInterval::bounded(
      Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
    )
  }

  #[test]
  fn equal_params_produce_equal_keys() {
    let a = LineKey { interval: jan(), unit_id: 7 };
    let b = LineKey { interval: jan(), unit_id: 7 };
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn distinct_params_produce_distinct_keys() {
    let a = LineKey { interval: jan(), unit_id: 7 };
    let b = LineKey { interval: jan(), unit_id: 8 };
    let c = LineKey {
      interval: TimeInterval::Unbounded,
      unit_id: 7,
    };
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(a.cache_hash(), b.cache_hash());
    assert_ne!(a.cache_hash(), c.cache_hash());
  }

  #[test]
  fn unbounded_differs_from_covering_bounded() {
    // A bounded window that happens to span all known data is still a
    // different request from "everything".
    let covering = TimeInterval::bounded(
      Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
      Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
    );
    let a = LineKey { interval: covering, unit_id: 1 };
    let b = LineKey {
      interval: TimeInterval::Unbounded,
      unit_id: 1,
    };
    assert_ne!(a, b);
    assert_ne!(a.canonical(), b.canonical());
  }

  #[test]
  fn equivalent_durations_canonicalize() {
    assert_eq!(CanonicalDuration::days(7), CanonicalDuration::weeks(1));
    assert_eq!(CanonicalDuration::hours(168), CanonicalDuration::weeks(1));

    let a = BarKey {
      interval: jan(),
      bar_duration: CanonicalDuration::days(7),
      unit_id: 3,
    };
    let b = BarKey {
      interval: jan(),
      bar_duration: CanonicalDuration::weeks(1),
      unit_id: 3,
    };
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn sub_second_components_truncate_to_whole_seconds() {
    assert_eq!(
      CanonicalDuration::from_duration(chrono::Duration::milliseconds(1500)),
      CanonicalDuration::from_duration(chrono::Duration::seconds(1)),
    );
    assert_eq!(
      CanonicalDuration::from_duration(chrono::Duration::milliseconds(999)).as_secs(),
      0
    );
  }

  #[test]
  fn families_never_share_canonical_forms() {
    let line = LineKey { interval: jan(), unit_id: 7 };
    let bar = BarKey {
      interval: jan(),
      bar_duration: CanonicalDuration::days(1),
      unit_id: 7,
    };
    let compare = CompareKey {
      interval: jan(),
      shift: CanonicalDuration::weeks(1),
    };
    let threed = ThreeDKey {
      interval: jan(),
      unit_id: 7,
      precision: CanonicalDuration::hours(1),
    };
    let forms = [
      line.canonical(),
      bar.canonical(),
      compare.canonical(),
      threed.canonical(),
    ];
    for (i, a) in forms.iter().enumerate() {
      for b in forms.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
  }
}
