//! Serde-deserializable types matching the readings API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs. The server speaks
//! camelCase and epoch-millisecond timestamps; conversions normalize both.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use super::types::{CompareUsage, RawReading, ReadingSeries, ThreeDMatrix};

/// One reading as the server sends it.
#[derive(Debug, Deserialize)]
pub struct ApiReading {
  pub reading: f64,
  #[serde(rename = "startTimestamp")]
  pub start_timestamp: i64,
  #[serde(rename = "endTimestamp")]
  pub end_timestamp: i64,
}

impl ApiReading {
  pub fn into_reading(self) -> RawReading {
    RawReading {
      start: millis_to_utc(self.start_timestamp),
      end: millis_to_utc(self.end_timestamp),
      value: self.reading,
    }
  }
}

/// Line/bar/map/radar response: entity id -> ordered reading sequence.
/// Keys arrive as JSON strings; non-numeric keys are dropped.
pub type ApiSeriesResponse = HashMap<String, Vec<ApiReading>>;

pub fn into_series_map(response: ApiSeriesResponse) -> HashMap<u32, ReadingSeries> {
  response
    .into_iter()
    .filter_map(|(id, readings)| {
      let id: u32 = id.parse().ok()?;
      Some((id, readings.into_iter().map(ApiReading::into_reading).collect()))
    })
    .collect()
}

/// Compare response: entity id -> usage totals for the two periods.
#[derive(Debug, Deserialize)]
pub struct ApiCompareUsage {
  #[serde(rename = "currUsage")]
  pub curr_usage: f64,
  #[serde(rename = "prevUsage")]
  pub prev_usage: f64,
}

pub type ApiCompareResponse = HashMap<String, ApiCompareUsage>;

pub fn into_compare_map(response: ApiCompareResponse) -> HashMap<u32, CompareUsage> {
  response
    .into_iter()
    .filter_map(|(id, usage)| {
      let id: u32 = id.parse().ok()?;
      Some((
        id,
        CompareUsage {
          curr_usage: usage.curr_usage,
          prev_usage: usage.prev_usage,
        },
      ))
    })
    .collect()
}

/// 3D response for a single entity.
#[derive(Debug, Deserialize)]
pub struct ApiThreeDResponse {
  #[serde(rename = "xData", default)]
  pub x_data: Vec<String>,
  #[serde(rename = "yData", default)]
  pub y_data: Vec<String>,
  #[serde(rename = "zData", default)]
  pub z_data: Vec<Vec<Option<f64>>>,
}

impl ApiThreeDResponse {
  pub fn into_matrix(self) -> ThreeDMatrix {
    ThreeDMatrix {
      x_labels: self.x_data,
      y_labels: self.y_data,
      values: self.z_data,
    }
  }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
  // Out-of-range timestamps clamp to the epoch rather than panicking
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
