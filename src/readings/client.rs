use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use url::Url;

use crate::cache::{BarKey, CompareKey, LineKey, ThreeDKey};
use crate::config::Config;

use super::api_types::{
  into_compare_map, into_series_map, ApiCompareResponse, ApiSeriesResponse, ApiThreeDResponse,
};
use super::types::{CompareUsage, EntityId, EntityKind, ReadingSeries, ThreeDMatrix};

/// Readings API client wrapper.
///
/// Each method issues one batched request covering every id it is given;
/// splitting ids into multiple round trips is the coordinator's job to avoid,
/// not this client's to perform.
#[derive(Clone)]
pub struct ReadingsClient {
  http: reqwest::Client,
  base: Url,
}

impl ReadingsClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Line readings for a batch of entities. Also serves the radar family.
  pub async fn line_readings(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &LineKey,
  ) -> Result<HashMap<EntityId, ReadingSeries>> {
    let url = self.endpoint("line", kind)?;
    let response: ApiSeriesResponse = self
      .http
      .get(url)
      .query(&[
        ("ids", join_ids(ids)),
        ("timeInterval", key.interval.canonical()),
        ("unitId", key.unit_id.to_string()),
      ])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| eyre!("Failed to fetch line readings: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse line readings: {}", e))?;

    Ok(into_series_map(response))
  }

  /// Bar readings for a batch of entities. Also serves the map family.
  pub async fn bar_readings(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &BarKey,
  ) -> Result<HashMap<EntityId, ReadingSeries>> {
    let url = self.endpoint("bar", kind)?;
    let response: ApiSeriesResponse = self
      .http
      .get(url)
      .query(&[
        ("ids", join_ids(ids)),
        ("timeInterval", key.interval.canonical()),
        ("barWidthSecs", key.bar_duration.as_secs().to_string()),
        ("unitId", key.unit_id.to_string()),
      ])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| eyre!("Failed to fetch bar readings: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse bar readings: {}", e))?;

    Ok(into_series_map(response))
  }

  /// Compare readings: usage totals for the current and shifted periods.
  pub async fn compare_readings(
    &self,
    kind: EntityKind,
    ids: &[EntityId],
    key: &CompareKey,
  ) -> Result<HashMap<EntityId, CompareUsage>> {
    let url = self.endpoint("compare", kind)?;
    let response: ApiCompareResponse = self
      .http
      .get(url)
      .query(&[
        ("ids", join_ids(ids)),
        ("timeInterval", key.interval.canonical()),
        ("shiftSecs", key.shift.as_secs().to_string()),
      ])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| eyre!("Failed to fetch compare readings: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse compare readings: {}", e))?;

    Ok(into_compare_map(response))
  }

  /// 3D readings for a single entity.
  pub async fn threed_readings(
    &self,
    kind: EntityKind,
    id: EntityId,
    key: &ThreeDKey,
  ) -> Result<ThreeDMatrix> {
    let url = self
      .base
      .join(&format!(
        "api/readings/threed/{}/{}",
        kind.path_segment(),
        id
      ))
      .map_err(|e| eyre!("Failed to build 3D readings URL: {}", e))?;

    let response: ApiThreeDResponse = self
      .http
      .get(url)
      .query(&[
        ("timeInterval", key.interval.canonical()),
        ("unitId", key.unit_id.to_string()),
        ("precisionSecs", key.precision.as_secs().to_string()),
      ])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| eyre!("Failed to fetch 3D readings for {} {}: {}", kind, id, e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse 3D readings for {} {}: {}", kind, id, e))?;

    Ok(response.into_matrix())
  }

  fn endpoint(&self, family: &str, kind: EntityKind) -> Result<Url> {
    self
      .base
      .join(&format!("api/readings/{}/{}", family, kind.path_segment()))
      .map_err(|e| eyre!("Failed to build {} readings URL: {}", family, e))
  }
}

fn join_ids(ids: &[EntityId]) -> String {
  ids
    .iter()
    .map(|id| id.to_string())
    .collect::<Vec<_>>()
    .join(",")
}
