mod cache;
mod config;
mod readings;
mod selection;

use chrono::{DateTime, Utc};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use cache::{CanonicalDuration, TimeInterval};
use readings::types::{EntityId, EntityKind};
use readings::CachedReadingsClient;
use selection::{ChartKind, Selection};

#[derive(Parser, Debug)]
#[command(name = "wattline")]
#[command(about = "Fetch and cache energy-usage readings from a dashboard server")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wattline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Chart family: line, bar, compare, map, radar, 3d
  #[arg(long, default_value = "line")]
  chart: ChartKind,

  /// Meter ids to fetch, comma separated
  #[arg(long, value_delimiter = ',')]
  meters: Vec<EntityId>,

  /// Group ids to fetch, comma separated
  #[arg(long, value_delimiter = ',')]
  groups: Vec<EntityId>,

  /// Graphing unit id (falls back to default_unit from config)
  #[arg(long)]
  unit: Option<u32>,

  /// Window start, RFC 3339 (omit both bounds for all data)
  #[arg(long)]
  start: Option<DateTime<Utc>>,

  /// Window end, RFC 3339
  #[arg(long)]
  end: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let interval = match (args.start, args.end) {
    (Some(start), Some(end)) => TimeInterval::bounded(start, end),
    (None, None) => TimeInterval::Unbounded,
    _ => return Err(eyre!("--start and --end must be given together")),
  };

  let unit_id = args
    .unit
    .or(config.default_unit)
    .ok_or_else(|| eyre!("No unit selected: pass --unit or set default_unit in the config"))?;

  let mut selection = Selection::new(interval, unit_id, args.chart);
  selection.meters.extend(args.meters);
  selection.groups.extend(args.groups);
  selection.bar_duration = CanonicalDuration::days(config.charts.bar_duration_days);
  selection.compare_shift = CanonicalDuration::days(config.charts.compare_shift_days);
  selection.precision = CanonicalDuration::hours(config.charts.precision_hours);

  let client = CachedReadingsClient::new(&config)?;
  client.apply_selection(&selection).await;

  print_summary(&client, &selection);

  Ok(())
}

/// Print one line per selected entity: ready, failed, or still loading.
fn print_summary(client: &CachedReadingsClient, selection: &Selection) {
  let entities: Vec<(EntityKind, EntityId)> = selection
    .meter_ids()
    .into_iter()
    .map(|id| (EntityKind::Meter, id))
    .chain(
      selection
        .group_ids()
        .into_iter()
        .map(|id| (EntityKind::Group, id)),
    )
    .collect();

  client.read(|store| {
    for (kind, id) in entities {
      let status = match selection.chart {
        ChartKind::Line => describe_series(
          store.line.payload(kind, id, &selection.line_key()).map(|p| p.data.len()),
          store.line.error(kind, id, &selection.line_key()),
        ),
        ChartKind::Bar => describe_series(
          store.bar.payload(kind, id, &selection.bar_key()).map(|p| p.data.len()),
          store.bar.error(kind, id, &selection.bar_key()),
        ),
        ChartKind::Map => describe_series(
          store.map.payload(kind, id, &selection.bar_key()).map(|p| p.data.len()),
          store.map.error(kind, id, &selection.bar_key()),
        ),
        ChartKind::Radar => describe_series(
          store.radar.payload(kind, id, &selection.line_key()).map(|p| p.data.len()),
          store.radar.error(kind, id, &selection.line_key()),
        ),
        ChartKind::Compare => {
          let key = selection.compare_key();
          match (store.compare.payload(kind, id, &key), store.compare.error(kind, id, &key)) {
            (Some(p), _) => format!(
              "curr {:.2} / prev {:.2}",
              p.data.curr_usage, p.data.prev_usage
            ),
            (None, Some(reason)) => format!("failed: {}", reason),
            (None, None) => "loading".to_string(),
          }
        }
        ChartKind::ThreeD => {
          let key = selection.threed_key();
          match (store.threed.payload(kind, id, &key), store.threed.error(kind, id, &key)) {
            (Some(p), _) => format!(
              "{} x {} matrix",
              p.data.y_labels.len(),
              p.data.x_labels.len()
            ),
            (None, Some(reason)) => format!("failed: {}", reason),
            (None, None) => "loading".to_string(),
          }
        }
      };
      println!("{} {}: {}", kind, id, status);
    }
  });
}

fn describe_series(len: Option<usize>, error: Option<&str>) -> String {
  match (len, error) {
    (Some(len), _) => format!("{} readings", len),
    (None, Some(reason)) => format!("failed: {}", reason),
    (None, None) => "loading".to_string(),
  }
}
