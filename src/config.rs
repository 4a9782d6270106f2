use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  /// Graphing unit to use when none is given on the command line
  pub default_unit: Option<u32>,
  #[serde(default)]
  pub charts: ChartsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the dashboard server, e.g. "https://energy.example.edu/"
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartsConfig {
  /// Default bar/map bucket width in days
  #[serde(default = "default_bar_days")]
  pub bar_duration_days: i64,
  /// Default compare shift in days
  #[serde(default = "default_shift_days")]
  pub compare_shift_days: i64,
  /// Default 3D reading gap in hours
  #[serde(default = "default_precision_hours")]
  pub precision_hours: i64,
}

fn default_bar_days() -> i64 {
  1
}

fn default_shift_days() -> i64 {
  7
}

fn default_precision_hours() -> i64 {
  1
}

impl Default for ChartsConfig {
  fn default() -> Self {
    Self {
      bar_duration_days: default_bar_days(),
      compare_shift_days: default_shift_days(),
      precision_hours: default_precision_hours(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wattline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wattline/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/wattline/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("wattline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wattline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}
