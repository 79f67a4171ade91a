use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::FlushRetry;
use crate::store::SqliteStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// SQLite ledger file (defaults to the user data directory)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub log: LogConfig,
  #[serde(default)]
  pub flush: FlushConfig,
  /// Resource set the binary expects to find next to itself
  pub resources: Option<ResourcesConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter directive; RUST_LOG takes precedence
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Write daily-rotated log files here instead of stderr
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
  /// How often a failed flush is attempted before giving up
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// Wait before the second attempt; grows linearly with each retry
  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
}

impl FlushConfig {
  pub fn retry(&self) -> FlushRetry {
    FlushRetry::new(self.max_attempts).with_backoff(Duration::from_millis(self.backoff_ms))
  }
}

impl Default for FlushConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      backoff_ms: default_backoff_ms(),
    }
  }
}

fn default_max_attempts() -> u32 {
  3
}

fn default_backoff_ms() -> u64 {
  100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
  pub name: String,
  pub version: String,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./ledger-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/ledger-cache/config.yaml
  ///
  /// Without any file the defaults are used.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("ledger-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("ledger-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Resolve the ledger database path.
  ///
  /// Checks LEDGER_CACHE_DB first, then the config file, then the default
  /// location.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LEDGER_CACHE_DB") {
      return Ok(PathBuf::from(path));
    }
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => SqliteStore::default_path(),
    }
  }
}
