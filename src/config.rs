use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the REST collection service.
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// HTTP request timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Default freshness window in milliseconds.
  #[serde(default = "default_stale_time_ms")]
  pub stale_time_ms: i64,
  /// Default eviction window for unsubscribed entries, in milliseconds.
  #[serde(default = "default_cache_time_ms")]
  pub cache_time_ms: i64,
}

fn default_base_url() -> String {
  "https://jsonplaceholder.typicode.com".to_string()
}

fn default_timeout_ms() -> u64 {
  20_000
}

fn default_user_agent() -> String {
  format!("requery/{}", env!("CARGO_PKG_VERSION"))
}

fn default_stale_time_ms() -> i64 {
  60_000
}

fn default_cache_time_ms() -> i64 {
  300_000
}

impl Default for ApiConfig {
  fn default() -> Self {
    ApiConfig {
      base_url: default_base_url(),
      timeout_ms: default_timeout_ms(),
      user_agent: default_user_agent(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    CacheConfig {
      stale_time_ms: default_stale_time_ms(),
      cache_time_ms: default_cache_time_ms(),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::milliseconds(self.stale_time_ms)
  }

  pub fn cache_time(&self) -> Duration {
    Duration::milliseconds(self.cache_time_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./requery.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/requery/config.yaml
  /// 4. ~/.config/requery/config.yaml
  ///
  /// When no file exists, the built-in defaults are used. The
  /// `REQUERY_BASE_URL` environment variable overrides the configured
  /// endpoint either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, Error> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(base_url) = std::env::var("REQUERY_BASE_URL") {
      config.api.base_url = base_url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("requery.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("requery").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, Error> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
      Error::config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })
  }
}
