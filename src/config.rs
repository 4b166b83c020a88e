use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Tuning for the cache, retry, and background sync layers
  #[serde(default)]
  pub client: ClientSettings,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// Spreadsheet-backed script endpoint (callback reads, JSON text writes)
  #[default]
  Script,
  /// Postgres-backed REST API with bearer auth
  Relational,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  #[serde(default)]
  pub kind: BackendKind,
  pub url: String,
  /// Public API key for the relational backend (may also come from the environment)
  pub api_key: Option<String>,
}

impl BackendConfig {
  /// API key from the config file, else `UTILIDESK_API_KEY`.
  pub fn api_key(&self) -> Option<String> {
    self
      .api_key
      .clone()
      .or_else(|| std::env::var("UTILIDESK_API_KEY").ok())
      .filter(|k| !k.is_empty())
  }
}

/// Client-side limits and timings. Every field has a default.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
  pub request_timeout_secs: u64,
  pub retry_attempts: u32,
  pub retry_delay_ms: u64,
  pub cache_ttl_secs: u64,
  pub max_cache_entries: usize,
  pub background_interval_secs: u64,
  pub background_timeout_secs: u64,
  pub max_background_failures: u32,
  pub pause_duration_secs: u64,
  pub fallback_enabled: bool,
}

impl Default for ClientSettings {
  fn default() -> Self {
    Self {
      request_timeout_secs: 30,
      retry_attempts: 3,
      retry_delay_ms: 1000,
      cache_ttl_secs: 5 * 60,
      max_cache_entries: 100,
      background_interval_secs: 60,
      background_timeout_secs: 10,
      max_background_failures: 5,
      pause_duration_secs: 10 * 60,
      fallback_enabled: true,
    }
  }
}

impl ClientSettings {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms)
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache_ttl_secs)
  }

  pub fn background_interval(&self) -> Duration {
    Duration::from_secs(self.background_interval_secs)
  }

  pub fn background_timeout(&self) -> Duration {
    Duration::from_secs(self.background_timeout_secs)
  }

  pub fn pause_duration(&self) -> Duration {
    Duration::from_secs(self.pause_duration_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./utilidesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/utilidesk/config.yaml
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
        "No configuration file found. Create one at ~/.config/utilidesk/config.yaml\n\
                 with at least `backend: {{ kind: script, url: ... }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("utilidesk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("utilidesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    url::Url::parse(&config.backend.url)
      .map_err(|e| eyre!("Invalid backend url {:?}: {}", config.backend.url, e))?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("backend:\n  url: https://script.example.com/exec\n").unwrap();
    assert_eq!(config.backend.kind, BackendKind::Script);
    assert_eq!(config.client, ClientSettings::default());
    assert_eq!(config.client.cache_ttl(), Duration::from_secs(300));
    assert_eq!(config.client.pause_duration(), Duration::from_secs(600));
    assert!(config.client.fallback_enabled);
  }

  #[test]
  fn test_relational_with_overrides() {
    let yaml = r#"
backend:
  kind: relational
  url: https://db.example.com/rest/v1
  api_key: anon-key
client:
  retry_attempts: 5
  fallback_enabled: false
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.backend.kind, BackendKind::Relational);
    assert_eq!(config.backend.api_key().as_deref(), Some("anon-key"));
    assert_eq!(config.client.retry_attempts, 5);
    assert!(!config.client.fallback_enabled);
    assert_eq!(config.client.request_timeout_secs, 30);
  }

  #[test]
  fn test_rejects_bad_url() {
    assert!(Config::from_yaml("backend:\n  url: not a url\n").is_err());
  }

  #[test]
  fn test_rejects_unknown_kind() {
    assert!(Config::from_yaml("backend:\n  kind: firebase\n  url: https://x.example.com\n").is_err());
  }
}
