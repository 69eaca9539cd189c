use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub provider: ProviderConfig,
  /// Resolver tick interval in seconds (default 1)
  pub tick_rate_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
  /// Base URL of the prayer-time-table provider
  #[serde(default = "default_provider_url")]
  pub url: String,
  /// Location slug the provider understands (e.g. "london" or "mecca")
  pub location: String,
}

fn default_provider_url() -> String {
  "https://muslimsalat.com/".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mihrab.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mihrab/config.yaml
  /// 4. ~/.config/mihrab/config.yaml
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
        "No configuration file found. Create one at ~/.config/mihrab/config.yaml\n\
                 with at least a provider.location entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mihrab.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mihrab").join("config.yaml");
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

  /// Optional provider API key from the environment.
  ///
  /// Checks MIHRAB_API_KEY; most providers serve day queries without one.
  pub fn get_api_key() -> Option<String> {
    std::env::var("MIHRAB_API_KEY").ok()
  }

  /// Resolver tick interval.
  pub fn tick_rate(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.tick_rate_secs.unwrap_or(1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str(
      "provider:\n  location: london\n",
    )
    .unwrap();

    assert_eq!(config.provider.location, "london");
    assert_eq!(config.provider.url, "https://muslimsalat.com/");
    assert_eq!(config.tick_rate(), std::time::Duration::from_secs(1));
  }

  #[test]
  fn test_parse_full_config() {
    let config: Config = serde_yaml::from_str(
      "provider:\n  url: https://times.example/\n  location: mecca\ntick_rate_secs: 5\n",
    )
    .unwrap();

    assert_eq!(config.provider.url, "https://times.example/");
    assert_eq!(config.tick_rate(), std::time::Duration::from_secs(5));
  }
}
