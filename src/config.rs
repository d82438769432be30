//! `[AMBIENT]` on-disk configuration: where the vault file lives and which
//! remotes to sync with, persisted as JSON beside it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::VaultError;

/// A configured sync remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
  pub name: String,
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub user: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
  pub vault_path: PathBuf,
  /// Optional cutoff for read-only history mode (§4.5): when set, open
  /// truncates the log to transactions at or before this many nanoseconds
  /// since the Unix epoch.
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub history_limit: Option<i64>,
  #[serde(default)]
  pub remotes: Vec<RemoteConfig>,
}

impl Config {
  pub fn new(vault_path: impl Into<PathBuf>) -> Config {
    Config { vault_path: vault_path.into(), history_limit: None, remotes: Vec::new() }
  }

  pub fn load(path: &Path) -> Result<Config, VaultError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  pub fn save(&self, path: &Path) -> Result<(), VaultError> {
    let bytes = serde_json::to_vec_pretty(self)?;
    fs::write(path, bytes)?;
    Ok(())
  }

  pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
    self.remotes.iter().find(|r| r.name == name)
  }

  pub fn add_remote(&mut self, remote: RemoteConfig) {
    self.remotes.retain(|r| r.name != remote.name);
    self.remotes.push(remote);
  }

  pub fn remove_remote(&mut self, name: &str) {
    self.remotes.retain(|r| r.name != name);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::new(dir.path().join("vault.blob"));
    config.add_remote(RemoteConfig { name: "laptop".into(), url: "file:///tmp/other.blob".into(), user: None });
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);
  }

  #[test]
  fn add_remote_replaces_same_name() {
    let mut config = Config::new("/tmp/vault.blob");
    config.add_remote(RemoteConfig { name: "laptop".into(), url: "file:///a".into(), user: None });
    config.add_remote(RemoteConfig { name: "laptop".into(), url: "file:///b".into(), user: None });
    assert_eq!(config.remotes.len(), 1);
    assert_eq!(config.remote("laptop").unwrap().url, "file:///b");
  }
}
