//! Configuration loading and management
//!
//! Handles parsing of `.taskboard.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Layout configuration
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Hour-snapshot configuration
    #[serde(default)]
    pub hours: HoursConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            hours: HoursConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Layout-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Fixed node width in pixels (cards are uniformly wide)
    #[serde(default = "default_node_width")]
    pub node_width: f64,

    /// Minimum vertical separation between nodes in a rank
    #[serde(default = "default_node_sep")]
    pub node_sep: f64,

    /// Horizontal separation between ranks
    #[serde(default = "default_rank_sep")]
    pub rank_sep: f64,
}

fn default_node_width() -> f64 {
    600.0
}

fn default_node_sep() -> f64 {
    5.0
}

fn default_rank_sep() -> f64 {
    50.0
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: default_node_width(),
            node_sep: default_node_sep(),
            rank_sep: default_rank_sep(),
        }
    }
}

/// Hour-snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoursConfig {
    /// Snapshots recorded within this window replace each other instead of
    /// accumulating, so rapid edits collapse into one row per window.
    #[serde(default = "default_debounce_minutes")]
    pub debounce_minutes: i64,
}

fn default_debounce_minutes() -> i64 {
    60
}

impl Default for HoursConfig {
    fn default() -> Self {
        Self {
            debounce_minutes: default_debounce_minutes(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory override (defaults to `.taskboard/` next to the config)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: None }
    }
}

/// Name of the configuration file
pub const CONFIG_FILE: &str = ".taskboard.toml";

impl Config {
    /// Load configuration from a board directory.
    ///
    /// Missing or unreadable files fall back to defaults; a present but
    /// malformed file also falls back (the board must stay usable).
    pub fn load_from_dir(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(?path, %err, "ignoring malformed config");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// Resolve the data directory for a board rooted at `dir`.
    pub fn data_dir(&self, dir: &Path) -> PathBuf {
        match &self.storage.dir {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => dir.join(path),
            None => dir.join(crate::store::DATA_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path());

        assert_eq!(config.layout.node_width, 600.0);
        assert_eq!(config.layout.node_sep, 5.0);
        assert_eq!(config.layout.rank_sep, 50.0);
        assert_eq!(config.hours.debounce_minutes, 60);
        assert!(config.storage.dir.is_none());
    }

    #[test]
    fn overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let toml = r#"
[layout]
node_width = 480.0
node_sep = 10.0

[hours]
debounce_minutes = 15

[storage]
dir = "state"
"#;
        std::fs::write(dir.path().join(CONFIG_FILE), toml).unwrap();

        let config = Config::load_from_dir(dir.path());

        assert_eq!(config.layout.node_width, 480.0);
        assert_eq!(config.layout.node_sep, 10.0);
        assert_eq!(config.layout.rank_sep, 50.0);
        assert_eq!(config.hours.debounce_minutes, 15);
        assert_eq!(config.data_dir(dir.path()), dir.path().join("state"));
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[layout\nnode_width = ").unwrap();

        let config = Config::load_from_dir(dir.path());
        assert_eq!(config.layout.node_width, 600.0);
    }
}
