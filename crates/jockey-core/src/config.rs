use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::platform;

/// Internal gain ceiling: user volume 0–200 % maps onto 0.0–0.2.
pub const MAX_GAIN: f64 = 0.2;

/// Flat configuration document. Every field carries a default so that a
/// config written by an older build back-fills missing keys on load and the
/// merged shape is what gets rewritten on the next save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_blacklist")]
    pub blacklisted_keywords: Vec<String>,
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: f64,
    #[serde(default = "default_shorts_keywords")]
    pub shorts_keywords: Vec<String>,
    #[serde(default = "default_max_shorts_duration")]
    pub max_shorts_duration: f64,
    #[serde(default = "default_true")]
    pub filters_enabled: bool,
    /// Session-only radio filter; persisted for visibility but reset on load.
    #[serde(default)]
    pub forced_keyword: Option<String>,
    /// Internal output gain, 0.0..=MAX_GAIN.
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_hotwords")]
    pub hotwords: Vec<String>,
    #[serde(default)]
    pub microphone_index: Option<usize>,
    #[serde(default = "default_true")]
    pub listen_enabled: bool,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Ratio above which a candidate counts as literally the same song.
    #[serde(default = "default_same_track_threshold")]
    pub same_track_threshold: f64,
    /// Looser ratio for suppressing near-duplicate radio suggestions.
    #[serde(default = "default_radio_duplicate_threshold")]
    pub radio_duplicate_threshold: f64,
    /// Worker pool size for playlist/favorites verification.
    #[serde(default = "default_verify_workers")]
    pub verify_workers: usize,
}

fn default_blacklist() -> Vec<String> {
    ["live", "concert", "remix", "album", "playlist", "mix", "tutorial", "compilation"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_shorts_keywords() -> Vec<String> {
    ["#shorts", "shorts", "reels"].iter().map(|s| s.to_string()).collect()
}

fn default_hotwords() -> Vec<String> {
    vec!["jockey".to_string()]
}

fn default_max_duration() -> f64 {
    600.0
}

fn default_max_shorts_duration() -> f64 {
    65.0
}

fn default_volume() -> f64 {
    0.05
}

fn default_history_limit() -> usize {
    15
}

fn default_same_track_threshold() -> f64 {
    0.85
}

fn default_radio_duplicate_threshold() -> f64 {
    0.45
}

fn default_verify_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blacklisted_keywords: default_blacklist(),
            max_duration_seconds: default_max_duration(),
            shorts_keywords: default_shorts_keywords(),
            max_shorts_duration: default_max_shorts_duration(),
            filters_enabled: true,
            forced_keyword: None,
            volume: default_volume(),
            hotwords: default_hotwords(),
            microphone_index: None,
            listen_enabled: true,
            history_limit: default_history_limit(),
            same_track_threshold: default_same_track_threshold(),
            radio_duplicate_threshold: default_radio_duplicate_threshold(),
            verify_workers: default_verify_workers(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Load from disk, back-filling defaults. A missing file is seeded with
    /// defaults; a corrupt file falls back to defaults without failing
    /// startup.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save() {
                warn!("could not seed config at {:?}: {}", path, e);
            }
            return config;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) => {
                warn!("could not read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Parse a config document, falling back to defaults on corruption.
    /// The forced keyword never survives a restart.
    pub fn from_toml_str(content: &str) -> Self {
        let mut config: Self = match toml::from_str(content) {
            Ok(c) => c,
            Err(e) => {
                warn!("corrupt config, using defaults: {}", e);
                Self::default()
            }
        };
        config.hotwords = config
            .hotwords
            .iter()
            .map(|h| h.to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        if config.hotwords.is_empty() {
            config.hotwords = default_hotwords();
        }
        config.forced_keyword = None;
        config
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// User-facing volume in percent (0–200).
    pub fn volume_percent(&self) -> i64 {
        (self.volume * 1000.0).round() as i64
    }

    /// Clamp a user percentage into the internal gain range.
    pub fn gain_from_percent(percent: i64) -> f64 {
        (percent as f64 / 1000.0).clamp(0.0, MAX_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.filters_enabled);
        assert_eq!(config.max_duration_seconds, 600.0);
        assert_eq!(config.max_shorts_duration, 65.0);
        assert_eq!(config.history_limit, 15);
        assert!(config.forced_keyword.is_none());
        assert!(config.blacklisted_keywords.iter().any(|k| k == "remix"));
    }

    #[test]
    fn test_missing_fields_backfill() {
        let config = Config::from_toml_str("volume = 0.1\n");
        assert_eq!(config.volume, 0.1);
        assert_eq!(config.max_duration_seconds, 600.0);
        assert!(config.filters_enabled);
    }

    #[test]
    fn test_forced_keyword_reset_on_load() {
        let config = Config::from_toml_str("forced_keyword = \"metrika\"\n");
        assert!(config.forced_keyword.is_none());
    }

    #[test]
    fn test_corrupt_config_falls_back() {
        let config = Config::from_toml_str("volume = [not toml");
        assert_eq!(config.volume, default_volume());
    }

    #[test]
    fn test_gain_clamp() {
        assert_eq!(Config::gain_from_percent(250), MAX_GAIN);
        assert_eq!(Config::gain_from_percent(-5), 0.0);
        assert!((Config::gain_from_percent(100) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_hotwords_normalized() {
        let config = Config::from_toml_str("hotwords = [\"Rafa\", \"DJ\"]\n");
        assert_eq!(config.hotwords, vec!["rafa", "dj"]);
        let empty = Config::from_toml_str("hotwords = []\n");
        assert_eq!(empty.hotwords, vec!["jockey"]);
    }
}
