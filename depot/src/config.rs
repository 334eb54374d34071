//! Configuration for the depot.
//!
//! DEPOT_ROOT resolution order:
//! 1. Explicit path passed to Config::with_root()
//! 2. DEPOT_ROOT environment variable
//! 3. Default: ~/.local/share/fuelwatch

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{Error, Region, Result, Window};

/// Depot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for depot state.
    pub depot_root: PathBuf,

    /// Remote store directory (a mounted or synced bucket).
    /// Defaults to `<depot_root>/store`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Live-source endpoint per region.
    #[serde(default)]
    pub endpoints: BTreeMap<Region, String>,

    /// Days covered by the retention window.
    #[serde(default = "default_window_span_days")]
    pub window_span_days: u32,

    /// Days between now and the last day shown (upstream processing lag).
    #[serde(default = "default_window_lag_days")]
    pub window_lag_days: u32,

    /// Timeout for a single store or live-source call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// How long a load result is served from the in-process cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Tags that put a record in the classification subset (case-sensitive).
    #[serde(default = "default_classification_tags")]
    pub classification_tags: Vec<String>,
}

fn default_window_span_days() -> u32 {
    10
}

fn default_window_lag_days() -> u32 {
    2
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    6 * 60 * 60
}

fn default_classification_tags() -> Vec<String> {
    vec!["USFS".to_string()]
}

impl Config {
    /// Create a new config with the given DEPOT_ROOT.
    pub fn with_root(depot_root: impl Into<PathBuf>) -> Self {
        Self {
            depot_root: depot_root.into(),
            store_dir: None,
            endpoints: BTreeMap::new(),
            window_span_days: default_window_span_days(),
            window_lag_days: default_window_lag_days(),
            call_timeout_secs: default_call_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            classification_tags: default_classification_tags(),
        }
    }

    /// Load config from DEPOT_ROOT/config.toml, or create default.
    pub fn load() -> Result<Self> {
        let depot_root = resolve_depot_root()?;
        Self::load_from(&depot_root)
    }

    /// Load config from a specific DEPOT_ROOT.
    pub fn load_from(depot_root: &Path) -> Result<Self> {
        let config_path = depot_root.join("config.toml");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
            config.depot_root = depot_root.to_path_buf();
            Ok(config)
        } else {
            Ok(Self::with_root(depot_root))
        }
    }

    /// Save config to DEPOT_ROOT/config.toml.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.depot_root)?;
        let config_path = self.depot_root.join("config.toml");
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_path, contents)?;
        Ok(())
    }

    /// Check the settings that must be right before any load starts.
    ///
    /// Every region in `regions` needs a live-source endpoint, since any of
    /// them may have to fall back to it.
    pub fn validate(&self, regions: &[Region]) -> Result<()> {
        let missing: Vec<&str> = regions
            .iter()
            .filter(|r| {
                self.endpoints
                    .get(r)
                    .map_or(true, |endpoint| endpoint.trim().is_empty())
            })
            .map(|r| r.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "No live-source endpoint configured for {}",
                missing.join(", ")
            )));
        }
        if self.call_timeout_secs == 0 {
            return Err(Error::Config("call_timeout_secs must be positive".to_string()));
        }
        if self.window_span_days == 0 {
            return Err(Error::Config("window_span_days must be positive".to_string()));
        }
        Ok(())
    }

    pub fn endpoint(&self, region: Region) -> Option<&str> {
        self.endpoints.get(&region).map(String::as_str)
    }

    pub fn with_endpoint(mut self, region: Region, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(region, endpoint.into());
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The retention window as of `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> Window {
        Window::retention(now, self.window_lag_days, self.window_span_days)
    }

    /// The retention window as of the current time.
    pub fn current_window(&self) -> Window {
        self.window_at(Utc::now())
    }

    // Path helpers

    /// Path to the remote store root.
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| self.depot_root.join("store"))
    }
}

/// Resolve DEPOT_ROOT using the standard resolution order.
fn resolve_depot_root() -> Result<PathBuf> {
    // 1. Environment variable
    if let Ok(path) = std::env::var("DEPOT_ROOT") {
        return Ok(PathBuf::from(path));
    }

    // 2. XDG data directory (via directories crate)
    if let Some(proj_dirs) = ProjectDirs::from("", "", "fuelwatch") {
        return Ok(proj_dirs.data_dir().to_path_buf());
    }

    // 3. Fallback to ~/.local/share/fuelwatch
    let home = std::env::var("HOME")
        .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;
    Ok(PathBuf::from(home).join(".local/share/fuelwatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_with_root() {
        let config = Config::with_root("/tmp/test-depot");
        assert_eq!(config.depot_root, PathBuf::from("/tmp/test-depot"));
        assert_eq!(config.window_span_days, 10);
        assert_eq!(config.window_lag_days, 2);
        assert_eq!(config.classification_tags, vec!["USFS"]);
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/test-depot/store"));
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let depot_root = tmp.path().to_path_buf();

        let config = Config::with_root(&depot_root)
            .with_endpoint(Region::Ind, "https://ind.example/api")
            .with_endpoint(Region::Nasa, "/srv/dumps/nasa");
        config.save().unwrap();

        let loaded = Config::load_from(&depot_root).unwrap();
        assert_eq!(loaded.endpoint(Region::Ind), Some("https://ind.example/api"));
        assert_eq!(loaded.endpoint(Region::Nasa), Some("/srv/dumps/nasa"));
        assert_eq!(loaded.endpoint(Region::Eu), None);
        assert_eq!(loaded.cache_ttl_secs, config.cache_ttl_secs);
    }

    #[test]
    fn test_config_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "depot_root = \"/elsewhere\"\nwindow_span_days = 7\n\n[endpoints]\nEU = \"/dumps/eu\"\n",
        )
        .unwrap();

        let loaded = Config::load_from(tmp.path()).unwrap();
        assert_eq!(loaded.depot_root, tmp.path());
        assert_eq!(loaded.window_span_days, 7);
        assert_eq!(loaded.call_timeout_secs, 30);
        assert_eq!(loaded.endpoint(Region::Eu), Some("/dumps/eu"));
    }

    #[test]
    fn test_validate_missing_endpoint() {
        let config = Config::with_root("/tmp/x").with_endpoint(Region::Ind, "/dumps/ind");
        assert!(config.validate(&[Region::Ind]).is_ok());

        let err = config.validate(&[Region::Ind, Region::Fml]).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("FML")));
    }
}
