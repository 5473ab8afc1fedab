//! Configuration system for xpand.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/xpand/config.toml`
//! 3. **Environment variables** - `XPAND_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! base_dir = "~/archives/twitter-2023"
//!
//! [engine]
//! batch_size = 100
//! cooldown_secs = 900
//!
//! [api]
//! base_url = "https://api.twitter.com/1.1"
//! timeout_secs = 30
//!
//! [output]
//! colors = true
//! ```

use crate::engine::{DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default remote API root.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/1.1";

/// Main configuration structure for xpand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Fetch loop tuning.
    pub engine: EngineSettings,
    /// Remote API settings.
    pub api: ApiConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Extracted archive directory; also holds credentials and `expanded/`.
    /// Environment variable: `XPAND_DIR`
    pub base_dir: Option<PathBuf>,
}

/// Fetch loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Ids per lookup call (1-100).
    /// Environment variable: `XPAND_BATCH_SIZE`
    pub batch_size: usize,

    /// Seconds to wait after a rate-limit response.
    /// Environment variable: `XPAND_COOLDOWN_SECS`
    pub cooldown_secs: u64,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root URL.
    /// Environment variable: `XPAND_API_BASE`
    pub base_url: String,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output (progress bars, etc.).
    pub quiet: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            user_agent: concat!("xpand/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            colors: true,
            quiet: false,
        }
    }
}

impl EngineSettings {
    /// Engine parameters, with the batch size clamped to what the API accepts.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let batch_size = self.batch_size.clamp(1, DEFAULT_BATCH_SIZE);
        if batch_size != self.batch_size {
            warn!(
                requested = self.batch_size,
                used = batch_size,
                "Batch size out of range, clamping"
            );
        }
        EngineConfig {
            batch_size,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/xpand/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xpand").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `XPAND_*` overrides from an arbitrary lookup (env in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("XPAND_DIR") {
            self.paths.base_dir = Some(PathBuf::from(dir));
        }

        if let Some(n) = lookup("XPAND_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.engine.batch_size = n;
        }
        if let Some(n) = lookup("XPAND_COOLDOWN_SECS").and_then(|v| v.parse().ok()) {
            self.engine.cooldown_secs = n;
        }

        if let Some(base) = lookup("XPAND_API_BASE") {
            self.api.base_url = base;
        }

        if lookup("XPAND_NO_COLOR").is_some() || lookup("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if lookup("XPAND_QUIET").is_some() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.base_dir.is_some() {
            self.paths.base_dir = other.paths.base_dir;
        }

        self.engine = other.engine;
        self.api = other.api;
        self.output = other.output;
    }

    /// Base directory, defaulting to the current directory.
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.paths
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.batch_size, 100);
        assert_eq!(config.engine.cooldown_secs, 15 * 60);
        assert_eq!(config.api.base_url, DEFAULT_API_BASE);
        assert!(config.output.colors);
        assert_eq!(config.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.engine.batch_size, parsed.engine.batch_size);
        assert_eq!(config.api.timeout_secs, parsed.api.timeout_secs);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[engine]\ncooldown_secs = 5\n").unwrap();
        assert_eq!(parsed.engine.cooldown_secs, 5);
        assert_eq!(parsed.engine.batch_size, 100);
        assert_eq!(parsed.api.base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.engine.batch_size = 50;
        other.paths.base_dir = Some(PathBuf::from("/custom/path"));

        base.merge(other);

        assert_eq!(base.engine.batch_size, 50);
        assert_eq!(base.paths.base_dir, Some(PathBuf::from("/custom/path")));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("XPAND_DIR", "/archive"),
            ("XPAND_BATCH_SIZE", "25"),
            ("XPAND_COOLDOWN_SECS", "notanumber"),
            ("NO_COLOR", "1"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.base_dir(), PathBuf::from("/archive"));
        assert_eq!(config.engine.batch_size, 25);
        assert_eq!(config.engine.cooldown_secs, 900);
        assert!(!config.output.colors);
        assert!(!config.output.quiet);
    }

    #[test]
    fn test_engine_config_clamps_batch_size() {
        let settings = EngineSettings {
            batch_size: 500,
            cooldown_secs: 3,
        };
        let engine = settings.engine_config();
        assert_eq!(engine.batch_size, 100);
        assert_eq!(engine.cooldown, Duration::from_secs(3));

        let zero = EngineSettings {
            batch_size: 0,
            cooldown_secs: 0,
        };
        assert_eq!(zero.engine_config().batch_size, 1);
    }
}
