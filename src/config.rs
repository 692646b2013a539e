//! Configuration module for the class watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.classwatch/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CW_` and use double underscores
//! to separate nested levels:
//! - `CW_WATCH__SETTLE_MS=0` sets `watch.settle_ms`
//! - `CW_WATCH__ROOTS=[build/classes,target/classes]` sets `watch.roots`
//! - `CW_ENGINE__CONTEXT=app` sets `engine.context`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Directory holding the settings file, searched for from the current directory upwards.
pub const CONFIG_DIR: &str = ".classwatch";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

/// Root used when no watch root is configured.
pub const DEFAULT_ROOT: &str = "target/classes";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory watching
    #[serde(default)]
    pub watch: WatchConfig,

    /// Reload engine binding
    #[serde(default)]
    pub engine: EngineConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Build-output roots to watch, in priority order.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// File suffix identifying a compiled artifact.
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,

    /// Upper bound on how long the event loop blocks before re-checking its run flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long an artifact's size must stay unchanged before it is loaded.
    /// Zero loads artifacts as soon as they are observed.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Name of the parent loading context the reload registry is bound to.
    #[serde(default = "default_context")]
    pub context: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `classwatch::watcher = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_artifact_suffix() -> String { ".class".to_string() }
fn default_poll_interval_ms() -> u64 { 250 }
fn default_settle_ms() -> u64 { 50 }
fn default_context() -> String { "app".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            artifact_suffix: default_artifact_suffix(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration layering defaults, the given file and `CW_` variables.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore stays in field names
            .merge(Env::prefixed("CW_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.classwatch/settings.toml` from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Configured roots, or the conventional default when none are configured.
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        effective_roots(&self.watch.roots)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        settings.watch.roots = vec![PathBuf::from(DEFAULT_ROOT)];
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

/// Substitute [`DEFAULT_ROOT`] for an empty root list.
pub fn effective_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    if roots.is_empty() {
        tracing::warn!(
            "[config] no watched folders have been defined, using the default {DEFAULT_ROOT}"
        );
        vec![PathBuf::from(DEFAULT_ROOT)]
    } else {
        roots.to_vec()
    }
}
