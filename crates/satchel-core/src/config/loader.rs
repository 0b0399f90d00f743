//! Hierarchical configuration loader with precedence
//!
//! Loads prefetch configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into the library)
//! 2. User config (~/.satchel/prefetch.yaml)
//! 3. Environment variables (SATCHEL_* prefix)

use crate::error::{Error, Result};
use crate::types::PrefetchConfig;
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use tracing::debug;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const DEFAULTS_FILE: &str = "prefetch-defaults.yaml";
const USER_FILE: &str = "prefetch.yaml";

/// Configuration hierarchy loader
pub struct ConfigLoader {
    /// Base directory for configuration files
    config_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at the standard config directory (~/.satchel)
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    fn default_config_dir() -> Result<Utf8PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|_| Error::invalid_config("Home directory is not valid UTF-8"))?;
        Ok(home.join(".satchel"))
    }

    /// Load prefetch configuration with hierarchical precedence
    pub fn load_prefetch_config(&self) -> Result<PrefetchConfig> {
        let mut config = Self::load_embedded_config::<PrefetchConfig>(DEFAULTS_FILE)?;

        let user_path = self.config_dir.join(USER_FILE);
        if user_path.exists() {
            debug!("Loading prefetch config from {}", user_path);
            config = self.load_yaml_file::<PrefetchConfig>(&user_path)?;
        }

        config = Self::apply_env_overrides(config)?;
        config.validate()?;

        Ok(config)
    }

    /// Load an embedded configuration file
    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    /// Load a YAML file and parse it
    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: PrefetchConfig) -> Result<PrefetchConfig> {
        if let Ok(val) = env::var("SATCHEL_STATUS_TTL_SECS") {
            config.status_ttl_secs = val.parse().map_err(|_| {
                Error::invalid_config("SATCHEL_STATUS_TTL_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("SATCHEL_SECTION_EVENT_CAPACITY") {
            config.section_event_capacity = val.parse().map_err(|_| {
                Error::invalid_config("SATCHEL_SECTION_EVENT_CAPACITY must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("SATCHEL_SESSION_EVENT_CAPACITY") {
            config.session_event_capacity = val.parse().map_err(|_| {
                Error::invalid_config("SATCHEL_SESSION_EVENT_CAPACITY must be a valid number")
            })?;
        }

        Ok(config)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
