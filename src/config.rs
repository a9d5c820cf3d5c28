//! Persisted container configuration.
//!
//! Containers created by reddock are tracked in a JSON file
//! (`~/.config/reddock/config.json` by default). The add-on subsystem only
//! touches one field: the ordered, append-only list of add-ons injected
//! into each container.

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, CONFIG_PATH_ENV, KNOWN_IMAGE_VERSIONS};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A tracked redroid container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub image_url: String,
    #[serde(default)]
    pub data_path: String,
    #[serde(default)]
    pub log_file: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub gpu_mode: String,
    #[serde(default)]
    pub initialized: bool,
    /// Add-ons injected into this container, in injection order.
    #[serde(default)]
    pub addons: Vec<String>,
}

impl ContainerRecord {
    /// Creates a record for a container running `image_url`.
    pub fn new(name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_url: image_url.into(),
            ..Self::default()
        }
    }

    /// Appends an add-on name unless already present. Returns true if added.
    pub fn record_addon(&mut self, addon: &str) -> bool {
        if self.addons.iter().any(|a| a == addon) {
            return false;
        }
        self.addons.push(addon.to_string());
        true
    }

    /// Platform version inferred from the container's image.
    pub fn version(&self) -> Option<String> {
        version_from_image(&self.image_url)
    }
}

/// Top-level config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerRecord>,
}

impl Config {
    pub fn container(&self, name: &str) -> Option<&ContainerRecord> {
        self.containers.get(name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut ContainerRecord> {
        self.containers.get_mut(name)
    }

    /// Inserts or replaces a record keyed by its name.
    pub fn add_container(&mut self, record: ContainerRecord) {
        self.containers.insert(record.name.clone(), record);
    }
}

/// Infers a platform version from an image reference such as
/// `redroid/redroid:13.0.0_64only-latest`.
///
/// The tag is stripped of `-latest` and matched against known version
/// prefixes; an unrecognized tag is returned as-is.
pub fn version_from_image(image_url: &str) -> Option<String> {
    let (_, tag) = image_url.rsplit_once(':')?;
    if tag.contains('/') || tag.is_empty() {
        return None;
    }
    let tag = tag.strip_suffix("-latest").unwrap_or(tag);

    let known = KNOWN_IMAGE_VERSIONS.iter().find(|v| tag.starts_with(**v));
    Some(known.map_or_else(|| tag.to_string(), |v| (*v).to_string()))
}

// =============================================================================
// Stores
// =============================================================================

/// Load/save access to the persisted configuration.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config>;
    fn save(&self, config: &Config) -> Result<()>;
}

/// JSON file store with atomic writes.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Store at `REDDOCK_CONFIG` or the default path.
    pub fn new() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path);
        Self::with_path(path)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/reddock/config.json`, falling back to `~/.config`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl std::fmt::Display) -> Error {
        Error::Config {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Default for JsonConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<Config> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.path.display());
                return Ok(Config::default());
            }
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_slice(&data).map_err(|e| self.error(e))
    }

    fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let data = serde_json::to_vec_pretty(config).map_err(|e| self.error(e))?;

        let temp_path = self
            .path
            .with_file_name(format!(".{CONFIG_FILE_NAME}.{}", uuid::Uuid::now_v7()));
        fs::write(&temp_path, &data).map_err(|e| self.error(e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            self.error(e)
        })?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

/// In-process store, used where nothing should touch disk.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Config {
        self.config.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config> {
        Ok(self.snapshot())
    }

    fn save(&self, config: &Config) -> Result<()> {
        if let Ok(mut current) = self.config.lock() {
            *current = config.clone();
        }
        Ok(())
    }
}
