//! Application configuration
//!
//! Configuration is a single JSON record stored in `<data_dir>/config.json`.
//! It is read whole and rewritten whole; there is no partial update.
//!
//! The data directory comes from (highest precedence first):
//! 1. The `--data-dir` flag of the binary
//! 2. The `BITACORA_DATA_DIR` environment variable
//! 3. `~/.bitacora`

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::EntryType;

/// Environment variable prefix
const ENV_PREFIX: &str = "BITACORA";

/// Port the server listens on when nothing else is configured
pub const DEFAULT_PORT: u16 = 8384;

/// Placeholder shown instead of the Signal K token
pub const REDACTED_TOKEN: &str = "********";

/// UI languages with a translation file
pub const SUPPORTED_LANGUAGES: &[&str] = &["es", "en", "fr", "zh", "ru", "ja"];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub language: String,
    /// False until the setup page has been saved once
    pub setup_completed: bool,
    pub backup_enabled: bool,
    /// Destination directory for backup archives (`~` is expanded)
    pub backup_path: String,
    pub signalk: SignalKSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            language: "es".to_string(),
            setup_completed: false,
            backup_enabled: false,
            backup_path: String::new(),
            signalk: SignalKSettings::default(),
        }
    }
}

impl Config {
    /// Language to render the UI in, falling back to Spanish
    pub fn effective_language(&self) -> &str {
        if SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            &self.language
        } else {
            "es"
        }
    }

    /// Copy with the Signal K token masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.signalk.token.is_empty() {
            config.signalk.token = REDACTED_TOKEN.to_string();
        }
        config
    }
}

/// Signal K server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalKSettings {
    pub enabled: bool,
    /// Base URL without trailing slash, e.g. `http://openplotter.local:3000`
    pub url: String,
    /// Bearer token obtained through the access request flow
    pub token: String,
    /// Client id of a pending access request
    pub client_id: String,
    /// Polling href of a pending access request
    pub request_href: String,
    /// Data paths sampled when an entry is created
    pub selected_paths: Vec<String>,
    /// Publish entries as Signal K notes
    pub sync_resources: bool,
    /// Entry types eligible for publishing
    pub sync_entry_types: Vec<EntryType>,
}

impl Default for SignalKSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            token: String::new(),
            client_id: String::new(),
            request_href: String::new(),
            selected_paths: default_selected_paths(),
            sync_resources: true,
            sync_entry_types: default_sync_entry_types(),
        }
    }
}

impl SignalKSettings {
    /// Telemetry is active only with the flag set and a URL configured
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }

    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Whether entries of this type should be mirrored to the server
    pub fn syncs(&self, entry_type: EntryType) -> bool {
        self.sync_resources && self.sync_entry_types.contains(&entry_type)
    }
}

pub fn default_selected_paths() -> Vec<String> {
    vec![
        "navigation.position".to_string(),
        "navigation.state".to_string(),
    ]
}

pub fn default_sync_entry_types() -> Vec<EntryType> {
    vec![EntryType::Log, EntryType::Navigation, EntryType::Weather]
}

/// Locations of everything the application persists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the data directory from an explicit value, the environment,
    /// or the default location
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        let data_dir = explicit
            .or_else(|| std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)).ok().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        Self::new(data_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("logbook.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn deleted_dir(&self) -> PathBuf {
        self.uploads_dir().join("deleted")
    }

    /// Create the data and uploads directories
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.uploads_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        Ok(())
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bitacora")
}

/// Port override from `BITACORA_PORT`
pub fn env_port() -> Option<u16> {
    std::env::var(format!("{}_PORT", ENV_PREFIX))
        .ok()
        .and_then(|v| v.trim().parse().ok())
}

/// Where the configuration record lives
pub trait ConfigBackend: Send + Sync {
    /// Read the stored record, `None` if nothing has been stored yet
    fn read(&self) -> Result<Option<Config>>;

    /// Replace the stored record
    fn write(&self, config: &Config) -> Result<()>;
}

/// JSON file backend
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigBackend for FileBackend {
    fn read(&self) -> Result<Option<Config>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {:?}", self.path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", self.path))?;
        Ok(Some(config))
    }

    fn write(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config file: {:?}", self.path))?;
        Ok(())
    }
}

/// In-memory backend (for testing)
#[derive(Debug, Default)]
pub struct MemoryBackend {
    config: Mutex<Option<Config>>,
}

impl MemoryBackend {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(Some(config)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Config>> {
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigBackend for MemoryBackend {
    fn read(&self) -> Result<Option<Config>> {
        Ok(self.slot().clone())
    }

    fn write(&self, config: &Config) -> Result<()> {
        *self.slot() = Some(config.clone());
        Ok(())
    }
}

/// Process-wide access to the configuration record
///
/// Every `load` reads the backend again, so changes made through the setup
/// endpoints are seen by the next request.
pub struct ConfigStore {
    backend: Box<dyn ConfigBackend>,
}

impl ConfigStore {
    pub fn new(backend: impl ConfigBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// File-backed store at `<data_dir>/config.json`
    pub fn file(paths: &DataPaths) -> Self {
        Self::new(FileBackend::new(paths.config_path()))
    }

    /// In-memory store seeded with `config`
    pub fn in_memory(config: Config) -> Self {
        Self::new(MemoryBackend::new(config))
    }

    /// Load the current configuration
    ///
    /// On first run the defaults are written to the backend and returned.
    pub fn load(&self) -> Result<Config> {
        match self.backend.read()? {
            Some(config) => Ok(config),
            None => {
                let config = Config::default();
                self.backend.write(&config)?;
                tracing::info!("Created initial configuration");
                Ok(config)
            }
        }
    }

    /// Rewrite the whole configuration
    pub fn save(&self, config: &Config) -> Result<()> {
        self.backend.write(config)
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}
