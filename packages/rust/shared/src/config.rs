//! Application configuration for venuebot.
//!
//! User config lives at `~/.venuebot/venuebot.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VenueBotError};
use crate::types::Credentials;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "venuebot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".venuebot";

// ---------------------------------------------------------------------------
// Config structs (matching venuebot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identity of this service in the graph.
    #[serde(default)]
    pub bot: BotConfig,

    /// Foursquare client settings.
    #[serde(default)]
    pub foursquare: FoursquareConfig,

    /// Background maintainer delays.
    #[serde(default)]
    pub maintainer: MaintainerConfig,

    /// Graph database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Search result limits.
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[bot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// URI stamped on enriched nodes as their provenance.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Prefix for URIs of nodes created by find-or-create.
    #[serde(default = "default_node_base")]
    pub node_base: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            node_base: default_node_base(),
        }
    }
}

fn default_identity() -> String {
    "urn:venuebot:foursquare".into()
}
fn default_node_base() -> String {
    "urn:uuid:".into()
}

/// `[foursquare]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoursquareConfig {
    /// Client identifier. Falls back to `client_id_env` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret. Falls back to `client_secret_env` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// API root, without trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value of the `v` versioning parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FoursquareConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            api_base: default_api_base(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_client_id_env() -> String {
    "FOURSQUARE_CLIENT_ID".into()
}
fn default_client_secret_env() -> String {
    "FOURSQUARE_CLIENT_SECRET".into()
}
fn default_api_base() -> String {
    "https://api.foursquare.com/v2".into()
}
fn default_api_version() -> String {
    "20180323".into()
}
fn default_timeout_secs() -> u64 {
    10
}

/// `[maintainer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintainerConfig {
    /// Delay before the next cycle when the last one found work.
    #[serde(default = "default_work_delay")]
    pub work_delay_ms: u64,

    /// Delay before the next cycle when the last one found nothing.
    #[serde(default = "default_idle_delay")]
    pub idle_delay_ms: u64,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            work_delay_ms: default_work_delay(),
            idle_delay_ms: default_idle_delay(),
        }
    }
}

fn default_work_delay() -> u64 {
    1_000
}
fn default_idle_delay() -> u64 {
    600_000
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the graph database file.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> String {
    "~/.venuebot/graph.db".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> u32 {
    10
}

impl AppConfig {
    /// Resolve client credentials from inline values or the environment.
    ///
    /// Returns `None` unless both halves are present and non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        let fs = &self.foursquare;
        let identifier = fs
            .client_id
            .clone()
            .or_else(|| std::env::var(&fs.client_id_env).ok())
            .filter(|v| !v.is_empty())?;
        let secret = fs
            .client_secret
            .clone()
            .or_else(|| std::env::var(&fs.client_secret_env).ok())
            .filter(|v| !v.is_empty())?;
        Some(Credentials { identifier, secret })
    }

    /// Storage path with a leading `~` expanded to the home directory.
    pub fn storage_path(&self) -> Result<PathBuf> {
        expand_home(&self.storage.path)
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| VenueBotError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.venuebot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| VenueBotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.venuebot/venuebot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| VenueBotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| VenueBotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| VenueBotError::io(parent, e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| VenueBotError::config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| VenueBotError::io(path, e))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    save_config_to(&AppConfig::default(), &path)?;
    tracing::info!(?path, "created default config file");
    Ok(path)
}

/// Store client credentials in the user config file.
pub fn set_credentials(identifier: &str, secret: &str) -> Result<PathBuf> {
    let path = config_file_path()?;
    let mut config = load_config()?;
    config.foursquare.client_id = Some(identifier.to_string());
    config.foursquare.client_secret = Some(secret.to_string());
    save_config_to(&config, &path)?;
    tracing::info!(?path, "stored foursquare credentials");
    Ok(path)
}
