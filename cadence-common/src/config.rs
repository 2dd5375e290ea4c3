//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only. Runtime player settings live in the
//! database `settings` table and are loaded by the player crate.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CADENCE_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "cadence.db";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and downloads (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path; defaults to `<root_folder>/cadence.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP control port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Fallback `EnvFilter` directives when `RUST_LOG` is unset
    pub fn filter_directives(&self) -> String {
        let level = self.level.trim().to_ascii_lowercase();
        format!(
            "cadence_player={level},cadence_common={level},tower_http={level}",
            level = level
        )
    }
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load bootstrap configuration from an explicit TOML file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Load bootstrap configuration, falling back to defaults
///
/// A missing config file is not an error: the player starts with built-in
/// defaults and logs a warning.
pub fn load_or_default(explicit: Option<&Path>) -> TomlConfig {
    let candidate = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_file(),
    };

    match candidate {
        Some(path) if path.exists() => match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using defaults", e);
                TomlConfig::default()
            }
        },
        Some(path) => {
            warn!("Config file {} not found; using defaults", path.display());
            TomlConfig::default()
        }
        None => TomlConfig::default(),
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database path: explicit TOML value, else inside the root folder
pub fn resolve_database_path(root_folder: &Path, toml: &TomlConfig) -> PathBuf {
    toml.database_path
        .clone()
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// Default configuration file path for the platform
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cadence"))
        .unwrap_or_else(|| PathBuf::from("./cadence_data"))
}
