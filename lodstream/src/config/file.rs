//! INI configuration file.

use super::keys::ConfigKey;
use super::{EngineConfig, DEFAULT_MEMORY_BUDGET_MB};
use crate::logging::LoggingConfig;
use crate::scheduler::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_LOADS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::traversal::DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR;
use ini::Ini;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const APP_DIR: &str = "lodstream";
const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors raised while reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Default configuration file location: `<config_dir>/lodstream/config.ini`.
///
/// Falls back to the working directory when the platform has no config dir.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE_NAME)
}

/// Formats a byte count for humans (`"1.5 GB"`, `"300 KB"`).
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[loading]`
#[derive(Clone, Debug, PartialEq)]
pub struct LoadingSettings {
    pub max_concurrent_loads: usize,
    pub max_attempts: u32,
    /// 0 disables timeouts.
    pub request_timeout_secs: u64,
}

impl Default for LoadingSettings {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// `[memory]`
#[derive(Clone, Debug, PartialEq)]
pub struct MemorySettings {
    pub budget_mb: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            budget_mb: DEFAULT_MEMORY_BUDGET_MB,
        }
    }
}

/// `[traversal]`
#[derive(Clone, Debug, PartialEq)]
pub struct TraversalSettings {
    pub maximum_screen_space_error: f64,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR,
        }
    }
}

/// The whole configuration file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub loading: LoadingSettings,
    pub memory: MemorySettings,
    pub traversal: TraversalSettings,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Loads from [`config_file_path`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Like [`load_from`](Self::load_from), but a file that does not exist
    /// yet yields the defaults. Any other problem is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Sets one key in the file at `path` and writes it back.
    ///
    /// Entries other than `key` are kept exactly as written, including keys
    /// this version does not know. Nothing is written if any value in the
    /// resulting file is invalid.
    pub fn update(path: &Path, key: ConfigKey, value: &str) -> Result<Self, ConfigError> {
        let mut ini = if path.exists() {
            Ini::load_from_file(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Ini::new()
        };
        ini.with_section(Some(key.section()))
            .set(key.key_name(), value.trim());

        let config = Self::from_ini(&ini)?;
        write_ini(&ini, path)?;
        Ok(config)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();
        for (section, properties) in ini.iter() {
            let Some(section) = section else { continue };
            for (key, value) in properties.iter() {
                let name = format!("{}.{}", section, key);
                // Keys from other tools or newer versions are ignored
                if let Ok(config_key) = ConfigKey::from_str(&name) {
                    config_key.set(&mut config, value)?;
                }
            }
        }
        Ok(config)
    }

    /// Writes to [`config_file_path`], creating parent directories.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        write_ini(&ini, path)
    }

    /// The engine settings described by this file.
    pub fn engine_config(&self) -> EngineConfig {
        let timeout = match self.loading.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let defaults = EngineConfig::default();
        EngineConfig {
            max_concurrent_loads: self.loading.max_concurrent_loads,
            retry_policy: defaults
                .retry_policy
                .with_max_attempts(self.loading.max_attempts),
            ..defaults
        }
        .with_request_timeout(timeout)
        .with_memory_budget_mb(self.memory.budget_mb)
        .with_maximum_screen_space_error(self.traversal.maximum_screen_space_error)
    }
}

fn write_ini(ini: &Ini, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    ini.write_to_file(path).map_err(write_err)
}
