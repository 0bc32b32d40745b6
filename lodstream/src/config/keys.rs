//! Addressable configuration keys (`section.key`).

use super::file::{ConfigError, ConfigFile};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A single setting of [`ConfigFile`], named `section.key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    LoadingMaxConcurrentLoads,
    LoadingMaxAttempts,
    LoadingRequestTimeoutSecs,
    MemoryBudgetMb,
    TraversalMaximumScreenSpaceError,
    LoggingDirectory,
    LoggingLevel,
}

const ALL_KEYS: [ConfigKey; 7] = [
    ConfigKey::LoadingMaxConcurrentLoads,
    ConfigKey::LoadingMaxAttempts,
    ConfigKey::LoadingRequestTimeoutSecs,
    ConfigKey::MemoryBudgetMb,
    ConfigKey::TraversalMaximumScreenSpaceError,
    ConfigKey::LoggingDirectory,
    ConfigKey::LoggingLevel,
];

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::LoadingMaxConcurrentLoads
            | ConfigKey::LoadingMaxAttempts
            | ConfigKey::LoadingRequestTimeoutSecs => "loading",
            ConfigKey::MemoryBudgetMb => "memory",
            ConfigKey::TraversalMaximumScreenSpaceError => "traversal",
            ConfigKey::LoggingDirectory | ConfigKey::LoggingLevel => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::LoadingMaxConcurrentLoads => "max_concurrent_loads",
            ConfigKey::LoadingMaxAttempts => "max_attempts",
            ConfigKey::LoadingRequestTimeoutSecs => "request_timeout_secs",
            ConfigKey::MemoryBudgetMb => "budget_mb",
            ConfigKey::TraversalMaximumScreenSpaceError => "maximum_screen_space_error",
            ConfigKey::LoggingDirectory => "directory",
            ConfigKey::LoggingLevel => "level",
        }
    }

    /// `section.key`
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text. Unset optional values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::LoadingMaxConcurrentLoads => config.loading.max_concurrent_loads.to_string(),
            ConfigKey::LoadingMaxAttempts => config.loading.max_attempts.to_string(),
            ConfigKey::LoadingRequestTimeoutSecs => config.loading.request_timeout_secs.to_string(),
            ConfigKey::MemoryBudgetMb => config.memory.budget_mb.to_string(),
            ConfigKey::TraversalMaximumScreenSpaceError => {
                config.traversal.maximum_screen_space_error.to_string()
            }
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Parses and stores `value`, rejecting values the engine cannot use.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::LoadingMaxConcurrentLoads => {
                let n: usize = self.parse(value)?;
                if n == 0 {
                    return Err(self.invalid(value, "must be at least 1"));
                }
                config.loading.max_concurrent_loads = n;
            }
            ConfigKey::LoadingMaxAttempts => {
                let n: u32 = self.parse(value)?;
                if n == 0 {
                    return Err(self.invalid(value, "must be at least 1"));
                }
                config.loading.max_attempts = n;
            }
            ConfigKey::LoadingRequestTimeoutSecs => {
                config.loading.request_timeout_secs = self.parse(value)?;
            }
            ConfigKey::MemoryBudgetMb => {
                config.memory.budget_mb = self.parse(value)?;
            }
            ConfigKey::TraversalMaximumScreenSpaceError => {
                let pixels: f64 = self.parse(value)?;
                if !pixels.is_finite() || pixels <= 0.0 {
                    return Err(self.invalid(value, "must be a positive number of pixels"));
                }
                config.traversal.maximum_screen_space_error = pixels;
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, "expected error, warn, info, debug or trace"));
                }
                config.logging.level = level;
            }
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| self.invalid(value, &e.to_string()))
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section().to_string(),
            key: self.key_name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_names() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!(matches!(
            "memory.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();
        ConfigKey::MemoryBudgetMb.set(&mut config, " 256 ").unwrap();
        assert_eq!(ConfigKey::MemoryBudgetMb.get(&config), "256");

        ConfigKey::LoggingLevel.set(&mut config, "DEBUG").unwrap();
        assert_eq!(config.logging.level, "debug");

        assert_eq!(ConfigKey::LoggingDirectory.get(&config), "");
        ConfigKey::LoggingDirectory.set(&mut config, "/tmp/x").unwrap();
        assert_eq!(ConfigKey::LoggingDirectory.get(&config), "/tmp/x");
    }

    #[test]
    fn test_rejects_unusable_values() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::LoadingMaxConcurrentLoads.set(&mut config, "0").is_err());
        assert!(ConfigKey::TraversalMaximumScreenSpaceError
            .set(&mut config, "-1")
            .is_err());
        assert!(ConfigKey::LoggingLevel.set(&mut config, "loud").is_err());
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_sections_are_contiguous() {
        let sections: Vec<_> = ConfigKey::all().iter().map(|k| k.section()).collect();
        let mut seen: Vec<&str> = Vec::new();
        for s in sections {
            if seen.last() != Some(&s) {
                assert!(!seen.contains(&s), "section {} split", s);
                seen.push(s);
            }
        }
    }
}
