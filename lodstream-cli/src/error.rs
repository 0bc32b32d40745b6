//! CLI error type.

use std::fmt;

use lodstream::config::ConfigError;
use lodstream::loader::FetchError;
use lodstream::logging::LoggingError;
use lodstream::tileset::TilesetError;
use lodstream::EngineError;

/// Everything a command can fail with. Printed once by `main`.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration value or key.
    Config(String),
    /// Configuration file could not be read or written.
    ConfigFile(ConfigError),
    /// Tileset document could not be loaded.
    Tileset(TilesetError),
    /// Engine setup failed.
    Engine(EngineError),
    /// Logging setup failed.
    Logging(LoggingError),
    /// Async runtime could not start.
    Runtime(std::io::Error),
    /// Invalid command-line argument.
    InvalidArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Tileset(e) => write!(f, "{}", e),
            CliError::Engine(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "failed to start runtime: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<TilesetError> for CliError {
    fn from(e: TilesetError) -> Self {
        CliError::Tileset(e)
    }
}

impl From<FetchError> for CliError {
    fn from(e: FetchError) -> Self {
        CliError::Tileset(TilesetError::Fetch(e))
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}
