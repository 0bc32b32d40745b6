//! Top-level error type.

use crate::config::ConfigError;
use crate::loader::FetchError;
use crate::logging::LoggingError;
use crate::tileset::{StatisticsError, TilesetError, TilesetId};
use thiserror::Error;

/// Errors surfaced by [`TilesetEngine`](crate::engine::TilesetEngine) and
/// the setup helpers around it.
///
/// Per-tile failures never show up here; they are reported through
/// [`EngineEvents::on_load_error`](crate::engine::EngineEvents::on_load_error).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tileset(#[from] TilesetError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("layer '{0}' is already active")]
    DuplicateLayer(TilesetId),

    #[error("layer '{0}' is not active")]
    UnknownLayer(TilesetId),

    #[error("layer '{tileset}' has no statistics for attribute '{attribute}'")]
    UnknownAttribute { tileset: TilesetId, attribute: String },
}
