//! lodstream - level-of-detail streaming for hierarchical 3D tilesets
//!
//! This library decides which tiles of one or more I3S-style tilesets must be
//! resident for a camera view, loads them with bounded concurrency, keeps
//! them within a shared memory budget and reports what happened.
//!
//! The pieces, leaf first:
//!
//! - [`geometry`]: vectors, bounding volumes, view frusta
//! - [`tileset`]: hierarchy model, JSON documents, validation
//! - [`loader`]: fetch and decode one tile's payload
//! - [`traversal`]: screen-space-error traversal with interim fallback
//! - [`scheduler`]: request reconciliation, admission, retries, timeouts
//! - [`cache`]: resident tiles and generation-based eviction
//! - [`telemetry`]: load counters
//! - [`engine`]: the orchestrator tying it all together

pub mod cache;
pub mod config;
pub mod debug;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod logging;
pub mod scheduler;
pub mod telemetry;
pub mod tileset;
pub mod traversal;

pub use config::EngineConfig;
pub use engine::{EngineEvents, NoopEvents, PassReport, TilesetEngine};
pub use error::EngineError;
pub use tileset::{LayerDescriptor, NodeId, TilesetId};
pub use traversal::ViewState;
