//! Tile loading telemetry for observability and tests.
//!
//! Counters are lock-free atomics so they can be updated from any completion
//! path with minimal overhead. Per-tileset counters live in a concurrent map
//! keyed by tileset id.
//!
//! # Architecture
//!
//! ```text
//! Engine events ─────► StatsAggregator ─────► TilesetStats ─────► Views
//!                      (atomic counters)      (point-in-time copy) (CLI, tests)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lodstream::telemetry::StatsAggregator;
//!
//! let stats = StatsAggregator::new();
//! stats.record_load(&tileset, 4096);
//! stats.record_eviction(&tileset, 1024);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.totals.bytes_resident, 3072);
//! ```

mod metrics;
mod snapshot;

pub use metrics::StatsAggregator;
pub use snapshot::{StatsCounts, TilesetStats};
