//! Point-in-time statistics.

use crate::tileset::TilesetId;
use std::collections::BTreeMap;
use std::fmt;

/// One set of counters, either totals or one tileset's share.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsCounts {
    pub tiles_loaded: u64,
    pub tiles_failed: u64,
    pub tiles_evicted: u64,
    pub bytes_resident: u64,
    pub load_retries: u64,
    pub cancellations: u64,
    /// Selected nodes in the latest pass.
    pub last_selected: u64,
    /// Requested nodes in the latest pass.
    pub last_requested: u64,
}

impl fmt::Display for StatsCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selected={} requested={} loaded={} failed={} evicted={} resident={:.1}MB",
            self.last_selected,
            self.last_requested,
            self.tiles_loaded,
            self.tiles_failed,
            self.tiles_evicted,
            self.bytes_resident as f64 / 1_048_576.0
        )
    }
}

/// Snapshot of every counter, with a per-tileset breakdown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TilesetStats {
    pub totals: StatsCounts,
    pub per_tileset: BTreeMap<TilesetId, StatsCounts>,
    /// Completed traversal passes.
    pub passes: u64,
}

impl TilesetStats {
    pub fn tileset(&self, id: &TilesetId) -> Option<&StatsCounts> {
        self.per_tileset.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let counts = StatsCounts {
            tiles_loaded: 3,
            bytes_resident: 2 * 1_048_576,
            last_selected: 2,
            ..Default::default()
        };
        assert_eq!(
            counts.to_string(),
            "selected=2 requested=0 loaded=3 failed=0 evicted=0 resident=2.0MB"
        );
    }
}
