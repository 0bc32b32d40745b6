//! Atomic counters behind [`StatsAggregator`].

use super::snapshot::{StatsCounts, TilesetStats};
use crate::tileset::TilesetId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    tiles_loaded: AtomicU64,
    tiles_failed: AtomicU64,
    tiles_evicted: AtomicU64,
    bytes_resident: AtomicU64,
    load_retries: AtomicU64,
    cancellations: AtomicU64,
    last_selected: AtomicU64,
    last_requested: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn sub(counter: &AtomicU64, n: u64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(n))
        });
    }

    fn snapshot(&self) -> StatsCounts {
        StatsCounts {
            tiles_loaded: self.tiles_loaded.load(Ordering::Relaxed),
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            tiles_evicted: self.tiles_evicted.load(Ordering::Relaxed),
            bytes_resident: self.bytes_resident.load(Ordering::Relaxed),
            load_retries: self.load_retries.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            last_selected: self.last_selected.load(Ordering::Relaxed),
            last_requested: self.last_requested.load(Ordering::Relaxed),
        }
    }
}

/// Accumulates tile counters across all loaded tilesets.
///
/// Every recording method updates both the totals and the tileset's own
/// breakdown. Owned by the engine; share it with `Arc` to read from other
/// threads.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    totals: Counters,
    per_tileset: DashMap<TilesetId, Counters>,
    passes: AtomicU64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, tileset: &TilesetId, f: impl Fn(&Counters)) {
        f(&self.totals);
        f(&self.per_tileset.entry(tileset.clone()).or_default());
    }

    /// A tile's content entered the cache.
    pub fn record_load(&self, tileset: &TilesetId, bytes: u64) {
        self.update(tileset, |c| {
            Counters::add(&c.tiles_loaded, 1);
            Counters::add(&c.bytes_resident, bytes);
        });
    }

    /// A tile failed permanently.
    pub fn record_failure(&self, tileset: &TilesetId) {
        self.update(tileset, |c| Counters::add(&c.tiles_failed, 1));
    }

    /// A tile left the cache.
    pub fn record_eviction(&self, tileset: &TilesetId, bytes: u64) {
        self.update(tileset, |c| {
            Counters::add(&c.tiles_evicted, 1);
            Counters::sub(&c.bytes_resident, bytes);
        });
    }

    pub fn record_retry(&self, tileset: &TilesetId) {
        self.update(tileset, |c| Counters::add(&c.load_retries, 1));
    }

    pub fn record_cancellation(&self, tileset: &TilesetId) {
        self.update(tileset, |c| Counters::add(&c.cancellations, 1));
    }

    /// Stores the selected/requested counts of the latest pass over a tileset.
    ///
    /// Totals for these two gauges are summed over tilesets at snapshot time.
    pub fn record_traversal(&self, tileset: &TilesetId, selected: usize, requested: usize) {
        let entry = self.per_tileset.entry(tileset.clone()).or_default();
        entry.last_selected.store(selected as u64, Ordering::Relaxed);
        entry.last_requested.store(requested as u64, Ordering::Relaxed);
    }

    /// Counts one completed traversal pass over all tilesets.
    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops a removed tileset's breakdown. Totals keep their history.
    pub fn forget_tileset(&self, tileset: &TilesetId) {
        self.per_tileset.remove(tileset);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> TilesetStats {
        let per_tileset: std::collections::BTreeMap<_, _> = self
            .per_tileset
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();

        let mut totals = self.totals.snapshot();
        totals.last_selected = per_tileset.values().map(|c| c.last_selected).sum();
        totals.last_requested = per_tileset.values().map(|c| c.last_requested).sum();

        TilesetStats {
            totals,
            per_tileset,
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_load_and_eviction_track_resident_bytes() {
        let stats = StatsAggregator::new();
        let a = TilesetId::new("a");
        let b = TilesetId::new("b");

        stats.record_load(&a, 100);
        stats.record_load(&b, 50);
        stats.record_eviction(&a, 40);
        stats.record_failure(&b);

        let snap = stats.snapshot();
        assert_eq!(snap.totals.tiles_loaded, 2);
        assert_eq!(snap.totals.bytes_resident, 110);
        assert_eq!(snap.totals.tiles_evicted, 1);
        assert_eq!(snap.totals.tiles_failed, 1);
        assert_eq!(snap.tileset(&a).unwrap().bytes_resident, 60);
        assert_eq!(snap.tileset(&b).unwrap().tiles_failed, 1);
    }

    #[test]
    fn test_resident_bytes_never_underflow() {
        let stats = StatsAggregator::new();
        let a = TilesetId::new("a");
        stats.record_eviction(&a, 10);
        assert_eq!(stats.snapshot().totals.bytes_resident, 0);
    }

    #[test]
    fn test_traversal_gauges_are_summed() {
        let stats = StatsAggregator::new();
        stats.record_traversal(&TilesetId::new("a"), 3, 1);
        stats.record_traversal(&TilesetId::new("b"), 2, 4);
        stats.record_traversal(&TilesetId::new("a"), 5, 0);
        stats.record_pass();

        let snap = stats.snapshot();
        assert_eq!(snap.totals.last_selected, 7);
        assert_eq!(snap.totals.last_requested, 4);
        assert_eq!(snap.passes, 1);
    }

    #[test]
    fn test_forget_tileset_keeps_totals() {
        let stats = StatsAggregator::new();
        let a = TilesetId::new("a");
        stats.record_load(&a, 10);
        stats.record_retry(&a);
        stats.record_cancellation(&a);
        stats.forget_tileset(&a);

        let snap = stats.snapshot();
        assert!(snap.tileset(&a).is_none());
        assert_eq!(snap.totals.tiles_loaded, 1);
        assert_eq!(snap.totals.load_retries, 1);
        assert_eq!(snap.totals.cancellations, 1);
    }

    #[test]
    fn test_thread_safe_counting() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&stats);
                std::thread::spawn(move || {
                    let id = TilesetId::new(format!("t{}", i % 2));
                    for _ in 0..100 {
                        s.record_load(&id, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.totals.tiles_loaded, 800);
        assert_eq!(snap.per_tileset.len(), 2);
    }
}
