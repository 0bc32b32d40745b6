//! Resident tile cache with a shared memory budget.
//!
//! The cache owns every decoded tile currently held in memory. Entries age by
//! *generation*: each traversal pass begins a new generation, and every tile
//! selected in that pass is stamped with it. Eviction removes the tiles with
//! the oldest stamps first.
//!
//! # Invariants
//!
//! - After [`ResidentCache::evict_to`] the resident bytes are within budget,
//!   unless the tiles selected in the current pass alone exceed it. Those are
//!   never evicted within their pass; the overshoot is reported as a
//!   [`BudgetExceeded`] warning instead.
//! - All tilesets share one budget and compete purely by recency.
//!
//! # Example
//!
//! ```ignore
//! let mut cache = ResidentCache::new();
//! let generation = cache.begin_pass();
//! cache.insert(node_id.clone(), Arc::new(content));
//! cache.mark_selected(&node_id, generation);
//! let report = cache.evict_to(512 * 1024 * 1024);
//! ```

use crate::loader::DecodedContent;
use crate::tileset::{NodeId, TilesetId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Monotonically increasing traversal pass identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// One decoded tile held in memory.
#[derive(Clone, Debug)]
pub struct ResidentTile {
    pub node_id: NodeId,
    pub content: Arc<DecodedContent>,
    pub byte_size: u64,
    pub last_selected: Generation,
}

/// Raised when the tiles protected by the current pass cannot fit the budget.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("resident tiles use {resident_bytes} bytes, budget is {budget_bytes} ({protected} tiles pinned by the current pass)")]
pub struct BudgetExceeded {
    pub resident_bytes: u64,
    pub budget_bytes: u64,
    pub protected: usize,
}

/// Outcome of [`ResidentCache::evict_to`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvictionReport {
    /// Evicted tiles with the bytes each released, in eviction order.
    pub evicted: Vec<(NodeId, u64)>,
    pub bytes_freed: u64,
    pub budget_exceeded: Option<BudgetExceeded>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.budget_exceeded.is_none()
    }
}

/// Owns decoded tile content, keyed by node identity.
///
/// Mutated only from the engine's control flow; not thread-safe by itself.
#[derive(Debug, Default)]
pub struct ResidentCache {
    entries: HashMap<NodeId, ResidentTile>,
    total_bytes: u64,
    generation: Generation,
}

impl ResidentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new traversal pass and returns its generation.
    pub fn begin_pass(&mut self) -> Generation {
        self.generation = Generation(self.generation.0 + 1);
        self.generation
    }

    pub fn current_generation(&self) -> Generation {
        self.generation
    }

    /// Registers decoded content, replacing any previous entry for the node.
    ///
    /// New entries are stamped with the current generation so they survive
    /// the pass that requested them.
    pub fn insert(&mut self, node_id: NodeId, content: Arc<DecodedContent>) -> Option<ResidentTile> {
        let byte_size = content.byte_size();
        let tile = ResidentTile {
            node_id: node_id.clone(),
            content,
            byte_size,
            last_selected: self.generation,
        };
        self.total_bytes += byte_size;
        let previous = self.entries.insert(node_id, tile);
        if let Some(prev) = &previous {
            self.total_bytes -= prev.byte_size;
        }
        previous
    }

    /// Stamps a resident tile as selected in `generation`.
    ///
    /// Returns false if the node is not resident.
    pub fn mark_selected(&mut self, node_id: &NodeId, generation: Generation) -> bool {
        match self.entries.get_mut(node_id) {
            Some(tile) => {
                tile.last_selected = tile.last_selected.max(generation);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<&Arc<DecodedContent>> {
        self.entries.get(node_id).map(|t| &t.content)
    }

    pub fn tile(&self, node_id: &NodeId) -> Option<&ResidentTile> {
        self.entries.get(node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.entries.contains_key(node_id)
    }

    pub fn remove(&mut self, node_id: &NodeId) -> Option<ResidentTile> {
        let tile = self.entries.remove(node_id)?;
        self.total_bytes -= tile.byte_size;
        Some(tile)
    }

    /// Drops every tile of a tileset (layer removed).
    pub fn remove_tileset(&mut self, tileset: &TilesetId) -> Vec<ResidentTile> {
        let ids: Vec<NodeId> = self
            .entries
            .keys()
            .filter(|id| id.tileset() == tileset)
            .cloned()
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Evicts least-recently-selected tiles until resident bytes fit
    /// `budget_bytes`.
    ///
    /// Order: ascending last-selected generation, ties by node id. Tiles of
    /// the current generation are never evicted.
    pub fn evict_to(&mut self, budget_bytes: u64) -> EvictionReport {
        let mut report = EvictionReport::default();
        if self.total_bytes <= budget_bytes {
            return report;
        }

        let mut candidates: Vec<(Generation, NodeId)> = self
            .entries
            .values()
            .filter(|t| t.last_selected < self.generation)
            .map(|t| (t.last_selected, t.node_id.clone()))
            .collect();
        candidates.sort();

        for (_, node_id) in candidates {
            if self.total_bytes <= budget_bytes {
                break;
            }
            if let Some(tile) = self.remove(&node_id) {
                debug!(node = %node_id, bytes = tile.byte_size, last_selected = %tile.last_selected, "Evicted tile");
                report.bytes_freed += tile.byte_size;
                report.evicted.push((node_id, tile.byte_size));
            }
        }

        if self.total_bytes > budget_bytes {
            let exceeded = BudgetExceeded {
                resident_bytes: self.total_bytes,
                budget_bytes,
                protected: self.entries.len(),
            };
            warn!("{}", exceeded);
            report.budget_exceeded = Some(exceeded);
        }
        report
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResidentTile> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Content occupying `36 * vertices` bytes.
    fn content(vertices: usize) -> Arc<DecodedContent> {
        Arc::new(DecodedContent {
            positions: vec![[0.0; 3]; vertices],
            ..Default::default()
        })
    }

    fn id(path: &str) -> NodeId {
        NodeId::new(TilesetId::new("t"), path)
    }

    #[test]
    fn test_insert_tracks_bytes_and_replacement() {
        let mut cache = ResidentCache::new();
        assert!(cache.insert(id("0"), content(10)).is_none());
        assert_eq!(cache.total_bytes(), 360);
        let prev = cache.insert(id("0"), content(1)).unwrap();
        assert_eq!(prev.byte_size, 360);
        assert_eq!(cache.total_bytes(), 36);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_selected_first() {
        let mut cache = ResidentCache::new();
        let g1 = cache.begin_pass();
        cache.insert(id("a"), content(10));
        cache.insert(id("b"), content(10));
        cache.insert(id("c"), content(10));
        cache.mark_selected(&id("a"), g1);

        let g2 = cache.begin_pass();
        cache.mark_selected(&id("b"), g2);
        let g3 = cache.begin_pass();
        cache.mark_selected(&id("c"), g3);

        // a (gen1) goes before b (gen2); c is protected
        let report = cache.evict_to(400);
        assert_eq!(report.evicted, vec![(id("a"), 360), (id("b"), 360)]);
        assert_eq!(report.bytes_freed, 720);
        assert!(report.budget_exceeded.is_none());
        assert!(cache.contains(&id("c")));
        assert_eq!(cache.total_bytes(), 360);
    }

    #[test]
    fn test_current_generation_is_never_evicted() {
        let mut cache = ResidentCache::new();
        let g = cache.begin_pass();
        cache.insert(id("big"), content(100));
        cache.mark_selected(&id("big"), g);

        let report = cache.evict_to(100);
        assert!(report.evicted.is_empty());
        let warning = report.budget_exceeded.unwrap();
        assert_eq!(warning.resident_bytes, 3600);
        assert_eq!(warning.protected, 1);
        assert!(cache.contains(&id("big")));
    }

    #[test]
    fn test_oversized_stale_tile_is_evicted_next_pass() {
        let mut cache = ResidentCache::new();
        cache.begin_pass();
        cache.insert(id("big"), content(100));
        cache.begin_pass();
        let report = cache.evict_to(100);
        assert_eq!(report.evicted.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_under_budget_is_noop() {
        let mut cache = ResidentCache::new();
        cache.insert(id("a"), content(1));
        cache.begin_pass();
        assert!(cache.evict_to(1_000).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mark_selected_never_moves_backwards() {
        let mut cache = ResidentCache::new();
        cache.begin_pass();
        let g2 = cache.begin_pass();
        cache.insert(id("a"), content(1));
        assert!(cache.mark_selected(&id("a"), Generation(1)));
        assert_eq!(cache.tile(&id("a")).unwrap().last_selected, g2);
        assert!(!cache.mark_selected(&id("missing"), g2));
    }

    #[test]
    fn test_remove_tileset() {
        let mut cache = ResidentCache::new();
        cache.insert(id("a"), content(1));
        cache.insert(NodeId::new(TilesetId::new("other"), "0"), content(2));
        let removed = cache.remove_tileset(&TilesetId::new("t"));
        assert_eq!(removed.len(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 72);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_eviction_respects_budget_or_protection(
                tiles in prop::collection::vec((1usize..50, 0u64..5), 0..40),
                budget in 0u64..20_000,
            ) {
                let mut cache = ResidentCache::new();
                for _ in 0..5 {
                    cache.begin_pass();
                }
                for (i, (vertices, generation)) in tiles.iter().enumerate() {
                    let node = id(&format!("0/{}", i));
                    cache.insert(node.clone(), content(*vertices));
                    // Reset the insertion stamp, then apply the chosen one
                    if let Some(tile) = cache.entries.get_mut(&node) {
                        tile.last_selected = Generation(*generation);
                    }
                }
                let current = cache.begin_pass();
                cache.evict_to(budget);

                let sum: u64 = cache.iter().map(|t| t.byte_size).sum();
                prop_assert_eq!(sum, cache.total_bytes());
                prop_assert!(cache.total_bytes() <= budget);
                prop_assert!(cache.iter().all(|t| t.last_selected < current));
            }

            #[test]
            fn test_protected_tiles_survive(
                protected in prop::collection::vec(1usize..50, 1..10),
                budget in 0u64..5_000,
            ) {
                let mut cache = ResidentCache::new();
                let g = cache.begin_pass();
                for (i, vertices) in protected.iter().enumerate() {
                    let node = id(&format!("0/{}", i));
                    cache.insert(node.clone(), content(*vertices));
                    cache.mark_selected(&node, g);
                }
                let report = cache.evict_to(budget);
                prop_assert_eq!(cache.len(), protected.len());
                prop_assert_eq!(report.budget_exceeded.is_some(), cache.total_bytes() > budget);
            }
        }
    }
}
