//! Screen-space-error traversal of a tileset hierarchy.
//!
//! One pass walks a hierarchy depth-first from its root and decides, per
//! node, whether it is pruned (outside the frustum), rendered as is
//! (detailed enough, or a leaf), or refined into its children.
//!
//! # Screen-space error
//!
//! ```text
//! sse = geometric_error × screen_height / (distance × sse_denominator)
//! sse_denominator = 2 · tan(fovy / 2)
//! ```
//!
//! A node whose `sse` is at or below `maximum_screen_space_error` is drawn
//! without refining further.
//!
//! # Refinement with interim fallback
//!
//! When a node is refined while some content its visible children would draw
//! is not resident yet, the node itself stays selected (or is requested) so
//! the view has no holes while children stream in. Children without content
//! are looked through to the descendants that replace them.
//!
//! Traversal is synchronous and deterministic: identical hierarchy, cache
//! contents and view always yield identical results.

use crate::cache::ResidentCache;
use crate::geometry::{Frustum, Vec3};
use crate::scheduler::LoadPriority;
use crate::tileset::{NodeId, NodeIndex, TileArena, TileNode};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::trace;

/// Default pixel error budget.
pub const DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR: f64 = 16.0;

/// Distances below this are clamped so a camera inside a volume does not
/// divide by zero.
const MIN_DISTANCE: f64 = 1.0e-3;

// =============================================================================
// View state
// =============================================================================

/// Camera parameters for one traversal pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub position: Vec3,
    pub frustum: Frustum,
    /// Viewport height in pixels.
    pub screen_height: f64,
    /// `2 · tan(fovy / 2)`.
    pub sse_denominator: f64,
    pub maximum_screen_space_error: f64,
}

impl ViewState {
    /// View from explicit frustum planes and a vertical field of view in
    /// radians.
    pub fn new(position: Vec3, frustum: Frustum, screen_height: f64, fovy: f64) -> Self {
        Self {
            position,
            frustum,
            screen_height,
            sse_denominator: 2.0 * (fovy * 0.5).tan(),
            maximum_screen_space_error: DEFAULT_MAXIMUM_SCREEN_SPACE_ERROR,
        }
    }

    /// Perspective camera looking along `direction`.
    pub fn perspective(
        position: Vec3,
        direction: Vec3,
        up: Vec3,
        fovy: f64,
        aspect: f64,
        screen_height: f64,
    ) -> Self {
        let frustum = Frustum::perspective(position, direction, up, fovy, aspect, 1.0, 1.0e8);
        Self::new(position, frustum, screen_height, fovy)
    }

    pub fn with_maximum_screen_space_error(mut self, pixels: f64) -> Self {
        self.maximum_screen_space_error = pixels;
        self
    }

    /// Projected size in pixels of `geometric_error` seen from `distance`.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        geometric_error * self.screen_height / (distance.max(MIN_DISTANCE) * self.sse_denominator)
    }
}

// =============================================================================
// Results
// =============================================================================

/// A node that should be loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRequest {
    pub url: String,
    pub priority: LoadPriority,
    pub depth: usize,
}

/// Malformed hierarchy detected during a pass. Only the affected subtree is
/// skipped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TraversalError {
    #[error("node {node} has no bounding volume")]
    MissingBoundingVolume { node: NodeId },

    #[error("node {parent} references missing child {index}")]
    DanglingChild { parent: NodeId, index: u32 },
}

/// Outcome of one traversal pass over one hierarchy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraversalResult {
    /// Nodes to render now. Every one is resident.
    pub selected: BTreeSet<NodeId>,
    /// Nodes that should be loaded, with their load priority.
    pub requested: BTreeMap<NodeId, TileRequest>,
    pub errors: Vec<TraversalError>,
    pub visited: usize,
    pub culled: usize,
}

impl TraversalResult {
    /// Folds another hierarchy's result into this one.
    pub fn merge(&mut self, other: TraversalResult) {
        self.selected.extend(other.selected);
        self.requested.extend(other.requested);
        self.errors.extend(other.errors);
        self.visited += other.visited;
        self.culled += other.culled;
    }
}

// =============================================================================
// Traversal
// =============================================================================

/// Runs one pass over `arena` for `view`, reading residency from `cache`.
pub fn traverse(arena: &TileArena, view: &ViewState, cache: &ResidentCache) -> TraversalResult {
    let mut result = TraversalResult::default();
    if arena.is_empty() {
        return result;
    }

    let mut stack = vec![arena.root()];
    while let Some(index) = stack.pop() {
        let Some(node) = arena.get(index) else {
            continue;
        };
        result.visited += 1;

        let Some(volume) = node.bounding_volume.as_ref() else {
            result.errors.push(TraversalError::MissingBoundingVolume {
                node: node.id.clone(),
            });
            continue;
        };
        if !view.frustum.intersects(volume) {
            result.culled += 1;
            continue;
        }

        let distance = volume.distance_to(view.position);
        let sse = view.screen_space_error(node.geometric_error, distance);
        trace!(node = %node.id, sse, distance, "Visit");

        if sse <= view.maximum_screen_space_error || node.children.is_empty() {
            if node.has_content() {
                select_or_request(node, distance, cache, &mut result);
            }
            continue;
        }

        let mut children_ready = true;
        let mut children = Vec::with_capacity(node.children.len());
        for &child_index in &node.children {
            if arena.get(child_index).is_none() {
                result.errors.push(TraversalError::DanglingChild {
                    parent: node.id.clone(),
                    index: child_index.0,
                });
                continue;
            }
            if children_ready
                && node.has_content()
                && !subtree_ready(arena, child_index, view, cache)
            {
                children_ready = false;
            }
            children.push(child_index);
        }

        if node.has_content() && !children_ready {
            select_or_request(node, distance, cache, &mut result);
        }

        // Reverse so children are visited in document order
        stack.extend(children.into_iter().rev());
    }
    result
}

/// Whether everything the subtree at `index` would draw this pass is
/// resident. A node without content that refines is only as ready as its
/// visible descendants; one that does not refine draws nothing.
fn subtree_ready(
    arena: &TileArena,
    index: NodeIndex,
    view: &ViewState,
    cache: &ResidentCache,
) -> bool {
    let mut stack = vec![index];
    while let Some(index) = stack.pop() {
        let Some(node) = arena.get(index) else {
            continue;
        };
        let Some(volume) = node.bounding_volume.as_ref() else {
            continue;
        };
        if !view.frustum.intersects(volume) {
            continue;
        }
        if node.has_content() {
            if !cache.contains(&node.id) {
                return false;
            }
            continue;
        }
        let sse = view.screen_space_error(node.geometric_error, volume.distance_to(view.position));
        if sse > view.maximum_screen_space_error {
            stack.extend(node.children.iter().copied());
        }
    }
    true
}

fn select_or_request(
    node: &TileNode,
    distance: f64,
    cache: &ResidentCache,
    result: &mut TraversalResult,
) {
    if cache.contains(&node.id) {
        result.selected.insert(node.id.clone());
    } else if let Some(url) = &node.content_url {
        result.requested.insert(
            node.id.clone(),
            TileRequest {
                url: url.clone(),
                priority: LoadPriority::new(distance, node.geometric_error),
                depth: node.depth(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingVolume;
    use crate::loader::DecodedContent;
    use crate::tileset::ArenaBuilder;
    use std::sync::Arc;

    /// Camera 1000 m away on +z looking at the origin.
    fn view() -> ViewState {
        ViewState::perspective(
            Vec3::new(0.0, 0.0, 1000.0),
            -Vec3::Z,
            Vec3::Y,
            60f64.to_radians(),
            1.0,
            1000.0,
        )
    }

    fn sphere(x: f64, r: f64) -> Option<BoundingVolume> {
        Some(BoundingVolume::sphere(Vec3::new(x, 0.0, 0.0), r))
    }

    /// Root (ge 100, content) with two children (ge 10, content).
    fn two_level() -> TileArena {
        let mut b = ArenaBuilder::new("t", sphere(0.0, 200.0), 100.0, Some("root"));
        let root = b.root();
        b.add_child(root, sphere(-100.0, 100.0), 10.0, Some("c0"));
        b.add_child(root, sphere(100.0, 100.0), 10.0, Some("c1"));
        b.build()
    }

    fn id(path: &str) -> NodeId {
        NodeId::new("t".into(), path)
    }

    fn resident(paths: &[&str]) -> ResidentCache {
        let mut cache = ResidentCache::new();
        for p in paths {
            cache.insert(id(p), Arc::new(DecodedContent::default()));
        }
        cache
    }

    #[test]
    fn test_screen_space_error_formula() {
        let v = ViewState::new(Vec3::ZERO, Frustum::unbounded(), 1000.0, 90f64.to_radians());
        // denominator = 2·tan(45°) = 2
        assert!((v.sse_denominator - 2.0).abs() < 1e-12);
        assert!((v.screen_space_error(10.0, 100.0) - 50.0).abs() < 1e-9);
        assert!(v.screen_space_error(10.0, 0.0).is_finite());
    }

    #[test]
    fn test_refine_with_fallback_then_replace() {
        let arena = two_level();
        let view = view();

        // Root: 100·1000 / (800·1.1547) ≈ 108 px, children ≈ 11 px
        let first = traverse(&arena, &view, &ResidentCache::new());
        assert!(first.selected.is_empty());
        let requested: Vec<_> = first.requested.keys().map(|k| k.path().to_string()).collect();
        assert_eq!(requested, vec!["0", "0/0", "0/1"]);

        let second = traverse(&arena, &view, &resident(&["0/0", "0/1"]));
        assert_eq!(
            second.selected.iter().map(|k| k.path()).collect::<Vec<_>>(),
            vec!["0/0", "0/1"]
        );
        assert!(second.requested.is_empty());
    }

    #[test]
    fn test_resident_parent_stays_selected_while_children_stream() {
        let arena = two_level();
        let result = traverse(&arena, &view(), &resident(&["0", "0/0"]));
        assert!(result.selected.contains(&id("0")));
        assert!(result.selected.contains(&id("0/0")));
        assert_eq!(result.requested.keys().cloned().collect::<Vec<_>>(), vec![id("0/1")]);
    }

    /// Resident root refining through a content-less node whose children
    /// carry content.
    fn hollow_middle() -> TileArena {
        let mut b = ArenaBuilder::new("t", sphere(0.0, 200.0), 100.0, Some("root"));
        let root = b.root();
        let middle = b.add_child(root, sphere(0.0, 100.0), 50.0, None);
        b.add_child(middle, sphere(-50.0, 40.0), 1.0, Some("g0"));
        b.add_child(middle, sphere(50.0, 40.0), 1.0, Some("g1"));
        b.build()
    }

    #[test]
    fn test_resident_parent_covers_empty_intermediate_node() {
        let arena = hollow_middle();

        let streaming = traverse(&arena, &view(), &resident(&["0"]));
        assert_eq!(streaming.selected.iter().cloned().collect::<Vec<_>>(), vec![id("0")]);
        assert_eq!(
            streaming.requested.keys().cloned().collect::<Vec<_>>(),
            vec![id("0/0/0"), id("0/0/1")]
        );

        let partial = traverse(&arena, &view(), &resident(&["0", "0/0/1"]));
        assert!(partial.selected.contains(&id("0")));
        assert!(partial.selected.contains(&id("0/0/1")));

        let loaded = traverse(&arena, &view(), &resident(&["0", "0/0/0", "0/0/1"]));
        assert_eq!(
            loaded.selected.iter().cloned().collect::<Vec<_>>(),
            vec![id("0/0/0"), id("0/0/1")]
        );
        assert!(loaded.requested.is_empty());
    }

    #[test]
    fn test_low_error_root_is_not_refined() {
        let mut b = ArenaBuilder::new("t", sphere(0.0, 200.0), 1.0, Some("root"));
        let root = b.root();
        b.add_child(root, sphere(0.0, 10.0), 0.5, Some("c"));
        let arena = b.build();

        let result = traverse(&arena, &view(), &ResidentCache::new());
        assert_eq!(result.requested.keys().cloned().collect::<Vec<_>>(), vec![id("0")]);
        assert_eq!(result.visited, 1);
    }

    #[test]
    fn test_frustum_culling_prunes_subtree() {
        let mut b = ArenaBuilder::new("t", sphere(0.0, 200.0), 100.0, None);
        let root = b.root();
        let behind = b.add_child(root, Some(BoundingVolume::sphere(Vec3::new(0.0, 0.0, 5000.0), 10.0)), 10.0, Some("x"));
        b.add_child(behind, sphere(0.0, 1.0), 1.0, Some("y"));
        b.add_child(root, sphere(0.0, 100.0), 10.0, Some("z"));
        let arena = b.build();

        let result = traverse(&arena, &view(), &ResidentCache::new());
        assert_eq!(result.culled, 1);
        assert_eq!(result.requested.keys().cloned().collect::<Vec<_>>(), vec![id("0/1")]);
    }

    #[test]
    fn test_empty_leaf_is_never_requested() {
        let arena = ArenaBuilder::new("t", sphere(0.0, 10.0), 0.0, None).build();
        let result = traverse(&arena, &view(), &ResidentCache::new());
        assert!(result.requested.is_empty());
        assert!(result.selected.is_empty());
    }

    #[test]
    fn test_malformed_subtrees_are_skipped_not_fatal() {
        let mut b = ArenaBuilder::new("t", sphere(0.0, 200.0), 100.0, None);
        let root = b.root();
        let broken = b.add_child(root, None, 10.0, Some("broken"));
        b.add_child(broken, sphere(0.0, 1.0), 1.0, Some("under-broken"));
        b.add_dangling_child(root, NodeIndex(99));
        b.add_child(root, sphere(0.0, 100.0), 10.0, Some("ok"));
        let arena = b.build();

        let result = traverse(&arena, &view(), &ResidentCache::new());
        assert_eq!(
            result.errors,
            vec![
                TraversalError::DanglingChild {
                    parent: id("0"),
                    index: 99
                },
                TraversalError::MissingBoundingVolume { node: id("0/0") },
            ]
        );
        // Dangling references still consume a child slot in the path
        assert_eq!(result.requested.keys().cloned().collect::<Vec<_>>(), vec![id("0/2")]);
    }

    #[test]
    fn test_priority_orders_closer_tiles_first() {
        let arena = two_level();
        let result = traverse(&arena, &view(), &ResidentCache::new());
        let root = &result.requested[&id("0")];
        let child = &result.requested[&id("0/0")];
        assert!(root.priority > child.priority, "root volume is closer to the camera");
        assert_eq!(child.depth, 1);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Random hierarchy: each entry attaches a node under an earlier one.
        fn arena_from(layout: &[(usize, f64, f64, bool)]) -> TileArena {
            let mut b = ArenaBuilder::new("t", sphere(0.0, 500.0), 200.0, Some("root"));
            let mut indices = vec![b.root()];
            for (i, (parent, x, ge, content)) in layout.iter().enumerate() {
                let parent = indices[parent % indices.len()];
                let url = format!("n{}", i);
                let idx = b.add_child(
                    parent,
                    sphere(*x, 50.0),
                    *ge,
                    content.then_some(url.as_str()),
                );
                indices.push(idx);
            }
            b.build()
        }

        proptest! {
            #[test]
            fn test_traversal_is_deterministic_and_never_selects_ghosts(
                layout in prop::collection::vec((0usize..64, -800.0f64..800.0, 0.0f64..150.0, any::<bool>()), 0..40),
                resident_mask in prop::collection::vec(any::<bool>(), 41),
                distance in 10.0f64..5000.0,
            ) {
                let arena = arena_from(&layout);
                let mut cache = ResidentCache::new();
                for ((_, node), keep) in arena.iter().zip(resident_mask.iter()) {
                    if *keep {
                        cache.insert(node.id.clone(), Arc::new(DecodedContent::default()));
                    }
                }
                let view = ViewState::perspective(
                    Vec3::new(0.0, 0.0, distance),
                    -Vec3::Z,
                    Vec3::Y,
                    60f64.to_radians(),
                    1.5,
                    900.0,
                );

                let a = traverse(&arena, &view, &cache);
                let b = traverse(&arena, &view, &cache);
                prop_assert_eq!(&a, &b);
                prop_assert!(a.selected.iter().all(|id| cache.contains(id)));
                prop_assert!(a.requested.keys().all(|id| !cache.contains(id)));
                prop_assert!(a.requested.keys().all(|id| arena.get_by_id(id).is_some_and(|n| n.has_content())));
            }
        }
    }
}
