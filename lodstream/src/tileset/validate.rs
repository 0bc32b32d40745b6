//! Structural and content checks for individual tiles.
//!
//! Warnings are informational: they feed diagnostics and never change what
//! the traversal selects.

use super::arena::TileArena;
use super::node::{NodeIndex, TileNode};
use crate::geometry::Vec3;
use crate::loader::DecodedContent;
use std::fmt;

/// Slack allowed when testing containment, relative to the outer volume's
/// bounding radius.
const CONTAINMENT_TOLERANCE: f64 = 0.01;

/// A problem found in one tile.
#[derive(Clone, Debug, PartialEq)]
pub enum TileWarning {
    /// A child is coarser than its parent.
    GeometricErrorIncreases { child_error: f64, parent_error: f64 },
    /// A child's bounding volume pokes out of its parent's.
    ChildVolumeOutsideParent,
    /// Some decoded vertices lie outside the node's bounding volume.
    VerticesOutsideVolume { outside: usize, total: usize },
    /// The payload decoded to zero vertices.
    EmptyGeometry,
}

impl fmt::Display for TileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileWarning::GeometricErrorIncreases {
                child_error,
                parent_error,
            } => write!(
                f,
                "geometric error {} exceeds parent's {}",
                child_error, parent_error
            ),
            TileWarning::ChildVolumeOutsideParent => {
                f.write_str("bounding volume is not contained in parent's")
            }
            TileWarning::VerticesOutsideVolume { outside, total } => write!(
                f,
                "{} of {} vertices lie outside the bounding volume",
                outside, total
            ),
            TileWarning::EmptyGeometry => f.write_str("content has no geometry"),
        }
    }
}

/// Checks a node against its parent.
pub fn validate_node(arena: &TileArena, index: NodeIndex) -> Vec<TileWarning> {
    let mut warnings = Vec::new();
    let (Some(node), Some(parent)) = (arena.get(index), arena.parent(index)) else {
        return warnings;
    };

    if node.geometric_error > parent.geometric_error {
        warnings.push(TileWarning::GeometricErrorIncreases {
            child_error: node.geometric_error,
            parent_error: parent.geometric_error,
        });
    }

    if let (Some(inner), Some(outer)) = (&node.bounding_volume, &parent.bounding_volume) {
        let tolerance = outer.bounding_radius() * CONTAINMENT_TOLERANCE;
        if !outer.contains(inner, tolerance) {
            warnings.push(TileWarning::ChildVolumeOutsideParent);
        }
    }
    warnings
}

/// Checks decoded content against its node.
///
/// Vertex positions are offsets from the center of the node's volume.
pub fn validate_content(node: &TileNode, content: &DecodedContent) -> Vec<TileWarning> {
    let mut warnings = Vec::new();
    if content.vertex_count() == 0 {
        warnings.push(TileWarning::EmptyGeometry);
        return warnings;
    }

    if let Some(volume) = &node.bounding_volume {
        let center = volume.center();
        let tolerance = volume.bounding_radius() * CONTAINMENT_TOLERANCE;
        let outside = content
            .positions
            .iter()
            .map(|p| center + Vec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .filter(|p| !volume.contains_point(*p, tolerance))
            .count();
        if outside > 0 {
            warnings.push(TileWarning::VerticesOutsideVolume {
                outside,
                total: content.vertex_count(),
            });
        }
    }
    warnings
}

/// Runs [`validate_node`] over a whole hierarchy, keeping nodes with
/// warnings only.
pub fn validate_arena(arena: &TileArena) -> Vec<(NodeIndex, Vec<TileWarning>)> {
    arena
        .iter()
        .map(|(index, _)| (index, validate_node(arena, index)))
        .filter(|(_, w)| !w.is_empty())
        .collect()
}
