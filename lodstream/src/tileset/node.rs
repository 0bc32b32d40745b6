//! Tile node model and identifiers.

use crate::geometry::BoundingVolume;
use std::fmt;
use std::sync::Arc;

/// Identifies one loaded tileset (one active layer).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TilesetId(Arc<str>);

impl TilesetId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TilesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TilesetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable identity of a tile node: its tileset plus its path within the
/// hierarchy (`"0"` for the root, `"0/2/1"` for the second child of the
/// third child of the root).
///
/// Cloning is cheap; both parts are reference counted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    tileset: TilesetId,
    path: Arc<str>,
}

impl NodeId {
    pub fn new(tileset: TilesetId, path: impl AsRef<str>) -> Self {
        Self {
            tileset,
            path: Arc::from(path.as_ref()),
        }
    }

    /// Identity of the `child_index`-th child of this node.
    pub fn child(&self, child_index: usize) -> Self {
        Self::new(self.tileset.clone(), format!("{}/{}", self.path, child_index))
    }

    pub fn tileset(&self) -> &TilesetId {
        &self.tileset
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of edges between this node and the root.
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tileset, self.path)
    }
}

/// Index of a node inside its [`TileArena`](super::TileArena).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One node of a tileset's spatial hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct TileNode {
    pub id: NodeId,
    /// Missing only in malformed documents; traversal skips such subtrees.
    pub bounding_volume: Option<BoundingVolume>,
    /// Geometric error in metres. Non-increasing toward the leaves.
    pub geometric_error: f64,
    /// Absolute URL of the node's payload. `None` for empty nodes.
    pub content_url: Option<String>,
    pub parent: Option<NodeIndex>,
    /// Ordered child references. A reference may point outside the arena
    /// when the document is malformed.
    pub children: Vec<NodeIndex>,
}

impl TileNode {
    pub fn has_content(&self) -> bool {
        self.content_url.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.id.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_child_paths() {
        let root = NodeId::new(TilesetId::new("city"), "0");
        let grandchild = root.child(2).child(1);
        assert_eq!(grandchild.path(), "0/2/1");
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(root.depth(), 0);
        assert_eq!(grandchild.to_string(), "city:0/2/1");
    }

    #[test]
    fn test_node_ids_order_by_tileset_then_path() {
        let a = NodeId::new(TilesetId::new("a"), "0/1");
        let b = NodeId::new(TilesetId::new("b"), "0");
        assert!(a < b);
        assert!(NodeId::new(TilesetId::new("a"), "0") < a);
    }
}
