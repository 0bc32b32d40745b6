//! Flat storage for a tileset hierarchy.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeIndex`]; the parent
//! link is a plain index, never an owning pointer.

use super::node::{NodeId, NodeIndex, TileNode, TilesetId};
use crate::geometry::BoundingVolume;
use std::collections::HashMap;

/// One tileset's hierarchy.
#[derive(Clone, Debug)]
pub struct TileArena {
    tileset: TilesetId,
    nodes: Vec<TileNode>,
    by_id: HashMap<NodeId, NodeIndex>,
}

impl TileArena {
    pub fn tileset_id(&self) -> &TilesetId {
        &self.tileset
    }

    /// The root node is always at index 0.
    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    pub fn get(&self, index: NodeIndex) -> Option<&TileNode> {
        self.nodes.get(index.as_usize())
    }

    pub fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.by_id.get(id).copied()
    }

    pub fn get_by_id(&self, id: &NodeId) -> Option<&TileNode> {
        self.index_of(id).and_then(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &TileNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex(i as u32), n))
    }

    /// Parent node of `index`, if any.
    pub fn parent(&self, index: NodeIndex) -> Option<&TileNode> {
        self.get(index)?.parent.and_then(|p| self.get(p))
    }

    /// Number of nodes carrying content.
    pub fn content_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.has_content()).count()
    }

    /// Deepest node depth (root = 0).
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth()).max().unwrap_or(0)
    }
}

/// Incrementally builds a [`TileArena`], assigning hierarchical node ids.
///
/// # Example
///
/// ```ignore
/// let mut builder = ArenaBuilder::new("city", BoundingVolume::sphere(Vec3::ZERO, 100.0), 100.0, Some("root.bin"));
/// let child = builder.add_child(builder.root(), Some(volume), 10.0, Some("child.bin"));
/// let arena = builder.build();
/// ```
#[derive(Debug)]
pub struct ArenaBuilder {
    tileset: TilesetId,
    nodes: Vec<TileNode>,
}

impl ArenaBuilder {
    /// Starts a hierarchy with its root node.
    pub fn new(
        tileset: impl Into<TilesetId>,
        bounding_volume: Option<BoundingVolume>,
        geometric_error: f64,
        content_url: Option<&str>,
    ) -> Self {
        let tileset = tileset.into();
        let root = TileNode {
            id: NodeId::new(tileset.clone(), "0"),
            bounding_volume,
            geometric_error,
            content_url: content_url.map(str::to_string),
            parent: None,
            children: Vec::new(),
        };
        Self {
            tileset,
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeIndex {
        NodeIndex(0)
    }

    /// Appends a child under `parent` and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was not produced by this builder.
    pub fn add_child(
        &mut self,
        parent: NodeIndex,
        bounding_volume: Option<BoundingVolume>,
        geometric_error: f64,
        content_url: Option<&str>,
    ) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        let parent_node = &mut self.nodes[parent.as_usize()];
        let id = parent_node.id.child(parent_node.children.len());
        parent_node.children.push(index);
        self.nodes.push(TileNode {
            id,
            bounding_volume,
            geometric_error,
            content_url: content_url.map(str::to_string),
            parent: Some(parent),
            children: Vec::new(),
        });
        index
    }

    /// Records a child reference that does not resolve to a node.
    pub fn add_dangling_child(&mut self, parent: NodeIndex, missing: NodeIndex) {
        self.nodes[parent.as_usize()].children.push(missing);
    }

    pub fn build(self) -> TileArena {
        let by_id = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), NodeIndex(i as u32)))
            .collect();
        TileArena {
            tileset: self.tileset,
            nodes: self.nodes,
            by_id,
        }
    }
}
