//! Outbound notifications.

use crate::loader::{DecodedContent, LoadErrorKind};
use crate::tileset::{NodeId, TileWarning, TilesetError, TilesetId, TilesetMetadata};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Receives engine notifications. Every method defaults to a no-op.
///
/// Callbacks run synchronously on the engine's control flow, in the order the
/// underlying events were applied; keep them short.
pub trait EngineEvents: Send + Sync {
    /// A tile's content entered the resident cache.
    fn on_tile_load(&self, _node_id: &NodeId, _content: &Arc<DecodedContent>) {}

    /// A layer's hierarchy is ready for traversal.
    fn on_tileset_load(&self, _tileset: &TilesetId, _metadata: &TilesetMetadata) {}

    /// A layer's document could not be loaded; the layer is dropped.
    fn on_tileset_error(&self, _tileset: &TilesetId, _error: &TilesetError) {}

    /// A view pass finished; `selected` is the complete render set.
    fn on_traversal_complete(&self, _selected: &BTreeSet<NodeId>) {}

    /// A tile failed permanently and will not be requested again this session.
    fn on_load_error(&self, _node_id: &NodeId, _kind: LoadErrorKind) {}

    /// Validation found problems with a tile.
    fn on_tile_warnings(&self, _node_id: &NodeId, _warnings: &[TileWarning]) {}
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;

impl EngineEvents for NoopEvents {}
