//! Messages sent from spawned work back to the control flow.

use crate::loader::{DecodedContent, LoadError};
use crate::scheduler::Ticket;
use crate::tileset::{NodeId, TileArena, TilesetError, TilesetId, TilesetMetadata};

#[derive(Debug)]
pub(crate) enum EngineMessage {
    /// One content load finished (successfully or not).
    TileLoaded {
        node_id: NodeId,
        ticket: Ticket,
        result: Result<DecodedContent, LoadError>,
    },
    /// A layer's document was fetched and parsed.
    TilesetLoaded {
        tileset: TilesetId,
        /// Matches the pending layer entry; a mismatch means the layer was
        /// removed (or re-added) meanwhile.
        seq: u64,
        token: Option<String>,
        result: Result<(TileArena, TilesetMetadata), TilesetError>,
    },
}
