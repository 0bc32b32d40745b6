//! Tileset hierarchies: node model, flat arena storage, JSON documents,
//! attribute statistics and structural validation.
//!
//! # Example
//!
//! ```ignore
//! use lodstream::tileset::{load_tileset, LayerDescriptor};
//!
//! let layer = LayerDescriptor::new("buildings", "https://example.com/layers/0/tileset.json");
//! let (arena, metadata) = load_tileset(&layer, &fetcher).await?;
//! println!("{} nodes, depth {}", metadata.node_count, metadata.max_depth);
//! ```

mod arena;
mod document;
mod node;
mod statistics;
mod validate;

pub use arena::{ArenaBuilder, TileArena};
pub use document::{
    load_tileset, parse_document, resolve_content_url, DocumentInfo, LayerDescriptor,
    TilesetError, TilesetKind, TilesetMetadata,
};
pub use node::{NodeId, NodeIndex, TileNode, TilesetId};
pub use statistics::{
    parse_statistics, AttributeStatistics, Histogram, StatisticsCache, StatisticsError,
    StatisticsRef, ValueCount,
};
pub use validate::{validate_arena, validate_content, validate_node, TileWarning};
