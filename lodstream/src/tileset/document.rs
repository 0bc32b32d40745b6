//! Tileset documents: the JSON description of a hierarchy.
//!
//! A document lists every node once, flat, with children referenced by
//! index. How bounding volumes are spelled depends on the layer's
//! [`TilesetKind`]:
//!
//! - I3S: `mbs` is a minimum bounding sphere `[x, y, z, r]`, `obb` an
//!   oriented box with `center`, `halfSize` and a `quaternion`
//!   `[x, y, z, w]`. When both are present the box wins.
//! - 3D Tiles: `boundingVolume.sphere` is `[x, y, z, r]`,
//!   `boundingVolume.box` is a center followed by three half-axis vectors.
//!
//! ```json
//! {
//!   "name": "Buildings",
//!   "version": "1.7",
//!   "root": 0,
//!   "statisticsInfo": [
//!     { "name": "HEIGHT", "href": "statistics/f_3/0" }
//!   ],
//!   "nodes": [
//!     { "index": 0, "mbs": [0, 0, 0, 500], "geometricError": 100,
//!       "children": [1, 2] },
//!     { "index": 1, "mbs": [-100, 0, 0, 250], "geometricError": 10,
//!       "content": "nodes/1/geometries/0" }
//!   ]
//! }
//! ```

use super::arena::{ArenaBuilder, TileArena};
use super::node::{NodeIndex, TilesetId};
use super::statistics::StatisticsRef;
use crate::geometry::{BoundingVolume, OrientedBox, Vec3};
use crate::loader::{FetchError, Fetcher};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Kind of dataset behind a layer. Selects the bounding volume vocabulary
/// of its document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TilesetKind {
    #[default]
    I3s,
    #[serde(rename = "3d-tiles")]
    Tiles3d,
}

/// An active layer as handed over by the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub id: String,
    pub url: String,
    /// Opaque access token, forwarded with every request.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: TilesetKind,
}

impl LayerDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            token: None,
            kind: TilesetKind::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Summary reported when a tileset finishes loading.
#[derive(Clone, Debug, PartialEq)]
pub struct TilesetMetadata {
    pub id: TilesetId,
    pub name: Option<String>,
    pub version: Option<String>,
    pub url: String,
    pub kind: TilesetKind,
    pub node_count: usize,
    pub content_count: usize,
    pub max_depth: usize,
    /// Per-attribute statistics resources, in document order.
    pub statistics: Vec<StatisticsRef>,
}

/// Errors raised while loading a tileset document.
#[derive(Debug, Error)]
pub enum TilesetError {
    #[error("failed to fetch tileset document: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed tileset document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tileset document: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    root: u32,
    #[serde(default)]
    statistics_info: Vec<StatisticsRecord>,
    nodes: Vec<NodeRecord>,
}

#[derive(Debug, Deserialize)]
struct StatisticsRecord {
    name: String,
    href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRecord {
    index: u32,
    #[serde(default)]
    mbs: Option<[f64; 4]>,
    #[serde(default)]
    obb: Option<ObbRecord>,
    #[serde(default)]
    bounding_volume: Option<VolumeRecord>,
    #[serde(default)]
    geometric_error: f64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    children: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObbRecord {
    center: [f64; 3],
    half_size: [f64; 3],
    #[serde(default = "identity_quaternion")]
    quaternion: [f64; 4],
}

fn identity_quaternion() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// 3D Tiles `boundingVolume`.
#[derive(Debug, Deserialize)]
struct VolumeRecord {
    #[serde(default)]
    sphere: Option<[f64; 4]>,
    #[serde(default, rename = "box")]
    obb: Option<[f64; 12]>,
}

impl NodeRecord {
    fn bounding_volume(&self, kind: TilesetKind) -> Option<BoundingVolume> {
        let sphere = |[x, y, z, r]: [f64; 4]| BoundingVolume::sphere(Vec3::new(x, y, z), r);
        match kind {
            TilesetKind::I3s => {
                if let Some(obb) = &self.obb {
                    return Some(BoundingVolume::Box(OrientedBox::from_quaternion(
                        Vec3::from(obb.center),
                        obb.half_size,
                        obb.quaternion,
                    )));
                }
                self.mbs.map(sphere)
            }
            TilesetKind::Tiles3d => {
                let volume = self.bounding_volume.as_ref()?;
                if let Some(b) = volume.obb {
                    let axis = |i: usize| Vec3::new(b[i], b[i + 1], b[i + 2]);
                    return Some(BoundingVolume::Box(OrientedBox {
                        center: axis(0),
                        half_axes: [axis(3), axis(6), axis(9)],
                    }));
                }
                volume.sphere.map(sphere)
            }
        }
    }
}

/// Resolves a content reference against the document location.
///
/// Absolute URLs are returned untouched. HTTP(S) bases are joined as URLs,
/// anything else is treated as a filesystem path.
pub fn resolve_content_url(base: &str, reference: &str) -> String {
    if reference.contains("://") {
        return reference.to_string();
    }
    if let Ok(base_url) = reqwest::Url::parse(base) {
        if matches!(base_url.scheme(), "http" | "https" | "file") {
            if let Ok(joined) = base_url.join(reference) {
                return joined.to_string();
            }
        }
    }
    let parent = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    parent.join(reference).to_string_lossy().into_owned()
}

/// Parses a tileset document into an arena.
///
/// Nodes unreachable from the root are ignored. Child references that do
/// not resolve, or that would revisit a node, are kept as dangling children
/// so the traversal can report them.
pub fn parse_document(
    tileset: TilesetId,
    kind: TilesetKind,
    base_url: &str,
    bytes: &[u8],
) -> Result<(TileArena, DocumentInfo), TilesetError> {
    let document: Document = serde_json::from_slice(bytes)?;

    let records: HashMap<u32, &NodeRecord> =
        document.nodes.iter().map(|n| (n.index, n)).collect();
    let root = records.get(&document.root).ok_or_else(|| {
        TilesetError::Invalid(format!("root node {} is not listed", document.root))
    })?;

    let resolve = |r: &NodeRecord| r.content.as_deref().map(|c| resolve_content_url(base_url, c));

    let root_content = resolve(*root);
    let mut builder = ArenaBuilder::new(
        tileset,
        root.bounding_volume(kind),
        root.geometric_error,
        root_content.as_deref(),
    );

    let mut visited: HashSet<u32> = HashSet::from([document.root]);
    let mut queue: VecDeque<(u32, NodeIndex)> = VecDeque::from([(document.root, builder.root())]);
    let mut dangling = 0usize;

    while let Some((doc_index, arena_index)) = queue.pop_front() {
        let record = records[&doc_index];
        for &child in &record.children {
            match records.get(&child) {
                Some(child_record) if visited.insert(child) => {
                    let content = resolve(*child_record);
                    let idx = builder.add_child(
                        arena_index,
                        child_record.bounding_volume(kind),
                        child_record.geometric_error,
                        content.as_deref(),
                    );
                    queue.push_back((child, idx));
                }
                _ => {
                    warn!(node = doc_index, child, "Unresolvable child reference in tileset document");
                    dangling += 1;
                    builder.add_dangling_child(arena_index, NodeIndex(u32::MAX));
                }
            }
        }
    }

    let arena = builder.build();
    debug!(
        tileset = %arena.tileset_id(),
        nodes = arena.len(),
        unreachable = document.nodes.len().saturating_sub(arena.len()),
        dangling,
        "Parsed tileset document"
    );

    let statistics = document
        .statistics_info
        .into_iter()
        .map(|record| StatisticsRef {
            url: resolve_content_url(base_url, &record.href),
            attribute: record.name,
        })
        .collect();

    Ok((
        arena,
        DocumentInfo {
            name: document.name,
            version: document.version,
            statistics,
        },
    ))
}

/// Descriptive fields of a document that do not belong in the arena.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub statistics: Vec<StatisticsRef>,
}

/// Fetches and parses the document behind a layer.
pub async fn load_tileset<F>(
    descriptor: &LayerDescriptor,
    fetcher: &F,
) -> Result<(TileArena, TilesetMetadata), TilesetError>
where
    F: Fetcher + ?Sized,
{
    let bytes = fetcher
        .fetch(&descriptor.url, descriptor.token.as_deref())
        .await?;
    let id = TilesetId::new(&descriptor.id);
    let (arena, info) = parse_document(id.clone(), descriptor.kind, &descriptor.url, &bytes)?;
    let metadata = TilesetMetadata {
        id,
        name: info.name,
        version: info.version,
        url: descriptor.url.clone(),
        kind: descriptor.kind,
        node_count: arena.len(),
        content_count: arena.content_count(),
        max_depth: arena.max_depth(),
        statistics: info.statistics,
    };
    Ok((arena, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "name": "Buildings",
        "version": "1.7",
        "root": 0,
        "statisticsInfo": [
            { "key": "f_3", "name": "HEIGHT", "href": "statistics/f_3/0" },
            { "name": "USE", "href": "https://stats.example.com/use.json" }
        ],
        "nodes": [
            { "index": 0, "mbs": [0, 0, 0, 500], "geometricError": 100, "children": [1, 2] },
            { "index": 1, "mbs": [-100, 0, 0, 250], "geometricError": 10, "content": "nodes/1/geometries/0" },
            { "index": 2, "obb": { "center": [100, 0, 0], "halfSize": [50, 50, 50] },
              "geometricError": 10, "content": "nodes/2/geometries/0", "children": [7] },
            { "index": 3, "mbs": [0, 0, 0, 1], "geometricError": 1 }
        ]
    }"#;

    #[test]
    fn test_parse_document_builds_reachable_hierarchy() {
        let (arena, info) = parse_document(
            TilesetId::new("b"),
            TilesetKind::I3s,
            "https://example.com/layers/0/tileset.json",
            DOC.as_bytes(),
        )
        .unwrap();

        assert_eq!(info.name.as_deref(), Some("Buildings"));
        assert_eq!(arena.len(), 3, "unreachable node 3 is ignored");
        let root = arena.get(arena.root()).unwrap();
        assert!(root.content_url.is_none());
        assert_eq!(root.children.len(), 2);

        let child = arena.get(root.children[0]).unwrap();
        assert_eq!(
            child.content_url.as_deref(),
            Some("https://example.com/layers/0/nodes/1/geometries/0")
        );
        assert!(matches!(
            arena.get(root.children[1]).unwrap().bounding_volume,
            Some(BoundingVolume::Box(_))
        ));
    }

    #[test]
    fn test_unresolvable_child_becomes_dangling() {
        let (arena, _) = parse_document(
            TilesetId::new("b"),
            TilesetKind::I3s,
            "/data/tileset.json",
            DOC.as_bytes(),
        )
        .unwrap();
        let box_node = arena
            .get_by_id(&crate::tileset::NodeId::new(TilesetId::new("b"), "0/1"))
            .unwrap();
        assert_eq!(box_node.children.len(), 1);
        assert!(arena.get(box_node.children[0]).is_none());
    }

    #[test]
    fn test_missing_root_is_invalid() {
        let err = parse_document(
            TilesetId::new("b"),
            TilesetKind::I3s,
            "x",
            br#"{ "root": 5, "nodes": [ { "index": 0 } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, TilesetError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = parse_document(TilesetId::new("b"), TilesetKind::I3s, "x", b"{ nope").unwrap_err();
        assert!(matches!(err, TilesetError::Json(_)));
    }

    #[test]
    fn test_cycles_do_not_loop() {
        let doc = br#"{ "nodes": [
            { "index": 0, "mbs": [0,0,0,1], "children": [1] },
            { "index": 1, "mbs": [0,0,0,1], "children": [0] }
        ] }"#;
        let (arena, _) = parse_document(TilesetId::new("c"), TilesetKind::I3s, "x", doc).unwrap();
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_resolve_content_url() {
        assert_eq!(
            resolve_content_url("https://h/a/tileset.json", "nodes/1"),
            "https://h/a/nodes/1"
        );
        assert_eq!(
            resolve_content_url("https://h/a/tileset.json", "https://cdn/x.bin"),
            "https://cdn/x.bin"
        );
        assert_eq!(
            resolve_content_url("/srv/data/tileset.json", "nodes/1.bin"),
            "/srv/data/nodes/1.bin"
        );
    }

    #[test]
    fn test_statistics_references_resolve_against_document() {
        let (_, info) = parse_document(
            TilesetId::new("b"),
            TilesetKind::I3s,
            "https://example.com/layers/0/tileset.json",
            DOC.as_bytes(),
        )
        .unwrap();
        assert_eq!(
            info.statistics,
            vec![
                StatisticsRef {
                    attribute: "HEIGHT".to_string(),
                    url: "https://example.com/layers/0/statistics/f_3/0".to_string(),
                },
                StatisticsRef {
                    attribute: "USE".to_string(),
                    url: "https://stats.example.com/use.json".to_string(),
                },
            ]
        );
    }

    const TILES_3D_DOC: &str = r#"{
        "nodes": [
            { "index": 0, "boundingVolume": { "sphere": [0, 0, 0, 500] },
              "mbs": [9, 9, 9, 9], "geometricError": 100, "children": [1] },
            { "index": 1,
              "boundingVolume": { "box": [10, 0, 0, 5, 0, 0, 0, 6, 0, 0, 0, 7] },
              "geometricError": 1, "content": "tiles/1.b3dm" }
        ]
    }"#;

    #[test]
    fn test_kind_selects_bounding_volume_vocabulary() {
        let (arena, _) = parse_document(
            TilesetId::new("t"),
            TilesetKind::Tiles3d,
            "/data/tileset.json",
            TILES_3D_DOC.as_bytes(),
        )
        .unwrap();
        let root = arena.get(arena.root()).unwrap();
        assert_eq!(
            root.bounding_volume,
            Some(BoundingVolume::sphere(Vec3::ZERO, 500.0)),
            "I3S fields are ignored for 3D Tiles"
        );
        let child = arena.get(root.children[0]).unwrap();
        assert_eq!(
            child.bounding_volume,
            Some(BoundingVolume::Box(OrientedBox {
                center: Vec3::new(10.0, 0.0, 0.0),
                half_axes: [
                    Vec3::new(5.0, 0.0, 0.0),
                    Vec3::new(0.0, 6.0, 0.0),
                    Vec3::new(0.0, 0.0, 7.0),
                ],
            }))
        );

        // The same document read as I3S only sees the mbs
        let (arena, _) = parse_document(
            TilesetId::new("t"),
            TilesetKind::I3s,
            "/data/tileset.json",
            TILES_3D_DOC.as_bytes(),
        )
        .unwrap();
        let root = arena.get(arena.root()).unwrap();
        assert_eq!(
            root.bounding_volume,
            Some(BoundingVolume::sphere(Vec3::new(9.0, 9.0, 9.0), 9.0))
        );
        assert!(arena.get(root.children[0]).unwrap().bounding_volume.is_none());
    }

    #[test]
    fn test_layer_descriptor_deserializes_type_field() {
        let d: LayerDescriptor = serde_json::from_str(
            r#"{ "id": "a", "url": "https://h/t.json", "token": "secret", "type": "3d-tiles" }"#,
        )
        .unwrap();
        assert_eq!(d.kind, TilesetKind::Tiles3d);
        assert_eq!(d.token.as_deref(), Some("secret"));
    }
}
