//! Debug rendering hints and per-tile colouring.
//!
//! Nothing here influences traversal or loading; the options are carried for
//! the rendering layer to read.

use crate::tileset::{AttributeStatistics, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An RGBA colour.
pub type Rgba = [u8; 4];

/// How tiles are tinted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileColorMode {
    /// Content colours, no override.
    #[default]
    Original,
    /// A stable colour derived from the node id.
    Random,
    /// A gradient by hierarchy depth.
    Depth,
    /// Colours assigned by the user, falling back to the original.
    Custom,
    /// Per-vertex colours interpolated from an attribute's value range.
    #[serde(rename = "byAttribute")]
    ByAttribute(AttributeColors),
}

/// Colour of the lowest attribute value by default.
pub const ATTRIBUTE_MIN_COLOR: Rgba = [146, 146, 252, 255];
/// Colour of the highest attribute value by default.
pub const ATTRIBUTE_MAX_COLOR: Rgba = [44, 44, 175, 255];

/// How an attribute colour combines with the content's own colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeBlend {
    #[default]
    Replace,
    Multiply,
}

/// Linear colour ramp over one attribute's `[min_value, max_value]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeColors {
    pub attribute: String,
    pub min_value: f64,
    pub max_value: f64,
    pub min_color: Rgba,
    pub max_color: Rgba,
    #[serde(default)]
    pub blend: AttributeBlend,
}

impl AttributeColors {
    /// Ramp over the statistics' range with the default colours. `None`
    /// when the statistics carry no usable min/max.
    pub fn from_statistics(attribute: impl Into<String>, stats: &AttributeStatistics) -> Option<Self> {
        let (min_value, max_value) = stats.range()?;
        Some(Self {
            attribute: attribute.into(),
            min_value,
            max_value,
            min_color: ATTRIBUTE_MIN_COLOR,
            max_color: ATTRIBUTE_MAX_COLOR,
            blend: AttributeBlend::Replace,
        })
    }

    pub fn with_blend(mut self, blend: AttributeBlend) -> Self {
        self.blend = blend;
        self
    }

    /// Colour for `value` over a vertex whose own colour is `base`.
    /// Values outside the range clamp to its ends; NaN maps to the minimum.
    pub fn color_for(&self, value: f64, base: Rgba) -> Rgba {
        let span = self.max_value - self.min_value;
        let t = if span > 0.0 {
            ((value - self.min_value) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let t = if t.is_nan() { 0.0 } else { t };

        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            let lo = self.min_color[i] as f64;
            let hi = self.max_color[i] as f64;
            let ramp = (lo + (hi - lo) * t).round();
            *channel = match self.blend {
                AttributeBlend::Replace => ramp as u8,
                AttributeBlend::Multiply => (ramp * base[i] as f64 / 255.0).round() as u8,
            };
        }
        out
    }
}

/// Flat debug options structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugOptions {
    pub tile_color_mode: TileColorMode,
    pub pickable: bool,
    pub bounding_volume_visible: bool,
    pub minimap: bool,
    pub wireframe: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            tile_color_mode: TileColorMode::Original,
            pickable: false,
            bounding_volume_visible: false,
            minimap: true,
            wireframe: false,
        }
    }
}

/// Depth gradient stops, root first. Deeper levels reuse the last stop.
const DEPTH_GRADIENT: [Rgba; 8] = [
    [68, 1, 84, 255],
    [70, 50, 126, 255],
    [54, 92, 141, 255],
    [39, 127, 142, 255],
    [31, 161, 135, 255],
    [74, 193, 109, 255],
    [160, 218, 57, 255],
    [253, 231, 37, 255],
];

/// Tile colour assignments owned by one engine.
#[derive(Debug, Default)]
pub struct TileColorMap {
    mode: TileColorMode,
    custom: HashMap<NodeId, Rgba>,
}

impl TileColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &TileColorMode {
        &self.mode
    }

    /// Switches mode. Leaving [`TileColorMode::Custom`] clears every custom
    /// assignment.
    pub fn set_mode(&mut self, mode: TileColorMode) {
        if mode != TileColorMode::Custom {
            self.custom.clear();
        }
        self.mode = mode;
    }

    pub fn set_custom(&mut self, node_id: NodeId, color: Rgba) {
        self.custom.insert(node_id, color);
    }

    pub fn reset_custom(&mut self, node_id: &NodeId) -> Option<Rgba> {
        self.custom.remove(node_id)
    }

    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    /// Forgets all assignments (active layers changed).
    pub fn reset(&mut self) {
        self.custom.clear();
    }

    /// Override colour for a whole tile, or `None` to keep its original
    /// colours. Attribute colouring works per vertex, see
    /// [`vertex_colors`](Self::vertex_colors).
    pub fn color_for(&self, node_id: &NodeId) -> Option<Rgba> {
        match &self.mode {
            TileColorMode::Original | TileColorMode::ByAttribute(_) => None,
            TileColorMode::Random => Some(random_color(node_id)),
            TileColorMode::Depth => {
                let stop = node_id.depth().min(DEPTH_GRADIENT.len() - 1);
                Some(DEPTH_GRADIENT[stop])
            }
            TileColorMode::Custom => self.custom.get(node_id).copied(),
        }
    }

    /// Per-vertex colours for `attribute` under attribute colouring.
    ///
    /// `None` unless the active mode colours by this attribute. Vertices
    /// without a value keep their base colour.
    pub fn vertex_colors(&self, attribute: &str, base: &[Rgba], values: &[f64]) -> Option<Vec<Rgba>> {
        let TileColorMode::ByAttribute(ramp) = &self.mode else {
            return None;
        };
        if ramp.attribute != attribute {
            return None;
        }
        Some(
            base.iter()
                .enumerate()
                .map(|(i, &color)| match values.get(i) {
                    Some(&value) => ramp.color_for(value, color),
                    None => color,
                })
                .collect(),
        )
    }
}

/// FNV-1a over the node id, so colours stay stable across runs.
fn random_color(node_id: &NodeId) -> Rgba {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let bytes = node_id
        .tileset()
        .as_str()
        .bytes()
        .chain(std::iter::once(b':'))
        .chain(node_id.path().bytes());
    for b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let [r, g, b, ..] = hash.to_le_bytes();
    [r, g, b, 255]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tileset::TilesetId;

    fn id(path: &str) -> NodeId {
        NodeId::new(TilesetId::new("t"), path)
    }

    #[test]
    fn test_original_has_no_override() {
        assert_eq!(TileColorMap::new().color_for(&id("0")), None);
    }

    #[test]
    fn test_random_is_stable_and_varies() {
        let mut map = TileColorMap::new();
        map.set_mode(TileColorMode::Random);
        let a = map.color_for(&id("0/1")).unwrap();
        assert_eq!(map.color_for(&id("0/1")), Some(a));
        assert_ne!(map.color_for(&id("0/2")), Some(a));
        assert_eq!(a[3], 255);
    }

    #[test]
    fn test_depth_gradient_clamps() {
        let mut map = TileColorMap::new();
        map.set_mode(TileColorMode::Depth);
        assert_eq!(map.color_for(&id("0")), Some(DEPTH_GRADIENT[0]));
        assert_eq!(map.color_for(&id("0/1/1")), Some(DEPTH_GRADIENT[2]));
        let deep = id("0/0/0/0/0/0/0/0/0/0/0");
        assert_eq!(map.color_for(&deep), Some(DEPTH_GRADIENT[7]));
    }

    #[test]
    fn test_leaving_custom_clears_assignments() {
        let mut map = TileColorMap::new();
        map.set_mode(TileColorMode::Custom);
        map.set_custom(id("0"), [1, 2, 3, 255]);
        assert_eq!(map.color_for(&id("0")), Some([1, 2, 3, 255]));
        assert_eq!(map.color_for(&id("0/0")), None);

        map.set_mode(TileColorMode::Custom);
        assert_eq!(map.custom_count(), 1);

        map.set_mode(TileColorMode::Depth);
        assert_eq!(map.custom_count(), 0);
    }

    fn height_ramp() -> AttributeColors {
        AttributeColors {
            attribute: "HEIGHT".to_string(),
            min_value: 0.0,
            max_value: 100.0,
            min_color: [0, 0, 0, 255],
            max_color: [200, 100, 50, 255],
            blend: AttributeBlend::Replace,
        }
    }

    #[test]
    fn test_attribute_ramp_interpolates_and_clamps() {
        let ramp = height_ramp();
        let base = [255, 255, 255, 255];
        assert_eq!(ramp.color_for(0.0, base), [0, 0, 0, 255]);
        assert_eq!(ramp.color_for(50.0, base), [100, 50, 25, 255]);
        assert_eq!(ramp.color_for(1000.0, base), [200, 100, 50, 255]);
        assert_eq!(ramp.color_for(-5.0, base), [0, 0, 0, 255]);
        assert_eq!(ramp.color_for(f64::NAN, base), [0, 0, 0, 255]);
    }

    #[test]
    fn test_attribute_multiply_keeps_base_shading() {
        let ramp = height_ramp().with_blend(AttributeBlend::Multiply);
        assert_eq!(ramp.color_for(100.0, [255, 0, 128, 255]), [200, 0, 25, 255]);
    }

    #[test]
    fn test_attribute_ramp_from_statistics() {
        let stats = crate::tileset::parse_statistics(br#"{ "stats": { "min": 3, "max": 9 } }"#).unwrap();
        let ramp = AttributeColors::from_statistics("HEIGHT", &stats).unwrap();
        assert_eq!((ramp.min_value, ramp.max_value), (3.0, 9.0));
        assert_eq!(ramp.min_color, ATTRIBUTE_MIN_COLOR);

        let no_range = AttributeStatistics::default();
        assert!(AttributeColors::from_statistics("HEIGHT", &no_range).is_none());
    }

    #[test]
    fn test_vertex_colors_only_for_active_attribute() {
        let mut map = TileColorMap::new();
        let base = [[10, 10, 10, 255]; 3];
        assert!(map.vertex_colors("HEIGHT", &base, &[0.0; 3]).is_none());

        map.set_mode(TileColorMode::ByAttribute(height_ramp()));
        assert_eq!(map.color_for(&id("0")), None);
        assert!(map.vertex_colors("USE", &base, &[0.0; 3]).is_none());

        let colors = map.vertex_colors("HEIGHT", &base, &[0.0, 100.0]).unwrap();
        assert_eq!(colors, vec![[0, 0, 0, 255], [200, 100, 50, 255], [10, 10, 10, 255]]);
    }

    #[test]
    fn test_debug_options_serde() {
        let json = r#"{ "tileColorMode": "depth", "wireframe": true }"#;
        let options: DebugOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.tile_color_mode, TileColorMode::Depth);
        assert!(options.wireframe);
        assert!(options.minimap, "missing fields take defaults");
        assert!(!options.pickable);

        let json = r#"{ "tileColorMode": { "byAttribute": {
            "attribute": "HEIGHT", "minValue": 0, "maxValue": 100,
            "minColor": [0, 0, 0, 255], "maxColor": [200, 100, 50, 255] } } }"#;
        let options: DebugOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.tile_color_mode, TileColorMode::ByAttribute(height_ramp()));
    }
}
