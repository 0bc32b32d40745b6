//! Tile payload decoding.
//!
//! Payloads use the I3S default geometry layout, little-endian, optionally
//! wrapped in gzip:
//!
//! ```text
//! u32 vertex_count
//! u32 feature_count
//! vertex_count × f32[3]  position (offset from the node's volume center)
//! vertex_count × f32[3]  normal
//! vertex_count × f32[2]  uv0
//! vertex_count × u8[4]   color
//! feature_count × u64    feature id
//! feature_count × u32[2] face range (first and last triangle, inclusive)
//! ```

use super::error::DecodeError;
use bytes::{Buf, BufMut};
use flate2::read::GzDecoder;
use std::io::Read;

const HEADER_SIZE: usize = 8;
const VERTEX_STRIDE: usize = 12 + 12 + 8 + 4;
const FEATURE_STRIDE: usize = 8 + 8;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest payload a gzip wrapper may expand to.
pub const MAX_INFLATED_BYTES: u64 = 256 * 1024 * 1024;

/// Decoded geometry of one tile. Opaque to the traversal; only its size
/// matters to the cache.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedContent {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uv0: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub feature_ids: Vec<u64>,
    pub face_ranges: Vec<[u32; 2]>,
    /// Whether the payload arrived gzip-compressed.
    pub compressed: bool,
}

impl DecodedContent {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Memory held by the decoded buffers.
    pub fn byte_size(&self) -> u64 {
        (self.vertex_count() * VERTEX_STRIDE + self.feature_count() * FEATURE_STRIDE) as u64
    }
}

fn ensure(section: &'static str, needed: usize, buf: &[u8]) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            section,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn inflate(data: &[u8], limit: u64) -> Result<Vec<u8>, DecodeError> {
    let capacity = (data.len().saturating_mul(4) as u64).min(limit) as usize;
    let mut out = Vec::with_capacity(capacity);
    // One byte past the limit tells an exact fit from an overflow
    GzDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Gzip(e.to_string()))?;
    if out.len() as u64 > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(out)
}

/// Decodes one payload.
pub fn decode_geometry(data: &[u8]) -> Result<DecodedContent, DecodeError> {
    let compressed = data.starts_with(&GZIP_MAGIC);
    let inflated;
    let mut buf: &[u8] = if compressed {
        inflated = inflate(data, MAX_INFLATED_BYTES)?;
        &inflated
    } else {
        data
    };

    ensure("header", HEADER_SIZE, buf)?;
    let vertex_count = buf.get_u32_le() as usize;
    let feature_count = buf.get_u32_le() as usize;

    ensure(
        "vertex attributes",
        vertex_count.saturating_mul(VERTEX_STRIDE),
        buf,
    )?;
    let positions = (0..vertex_count)
        .map(|_| [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()])
        .collect();
    let normals = (0..vertex_count)
        .map(|_| [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()])
        .collect();
    let uv0 = (0..vertex_count)
        .map(|_| [buf.get_f32_le(), buf.get_f32_le()])
        .collect();
    let colors = (0..vertex_count)
        .map(|_| [buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()])
        .collect();

    ensure(
        "feature attributes",
        feature_count.saturating_mul(FEATURE_STRIDE),
        buf,
    )?;
    let feature_ids: Vec<u64> = (0..feature_count).map(|_| buf.get_u64_le()).collect();
    let face_ranges: Vec<[u32; 2]> = (0..feature_count)
        .map(|_| [buf.get_u32_le(), buf.get_u32_le()])
        .collect();

    if buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(buf.remaining()));
    }

    let triangles = vertex_count / 3;
    for (feature, [start, end]) in face_ranges.iter().copied().enumerate() {
        if start > end || end as usize >= triangles {
            return Err(DecodeError::FaceRangeOutOfBounds {
                feature,
                start,
                end,
                triangles,
            });
        }
    }

    Ok(DecodedContent {
        positions,
        normals,
        uv0,
        colors,
        feature_ids,
        face_ranges,
        compressed,
    })
}

/// Serializes content into the uncompressed payload layout. Missing
/// per-vertex attributes are written as zeros.
pub fn encode_geometry(content: &DecodedContent) -> Vec<u8> {
    let n = content.vertex_count();
    let m = content.feature_count();
    let mut out = Vec::with_capacity(HEADER_SIZE + n * VERTEX_STRIDE + m * FEATURE_STRIDE);
    out.put_u32_le(n as u32);
    out.put_u32_le(m as u32);
    for p in &content.positions {
        p.iter().for_each(|v| out.put_f32_le(*v));
    }
    for i in 0..n {
        let normal = content.normals.get(i).copied().unwrap_or_default();
        normal.iter().for_each(|v| out.put_f32_le(*v));
    }
    for i in 0..n {
        let uv = content.uv0.get(i).copied().unwrap_or_default();
        uv.iter().for_each(|v| out.put_f32_le(*v));
    }
    for i in 0..n {
        out.put_slice(&content.colors.get(i).copied().unwrap_or([255; 4]));
    }
    for id in &content.feature_ids {
        out.put_u64_le(*id);
    }
    for i in 0..m {
        let [start, end] = content.face_ranges.get(i).copied().unwrap_or_default();
        out.put_u32_le(start);
        out.put_u32_le(end);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn triangle() -> DecodedContent {
        DecodedContent {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uv0: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            colors: vec![[200, 100, 50, 255]; 3],
            feature_ids: vec![7],
            face_ranges: vec![[0, 0]],
            compressed: false,
        }
    }

    #[test]
    fn test_decode_plain_payload() {
        let bytes = encode_geometry(&triangle());
        assert_eq!(bytes.len(), 8 + 3 * 36 + 16);
        let decoded = decode_geometry(&bytes).unwrap();
        assert_eq!(decoded, triangle());
        assert_eq!(decoded.triangle_count(), 1);
        assert_eq!(decoded.byte_size(), 3 * 36 + 16);
    }

    #[test]
    fn test_decode_gzip_payload() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encode_geometry(&triangle())).unwrap();
        let gz = encoder.finish().unwrap();

        let decoded = decode_geometry(&gz).unwrap();
        assert!(decoded.compressed);
        assert_eq!(decoded.positions, triangle().positions);
    }

    #[test]
    fn test_inflate_is_bounded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1 << 20]).unwrap();
        let bomb = encoder.finish().unwrap();
        assert!(bomb.len() < 16 * 1024);

        assert_eq!(
            inflate(&bomb, 64 * 1024),
            Err(DecodeError::TooLarge { limit: 64 * 1024 })
        );
        assert_eq!(inflate(&bomb, 1 << 20).map(|out| out.len()), Ok(1 << 20));
    }

    #[test]
    fn test_truncated_vertex_section() {
        let mut bytes = encode_geometry(&triangle());
        bytes.truncate(40);
        let err = decode_geometry(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                section: "vertex attributes",
                ..
            }
        ));
    }

    #[test]
    fn test_header_only_garbage() {
        assert!(matches!(
            decode_geometry(&[1, 2, 3]),
            Err(DecodeError::Truncated { section: "header", .. })
        ));
    }

    #[test]
    fn test_absurd_vertex_count_does_not_allocate() {
        let mut bytes = Vec::new();
        bytes.put_u32_le(u32::MAX);
        bytes.put_u32_le(0);
        assert!(matches!(
            decode_geometry(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_geometry(&triangle());
        bytes.extend_from_slice(&[0, 0]);
        assert_eq!(decode_geometry(&bytes), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_face_range_out_of_bounds() {
        let mut content = triangle();
        content.face_ranges = vec![[0, 4]];
        let err = decode_geometry(&encode_geometry(&content)).unwrap_err();
        assert!(matches!(err, DecodeError::FaceRangeOutOfBounds { feature: 0, .. }));
    }

    #[test]
    fn test_corrupt_gzip() {
        let err = decode_geometry(&[0x1f, 0x8b, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::Gzip(_)));
    }

    #[test]
    fn test_empty_geometry_is_valid() {
        let decoded = decode_geometry(&encode_geometry(&DecodedContent::default())).unwrap();
        assert_eq!(decoded.vertex_count(), 0);
        assert_eq!(decoded.byte_size(), 0);
    }
}
