//! Bounding volumes: spheres and oriented boxes.

use super::Vec3;

/// A bounding sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
}

/// An oriented bounding box described by its center and three half-axis
/// vectors. The half-axes are expected to be mutually orthogonal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub center: Vec3,
    pub half_axes: [Vec3; 3],
}

impl OrientedBox {
    /// Builds a box from I3S style parameters: half sizes along the local
    /// axes and a unit quaternion `[x, y, z, w]` rotating local into world.
    pub fn from_quaternion(center: Vec3, half_size: [f64; 3], quaternion: [f64; 4]) -> Self {
        let [x, y, z, w] = quaternion;
        // Columns of the rotation matrix
        let col_x = Vec3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y + z * w),
            2.0 * (x * z - y * w),
        );
        let col_y = Vec3::new(
            2.0 * (x * y - z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z + x * w),
        );
        let col_z = Vec3::new(
            2.0 * (x * z + y * w),
            2.0 * (y * z - x * w),
            1.0 - 2.0 * (x * x + y * y),
        );
        Self {
            center,
            half_axes: [
                col_x * half_size[0],
                col_y * half_size[1],
                col_z * half_size[2],
            ],
        }
    }

    /// Axis-aligned box from min/max corners.
    pub fn from_corners(min: Vec3, max: Vec3) -> Self {
        let center = (min + max) * 0.5;
        let half = (max - min) * 0.5;
        Self {
            center,
            half_axes: [
                Vec3::X * half.x.abs(),
                Vec3::Y * half.y.abs(),
                Vec3::Z * half.z.abs(),
            ],
        }
    }

    /// Returns the eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let [a, b, c] = self.half_axes;
        let mut out = [self.center; 8];
        for (i, corner) in out.iter_mut().enumerate() {
            let sa = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sb = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sc = if i & 4 == 0 { -1.0 } else { 1.0 };
            *corner = self.center + a * sa + b * sb + c * sc;
        }
        out
    }

    /// Offset of `point` from the center along each half-axis, with the
    /// half-axis length alongside.
    fn local_extents(&self, point: Vec3) -> [(f64, f64); 3] {
        let offset = point - self.center;
        self.half_axes.map(|axis| {
            let half = axis.length();
            (offset.dot(axis.normalize()), half)
        })
    }
}

/// The spatial extent of a tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundingVolume {
    Sphere(Sphere),
    Box(OrientedBox),
}

impl BoundingVolume {
    pub fn sphere(center: Vec3, radius: f64) -> Self {
        BoundingVolume::Sphere(Sphere { center, radius })
    }

    pub fn center(&self) -> Vec3 {
        match self {
            BoundingVolume::Sphere(s) => s.center,
            BoundingVolume::Box(b) => b.center,
        }
    }

    /// Radius of the smallest sphere around the volume's center that
    /// contains it.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            BoundingVolume::Sphere(s) => s.radius,
            BoundingVolume::Box(b) => {
                let [a, c, d] = b.half_axes;
                (a.dot(a) + c.dot(c) + d.dot(d)).sqrt()
            }
        }
    }

    /// Returns false for NaN/infinite centers or negative extents.
    pub fn is_valid(&self) -> bool {
        match self {
            BoundingVolume::Sphere(s) => s.center.is_finite() && s.radius >= 0.0,
            BoundingVolume::Box(b) => {
                b.center.is_finite() && b.half_axes.iter().all(|a| a.is_finite())
            }
        }
    }

    /// Distance from `point` to the surface of the volume; zero inside.
    pub fn distance_to(&self, point: Vec3) -> f64 {
        match self {
            BoundingVolume::Sphere(s) => (s.center.distance(point) - s.radius).max(0.0),
            BoundingVolume::Box(b) => b
                .local_extents(point)
                .iter()
                .map(|(d, half)| {
                    let excess = (d.abs() - half).max(0.0);
                    excess * excess
                })
                .sum::<f64>()
                .sqrt(),
        }
    }

    /// Signed distance of the volume from a plane: positive when entirely in
    /// front, negative when entirely behind, zero when straddling.
    pub fn plane_side(&self, normal: Vec3, distance: f64) -> f64 {
        let (center, radius) = match self {
            BoundingVolume::Sphere(s) => (s.center, s.radius),
            BoundingVolume::Box(b) => {
                let r = b.half_axes.iter().map(|a| normal.dot(*a).abs()).sum();
                (b.center, r)
            }
        };
        let signed = normal.dot(center) + distance;
        if signed > radius {
            signed - radius
        } else if signed < -radius {
            signed + radius
        } else {
            0.0
        }
    }

    /// Whether `point` lies within the volume, allowing `tolerance` metres of slack.
    pub fn contains_point(&self, point: Vec3, tolerance: f64) -> bool {
        match self {
            BoundingVolume::Sphere(s) => s.center.distance(point) <= s.radius + tolerance,
            BoundingVolume::Box(b) => b
                .local_extents(point)
                .iter()
                .all(|(d, half)| d.abs() <= half + tolerance),
        }
    }

    /// Whether `other` lies entirely within this volume, allowing `tolerance`
    /// metres of slack.
    pub fn contains(&self, other: &BoundingVolume, tolerance: f64) -> bool {
        match (self, other) {
            (BoundingVolume::Sphere(outer), BoundingVolume::Sphere(inner)) => {
                outer.center.distance(inner.center) + inner.radius <= outer.radius + tolerance
            }
            (BoundingVolume::Box(outer), BoundingVolume::Sphere(inner)) => outer
                .local_extents(inner.center)
                .iter()
                .all(|(d, half)| d.abs() + inner.radius <= half + tolerance),
            (_, BoundingVolume::Box(inner)) => inner
                .corners()
                .iter()
                .all(|corner| self.contains_point(*corner, tolerance)),
        }
    }
}
