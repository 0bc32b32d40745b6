//! View frustum culling.

use super::{BoundingVolume, Vec3};

/// A plane in Hessian normal form: points `p` with `normal · p + distance >= 0`
/// are on the inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f64,
}

impl Plane {
    /// Creates a plane, normalizing the normal vector.
    pub fn new(normal: Vec3, distance: f64) -> Self {
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal * (1.0 / len),
                distance: distance / len,
            }
        } else {
            Self { normal, distance }
        }
    }

    /// Plane through `point` with the given inward normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize();
        Self {
            normal: n,
            distance: -n.dot(point),
        }
    }
}

/// A convex set of inward-facing planes, usually the six planes of a
/// perspective camera.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frustum {
    planes: Vec<Plane>,
}

impl Frustum {
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// A frustum with no planes; every volume intersects it.
    pub fn unbounded() -> Self {
        Self { planes: Vec::new() }
    }

    /// Builds the six planes of a perspective camera.
    ///
    /// # Arguments
    ///
    /// * `position` - Camera position
    /// * `direction` - View direction
    /// * `up` - Approximate up vector (need not be orthogonal to `direction`)
    /// * `fovy` - Vertical field of view in radians
    /// * `aspect` - Width / height
    /// * `near`, `far` - Clip distances
    pub fn perspective(
        position: Vec3,
        direction: Vec3,
        up: Vec3,
        fovy: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let d = direction.normalize();
        let right = d.cross(up).normalize();
        let u = right.cross(d);

        let half_v = fovy * 0.5;
        let half_h = (half_v.tan() * aspect).atan();
        let (sin_v, cos_v) = half_v.sin_cos();
        let (sin_h, cos_h) = half_h.sin_cos();

        let planes = vec![
            Plane::from_point_normal(position + d * near, d),
            Plane::from_point_normal(position + d * far, -d),
            Plane::from_point_normal(position, right * cos_h + d * sin_h),
            Plane::from_point_normal(position, -right * cos_h + d * sin_h),
            Plane::from_point_normal(position, u * cos_v + d * sin_v),
            Plane::from_point_normal(position, -u * cos_v + d * sin_v),
        ];
        Self { planes }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// True unless the volume lies entirely behind at least one plane.
    pub fn intersects(&self, volume: &BoundingVolume) -> bool {
        self.planes
            .iter()
            .all(|p| volume.plane_side(p.normal, p.distance) >= 0.0)
    }
}
