//! The two pseudo-objects every world carries: the flat ground plane and an
//! optional terrain heightmap.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::narrowphase::ContactPoint;
use crate::{core::rigidbody::SimBody, utils::math::any_orthogonal};

/// Tilt used to find the other corners of a flat face resting on a plane.
const PERTURBATION: f32 = 0.05;
const MIN_POINT_SPACING_SQ: f32 = 1e-4;
const MAX_PLANE_POINTS: usize = 4;

/// Infinite horizontal plane, facing +Y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPlane {
    pub height: f32,
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self { height: 0.0 }
    }
}

impl GroundPlane {
    pub fn contacts(&self, body: &SimBody, margin: f32) -> Vec<ContactPoint> {
        plane_manifold(body, Vec3::new(0.0, self.height, 0.0), Vec3::Y, margin)
    }
}

/// Regular grid of heights over the XZ plane, starting at the world origin.
/// Heights are row-major with X varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heightmap {
    size_x: usize,
    size_z: usize,
    cell_size: f32,
    heights: Vec<f32>,
}

impl Heightmap {
    /// Returns `None` for a grid that cannot describe a surface (fewer than
    /// two samples per side, bad cell size, wrong sample count or a
    /// non-finite height).
    pub fn new(size_x: usize, size_z: usize, cell_size: f32, heights: Vec<f32>) -> Option<Self> {
        let usable = size_x >= 2
            && size_z >= 2
            && cell_size.is_finite()
            && cell_size > 0.0
            && heights.len() == size_x * size_z
            && heights.iter().all(|h| h.is_finite());
        usable.then_some(Self {
            size_x,
            size_z,
            cell_size,
            heights,
        })
    }

    pub fn extent(&self) -> (f32, f32) {
        (
            (self.size_x - 1) as f32 * self.cell_size,
            (self.size_z - 1) as f32 * self.cell_size,
        )
    }

    fn sample(&self, ix: usize, iz: usize) -> f32 {
        self.heights[iz * self.size_x + ix]
    }

    /// Bilinear height at a world XZ position, or `None` off the grid.
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let (max_x, max_z) = self.extent();
        if !(0.0..=max_x).contains(&x) || !(0.0..=max_z).contains(&z) {
            return None;
        }
        let fx = x / self.cell_size;
        let fz = z / self.cell_size;
        let ix = (fx.floor() as usize).min(self.size_x - 2);
        let iz = (fz.floor() as usize).min(self.size_z - 2);
        let tx = fx - ix as f32;
        let tz = fz - iz as f32;

        let h00 = self.sample(ix, iz);
        let h10 = self.sample(ix + 1, iz);
        let h01 = self.sample(ix, iz + 1);
        let h11 = self.sample(ix + 1, iz + 1);
        let near = h00 + (h10 - h00) * tx;
        let far = h01 + (h11 - h01) * tx;
        Some(near + (far - near) * tz)
    }

    /// Surface normal from central differences.
    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let d = self.cell_size * 0.5;
        let (max_x, max_z) = self.extent();
        let h = |x: f32, z: f32| {
            self.height_at(x.clamp(0.0, max_x), z.clamp(0.0, max_z))
                .unwrap_or(0.0)
        };
        let dx = h(x + d, z) - h(x - d, z);
        let dz = h(x, z + d) - h(x, z - d);
        Vec3::new(-dx, 2.0 * d, -dz).normalize_or(Vec3::Y)
    }

    /// Contact against the tangent plane under the body's center.
    pub fn contacts(&self, body: &SimBody, margin: f32) -> Vec<ContactPoint> {
        let center = body.transform.position;
        let Some(height) = self.height_at(center.x, center.z) else {
            return Vec::new();
        };
        let normal = self.normal_at(center.x, center.z);
        plane_manifold(body, Vec3::new(center.x, height, center.z), normal, margin)
    }

    /// First crossing of the segment through the surface, as
    /// `(fraction, normal, point)`.
    pub fn raycast(&self, from: Vec3, to: Vec3) -> Option<(f32, Vec3, Vec3)> {
        let ray = to - from;
        let length = ray.length();
        if length < 1e-6 {
            return None;
        }
        let above = |t: f32| {
            let p = from + ray * t;
            self.height_at(p.x, p.z).map(|h| p.y - h)
        };

        let steps = ((length / (self.cell_size * 0.25)).ceil() as usize).clamp(1, 4096);
        let mut prev_t = 0.0;
        let mut prev = above(0.0);
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let current = above(t);
            if let (Some(p), Some(c)) = (prev, current) {
                if p > 0.0 && c <= 0.0 {
                    let t_hit = Self::bisect(&above, prev_t, t);
                    let point = from + ray * t_hit;
                    return Some((t_hit, self.normal_at(point.x, point.z), point));
                }
            }
            prev_t = t;
            prev = current;
        }
        None
    }

    fn bisect(above: &impl Fn(f32) -> Option<f32>, mut lo: f32, mut hi: f32) -> f32 {
        for _ in 0..24 {
            let mid = 0.5 * (lo + hi);
            match above(mid) {
                Some(h) if h > 0.0 => lo = mid,
                _ => hi = mid,
            }
        }
        hi
    }
}

/// Contact points of a convex body against a plane. Besides the deepest
/// point, supports along slightly tilted directions pick up the remaining
/// corners of a face lying flat on the plane. Normals point from the body
/// into the plane.
pub fn plane_manifold(
    body: &SimBody,
    plane_point: Vec3,
    plane_normal: Vec3,
    margin: f32,
) -> Vec<ContactPoint> {
    let down = -plane_normal;
    let depth_of = |p: Vec3| (plane_point - p).dot(plane_normal);

    let deepest = body.shape.support(&body.transform, down);
    if depth_of(deepest) <= -margin {
        return Vec::new();
    }

    let tangent = any_orthogonal(plane_normal);
    let bitangent = plane_normal.cross(tangent);
    let mut candidates = vec![deepest];
    for (s, t) in [
        (1.0, 0.0),
        (-1.0, 0.0),
        (0.0, 1.0),
        (0.0, -1.0),
        (1.0, 1.0),
        (1.0, -1.0),
        (-1.0, 1.0),
        (-1.0, -1.0),
    ] {
        let tilted = down + (tangent * s + bitangent * t) * PERTURBATION;
        candidates.push(body.shape.support(&body.transform, tilted));
    }
    candidates.sort_by(|a, b| depth_of(*b).total_cmp(&depth_of(*a)));

    let mut kept: Vec<Vec3> = Vec::with_capacity(MAX_PLANE_POINTS);
    for candidate in candidates {
        if kept.len() == MAX_PLANE_POINTS || depth_of(candidate) <= -margin {
            break;
        }
        if kept
            .iter()
            .all(|p| (*p - candidate).length_squared() > MIN_POINT_SPACING_SQ)
        {
            kept.push(candidate);
        }
    }

    kept.into_iter()
        .map(|p| {
            let depth = depth_of(p);
            ContactPoint {
                point: p + plane_normal * depth * 0.5,
                normal: down,
                depth,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorldSettings,
        core::{
            math::Vector3,
            mesh::GeometryStore,
            shape::{ShapeData, ShapeType},
        },
    };

    fn box_at(y: f32) -> SimBody {
        let data = ShapeData::new(2, ShapeType::Box).with_position(Vector3::new(0.0, y, 0.0));
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
            .expect("box")
    }

    #[test]
    fn flat_box_on_ground_yields_four_corners() {
        let contacts = GroundPlane::default().contacts(&box_at(0.45), 0.1);
        assert_eq!(contacts.len(), 4, "{contacts:?}");
        for c in &contacts {
            assert!((c.depth - 0.05).abs() < 1e-4);
            assert_eq!(c.normal, -Vec3::Y);
        }
    }

    #[test]
    fn hovering_box_has_no_contacts() {
        assert!(GroundPlane::default().contacts(&box_at(2.0), 0.1).is_empty());
    }

    #[test]
    fn heightmap_interpolates_and_rejects_bad_grids() {
        let map = Heightmap::new(2, 2, 10.0, vec![0.0, 10.0, 0.0, 10.0]).expect("grid");
        assert_eq!(map.height_at(5.0, 5.0), Some(5.0));
        assert_eq!(map.height_at(-1.0, 5.0), None);
        assert!(Heightmap::new(1, 2, 1.0, vec![0.0, 0.0]).is_none());
        assert!(Heightmap::new(2, 2, 1.0, vec![0.0, 0.0, f32::NAN, 0.0]).is_none());
    }

    #[test]
    fn heightmap_raycast_finds_surface() {
        let map = Heightmap::new(3, 3, 5.0, vec![2.0; 9]).expect("grid");
        let (fraction, normal, point) = map
            .raycast(Vec3::new(5.0, 12.0, 5.0), Vec3::new(5.0, -8.0, 5.0))
            .expect("hit");
        assert!((fraction - 0.5).abs() < 1e-3);
        assert!(normal.y > 0.999);
        assert!((point.y - 2.0).abs() < 1e-3);
    }
}
