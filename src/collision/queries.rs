//! Read-only spatial queries: raycasts and convex sweeps.
//!
//! Everything here returns `Option`; the "no hit" sentinel is produced only
//! when a hit is converted to its boundary record.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    narrowphase::{cast_ray, MinkowskiDifference, ShapeSupport, SupportMap},
    shapes::CollisionShape,
    terrain::Heightmap,
};
use crate::core::{
    ids::{ObjectId, INVALID_HIT_ID},
    math::Vector3,
    mesh::{Aabb, HullGeometry},
    rigidbody::{normalized_rotation, SimBody},
    types::Transform,
};

/// Raycast answer as laid out on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct RaycastHit {
    pub id: u32,
    pub fraction: f32,
    pub normal: Vector3,
}

impl RaycastHit {
    pub const MISS: Self = Self {
        id: INVALID_HIT_ID,
        fraction: 1.0,
        normal: Vector3::ZERO,
    };

    pub fn or_miss(hit: Option<Self>) -> Self {
        hit.unwrap_or(Self::MISS)
    }

    pub fn is_hit(&self) -> bool {
        self.id != INVALID_HIT_ID
    }
}

/// Convex sweep answer as laid out on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SweepHit {
    pub id: u32,
    pub fraction: f32,
    pub normal: Vector3,
    pub point: Vector3,
}

impl SweepHit {
    pub const MISS: Self = Self {
        id: INVALID_HIT_ID,
        fraction: 1.0,
        normal: Vector3::ZERO,
        point: Vector3::ZERO,
    };

    pub fn or_miss(hit: Option<Self>) -> Self {
        hit.unwrap_or(Self::MISS)
    }

    pub fn is_hit(&self) -> bool {
        self.id != INVALID_HIT_ID
    }
}

/// Shapes that can be swept without being an object in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SweepShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Capsule { radius: f32, height: f32 },
    Hull { vertices: Vec<Vec3> },
}

impl SweepShape {
    /// `None` when the shape cannot be swept (non-finite, no extent or no
    /// vertices).
    pub fn to_collision_shape(&self) -> Option<CollisionShape> {
        let shape = match self {
            SweepShape::Sphere { radius } => CollisionShape::Sphere { radius: *radius },
            SweepShape::Box { half_extents } => CollisionShape::Box {
                half_extents: *half_extents,
            },
            SweepShape::Capsule { radius, height } => CollisionShape::Capsule {
                radius: *radius,
                height: *height,
            },
            SweepShape::Hull { vertices } => {
                if vertices.is_empty() || vertices.iter().any(|v| !v.is_finite()) {
                    return None;
                }
                CollisionShape::Hull {
                    geometry: Arc::new(HullGeometry {
                        vertices: vertices.clone(),
                        bounds: Aabb::from_points(vertices),
                    }),
                    scale: Vec3::ONE,
                }
            }
        };
        (!shape.is_degenerate()).then_some(shape)
    }
}

fn segment_is_usable(from: Vec3, to: Vec3) -> bool {
    from.is_finite() && to.is_finite() && (to - from).length_squared() > 1e-12
}

/// Cheap rejection: can the segment (grown by `padding`) reach the body's
/// bounding sphere at all?
fn segment_near_body(from: Vec3, to: Vec3, body: &SimBody, padding: f32) -> bool {
    let center = body.transform.position;
    let ray = to - from;
    let t = ((center - from).dot(ray) / ray.length_squared()).clamp(0.0, 1.0);
    let closest = from + ray * t;
    let reach = body.shape.bounding_radius() + padding;
    (closest - center).length_squared() <= reach * reach
}

fn closer(best: Option<(ObjectId, f32)>, fraction: f32) -> bool {
    best.map_or(true, |(_, f)| fraction < f)
}

/// Closest hit along the segment from `from` to `to` among collidable
/// bodies and the terrain. `exclude` skips one object.
pub fn raycast(
    bodies: &[SimBody],
    terrain: Option<&Heightmap>,
    from: Vec3,
    to: Vec3,
    exclude: Option<ObjectId>,
) -> Option<RaycastHit> {
    if !segment_is_usable(from, to) {
        return None;
    }
    let ray = to - from;
    let mut best: Option<(ObjectId, f32)> = None;
    let mut best_normal = Vec3::ZERO;

    for body in bodies {
        if !body.is_collidable || Some(body.id) == exclude {
            continue;
        }
        if !segment_near_body(from, to, body, 0.0) {
            continue;
        }
        let target = ShapeSupport::new(&body.shape, &body.transform);
        if let Some(hit) = cast_ray(&target, from, ray) {
            if closer(best, hit.fraction) {
                best = Some((body.id, hit.fraction));
                best_normal = hit.normal;
            }
        }
    }

    if let Some((fraction, normal, _)) = terrain.and_then(|map| map.raycast(from, to)) {
        if closer(best, fraction) {
            best = Some((ObjectId::TERRAIN, fraction));
            best_normal = normal;
        }
    }

    best.map(|(id, fraction)| RaycastHit {
        id: id.raw(),
        fraction,
        normal: best_normal.into(),
    })
}

/// One convex sweep: `shape` held at `rotation` and moved from `from` to
/// `to`, inflated by `extra_margin`.
#[derive(Debug, Clone, Copy)]
pub struct SweepQuery<'a> {
    pub shape: &'a CollisionShape,
    pub rotation: Quat,
    pub from: Vec3,
    pub to: Vec3,
    pub extra_margin: f32,
}

/// First time of impact of the swept shape. The normal is on the hit
/// surface, facing the swept shape.
pub fn convex_sweep(
    bodies: &[SimBody],
    terrain: Option<&Heightmap>,
    query: &SweepQuery<'_>,
    exclude: Option<ObjectId>,
) -> Option<SweepHit> {
    let SweepQuery {
        shape,
        rotation,
        from,
        to,
        extra_margin,
    } = *query;
    if !segment_is_usable(from, to) || shape.is_degenerate() || !rotation.is_finite() {
        return None;
    }
    let margin = if extra_margin.is_finite() {
        extra_margin.max(0.0)
    } else {
        0.0
    };
    let motion = to - from;
    let start = Transform::from_position_rotation(from, normalized_rotation(rotation));
    let mover = ShapeSupport::new(shape, &start).inflated(margin);
    let padding = shape.bounding_radius() + margin;

    let mut best: Option<(ObjectId, f32)> = None;
    let mut best_normal = Vec3::ZERO;
    let mut best_point = Vec3::ZERO;

    for body in bodies {
        if !body.is_collidable || Some(body.id) == exclude {
            continue;
        }
        if !segment_near_body(from, to, body, padding) {
            continue;
        }
        let target = ShapeSupport::new(&body.shape, &body.transform);
        let difference = MinkowskiDifference {
            target: &target,
            mover: &mover,
        };
        if let Some(hit) = cast_ray(&difference, Vec3::ZERO, motion) {
            if closer(best, hit.fraction) {
                best = Some((body.id, hit.fraction));
                best_normal = hit.normal;
                best_point = hit.point;
            }
        }
    }

    if let Some(map) = terrain {
        // The terrain is not convex; follow the mover's lowest point instead.
        let lowest = mover.support(Vec3::NEG_Y);
        if let Some((fraction, normal, point)) = map.raycast(lowest, lowest + motion) {
            if closer(best, fraction) {
                best = Some((ObjectId::TERRAIN, fraction));
                best_normal = normal;
                best_point = point;
            }
        }
    }

    best.map(|(id, fraction)| SweepHit {
        id: id.raw(),
        fraction,
        normal: best_normal.into(),
        point: best_point.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorldSettings,
        core::{
            mesh::GeometryStore,
            shape::{ShapeData, ShapeType},
        },
    };

    fn body(id: u32, kind: ShapeType, position: Vec3) -> SimBody {
        let data = ShapeData::new(id, kind).with_position(position.into());
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
            .expect("body")
    }

    #[test]
    fn miss_records_use_the_sentinel() {
        assert_eq!(RaycastHit::or_miss(None).id, u32::MAX);
        assert_eq!(RaycastHit::or_miss(None).fraction, 1.0);
        assert!(!SweepHit::or_miss(None).is_hit());
    }

    #[test]
    fn ray_hits_closest_body() {
        let bodies = vec![
            body(3, ShapeType::Box, Vec3::new(0.0, 0.0, 10.0)),
            body(2, ShapeType::Box, Vec3::new(0.0, 0.0, 5.0)),
        ];
        let hit = raycast(&bodies, None, Vec3::ZERO, Vec3::new(0.0, 0.0, 20.0), None)
            .expect("hit");
        assert_eq!(hit.id, 2);
        assert!((hit.fraction - 4.5 / 20.0).abs() < 1e-3);
        assert!((Vec3::from(hit.normal) - Vec3::NEG_Z).length() < 1e-3);
    }

    #[test]
    fn excluded_and_phantom_bodies_are_ignored() {
        let mut bodies = vec![
            body(2, ShapeType::Sphere, Vec3::new(0.0, 0.0, 5.0)),
            body(3, ShapeType::Sphere, Vec3::new(0.0, 0.0, 8.0)),
        ];
        let to = Vec3::new(0.0, 0.0, 20.0);
        let hit = raycast(&bodies, None, Vec3::ZERO, to, Some(ObjectId(2))).expect("hit");
        assert_eq!(hit.id, 3);

        bodies[1].is_collidable = false;
        assert!(raycast(&bodies, None, Vec3::ZERO, to, Some(ObjectId(2))).is_none());
    }

    #[test]
    fn degenerate_segment_misses() {
        let bodies = vec![body(2, ShapeType::Box, Vec3::ZERO)];
        assert!(raycast(&bodies, None, Vec3::X * 3.0, Vec3::X * 3.0, None).is_none());
        assert!(raycast(&bodies, None, Vec3::NAN, Vec3::X, None).is_none());
    }

    #[test]
    fn terrain_is_reported_as_id_zero() {
        let map = Heightmap::new(3, 3, 5.0, vec![1.0; 9]).expect("map");
        let hit = raycast(
            &[],
            Some(&map),
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(5.0, -5.0, 5.0),
            None,
        )
        .expect("terrain hit");
        assert_eq!(hit.id, 0);
        assert!((hit.fraction - 0.4).abs() < 1e-3);
    }

    #[test]
    fn sphere_sweep_stops_at_box_face() {
        let bodies = vec![body(2, ShapeType::Box, Vec3::new(5.0, 0.0, 0.0))];
        let shape = SweepShape::Sphere { radius: 0.5 }
            .to_collision_shape()
            .expect("sphere");
        let query = SweepQuery {
            shape: &shape,
            rotation: Quat::IDENTITY,
            from: Vec3::ZERO,
            to: Vec3::new(10.0, 0.0, 0.0),
            extra_margin: 0.0,
        };
        let hit = convex_sweep(&bodies, None, &query, None).expect("hit");
        assert_eq!(hit.id, 2);
        // Sphere surface meets the face at x = 4.5 when its center is at 4.0.
        assert!((hit.fraction - 0.4).abs() < 1e-2, "{hit:?}");
        assert!((Vec3::from(hit.normal) - Vec3::NEG_X).length() < 1e-2);
        assert!((hit.point.x - 4.5).abs() < 1e-2);
    }

    #[test]
    fn degenerate_sweep_shapes_are_refused() {
        assert!(SweepShape::Sphere { radius: 0.0 }.to_collision_shape().is_none());
        assert!(SweepShape::Hull { vertices: vec![] }.to_collision_shape().is_none());
    }
}
