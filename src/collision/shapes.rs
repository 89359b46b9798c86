use std::{f32::consts::PI, sync::Arc};

use glam::{Mat3, Vec3};

use crate::{
    core::{
        mesh::{HullGeometry, TriangleMesh},
        types::{InertiaTensorExt, Transform},
    },
    utils::math::inertia_capsule,
};

/// Collision geometry of a live object, in object space, with the host scale
/// already applied. Round shapes are aligned with local Y.
#[derive(Debug, Clone)]
pub enum CollisionShape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    /// `height` is the length of the straight section between the caps.
    Capsule {
        radius: f32,
        height: f32,
    },
    Cylinder {
        radius: f32,
        height: f32,
    },
    /// Apex at `+height / 2`, base disc at `-height / 2`.
    Cone {
        radius: f32,
        height: f32,
    },
    Hull {
        geometry: Arc<HullGeometry>,
        scale: Vec3,
    },
    /// Collides as the convex envelope of its vertices.
    Mesh {
        mesh: Arc<TriangleMesh>,
        scale: Vec3,
    },
}

impl CollisionShape {
    /// Farthest point of the shape along `direction`, in object space.
    pub fn support_local(&self, direction: Vec3) -> Vec3 {
        match self {
            CollisionShape::Sphere { radius } => direction.normalize_or_zero() * *radius,
            CollisionShape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(direction.x),
                half_extents.y.copysign(direction.y),
                half_extents.z.copysign(direction.z),
            ),
            CollisionShape::Capsule { radius, height } => {
                let cap = Vec3::Y * (0.5 * height).copysign(direction.y);
                cap + direction.normalize_or_zero() * *radius
            }
            CollisionShape::Cylinder { radius, height } => {
                let lateral = Vec3::new(direction.x, 0.0, direction.z).normalize_or_zero();
                lateral * *radius + Vec3::Y * (0.5 * height).copysign(direction.y)
            }
            CollisionShape::Cone { radius, height } => {
                let apex = Vec3::Y * (0.5 * height);
                let lateral = Vec3::new(direction.x, 0.0, direction.z).normalize_or_zero();
                let rim = lateral * *radius - Vec3::Y * (0.5 * height);
                if apex.dot(direction) >= rim.dot(direction) {
                    apex
                } else {
                    rim
                }
            }
            CollisionShape::Hull { geometry, scale } => {
                max_along(geometry.vertices.iter().map(|v| *v * *scale), direction)
            }
            CollisionShape::Mesh { mesh, scale } => {
                max_along(mesh.vertices.iter().map(|v| *v * *scale), direction)
            }
        }
    }

    /// Farthest point along a world-space direction, in world space.
    pub fn support(&self, transform: &Transform, direction: Vec3) -> Vec3 {
        let local_dir = transform.rotation.conjugate() * direction;
        transform.apply(self.support_local(local_dir))
    }

    pub fn bounding_radius(&self) -> f32 {
        match self {
            CollisionShape::Sphere { radius } => *radius,
            CollisionShape::Box { half_extents } => half_extents.length(),
            CollisionShape::Capsule { radius, height } => radius + height * 0.5,
            CollisionShape::Cylinder { radius, height }
            | CollisionShape::Cone { radius, height } => {
                (radius.powi(2) + (height * 0.5).powi(2)).sqrt()
            }
            CollisionShape::Hull { geometry, scale } => {
                geometry.bounding_radius() * scale.abs().max_element()
            }
            CollisionShape::Mesh { mesh, scale } => {
                mesh.bounding_radius() * scale.abs().max_element()
            }
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            CollisionShape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            CollisionShape::Box { half_extents } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            CollisionShape::Capsule { radius, height } => {
                PI * radius * radius * height + 4.0 / 3.0 * PI * radius.powi(3)
            }
            CollisionShape::Cylinder { radius, height } => PI * radius * radius * height,
            CollisionShape::Cone { radius, height } => PI * radius * radius * height / 3.0,
            CollisionShape::Hull { geometry, scale } => {
                let size = geometry.bounds.extent() * 2.0 * scale.abs();
                size.x * size.y * size.z
            }
            CollisionShape::Mesh { mesh, scale } => {
                let size = mesh.bounds.extent() * 2.0 * scale.abs();
                size.x * size.y * size.z
            }
        }
    }

    /// Local inertia tensor for a solid body of the given mass.
    pub fn inertia(&self, mass: f32) -> Mat3 {
        match self {
            CollisionShape::Sphere { radius } => Mat3::for_solid_sphere(*radius, mass),
            CollisionShape::Box { half_extents } => Mat3::for_solid_box(*half_extents, mass),
            CollisionShape::Capsule { radius, height } => inertia_capsule(*radius, *height, mass),
            CollisionShape::Cylinder { radius, height } => {
                Mat3::for_solid_cylinder(*radius, *height, mass)
            }
            CollisionShape::Cone { radius, height } => Mat3::for_solid_cone(*radius, *height, mass),
            CollisionShape::Hull { geometry, scale } => {
                Mat3::for_solid_box(geometry.bounds.extent() * scale.abs(), mass)
            }
            CollisionShape::Mesh { mesh, scale } => {
                Mat3::for_solid_box(mesh.bounds.extent() * scale.abs(), mass)
            }
        }
    }

    /// A shape with no extent cannot be swept or hit.
    pub fn is_degenerate(&self) -> bool {
        let positive = |x: f32| x.is_finite() && x > 0.0;
        match self {
            CollisionShape::Sphere { radius } => !positive(*radius),
            CollisionShape::Box { half_extents } => {
                !(positive(half_extents.x) && positive(half_extents.y) && positive(half_extents.z))
            }
            CollisionShape::Capsule { radius, height } => {
                !positive(*radius) || !height.is_finite() || *height < 0.0
            }
            CollisionShape::Cylinder { radius, height }
            | CollisionShape::Cone { radius, height } => !(positive(*radius) && positive(*height)),
            CollisionShape::Hull { geometry, scale } => {
                geometry.vertices.is_empty() || !positive(scale.abs().max_element())
            }
            CollisionShape::Mesh { mesh, scale } => {
                mesh.vertices.is_empty() || !positive(scale.abs().max_element())
            }
        }
    }
}

fn max_along(points: impl Iterator<Item = Vec3>, direction: Vec3) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_dot = f32::NEG_INFINITY;
    for point in points {
        let dot = point.dot(direction);
        if dot > best_dot {
            best_dot = dot;
            best = point;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{math::Vector3, shape::ConvexHull};
    use glam::Quat;

    #[test]
    fn box_support_picks_corner() {
        let shape = CollisionShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        assert_eq!(
            shape.support_local(Vec3::new(1.0, -1.0, 1.0)),
            Vec3::new(1.0, -2.0, 3.0)
        );
    }

    #[test]
    fn cone_support_prefers_apex_upwards_and_rim_sideways() {
        let shape = CollisionShape::Cone {
            radius: 1.0,
            height: 2.0,
        };
        assert_eq!(shape.support_local(Vec3::Y), Vec3::new(0.0, 1.0, 0.0));
        let side = shape.support_local(Vec3::new(1.0, -0.1, 0.0));
        assert!((side - Vec3::new(1.0, -1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn world_support_respects_rotation() {
        let shape = CollisionShape::Box {
            half_extents: Vec3::new(2.0, 0.5, 0.5),
        };
        let transform = Transform::from_position_rotation(
            Vec3::new(0.0, 5.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        );
        // The long axis now points along world Y.
        let top = shape.support(&transform, Vec3::Y);
        assert!((top.y - 7.0).abs() < 1e-4, "top was {top:?}");
    }

    #[test]
    fn hull_support_uses_scaled_vertices() {
        let verts = [
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let geometry = HullGeometry::from_view(&ConvexHull::new(Vector3::ZERO, &verts))
            .expect("hull");
        let shape = CollisionShape::Hull {
            geometry: Arc::new(geometry),
            scale: Vec3::new(2.0, 3.0, 1.0),
        };
        assert_eq!(shape.support_local(Vec3::Y), Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(shape.support_local(-Vec3::X), Vec3::new(-2.0, 0.0, 0.0));
    }

    #[test]
    fn degenerate_shapes_are_flagged() {
        assert!(CollisionShape::Sphere { radius: 0.0 }.is_degenerate());
        assert!(CollisionShape::Box {
            half_extents: Vec3::new(1.0, 0.0, 1.0)
        }
        .is_degenerate());
        assert!(!CollisionShape::Capsule {
            radius: 0.3,
            height: 0.0
        }
        .is_degenerate());
    }
}
