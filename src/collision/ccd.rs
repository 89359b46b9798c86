use glam::Vec3;

use super::{
    narrowphase::{cast_ray, MinkowskiDifference, ShapeSupport},
    shapes::CollisionShape,
    terrain::{GroundPlane, Heightmap},
};
use crate::{
    config::WorldSettings,
    core::{ids::ObjectId, rigidbody::SimBody, types::Transform},
};

/// Where a fast mover's swept sphere first touched static geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcdHit {
    pub target: ObjectId,
    /// Fraction of this step's motion the body may keep.
    pub fraction: f32,
    pub normal: Vec3,
}

/// Continuous collision clamp for bodies that move farther in one step than
/// the motion threshold. Only static bodies, the ground plane and the
/// terrain stop a mover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CCDDetector {
    pub motion_threshold: f32,
    pub swept_sphere_radius: f32,
    pub terrain_hit_fraction: f32,
}

impl Default for CCDDetector {
    fn default() -> Self {
        Self::from_settings(&WorldSettings::default())
    }
}

impl CCDDetector {
    pub fn from_settings(settings: &WorldSettings) -> Self {
        Self {
            motion_threshold: settings.ccd_motion_threshold,
            swept_sphere_radius: settings.ccd_swept_sphere_radius,
            terrain_hit_fraction: settings.terrain_hit_fraction,
        }
    }

    /// A zero threshold turns the clamp off.
    pub fn enabled(&self) -> bool {
        self.motion_threshold > 0.0 && self.swept_sphere_radius > 0.0
    }

    pub fn needs_sweep(&self, motion: Vec3) -> bool {
        self.enabled() && motion.length_squared() > self.motion_threshold * self.motion_threshold
    }

    /// Earliest hit of the sphere swept from `start` to `end`, if any.
    pub fn sweep(
        &self,
        mover: ObjectId,
        start: Vec3,
        end: Vec3,
        statics: &[&SimBody],
        ground: &GroundPlane,
        terrain: Option<&Heightmap>,
    ) -> Option<CcdHit> {
        let motion = end - start;
        if !self.needs_sweep(motion) {
            return None;
        }
        let radius = self.swept_sphere_radius;
        let mut best: Option<CcdHit> = None;
        let mut keep = |hit: CcdHit| {
            if best.map_or(true, |b| hit.fraction < b.fraction) {
                best = Some(hit);
            }
        };

        let sphere = CollisionShape::Sphere { radius };
        let placed = Transform::from_position(start);
        let swept = ShapeSupport::new(&sphere, &placed);
        for body in statics {
            if body.id == mover || !body.is_collidable {
                continue;
            }
            let target = ShapeSupport::new(&body.shape, &body.transform);
            let difference = MinkowskiDifference {
                target: &target,
                mover: &swept,
            };
            if let Some(hit) = cast_ray(&difference, Vec3::ZERO, motion) {
                keep(CcdHit {
                    target: body.id,
                    fraction: hit.fraction,
                    normal: hit.normal,
                });
            }
        }

        let clearance_start = start.y - ground.height - radius;
        let clearance_end = end.y - ground.height - radius;
        if clearance_start >= 0.0 && clearance_end < 0.0 {
            let fraction = clearance_start / (clearance_start - clearance_end);
            keep(CcdHit {
                target: ObjectId::GROUND_PLANE,
                fraction: fraction * self.terrain_hit_fraction,
                normal: Vec3::Y,
            });
        }

        if let Some(map) = terrain {
            let bottom = start - Vec3::Y * radius;
            if let Some((fraction, normal, _)) = map.raycast(bottom, bottom + motion) {
                keep(CcdHit {
                    target: ObjectId::TERRAIN,
                    fraction: fraction * self.terrain_hit_fraction,
                    normal,
                });
            }
        }

        best
    }

    /// Moves the body back to the hit and removes the velocity that carried
    /// it into the surface.
    pub fn apply(body: &mut SimBody, start: Vec3, hit: &CcdHit) {
        let end = body.transform.position;
        body.transform.position = start + (end - start) * hit.fraction;
        let into = body.velocity.linear.dot(hit.normal);
        if into < 0.0 {
            body.velocity.linear -= hit.normal * into;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CCDDetector {
        CCDDetector {
            motion_threshold: 0.5,
            swept_sphere_radius: 0.2,
            terrain_hit_fraction: 1.0,
        }
    }

    #[test]
    fn disabled_by_zero_threshold() {
        let ccd = CCDDetector {
            motion_threshold: 0.0,
            ..detector()
        };
        assert!(!ccd.enabled());
        let hit = ccd.sweep(
            ObjectId(5),
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.0, -5.0, 0.0),
            &[],
            &GroundPlane::default(),
            None,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn slow_motion_is_not_swept() {
        let hit = detector().sweep(
            ObjectId(5),
            Vec3::new(0.0, 0.3, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            &[],
            &GroundPlane::default(),
            None,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn fast_fall_is_stopped_at_the_ground() {
        let hit = detector()
            .sweep(
                ObjectId(5),
                Vec3::new(0.0, 2.2, 0.0),
                Vec3::new(0.0, -7.8, 0.0),
                &[],
                &GroundPlane::default(),
                None,
            )
            .expect("ground hit");
        assert_eq!(hit.target, ObjectId::GROUND_PLANE);
        assert!((hit.fraction - 0.2).abs() < 1e-5);
    }

    #[test]
    fn apply_clamps_position_and_normal_velocity() {
        use crate::core::{
            math::Vector3,
            mesh::GeometryStore,
            shape::{ShapeData, ShapeType},
        };
        let data = ShapeData::new(5, ShapeType::Sphere)
            .with_velocity(Vector3::new(3.0, -60.0, 0.0));
        let mut body =
            SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
                .expect("body");
        body.transform.position = Vec3::new(0.0, -8.0, 0.0);
        let hit = CcdHit {
            target: ObjectId::GROUND_PLANE,
            fraction: 0.2,
            normal: Vec3::Y,
        };
        CCDDetector::apply(&mut body, Vec3::new(0.0, 2.0, 0.0), &hit);
        assert!((body.transform.position.y - 0.0).abs() < 1e-5);
        assert_eq!(body.velocity.linear, Vec3::new(3.0, 0.0, 0.0));
    }
}
