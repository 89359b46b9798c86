use glam::{Mat3, Quat, Vec3};

use super::{
    ids::ObjectId,
    mesh::{Aabb, GeometryCache},
    shape::{ShapeData, ShapeType},
    types::{MassProperties, Material, Transform, Velocity},
};
use crate::{collision::shapes::CollisionShape, config::WorldSettings, error::CreateError};

/// Live simulated object owned by the world.
#[derive(Debug, Clone)]
pub struct SimBody {
    pub id: ObjectId,
    pub kind: ShapeType,
    pub shape: CollisionShape,
    pub transform: Transform,
    pub velocity: Velocity,
    pub acceleration: Vec3,
    /// Host forces accumulated since the last step.
    pub force: Vec3,
    pub mass_properties: MassProperties,
    pub material: Material,
    pub buoyancy: f32,
    pub is_static: bool,
    pub is_collidable: bool,
    pub is_awake: bool,
    pub is_frozen: bool,
    pub lock_rotation: bool,
    pub inverse_mass: f32,
    pub inverse_inertia: Mat3,
    pub sleep_timer: f32,
    pub hull_key: u64,
    pub mesh_key: u64,
    /// Mass as requested by the host, kept so scale changes can re-derive it.
    requested_mass: f32,
}

impl SimBody {
    /// Builds a body from a host request. The request is rejected whole if
    /// any part of it is unusable.
    pub fn from_shape_data(
        data: &ShapeData,
        settings: &WorldSettings,
        cache: &dyn GeometryCache,
    ) -> Result<Self, CreateError> {
        let kind = data.kind()?;
        if !data.transform_is_finite() {
            return Err(CreateError::NonFiniteTransform);
        }

        let scale = Vec3::from(data.scale).abs();
        let shape = build_shape(kind, scale, data.hull_key, data.mesh_key, settings, cache)?;

        let material = if kind == ShapeType::Avatar {
            Material::new(settings.avatar_friction, settings.avatar_restitution)
        } else {
            Material::new(
                sanitize(data.friction, settings.default_friction),
                sanitize(data.restitution, settings.default_restitution),
            )
        };

        let mut body = Self {
            id: data.object_id(),
            kind,
            shape,
            transform: Transform {
                position: data.position.into(),
                rotation: normalized_rotation(data.rotation.into()),
                scale,
            },
            velocity: Velocity {
                linear: data.velocity.into(),
                angular: Vec3::ZERO,
            },
            acceleration: Vec3::ZERO,
            force: Vec3::ZERO,
            mass_properties: MassProperties::default(),
            material,
            buoyancy: data.buoyancy.clamp(-1.0, 1.0),
            is_static: data.is_static_object(),
            is_collidable: data.is_collidable(),
            is_awake: true,
            is_frozen: false,
            lock_rotation: kind == ShapeType::Avatar,
            inverse_mass: 0.0,
            inverse_inertia: Mat3::ZERO,
            sleep_timer: 0.0,
            hull_key: data.hull_key,
            mesh_key: data.mesh_key,
            requested_mass: data.mass,
        };
        if body.buoyancy.is_nan() {
            body.buoyancy = 0.0;
        }
        body.recompute_mass(settings);
        Ok(body)
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static
    }

    /// Whether the integrator should move this body this step.
    pub fn is_simulated(&self) -> bool {
        !self.is_static && !self.is_frozen && self.is_awake
    }

    /// Re-derives mass, inertia and their inverses from the shape.
    pub fn recompute_mass(&mut self, settings: &WorldSettings) {
        let density = if self.kind == ShapeType::Avatar {
            settings.avatar_density
        } else {
            settings.default_density
        };
        let mass = if self.requested_mass.is_finite() && self.requested_mass > 0.0 {
            self.requested_mass
        } else {
            density * self.shape.volume()
        };
        self.mass_properties = MassProperties {
            mass,
            inertia: self.shape.inertia(mass),
        };

        if self.is_static || !(mass.is_finite() && mass > f32::EPSILON) {
            self.inverse_mass = 0.0;
            self.inverse_inertia = Mat3::ZERO;
            return;
        }
        self.inverse_mass = 1.0 / mass;
        let inverse = self.mass_properties.inertia.inverse();
        self.inverse_inertia = if self.lock_rotation || !inverse.is_finite() {
            Mat3::ZERO
        } else {
            inverse
        };
    }

    /// Replaces scale and requested mass, rebuilding the collision shape.
    pub fn set_scale_mass(
        &mut self,
        scale: Vec3,
        mass: f32,
        settings: &WorldSettings,
        cache: &dyn GeometryCache,
    ) -> Result<(), CreateError> {
        let scale = scale.abs();
        self.shape = build_shape(
            self.kind,
            scale,
            self.hull_key,
            self.mesh_key,
            settings,
            cache,
        )?;
        self.transform.scale = scale;
        self.requested_mass = mass;
        self.recompute_mass(settings);
        Ok(())
    }

    /// Re-derives everything that depends on world settings after a
    /// parameter change: avatar shape and material, and density-derived mass.
    pub fn apply_settings(&mut self, settings: &WorldSettings, cache: &dyn GeometryCache) {
        if self.kind == ShapeType::Avatar {
            self.shape = CollisionShape::Capsule {
                radius: settings.avatar_capsule_radius,
                height: settings.avatar_capsule_height,
            };
            self.material = Material::new(settings.avatar_friction, settings.avatar_restitution);
        } else if let Ok(shape) = build_shape(
            self.kind,
            self.transform.scale,
            self.hull_key,
            self.mesh_key,
            settings,
            cache,
        ) {
            self.shape = shape;
        }
        self.recompute_mass(settings);
    }

    pub fn set_static(&mut self, is_static: bool, settings: &WorldSettings) {
        self.is_static = is_static;
        if is_static {
            self.velocity = Velocity::default();
            self.acceleration = Vec3::ZERO;
        }
        self.recompute_mass(settings);
    }

    /// Inverse inertia in world space.
    pub fn world_inverse_inertia(&self) -> Mat3 {
        let rotation = Mat3::from_quat(self.transform.rotation);
        rotation * self.inverse_inertia * rotation.transpose()
    }

    /// Gravity acting on this body after buoyancy.
    pub fn effective_gravity(&self, gravity: Vec3) -> Vec3 {
        gravity * (1.0 - self.buoyancy)
    }

    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.velocity.linear + self.velocity.angular.cross(point - self.transform.position)
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if self.inverse_mass == 0.0 {
            return;
        }
        self.velocity.linear += impulse * self.inverse_mass;
        let torque = (point - self.transform.position).cross(impulse);
        self.velocity.angular += self.world_inverse_inertia() * torque;
    }

    /// Host writes always wake the body and clear a numeric freeze.
    pub fn wake(&mut self) {
        self.is_awake = true;
        self.is_frozen = false;
        self.sleep_timer = 0.0;
    }

    /// World-space bounds of the collision shape.
    pub fn aabb(&self) -> Aabb {
        let t = &self.transform;
        let max = Vec3::new(
            self.shape.support(t, Vec3::X).x,
            self.shape.support(t, Vec3::Y).y,
            self.shape.support(t, Vec3::Z).z,
        );
        let min = Vec3::new(
            self.shape.support(t, -Vec3::X).x,
            self.shape.support(t, -Vec3::Y).y,
            self.shape.support(t, -Vec3::Z).z,
        );
        Aabb::new(min, max)
    }

    pub fn state_is_finite(&self) -> bool {
        self.transform.is_finite() && self.velocity.is_finite() && self.acceleration.is_finite()
    }
}

/// Hosts sometimes send an all-zero quaternion for "no rotation".
pub(crate) fn normalized_rotation(rotation: Quat) -> Quat {
    if rotation.length_squared() < 1e-12 {
        Quat::IDENTITY
    } else {
        rotation.normalize()
    }
}

fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

/// Turns a shape kind plus full-size scale into object-space geometry.
pub(crate) fn build_shape(
    kind: ShapeType,
    scale: Vec3,
    hull_key: u64,
    mesh_key: u64,
    settings: &WorldSettings,
    cache: &dyn GeometryCache,
) -> Result<CollisionShape, CreateError> {
    let lateral = scale.x.max(scale.z) * 0.5;
    let shape = match kind {
        ShapeType::Avatar => CollisionShape::Capsule {
            radius: settings.avatar_capsule_radius,
            height: settings.avatar_capsule_height,
        },
        ShapeType::Box => CollisionShape::Box {
            half_extents: scale * 0.5,
        },
        ShapeType::Sphere => CollisionShape::Sphere {
            radius: scale.max_element() * 0.5,
        },
        ShapeType::Cylinder => CollisionShape::Cylinder {
            radius: lateral,
            height: scale.y,
        },
        ShapeType::Cone => CollisionShape::Cone {
            radius: lateral,
            height: scale.y,
        },
        ShapeType::Hull => CollisionShape::Hull {
            geometry: cache
                .resolve_hull(hull_key)
                .ok_or(CreateError::UnknownHull(hull_key))?,
            scale,
        },
        ShapeType::Mesh => CollisionShape::Mesh {
            mesh: cache
                .resolve_mesh(mesh_key)
                .ok_or(CreateError::UnknownMesh(mesh_key))?,
            scale,
        },
    };
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        math::{Vector3, Quaternion},
        mesh::GeometryStore,
    };
    use approx::assert_relative_eq;

    fn make(data: ShapeData) -> Result<SimBody, CreateError> {
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
    }

    #[test]
    fn box_scale_is_full_size() {
        let body = make(ShapeData::new(5, ShapeType::Box).with_scale(Vector3::new(2.0, 4.0, 6.0)))
            .expect("box");
        match body.shape {
            CollisionShape::Box { half_extents } => {
                assert_eq!(half_extents, Vec3::new(1.0, 2.0, 3.0))
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(body.inverse_mass, 1.0);
    }

    #[test]
    fn static_body_has_infinite_mass() {
        let body = make(ShapeData::new(5, ShapeType::Sphere).with_static(true).with_mass(0.0))
            .expect("static");
        assert_eq!(body.inverse_mass, 0.0);
        assert_eq!(body.world_inverse_inertia(), Mat3::ZERO);
    }

    #[test]
    fn non_positive_mass_derives_from_density() {
        let settings = WorldSettings::default();
        let body = make(ShapeData::new(5, ShapeType::Box).with_mass(-1.0)).expect("box");
        assert_relative_eq!(body.mass_properties.mass, settings.default_density, epsilon = 1e-4);
    }

    #[test]
    fn avatar_uses_capsule_and_locked_rotation() {
        let settings = WorldSettings::default();
        let body = make(ShapeData::new(5, ShapeType::Avatar)).expect("avatar");
        match body.shape {
            CollisionShape::Capsule { radius, height } => {
                assert_eq!(radius, settings.avatar_capsule_radius);
                assert_eq!(height, settings.avatar_capsule_height);
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert!(body.lock_rotation);
        assert_eq!(body.inverse_inertia, Mat3::ZERO);
        assert_eq!(body.material.friction, settings.avatar_friction);
    }

    #[test]
    fn unknown_hull_key_is_rejected() {
        let err = make(ShapeData::new(5, ShapeType::Hull).with_hull_key(42)).expect_err("no hull");
        assert_eq!(err, CreateError::UnknownHull(42));
    }

    #[test]
    fn invalid_material_falls_back_to_defaults() {
        let settings = WorldSettings::default();
        let body = make(ShapeData::new(5, ShapeType::Box).with_material(-1.0, f32::NAN))
            .expect("box");
        assert_eq!(body.material.friction, settings.default_friction);
        assert_eq!(body.material.restitution, settings.default_restitution);
    }

    #[test]
    fn non_finite_rotation_is_rejected() {
        let data = ShapeData::new(5, ShapeType::Box)
            .with_rotation(Quaternion::new(f32::NAN, 0.0, 0.0, 1.0));
        assert_eq!(make(data).expect_err("nan"), CreateError::NonFiniteTransform);
    }

    #[test]
    fn buoyancy_scales_gravity() {
        let body = make(ShapeData::new(5, ShapeType::Box).with_buoyancy(0.25)).expect("box");
        let g = body.effective_gravity(Vec3::new(0.0, -10.0, 0.0));
        assert_relative_eq!(g.y, -7.5);
    }

    #[test]
    fn aabb_of_unit_box_at_origin() {
        let body = make(ShapeData::new(5, ShapeType::Box)).expect("box");
        let aabb = body.aabb();
        assert_eq!(aabb.min, Vec3::splat(-0.5));
        assert_eq!(aabb.max, Vec3::splat(0.5));
    }
}
