use glam::Vec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    config::WorldSettings, core::rigidbody::SimBody, utils::math::angular_velocity_to_quat,
};

/// Below this many bodies the parallel path costs more than it saves.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 256;

/// Integrator responsible for stepping rigid bodies forward in time.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    parallel: bool,
}

impl Integrator {
    pub fn from_settings(settings: &WorldSettings) -> Self {
        Self {
            gravity: settings.gravity,
            linear_damping: settings.linear_damping,
            angular_damping: settings.angular_damping,
            parallel: cfg!(feature = "parallel"),
        }
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled && cfg!(feature = "parallel");
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Applies gravity (after buoyancy), the accumulated host force and
    /// damping, then clears the force.
    pub fn integrate_velocity(&self, body: &mut SimBody, dt: f32) {
        if !body.is_simulated() {
            return;
        }

        let acceleration = body.effective_gravity(self.gravity) + body.force * body.inverse_mass;
        body.velocity.linear += acceleration * dt;
        body.velocity.linear *= (1.0 - self.linear_damping).powf(dt);
        body.velocity.angular *= (1.0 - self.angular_damping).powf(dt);
        if body.lock_rotation {
            body.velocity.angular = Vec3::ZERO;
        }
        body.force = Vec3::ZERO;
    }

    pub fn integrate_position(&self, body: &mut SimBody, dt: f32) {
        if !body.is_simulated() {
            return;
        }

        body.transform.position += body.velocity.linear * dt;
        let delta = angular_velocity_to_quat(body.velocity.angular, dt);
        body.transform.rotation = (delta * body.transform.rotation).normalize();
    }

    pub fn integrate_velocities(&self, bodies: &mut [SimBody], dt: f32) {
        #[cfg(feature = "parallel")]
        if self.parallel && bodies.len() >= PARALLEL_THRESHOLD {
            bodies
                .par_iter_mut()
                .for_each(|body| self.integrate_velocity(body, dt));
            return;
        }
        for body in bodies.iter_mut() {
            self.integrate_velocity(body, dt);
        }
    }

    pub fn integrate_positions(&self, bodies: &mut [SimBody], dt: f32) {
        #[cfg(feature = "parallel")]
        if self.parallel && bodies.len() >= PARALLEL_THRESHOLD {
            bodies
                .par_iter_mut()
                .for_each(|body| self.integrate_position(body, dt));
            return;
        }
        for body in bodies.iter_mut() {
            self.integrate_position(body, dt);
        }
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Self::from_settings(&WorldSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::core::{
        math::Vector3,
        mesh::GeometryStore,
        shape::{ShapeData, ShapeType},
    };

    fn body(data: ShapeData) -> SimBody {
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
            .expect("body")
    }

    #[test]
    fn gravity_scales_with_buoyancy() {
        let integrator = Integrator::default();
        let mut sinking = body(ShapeData::new(2, ShapeType::Box));
        let mut floating = body(ShapeData::new(3, ShapeType::Box).with_buoyancy(1.0));
        integrator.integrate_velocity(&mut sinking, 0.1);
        integrator.integrate_velocity(&mut floating, 0.1);
        assert!((sinking.velocity.linear.y - integrator.gravity.y * 0.1).abs() < 1e-5);
        assert_eq!(floating.velocity.linear, Vec3::ZERO);
    }

    #[test]
    fn force_is_consumed_once() {
        let mut integrator = Integrator::default();
        integrator.gravity = Vec3::ZERO;
        let mut b = body(ShapeData::new(2, ShapeType::Box).with_mass(2.0));
        b.force = Vec3::new(4.0, 0.0, 0.0);
        integrator.integrate_velocity(&mut b, 0.5);
        assert!((b.velocity.linear.x - 1.0).abs() < 1e-5);
        assert_eq!(b.force, Vec3::ZERO);
        integrator.integrate_velocity(&mut b, 0.5);
        assert!((b.velocity.linear.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn damping_follows_per_second_fraction() {
        let mut integrator = Integrator::default();
        integrator.gravity = Vec3::ZERO;
        integrator.linear_damping = 0.5;
        let mut b =
            body(ShapeData::new(2, ShapeType::Box).with_velocity(Vector3::new(8.0, 0.0, 0.0)));
        for _ in 0..4 {
            integrator.integrate_velocity(&mut b, 0.25);
        }
        assert!((b.velocity.linear.x - 4.0).abs() < 1e-3);
    }

    #[test]
    fn statics_and_sleepers_do_not_move() {
        let integrator = Integrator::default();
        let mut fixed = body(ShapeData::new(2, ShapeType::Box).with_static(true));
        let mut asleep = body(ShapeData::new(3, ShapeType::Box));
        asleep.is_awake = false;
        for b in [&mut fixed, &mut asleep] {
            integrator.integrate_velocity(b, 0.1);
            integrator.integrate_position(b, 0.1);
            assert_eq!(b.transform.position, Vec3::ZERO);
        }
    }

    #[test]
    fn spin_rotates_about_axis() {
        let integrator = Integrator::default();
        let mut b = body(ShapeData::new(2, ShapeType::Box));
        b.velocity.angular = Vec3::new(0.0, std::f32::consts::PI, 0.0);
        integrator.integrate_position(&mut b, 0.5);
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(b.transform.rotation.angle_between(expected) < 1e-4);
    }
}
