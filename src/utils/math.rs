//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Builds an inertia tensor for a solid capsule aligned along Y.
pub fn inertia_capsule(radius: f32, height: f32, mass: f32) -> Mat3 {
    let cylinder_mass = mass * 0.6;
    let sphere_mass = (mass - cylinder_mass) / 2.0;

    let cylinder_inertia = Mat3::from_diagonal(Vec3::new(
        (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height),
        0.5 * cylinder_mass * radius * radius,
        (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height),
    ));

    let sphere_inertia = Mat3::from_diagonal(Vec3::splat(0.4 * sphere_mass * radius * radius));

    cylinder_inertia + sphere_inertia
}

/// Any vector orthogonal to `v` (unit length when `v` is non-zero).
pub fn any_orthogonal(v: Vec3) -> Vec3 {
    let axis = if v.x.abs() < 0.57 { Vec3::X } else { Vec3::Y };
    v.cross(axis).normalize_or_zero()
}

/// Small deterministic generator for solver-order shuffling.
#[derive(Debug, Clone, Copy)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u32() as usize) % (i + 1);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthogonal_is_orthogonal() {
        for v in [Vec3::X, Vec3::Y, Vec3::new(0.3, -2.0, 5.0)] {
            let o = any_orthogonal(v);
            assert!(o.dot(v).abs() < 1e-5);
            assert!((o.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn shuffle_is_a_permutation_and_deterministic() {
        let mut a: Vec<u32> = (0..16).collect();
        let mut b = a.clone();
        XorShift32::new(7).shuffle(&mut a);
        XorShift32::new(7).shuffle(&mut b);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn zero_angular_velocity_is_identity() {
        assert_eq!(angular_velocity_to_quat(Vec3::ZERO, 0.1), Quat::IDENTITY);
    }
}
