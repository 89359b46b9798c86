//! Boundary vector and rotation types.
//!
//! These are the single-precision value types that cross the host boundary.
//! Internally the engine works on `glam` types; conversion is lossless in both
//! directions.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// 3D point or direction as laid out on the wire: `x, y, z` as `f32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Per-axis tolerance test used by change detection.
    ///
    /// Each axis must fall strictly inside `(other - epsilon, other + epsilon)`.
    /// The axes are tested independently, so this is a box test rather than a
    /// distance test, and a difference of exactly `epsilon` fails.
    pub fn almost_equal(&self, other: &Self, epsilon: f32) -> bool {
        within(self.x, other.x, epsilon)
            && within(self.y, other.y, epsilon)
            && within(self.z, other.z, epsilon)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vec3> for Vector3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vector3> for Vec3 {
    fn from(v: Vector3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// Rotation as laid out on the wire: `x, y, z, w` as `f32`.
///
/// The type does not normalize; callers hand in normalized rotations.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Per-component tolerance test with the same window semantics as
    /// [`Vector3::almost_equal`].
    pub fn almost_equal(&self, other: &Self, epsilon: f32) -> bool {
        within(self.x, other.x, epsilon)
            && within(self.y, other.y, epsilon)
            && within(self.z, other.z, epsilon)
            && within(self.w, other.w, epsilon)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }
}

impl From<Quat> for Quaternion {
    fn from(q: Quat) -> Self {
        Self::new(q.x, q.y, q.z, q.w)
    }
}

impl From<Quaternion> for Quat {
    fn from(q: Quaternion) -> Self {
        Quat::from_xyzw(q.x, q.y, q.z, q.w)
    }
}

#[inline]
fn within(value: f32, reference: f32, epsilon: f32) -> bool {
    (reference - epsilon) < value && value < (reference + epsilon)
}
