//! Host-facing object description records.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::{
    ids::ObjectId,
    math::{Quaternion, Vector3},
};
use crate::error::{CreateError, GeometryError};

/// Closed set of shape kinds. The numeric values are the wire contract.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Avatar = 0,
    Box = 1,
    Cone = 2,
    Cylinder = 3,
    Sphere = 4,
    Mesh = 5,
    Hull = 6,
}

impl ShapeType {
    pub const ALL: [ShapeType; 7] = [
        ShapeType::Avatar,
        ShapeType::Box,
        ShapeType::Cone,
        ShapeType::Cylinder,
        ShapeType::Sphere,
        ShapeType::Mesh,
        ShapeType::Hull,
    ];

    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ShapeType {
    type Error = CreateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ShapeType::Avatar),
            1 => Ok(ShapeType::Box),
            2 => Ok(ShapeType::Cone),
            3 => Ok(ShapeType::Cylinder),
            4 => Ok(ShapeType::Sphere),
            5 => Ok(ShapeType::Mesh),
            6 => Ok(ShapeType::Hull),
            other => Err(CreateError::InvalidShapeType(other)),
        }
    }
}

/// Creation / bulk-update request for one object.
///
/// Layout matches the natural C layout of the host record. Booleans are `i32`
/// because boolean width differs between the languages on either side. The
/// four bytes before `hull_key` are the alignment gap the C compiler inserts;
/// they are spelled out so the record has no implicit padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct ShapeData {
    pub id: u32,
    pub shape_type: i32,
    pub position: Vector3,
    pub rotation: Quaternion,
    pub velocity: Vector3,
    pub scale: Vector3,
    pub mass: f32,
    /// Fraction of gravity cancelled for this object.
    pub buoyancy: f32,
    #[serde(skip)]
    pub _pad: u32,
    pub hull_key: u64,
    pub mesh_key: u64,
    pub friction: f32,
    pub restitution: f32,
    pub collidable: i32,
    pub is_static: i32,
}

impl ShapeData {
    pub fn new(id: u32, shape_type: ShapeType) -> Self {
        Self {
            id,
            shape_type: shape_type.raw(),
            position: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            velocity: Vector3::ZERO,
            scale: Vector3::new(1.0, 1.0, 1.0),
            mass: 1.0,
            buoyancy: 0.0,
            _pad: 0,
            hull_key: 0,
            mesh_key: 0,
            friction: 0.5,
            restitution: 0.0,
            collidable: 1,
            is_static: 0,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId(self.id)
    }

    pub fn kind(&self) -> Result<ShapeType, CreateError> {
        ShapeType::try_from(self.shape_type)
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable != 0
    }

    pub fn is_static_object(&self) -> bool {
        self.is_static != 0
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_scale(mut self, scale: Vector3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_buoyancy(mut self, buoyancy: f32) -> Self {
        self.buoyancy = buoyancy;
        self
    }

    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    pub fn with_hull_key(mut self, key: u64) -> Self {
        self.hull_key = key;
        self
    }

    pub fn with_mesh_key(mut self, key: u64) -> Self {
        self.mesh_key = key;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = i32::from(is_static);
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = i32::from(collidable);
        self
    }

    pub(crate) fn transform_is_finite(&self) -> bool {
        self.position.is_finite()
            && self.rotation.is_finite()
            && self.velocity.is_finite()
            && self.scale.is_finite()
    }
}

/// Hull input exactly as the host lays it out. The vertex buffer belongs to
/// the caller.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawConvexHull {
    pub offset: Vector3,
    pub vertex_count: u32,
    pub vertices: *const Vector3,
}

impl RawConvexHull {
    /// Borrows the caller's vertex buffer for the duration of one call.
    ///
    /// # Safety
    /// `vertices` must point at `vertex_count` initialized `Vector3`s that stay
    /// valid and unmodified for `'a`.
    pub unsafe fn as_view<'a>(&'a self) -> Result<ConvexHull<'a>, GeometryError> {
        if self.vertex_count == 0 {
            return Err(GeometryError::EmptyHull);
        }
        if self.vertices.is_null() {
            return Err(GeometryError::NullVertices);
        }
        let vertices = std::slice::from_raw_parts(self.vertices, self.vertex_count as usize);
        Ok(ConvexHull::new(self.offset, vertices))
    }
}

/// Borrowed hull geometry. Whatever consumes it copies what it needs; the
/// view never outlives the call it was handed to.
#[derive(Debug, Clone, Copy)]
pub struct ConvexHull<'a> {
    pub offset: Vector3,
    pub vertices: &'a [Vector3],
}

impl<'a> ConvexHull<'a> {
    pub fn new(offset: Vector3, vertices: &'a [Vector3]) -> Self {
        Self { offset, vertices }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
