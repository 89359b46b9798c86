//! Error types for object creation, object access and geometry registration.
//!
//! Nothing in the stepping path returns these; they surface only from the
//! single host call that failed.

use thiserror::Error;

use crate::core::ids::ObjectId;

/// Why a single creation (or bulk update) request was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CreateError {
    #[error("object id {0} is reserved")]
    ReservedId(u32),
    #[error("object {0} already exists")]
    DuplicateId(ObjectId),
    #[error("unknown shape type {0}")]
    InvalidShapeType(i32),
    #[error("hull key {0:#018x} is not in the geometry cache")]
    UnknownHull(u64),
    #[error("mesh key {0:#018x} is not in the geometry cache")]
    UnknownMesh(u64),
    #[error("creation transform or velocity is not finite")]
    NonFiniteTransform,
}

/// Errors from calls addressing an existing object.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    #[error("object {0} does not exist")]
    NotFound(ObjectId),
    #[error(transparent)]
    Create(#[from] CreateError),
    #[error("value for object {0} is not finite")]
    NonFinite(ObjectId),
}

/// Errors raised while registering hull or mesh geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("hull has no vertices")]
    EmptyHull,
    #[error("vertex buffer pointer is null")]
    NullVertices,
    #[error("vertex {0} is not finite")]
    NonFiniteVertex(usize),
    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    BadIndex { index: u32, vertex_count: usize },
}

pub type Result<T, E = ObjectError> = std::result::Result<T, E>;
