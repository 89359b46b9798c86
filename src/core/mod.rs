//! Core types describing simulated objects and the records the host sends.

pub mod ids;
pub mod math;
pub mod mesh;
pub mod rigidbody;
pub mod shape;
pub mod types;

pub use ids::{ObjectId, GROUND_PLANE_ID, INVALID_HIT_ID, TERRAIN_ID};
pub use math::{Quaternion, Vector3};
pub use mesh::{Aabb, GeometryCache, GeometryStore, HullGeometry, TriangleMesh};
pub use rigidbody::SimBody;
pub use shape::{ConvexHull, RawConvexHull, ShapeData, ShapeType};
pub use types::{MassProperties, Material, Transform, Velocity};
