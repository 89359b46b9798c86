//! Collision detection modules: broad-phase, narrow-phase, contact manifolds,
//! the ground and terrain pseudo-objects, queries and CCD.

pub mod broadphase;
pub mod ccd;
pub mod clipping;
pub mod contact;
pub mod narrowphase;
pub mod queries;
pub mod shapes;
pub mod terrain;

pub use broadphase::{BroadPhase, SpatialGrid};
pub use ccd::{CCDDetector, CcdHit};
pub use contact::{CollisionDesc, Contact, ContactManifold, ContactTracker, ManifoldCache, PairKey};
pub use narrowphase::{ContactPoint, NarrowPhase};
pub use queries::{RaycastHit, SweepHit, SweepQuery, SweepShape};
pub use shapes::CollisionShape;
pub use terrain::{GroundPlane, Heightmap};
