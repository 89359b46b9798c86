//! Object identifiers and the reserved sentinel values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terrain collisions are reported against this id.
pub const TERRAIN_ID: u32 = 0;
/// The ground plane backstop.
pub const GROUND_PLANE_ID: u32 = 1;
/// "No object" in every hit record.
pub const INVALID_HIT_ID: u32 = u32::MAX;

/// Host-assigned identifier of a physics object.
///
/// Ids are opaque to the core and stable for the lifetime of the object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const TERRAIN: Self = Self(TERRAIN_ID);
    pub const GROUND_PLANE: Self = Self(GROUND_PLANE_ID);

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Whether the id is one of the process-wide reserved values that may
    /// never name a simulated object.
    pub fn is_reserved(self) -> bool {
        matches!(self.0, TERRAIN_ID | GROUND_PLANE_ID | INVALID_HIT_ID)
    }

    /// Terrain and ground plane only ever appear as a side of a collision.
    pub fn is_pseudo_object(self) -> bool {
        matches!(self.0, TERRAIN_ID | GROUND_PLANE_ID)
    }
}

impl From<u32> for ObjectId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TERRAIN_ID => write!(f, "terrain"),
            GROUND_PLANE_ID => write!(f, "ground-plane"),
            raw => write!(f, "#{raw}"),
        }
    }
}

/// Translates an internal optional hit target to its boundary encoding.
pub fn hit_id(target: Option<ObjectId>) -> u32 {
    target.map_or(INVALID_HIT_ID, ObjectId::raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_recognised() {
        assert!(ObjectId(0).is_reserved());
        assert!(ObjectId(1).is_reserved());
        assert!(ObjectId(u32::MAX).is_reserved());
        assert!(!ObjectId(2).is_reserved());
        assert!(!ObjectId(u32::MAX - 1).is_reserved());
    }

    #[test]
    fn missing_hit_maps_to_sentinel() {
        assert_eq!(hit_id(None), INVALID_HIT_ID);
        assert_eq!(hit_id(Some(ObjectId(42))), 42);
        assert_eq!(hit_id(Some(ObjectId::TERRAIN)), TERRAIN_ID);
    }
}
