//! Hull and mesh geometry plus the cache that resolves host keys to it.
//!
//! Objects reference geometry by opaque 64-bit keys. The world never
//! interprets a key itself; it asks a [`GeometryCache`] to resolve it at
//! creation time and keeps the returned `Arc`.

use std::{collections::HashMap, sync::Arc};

use glam::Vec3;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{math::Vector3, shape::ConvexHull};
use crate::error::GeometryError;

/// Axis-aligned bounding box used for geometry bounds and broad-phase cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }
}

/// Convex hull vertices in object space with the host offset already applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HullGeometry {
    pub vertices: Vec<Vec3>,
    pub bounds: Aabb,
}

impl HullGeometry {
    /// Copies a borrowed hull. The caller's buffer is not referenced after
    /// this returns.
    pub fn from_view(hull: &ConvexHull<'_>) -> Result<Self, GeometryError> {
        if hull.vertices.is_empty() {
            return Err(GeometryError::EmptyHull);
        }
        let offset = Vec3::from(hull.offset);
        let mut vertices = Vec::with_capacity(hull.vertices.len());
        for (index, vertex) in hull.vertices.iter().enumerate() {
            if !vertex.is_finite() {
                return Err(GeometryError::NonFiniteVertex(index));
            }
            vertices.push(Vec3::from(*vertex) + offset);
        }
        let bounds = Aabb::from_points(&vertices);
        Ok(Self { vertices, bounds })
    }

    pub fn bounding_radius(&self) -> f32 {
        self.vertices.iter().map(|v| v.length()).fold(0.0, f32::max)
    }
}

/// Triangle mesh registered by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub bounds: Aabb,
}

impl TriangleMesh {
    pub fn new(vertices: &[Vector3], indices: &[u32]) -> Result<Self, GeometryError> {
        if vertices.is_empty() {
            return Err(GeometryError::EmptyHull);
        }
        let mut points = Vec::with_capacity(vertices.len());
        for (index, vertex) in vertices.iter().enumerate() {
            if !vertex.is_finite() {
                return Err(GeometryError::NonFiniteVertex(index));
            }
            points.push(Vec3::from(*vertex));
        }

        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for tri in indices.chunks_exact(3) {
            for &index in tri {
                if index as usize >= points.len() {
                    return Err(GeometryError::BadIndex {
                        index,
                        vertex_count: points.len(),
                    });
                }
            }
            triangles.push([tri[0], tri[1], tri[2]]);
        }

        let bounds = Aabb::from_points(&points);
        Ok(Self {
            vertices: points,
            indices: triangles,
            bounds,
        })
    }

    pub fn bounding_radius(&self) -> f32 {
        self.vertices.iter().map(|v| v.length()).fold(0.0, f32::max)
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.iter().map(move |tri| {
            [
                self.vertices[tri[0] as usize],
                self.vertices[tri[1] as usize],
                self.vertices[tri[2] as usize],
            ]
        })
    }
}

/// External collaborator that turns hull/mesh keys into geometry.
pub trait GeometryCache: Send + Sync {
    fn resolve_hull(&self, key: u64) -> Option<Arc<HullGeometry>>;
    fn resolve_mesh(&self, key: u64) -> Option<Arc<TriangleMesh>>;
}

impl<T: GeometryCache + ?Sized> GeometryCache for Arc<T> {
    fn resolve_hull(&self, key: u64) -> Option<Arc<HullGeometry>> {
        (**self).resolve_hull(key)
    }

    fn resolve_mesh(&self, key: u64) -> Option<Arc<TriangleMesh>> {
        (**self).resolve_mesh(key)
    }
}

/// In-memory geometry cache. Safe to share between the host thread that
/// registers geometry and the world that resolves it.
#[derive(Debug, Default)]
pub struct GeometryStore {
    hulls: RwLock<HashMap<u64, Arc<HullGeometry>>>,
    meshes: RwLock<HashMap<u64, Arc<TriangleMesh>>>,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_hull(&self, key: u64, hull: ConvexHull<'_>) -> Result<(), GeometryError> {
        let geometry = HullGeometry::from_view(&hull)?;
        debug!(
            "geometry: hull {key:#x} registered with {} vertices",
            geometry.vertices.len()
        );
        self.hulls.write().insert(key, Arc::new(geometry));
        Ok(())
    }

    pub fn insert_mesh(
        &self,
        key: u64,
        vertices: &[Vector3],
        indices: &[u32],
    ) -> Result<(), GeometryError> {
        let mesh = TriangleMesh::new(vertices, indices)?;
        debug!(
            "geometry: mesh {key:#x} registered with {} triangles",
            mesh.indices.len()
        );
        self.meshes.write().insert(key, Arc::new(mesh));
        Ok(())
    }

    pub fn remove_hull(&self, key: u64) -> bool {
        self.hulls.write().remove(&key).is_some()
    }

    pub fn remove_mesh(&self, key: u64) -> bool {
        self.meshes.write().remove(&key).is_some()
    }

    pub fn hull_count(&self) -> usize {
        self.hulls.read().len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.read().len()
    }
}

impl GeometryCache for GeometryStore {
    fn resolve_hull(&self, key: u64) -> Option<Arc<HullGeometry>> {
        self.hulls.read().get(&key).cloned()
    }

    fn resolve_mesh(&self, key: u64) -> Option<Arc<TriangleMesh>> {
        self.meshes.read().get(&key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra() -> Vec<Vector3> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn hull_copy_applies_offset() {
        let verts = tetra();
        let hull = ConvexHull::new(Vector3::new(0.0, 2.0, 0.0), &verts);
        let geometry = HullGeometry::from_view(&hull).expect("hull");
        assert_eq!(geometry.vertices[0], Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(geometry.bounds.max.y, 3.0);
    }

    #[test]
    fn store_resolves_and_forgets_keys() {
        let store = GeometryStore::new();
        let verts = tetra();
        store
            .insert_hull(7, ConvexHull::new(Vector3::ZERO, &verts))
            .expect("insert");
        assert!(store.resolve_hull(7).is_some());
        assert!(store.resolve_hull(8).is_none());
        assert!(store.remove_hull(7));
        assert!(store.resolve_hull(7).is_none());
    }

    #[test]
    fn mesh_rejects_out_of_range_index() {
        let verts = tetra();
        let err = TriangleMesh::new(&verts, &[0, 1, 9]).expect_err("bad index");
        assert_eq!(
            err,
            GeometryError::BadIndex {
                index: 9,
                vertex_count: 4
            }
        );
    }

    #[test]
    fn hull_rejects_non_finite_vertex() {
        let mut verts = tetra();
        verts[2].y = f32::NAN;
        let err = HullGeometry::from_view(&ConvexHull::new(Vector3::ZERO, &verts))
            .expect_err("nan vertex");
        assert_eq!(err, GeometryError::NonFiniteVertex(2));
    }
}
