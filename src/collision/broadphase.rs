use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::core::{ids::ObjectId, mesh::Aabb, rigidbody::SimBody};

/// Bounds covering more cells than this skip the grid and are tested
/// against everything.
const MAX_CELLS_PER_ENTRY: i64 = 4096;

/// Uniform grid spatial partitioning used by the broad-phase. Entries are
/// indices into the body slice handed to [`BroadPhase::potential_pairs`].
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<(i32, i32, i32), Vec<usize>>,
    oversized: Vec<usize>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            grid: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    fn cell_range(&self, bounds: &Aabb) -> Option<((i32, i32, i32), (i32, i32, i32))> {
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);
        let span = |lo: i32, hi: i32| i64::from(hi) - i64::from(lo) + 1;
        let cells = span(min_cell.0, max_cell.0)
            * span(min_cell.1, max_cell.1)
            * span(min_cell.2, max_cell.2);
        (cells <= MAX_CELLS_PER_ENTRY).then_some((min_cell, max_cell))
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        self.oversized.clear();
    }

    pub fn insert(&mut self, entry: usize, bounds: &Aabb) {
        let Some((min_cell, max_cell)) = self.cell_range(bounds) else {
            self.oversized.push(entry);
            return;
        };
        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid.entry((x, y, z)).or_default().push(entry);
                }
            }
        }
    }

    pub fn query(&self, bounds: &Aabb) -> Vec<usize> {
        let mut results = self.oversized.clone();
        match self.cell_range(bounds) {
            Some((min_cell, max_cell)) => {
                for x in min_cell.0..=max_cell.0 {
                    for y in min_cell.1..=max_cell.1 {
                        for z in min_cell.2..=max_cell.2 {
                            if let Some(entries) = self.grid.get(&(x, y, z)) {
                                results.extend(entries);
                            }
                        }
                    }
                }
            }
            None => results.extend(self.grid.values().flatten()),
        }

        results.sort_unstable();
        results.dedup();
        results
    }
}

/// Broad phase driver returning potential body pairs.
///
/// Bodies that are not being simulated (static, asleep or frozen) keep the
/// bounds computed the last time they moved unless every bound is forced to
/// refresh.
pub struct BroadPhase {
    grid: SpatialGrid,
    cached_bounds: HashMap<ObjectId, Aabb>,
}

impl BroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            cached_bounds: HashMap::new(),
        }
    }

    /// Drops the cached bounds of a body the host moved or removed.
    pub fn invalidate(&mut self, id: ObjectId) {
        self.cached_bounds.remove(&id);
    }

    pub fn clear(&mut self) {
        self.grid.clear();
        self.cached_bounds.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cached_bounds.len()
    }

    fn bounds_of(&mut self, body: &SimBody, margin: f32, force_update: bool) -> Aabb {
        if !force_update && !body.is_simulated() {
            if let Some(bounds) = self.cached_bounds.get(&body.id) {
                return *bounds;
            }
        }
        let raw = body.aabb();
        let bounds = Aabb::new(raw.min - Vec3::splat(margin), raw.max + Vec3::splat(margin));
        self.cached_bounds.insert(body.id, bounds);
        bounds
    }

    /// Index pairs `(i, j)` into `bodies` whose bounds, grown by `margin`,
    /// overlap. The lower id is always first and the list is sorted by id.
    /// Pairs where neither side is simulated never appear, so two static
    /// (or two sleeping) bodies are never paired.
    pub fn potential_pairs(
        &mut self,
        bodies: &[SimBody],
        margin: f32,
        force_update: bool,
    ) -> Vec<(usize, usize)> {
        self.grid.clear();
        let mut bounds = Vec::with_capacity(bodies.len());
        for (index, body) in bodies.iter().enumerate() {
            if !body.is_collidable {
                bounds.push(None);
                continue;
            }
            let aabb = self.bounds_of(body, margin, force_update);
            self.grid.insert(index, &aabb);
            bounds.push(Some(aabb));
        }

        let mut pairs = Vec::new();
        let mut checked = HashSet::new();

        for (index, body) in bodies.iter().enumerate() {
            if !body.is_simulated() {
                continue;
            }
            let Some(aabb) = bounds[index] else {
                continue;
            };

            for other in self.grid.query(&aabb) {
                if other == index {
                    continue;
                }
                let Some(other_aabb) = bounds[other] else {
                    continue;
                };
                if !aabb.overlaps(&other_aabb) {
                    continue;
                }

                let pair = if body.id < bodies[other].id {
                    (index, other)
                } else {
                    (other, index)
                };
                if checked.insert(pair) {
                    pairs.push(pair);
                }
            }
        }

        pairs.sort_unstable_by_key(|&(a, b)| (bodies[a].id, bodies[b].id));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorldSettings,
        core::{
            math::Vector3,
            mesh::GeometryStore,
            shape::{ShapeData, ShapeType},
        },
    };

    fn body(id: u32, x: f32, is_static: bool) -> SimBody {
        let data = ShapeData::new(id, ShapeType::Box)
            .with_position(Vector3::new(x, 0.0, 0.0))
            .with_static(is_static);
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
            .expect("body")
    }

    #[test]
    fn overlapping_bodies_pair_in_id_order() {
        let bodies = vec![body(9, 0.0, false), body(4, 0.5, false), body(5, 40.0, false)];
        let pairs = BroadPhase::new(4.0).potential_pairs(&bodies, 0.1, true);
        assert_eq!(pairs, vec![(1, 0)]);
    }

    #[test]
    fn static_pairs_are_skipped() {
        let bodies = vec![body(2, 0.0, true), body(3, 0.5, true)];
        assert!(BroadPhase::new(4.0)
            .potential_pairs(&bodies, 0.1, true)
            .is_empty());
    }

    #[test]
    fn phantoms_are_skipped() {
        let mut bodies = vec![body(2, 0.0, false), body(3, 0.5, false)];
        bodies[1].is_collidable = false;
        assert!(BroadPhase::new(4.0)
            .potential_pairs(&bodies, 0.1, true)
            .is_empty());
    }

    #[test]
    fn sleeping_bodies_keep_cached_bounds() {
        let mut bodies = vec![body(2, 0.0, false), body(3, 10.0, false)];
        let mut broadphase = BroadPhase::new(4.0);
        assert!(broadphase.potential_pairs(&bodies, 0.1, false).is_empty());

        // A sleeping body moved behind the engine's back is still found at
        // its old bounds until forced or invalidated.
        bodies[1].is_awake = false;
        bodies[1].transform.position = Vec3::new(0.5, 0.0, 0.0);
        assert!(broadphase.potential_pairs(&bodies, 0.1, false).is_empty());
        assert_eq!(broadphase.potential_pairs(&bodies, 0.1, true), vec![(0, 1)]);
    }

    #[test]
    fn oversized_bounds_still_pair() {
        let mut floor = ShapeData::new(2, ShapeType::Box).with_static(true);
        floor.scale = Vector3::new(1000.0, 1.0, 1000.0);
        let floor = SimBody::from_shape_data(
            &floor,
            &WorldSettings::default(),
            &GeometryStore::new(),
        )
        .expect("floor");
        let bodies = vec![floor, body(3, 300.0, false)];
        assert_eq!(
            BroadPhase::new(4.0).potential_pairs(&bodies, 0.1, true),
            vec![(0, 1)]
        );
    }
}
