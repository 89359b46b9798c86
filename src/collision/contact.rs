use std::collections::{HashMap, HashSet};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use super::narrowphase::ContactPoint;
use crate::core::{ids::ObjectId, math::Vector3, rigidbody::SimBody, types::Material};

pub const MAX_MANIFOLD_POINTS: usize = 4;
/// Fresh points closer than this to a cached point inherit its impulses.
const MATCH_DISTANCE_SQ: f32 = 0.02 * 0.02;

pub type PairKey = (ObjectId, ObjectId);

/// One reported contact. `normal` is B's surface normal, pointing toward A.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct CollisionDesc {
    pub a_id: u32,
    pub b_id: u32,
    pub point: Vector3,
    pub normal: Vector3,
}

impl CollisionDesc {
    pub fn pair(&self) -> PairKey {
        (ObjectId(self.a_id), ObjectId(self.b_id))
    }
}

/// Solver view of one contact point. `normal` points from A toward B.
#[derive(Debug, Clone)]
pub struct Contact {
    pub body_a: ObjectId,
    pub body_b: ObjectId,
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub material: Material,
    pub accumulated_normal_impulse: f32,
    pub accumulated_tangent_impulse: Vec3,
    /// Index of the manifold point this contact was built from.
    pub feature_id: usize,
}

#[derive(Debug, Clone, Copy)]
struct ManifoldPoint {
    /// Point on A in A's local frame.
    local_a: Vec3,
    /// Point on B in B's local frame, or in world space for terrain/ground.
    local_b: Vec3,
    depth: f32,
    normal_impulse: f32,
    tangent_impulse: Vec3,
}

/// Persistent contact points for one pair.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub body_a: ObjectId,
    pub body_b: ObjectId,
    pub normal: Vec3,
    pub material: Material,
    points: Vec<ManifoldPoint>,
}

impl ContactManifold {
    pub fn key(&self) -> PairKey {
        (self.body_a, self.body_b)
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn max_depth(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.depth)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Touching or overlapping points as solver contacts.
    pub fn solver_contacts(
        &self,
        a: &SimBody,
        b: Option<&SimBody>,
        warm_start: bool,
    ) -> Vec<Contact> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.depth > 0.0)
            .map(|(index, p)| {
                let world_a = a.transform.apply(p.local_a);
                let world_b = to_world(b, p.local_b);
                Contact {
                    body_a: self.body_a,
                    body_b: self.body_b,
                    point: (world_a + world_b) * 0.5,
                    normal: self.normal,
                    depth: p.depth,
                    material: self.material,
                    accumulated_normal_impulse: if warm_start { p.normal_impulse } else { 0.0 },
                    accumulated_tangent_impulse: if warm_start {
                        p.tangent_impulse
                    } else {
                        Vec3::ZERO
                    },
                    feature_id: index,
                }
            })
            .collect()
    }

    /// Report record for the deepest point.
    pub fn describe(&self, a: &SimBody, b: Option<&SimBody>) -> Option<CollisionDesc> {
        let deepest = self
            .points
            .iter()
            .max_by(|x, y| x.depth.total_cmp(&y.depth))?;
        let point = (a.transform.apply(deepest.local_a) + to_world(b, deepest.local_b)) * 0.5;
        Some(CollisionDesc {
            a_id: self.body_a.raw(),
            b_id: self.body_b.raw(),
            point: point.into(),
            normal: (-self.normal).into(),
        })
    }
}

fn to_world(body: Option<&SimBody>, local: Vec3) -> Vec3 {
    match body {
        Some(b) => b.transform.apply(local),
        None => local,
    }
}

fn to_local(body: Option<&SimBody>, world: Vec3) -> Vec3 {
    match body {
        Some(b) => b.transform.rotation.conjugate() * (world - b.transform.position),
        None => world,
    }
}

/// Manifolds that survive between steps, keyed by pair.
#[derive(Debug, Default)]
pub struct ManifoldCache {
    manifolds: HashMap<PairKey, ContactManifold>,
}

impl ManifoldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.manifolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifolds.is_empty()
    }

    pub fn get(&self, key: &PairKey) -> Option<&ContactManifold> {
        self.manifolds.get(key)
    }

    /// Merges this step's contact points for a pair into its manifold.
    /// Cached points that still hold (within `margin` along the normal and
    /// not slid apart) are kept when `persistent` is set.
    pub fn refresh(
        &mut self,
        a: &SimBody,
        b: Option<&SimBody>,
        b_id: ObjectId,
        fresh: &[ContactPoint],
        material: Material,
        persistent: bool,
        margin: f32,
    ) -> &ContactManifold {
        let key = (a.id, b_id);
        let previous = self.manifolds.remove(&key);
        let normal = fresh
            .first()
            .map(|c| c.normal)
            .or_else(|| previous.as_ref().map(|m| m.normal))
            .unwrap_or(Vec3::NEG_Y);

        let mut points: Vec<ManifoldPoint> = fresh
            .iter()
            .map(|c| {
                let on_a = c.point + c.normal * c.depth * 0.5;
                let on_b = c.point - c.normal * c.depth * 0.5;
                ManifoldPoint {
                    local_a: to_local(Some(a), on_a),
                    local_b: to_local(b, on_b),
                    depth: c.depth,
                    normal_impulse: 0.0,
                    tangent_impulse: Vec3::ZERO,
                }
            })
            .collect();

        if let Some(old) = previous {
            for cached in &old.points {
                let world_a = a.transform.apply(cached.local_a);
                let world_b = to_world(b, cached.local_b);
                let matched = points.iter_mut().find(|p| {
                    (a.transform.apply(p.local_a) - world_a).length_squared() < MATCH_DISTANCE_SQ
                });
                if let Some(point) = matched {
                    point.normal_impulse = cached.normal_impulse;
                    point.tangent_impulse = cached.tangent_impulse;
                    continue;
                }
                if !persistent {
                    continue;
                }
                let gap = world_b - world_a;
                let depth = gap.dot(-normal);
                let drift = gap + normal * depth;
                if depth > -margin && drift.length_squared() < margin * margin {
                    points.push(ManifoldPoint { depth, ..*cached });
                }
            }
        }

        reduce_points(&mut points);
        self.manifolds.entry(key).or_insert(ContactManifold {
            body_a: a.id,
            body_b: b_id,
            normal,
            material,
            points,
        })
    }

    /// Writes solved impulses back for the next step's warm start.
    pub fn store_impulses(&mut self, contacts: &[Contact]) {
        for contact in contacts {
            let Some(manifold) = self.manifolds.get_mut(&(contact.body_a, contact.body_b)) else {
                continue;
            };
            if let Some(point) = manifold.points.get_mut(contact.feature_id) {
                point.normal_impulse = contact.accumulated_normal_impulse;
                point.tangent_impulse = contact.accumulated_tangent_impulse;
            }
        }
    }

    pub fn remove(&mut self, key: &PairKey) {
        self.manifolds.remove(key);
    }

    /// Drops every manifold involving `id`.
    pub fn forget(&mut self, id: ObjectId) {
        self.manifolds.retain(|(a, b), _| *a != id && *b != id);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&PairKey) -> bool) {
        self.manifolds.retain(|key, _| keep(key));
    }

    pub fn clear(&mut self) {
        self.manifolds.clear();
    }
}

/// Keeps the deepest point and then the points that spread the manifold
/// the most.
fn reduce_points(points: &mut Vec<ManifoldPoint>) {
    if points.len() <= MAX_MANIFOLD_POINTS {
        return;
    }
    points.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    let mut kept = vec![points[0]];
    while kept.len() < MAX_MANIFOLD_POINTS {
        let farthest = points
            .iter()
            .filter(|p| !kept.iter().any(|k| k.local_a == p.local_a))
            .max_by(|x, y| spread(&kept, x).total_cmp(&spread(&kept, y)))
            .copied();
        match farthest {
            Some(p) => kept.push(p),
            None => break,
        }
    }
    *points = kept;
}

fn spread(kept: &[ManifoldPoint], candidate: &ManifoldPoint) -> f32 {
    kept.iter()
        .map(|k| (k.local_a - candidate.local_a).length_squared())
        .fold(f32::MAX, f32::min)
}

/// Remembers which pairs are in contact so only new contacts are reported.
///
/// A pair becomes active the step its shapes first touch. It stays active
/// while its manifold survives (separation under the processing threshold)
/// or while both sides sleep, and a later touch after that is new again.
#[derive(Debug, Default)]
pub struct ContactTracker {
    active: HashSet<PairKey>,
}

impl ContactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, key: &PairKey) -> bool {
        self.active.contains(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// `near` holds every pair with a live manifold this step and its
    /// deepest point. Returns the pairs whose contact began this step.
    pub fn update(
        &mut self,
        near: &[(PairKey, f32)],
        both_asleep: impl Fn(&PairKey) -> bool,
    ) -> Vec<PairKey> {
        let mut next = HashSet::with_capacity(near.len());
        let mut began = Vec::new();

        for &(key, depth) in near {
            if self.active.contains(&key) {
                next.insert(key);
            } else if depth > 0.0 {
                next.insert(key);
                began.push(key);
            }
        }
        for key in &self.active {
            if !next.contains(key) && both_asleep(key) {
                next.insert(*key);
            }
        }

        let ended = self.active.len() + began.len() - next.len();
        if ended > 0 {
            debug!("contacts: {ended} pair(s) separated");
        }
        self.active = next;
        began.sort_unstable();
        began
    }

    pub fn forget(&mut self, id: ObjectId) {
        self.active.retain(|(a, b)| *a != id && *b != id);
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: u32, b: u32) -> PairKey {
        (ObjectId(a), ObjectId(b))
    }

    #[test]
    fn resting_contact_is_reported_once() {
        let mut tracker = ContactTracker::new();
        assert_eq!(tracker.update(&[(key(2, 1), 0.01)], |_| false), vec![key(2, 1)]);
        assert!(tracker.update(&[(key(2, 1), 0.02)], |_| false).is_empty());
        assert!(tracker.update(&[(key(2, 1), -0.05)], |_| false).is_empty());
        assert!(tracker.is_active(&key(2, 1)));
    }

    #[test]
    fn near_but_untouched_pair_is_not_reported() {
        let mut tracker = ContactTracker::new();
        assert!(tracker.update(&[(key(2, 3), -0.05)], |_| false).is_empty());
        assert!(!tracker.is_active(&key(2, 3)));
    }

    #[test]
    fn separation_then_touch_reports_again() {
        let mut tracker = ContactTracker::new();
        tracker.update(&[(key(2, 3), 0.01)], |_| false);
        tracker.update(&[], |_| false);
        assert!(!tracker.is_active(&key(2, 3)));
        assert_eq!(tracker.update(&[(key(2, 3), 0.01)], |_| false), vec![key(2, 3)]);
    }

    #[test]
    fn sleeping_pairs_stay_active() {
        let mut tracker = ContactTracker::new();
        tracker.update(&[(key(2, 1), 0.01)], |_| false);
        tracker.update(&[], |_| true);
        assert!(tracker.is_active(&key(2, 1)));
    }

    #[test]
    fn forget_drops_pairs_of_destroyed_object() {
        let mut tracker = ContactTracker::new();
        tracker.update(&[(key(2, 3), 0.01), (key(4, 5), 0.01)], |_| false);
        tracker.forget(ObjectId(3));
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn reduce_keeps_deepest_and_caps_count() {
        let mut points: Vec<ManifoldPoint> = (0..6)
            .map(|i| ManifoldPoint {
                local_a: Vec3::new(i as f32, 0.0, 0.0),
                local_b: Vec3::ZERO,
                depth: i as f32 * 0.01,
                normal_impulse: 0.0,
                tangent_impulse: Vec3::ZERO,
            })
            .collect();
        reduce_points(&mut points);
        assert_eq!(points.len(), MAX_MANIFOLD_POINTS);
        assert_eq!(points[0].depth, 0.05);
    }
}
