use std::collections::{HashMap, HashSet};

use glam::Vec3;
use log::debug;

use crate::collision::{
    broadphase::BroadPhase,
    ccd::{CCDDetector, CcdHit},
    contact::{CollisionDesc, Contact, ContactTracker, ManifoldCache, PairKey},
    narrowphase::{ContactPoint, NarrowPhase},
    terrain::{GroundPlane, Heightmap},
};
use crate::config::{WorldSettings, DEFAULT_BROADPHASE_CELL_SIZE};
use crate::core::{ids::ObjectId, rigidbody::SimBody, types::Material};

/// One pair's share of position correction: A-to-B normal and deepest point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    pub pair: PairKey,
    pub normal: Vec3,
    pub depth: f32,
}

/// Output of contact processing for one substep.
#[derive(Debug, Default)]
pub struct ContactFrame {
    pub contacts: Vec<Contact>,
    pub began: Vec<CollisionDesc>,
    pub penetrations: Vec<Penetration>,
    pub dropped: usize,
}

/// Everything that decides which objects touch: broad phase, manifolds,
/// the new-contact tracker, the CCD clamp and the two pseudo-objects.
pub struct CollisionManager {
    pub broadphase: BroadPhase,
    pub manifold_cache: ManifoldCache,
    pub tracker: ContactTracker,
    pub ccd: CCDDetector,
    pub ground: GroundPlane,
    pub terrain: Option<Heightmap>,
}

impl Default for CollisionManager {
    fn default() -> Self {
        Self::new(&WorldSettings::default())
    }
}

impl CollisionManager {
    pub fn new(settings: &WorldSettings) -> Self {
        Self {
            broadphase: BroadPhase::new(DEFAULT_BROADPHASE_CELL_SIZE),
            manifold_cache: ManifoldCache::new(),
            tracker: ContactTracker::new(),
            ccd: CCDDetector::from_settings(settings),
            ground: GroundPlane::default(),
            terrain: None,
        }
    }

    pub fn apply_settings(&mut self, settings: &WorldSettings) {
        self.ccd = CCDDetector::from_settings(settings);
        self.broadphase.clear();
    }

    /// Drops every trace of an object that left the world or changed shape.
    pub fn forget(&mut self, id: ObjectId) {
        self.broadphase.invalidate(id);
        self.manifold_cache.forget(id);
        self.tracker.forget(id);
    }

    /// Shape-only change: cached bounds and points are stale but the pair
    /// may still be touching, so the tracker keeps it.
    pub fn invalidate(&mut self, id: ObjectId) {
        self.broadphase.invalidate(id);
        self.manifold_cache.forget(id);
    }

    pub fn set_terrain(&mut self, terrain: Option<Heightmap>) {
        self.terrain = terrain;
        self.manifold_cache.retain(|(_, b)| *b != ObjectId::TERRAIN);
    }

    pub fn find_pairs(
        &mut self,
        bodies: &[SimBody],
        settings: &WorldSettings,
    ) -> Vec<(usize, usize)> {
        self.broadphase.potential_pairs(
            bodies,
            settings.contact_processing_threshold,
            settings.force_update_all_aabbs,
        )
    }

    /// Narrow phase over the broad-phase pairs and both pseudo-objects,
    /// manifold upkeep, new-contact detection and the solver contact list.
    pub fn process(
        &mut self,
        bodies: &[SimBody],
        index: &HashMap<ObjectId, usize>,
        pairs: &[(usize, usize)],
        settings: &WorldSettings,
    ) -> ContactFrame {
        let margin = settings.contact_processing_threshold;
        let terrain_material =
            Material::new(settings.terrain_friction, settings.terrain_restitution);
        let mut touched: HashSet<PairKey> = HashSet::with_capacity(pairs.len());

        for &(i, j) in pairs {
            let (a, b) = (&bodies[i], &bodies[j]);
            let fresh: Vec<ContactPoint> = NarrowPhase::manifold(a, b, margin);
            let material = a.material.combine_with(&b.material);
            if self.refresh(a, Some(b), b.id, &fresh, material, margin) {
                touched.insert((a.id, b.id));
            }
        }

        for body in bodies.iter().filter(|b| b.is_simulated() && b.is_collidable) {
            let material = body.material.combine_with(&terrain_material);
            let fresh = self.ground.contacts(body, margin);
            if self.refresh(body, None, ObjectId::GROUND_PLANE, &fresh, material, margin) {
                touched.insert((body.id, ObjectId::GROUND_PLANE));
            }
            let Some(fresh) = self.terrain.as_ref().map(|map| map.contacts(body, margin)) else {
                continue;
            };
            if self.refresh(body, None, ObjectId::TERRAIN, &fresh, material, margin) {
                touched.insert((body.id, ObjectId::TERRAIN));
            }
        }

        let resting = |id: ObjectId| {
            id.is_pseudo_object()
                || index
                    .get(&id)
                    .and_then(|&i| bodies.get(i))
                    .is_some_and(|body| !body.is_simulated())
        };
        self.manifold_cache
            .retain(|key| touched.contains(key) || (resting(key.0) && resting(key.1)));

        let mut keys: Vec<PairKey> = touched.into_iter().collect();
        keys.sort_unstable();

        let mut near = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(manifold) = self.manifold_cache.get(key) {
                near.push((*key, manifold.max_depth()));
            }
        }
        let began_pairs = self.tracker.update(&near, |key| resting(key.0) && resting(key.1));

        let lookup = |id: ObjectId| index.get(&id).and_then(|&i| bodies.get(i));
        let mut frame = ContactFrame::default();
        for key in &began_pairs {
            let (Some(manifold), Some(a)) = (self.manifold_cache.get(key), lookup(key.0)) else {
                continue;
            };
            if let Some(desc) = manifold.describe(a, lookup(key.1)) {
                frame.began.push(desc);
            }
        }

        let warm_start = settings.enable_friction_caching;
        for key in &keys {
            let (Some(manifold), Some(a)) = (self.manifold_cache.get(key), lookup(key.0)) else {
                continue;
            };
            let b = lookup(key.1);
            let contacts = manifold.solver_contacts(a, b, warm_start);
            if contacts.is_empty() {
                continue;
            }
            frame.penetrations.push(Penetration {
                pair: *key,
                normal: manifold.normal,
                depth: manifold.max_depth(),
            });
            frame.contacts.extend(contacts);
        }

        if let Some(limit) = settings.contact_pool_limit {
            if frame.contacts.len() > limit {
                frame.dropped = frame.contacts.len() - limit;
                frame.contacts.truncate(limit);
                debug!(
                    "contacts: pool limit {limit} reached, {} contact(s) dropped",
                    frame.dropped
                );
            }
        }
        frame
    }

    /// Updates one pair's manifold; returns whether it still holds points.
    fn refresh(
        &mut self,
        a: &SimBody,
        b: Option<&SimBody>,
        b_id: ObjectId,
        fresh: &[ContactPoint],
        material: Material,
        margin: f32,
    ) -> bool {
        let key = (a.id, b_id);
        if fresh.is_empty() && self.manifold_cache.get(&key).is_none() {
            return false;
        }
        let live = self
            .manifold_cache
            .refresh(a, b, b_id, fresh, material, true, margin)
            .point_count()
            > 0;
        if !live {
            self.manifold_cache.remove(&key);
        }
        live
    }

    /// Sweeps every fast mover from its pre-step position against static
    /// geometry. Returns body indices with the hit to clamp to.
    pub fn continuous_hits(&self, bodies: &[SimBody], starts: &[Vec3]) -> Vec<(usize, CcdHit)> {
        if !self.ccd.enabled() {
            return Vec::new();
        }
        let statics: Vec<&SimBody> = bodies
            .iter()
            .filter(|body| body.is_static && body.is_collidable)
            .collect();
        bodies
            .iter()
            .zip(starts)
            .enumerate()
            .filter(|(_, (body, _))| body.is_simulated() && body.is_collidable)
            .filter_map(|(i, (body, &start))| {
                self.ccd
                    .sweep(
                        body.id,
                        start,
                        body.transform.position,
                        &statics,
                        &self.ground,
                        self.terrain.as_ref(),
                    )
                    .map(|hit| (i, hit))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.broadphase.clear();
        self.manifold_cache.clear();
        self.tracker.clear();
    }
}
