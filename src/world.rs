//! The simulated world: object storage, the step pipeline and queries.

pub mod collision_manager;
pub mod commands;
pub mod dynamics_manager;
pub mod sync;

use std::collections::HashMap;

use glam::{Quat, Vec3};
use log::{debug, info, warn};
use serde::Serialize;

pub use collision_manager::{CollisionManager, ContactFrame, Penetration};
pub use commands::{CommandReport, WorldCommand};
pub use dynamics_manager::DynamicsManager;
pub use sync::{EntityProperties, StepOutput, SyncTracker, UpdatePolicy};

use crate::{
    collision::{
        ccd::CCDDetector,
        queries::{self, RaycastHit, SweepHit, SweepQuery, SweepShape},
        terrain::Heightmap,
    },
    config::{
        ConfigDiagnostic, ParamBlock, WorldLimits, WorldSettings, DEFAULT_TIME_STEP,
        POSITION_CORRECTION_FACTOR,
    },
    core::{
        ids::ObjectId,
        mesh::{Aabb, GeometryCache, GeometryStore},
        rigidbody::{normalized_rotation, SimBody},
        shape::ShapeData,
        types::{Transform, Velocity},
    },
    dynamics::solver::{correct_position, pair_mut, Solver, SolverStepMetrics},
    error::{CreateError, ObjectError, Result},
    utils::{
        logging::ScopedTimer,
        profiling::{PhaseTimer, StepProfile},
    },
};

/// Central simulation container orchestrating all subsystems.
pub struct PhysicsWorld {
    settings: WorldSettings,
    limits: WorldLimits,
    geometry: Box<dyn GeometryCache>,
    bodies: Vec<SimBody>,
    index: HashMap<ObjectId, usize>,
    collision: CollisionManager,
    dynamics: DynamicsManager,
    sync: SyncTracker,
    pending: Vec<WorldCommand>,
    step_count: u64,
    time_accumulated: f32,
    profile: StepProfile,
}

/// Snapshot of world bookkeeping, as logged by `dump_statistics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorldStatistics {
    pub step_count: u64,
    pub objects: usize,
    pub static_objects: usize,
    pub sleeping_objects: usize,
    pub frozen_objects: usize,
    pub phantom_objects: usize,
    pub manifolds: usize,
    pub active_contacts: usize,
    pub islands: usize,
    pub pending_commands: usize,
    pub has_terrain: bool,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(
            WorldSettings::default(),
            WorldLimits::default(),
            Box::new(GeometryStore::new()),
        )
    }
}

impl PhysicsWorld {
    pub fn new(
        settings: WorldSettings,
        limits: WorldLimits,
        geometry: Box<dyn GeometryCache>,
    ) -> Self {
        Self {
            collision: CollisionManager::new(&settings),
            dynamics: DynamicsManager::new(&settings),
            settings,
            limits,
            geometry,
            bodies: Vec::new(),
            index: HashMap::new(),
            sync: SyncTracker::default(),
            pending: Vec::new(),
            step_count: 0,
            time_accumulated: 0.0,
            profile: StepProfile::default(),
        }
    }

    /// Builds a world from a host parameter block, returning the fields that
    /// had to be replaced.
    pub fn from_params(
        params: &ParamBlock,
        limits: WorldLimits,
        geometry: Box<dyn GeometryCache>,
    ) -> (Self, Vec<ConfigDiagnostic>) {
        let (settings, diagnostics) = WorldSettings::from_params(params);
        (Self::new(settings, limits, geometry), diagnostics)
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn limits(&self) -> WorldLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: WorldLimits) {
        self.limits = limits;
    }

    pub fn update_policy(&self) -> &UpdatePolicy {
        self.sync.policy()
    }

    pub fn set_update_policy(&mut self, policy: UpdatePolicy) {
        self.sync.set_policy(policy);
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.dynamics.integrator.set_parallel(enabled);
    }

    pub fn parallel_enabled(&self) -> bool {
        self.dynamics.integrator.parallel()
    }

    /// Replaces the contact solver.
    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        debug!("solver: {} -> {}", self.dynamics.solver.name(), solver.name());
        self.dynamics.solver = solver;
    }

    pub fn solver_name(&self) -> &str {
        self.dynamics.solver.name()
    }

    pub fn solver_metrics(&self) -> &SolverStepMetrics {
        &self.dynamics.metrics
    }

    pub fn set_geometry_cache(&mut self, geometry: Box<dyn GeometryCache>) {
        self.geometry = geometry;
    }

    pub fn ccd(&self) -> &CCDDetector {
        &self.collision.ccd
    }

    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Validates `params` whole and swaps the result in. Clamped fields are
    /// returned; the call itself never fails.
    pub fn update_params(&mut self, params: &ParamBlock) -> Vec<ConfigDiagnostic> {
        let (settings, diagnostics) = WorldSettings::from_params(params);
        self.collision.apply_settings(&settings);
        self.dynamics.apply_settings(&settings);
        for body in &mut self.bodies {
            body.apply_settings(&settings, self.geometry.as_ref());
        }
        self.settings = settings;
        debug!("params: applied with {} clamp(s)", diagnostics.len());
        diagnostics
    }

    /// Installs or removes the terrain. Everything asleep is woken since its
    /// support may have changed.
    pub fn set_heightmap(&mut self, terrain: Option<Heightmap>) {
        debug!("terrain: {}", if terrain.is_some() { "installed" } else { "removed" });
        self.collision.set_terrain(terrain);
        for body in self.bodies.iter_mut().filter(|body| body.is_dynamic()) {
            body.is_awake = true;
            body.sleep_timer = 0.0;
        }
    }

    pub fn terrain(&self) -> Option<&Heightmap> {
        self.collision.terrain.as_ref()
    }

    // Objects

    pub fn create_object(&mut self, data: &ShapeData) -> Result<()> {
        let id = data.object_id();
        if id.is_reserved() {
            return Err(CreateError::ReservedId(id.raw()).into());
        }
        if self.index.contains_key(&id) {
            return Err(CreateError::DuplicateId(id).into());
        }
        let body = SimBody::from_shape_data(data, &self.settings, self.geometry.as_ref())?;

        debug!("object {id} created ({:?})", body.kind);
        self.sync.seed(EntityProperties::at_creation(&body));
        self.collision.forget(id);
        self.index.insert(id, self.bodies.len());
        self.bodies.push(body);
        Ok(())
    }

    /// Replaces an existing object with a freshly validated one. The host
    /// wrote the whole state, so none of it is echoed back.
    pub fn update_object(&mut self, data: &ShapeData) -> Result<()> {
        let id = data.object_id();
        let slot = self.slot(id)?;
        let body = SimBody::from_shape_data(data, &self.settings, self.geometry.as_ref())?;
        self.sync.seed(EntityProperties::from_body(&body));
        self.bodies[slot] = body;
        self.collision.invalidate(id);
        Ok(())
    }

    pub fn destroy_object(&mut self, id: ObjectId) -> Result<()> {
        let slot = self.index.remove(&id).ok_or(ObjectError::NotFound(id))?;
        let body = self.bodies.swap_remove(slot);
        if let Some(moved) = self.bodies.get(slot) {
            self.index.insert(moved.id, slot);
        }

        let padding = self.settings.contact_processing_threshold;
        let bounds = body.aabb();
        let reach = Aabb::new(bounds.min - Vec3::splat(padding), bounds.max + Vec3::splat(padding));
        for neighbor in self.bodies.iter_mut() {
            if neighbor.is_dynamic() && !neighbor.is_awake && neighbor.aabb().overlaps(&reach) {
                neighbor.is_awake = true;
                neighbor.sleep_timer = 0.0;
            }
        }

        self.collision.forget(id);
        self.sync.mark_removed(id);
        debug!("object {id} destroyed");
        Ok(())
    }

    pub fn has_object(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn object_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body(&self, id: ObjectId) -> Option<&SimBody> {
        self.index.get(&id).and_then(|&slot| self.bodies.get(slot))
    }

    pub fn bodies(&self) -> &[SimBody] {
        &self.bodies
    }

    pub fn entity_properties(&self, id: ObjectId) -> Option<EntityProperties> {
        self.body(id).map(EntityProperties::from_body)
    }

    pub fn set_translation(&mut self, id: ObjectId, position: Vec3, rotation: Quat) -> Result<()> {
        if !position.is_finite() || !rotation.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, _, _| {
            body.transform.position = position;
            body.transform.rotation = normalized_rotation(rotation);
            Ok(())
        })
    }

    pub fn set_velocity(&mut self, id: ObjectId, velocity: Vec3) -> Result<()> {
        if !velocity.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, _, _| {
            if !body.is_static {
                body.velocity.linear = velocity;
            }
            Ok(())
        })
    }

    pub fn set_angular_velocity(&mut self, id: ObjectId, velocity: Vec3) -> Result<()> {
        if !velocity.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, _, _| {
            if !body.is_static && !body.lock_rotation {
                body.velocity.angular = velocity;
            }
            Ok(())
        })
    }

    /// Accumulates a force for the next step only.
    pub fn apply_force(&mut self, id: ObjectId, force: Vec3) -> Result<()> {
        if !force.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, _, _| {
            body.force += force;
            Ok(())
        })
    }

    pub fn set_scale_mass(&mut self, id: ObjectId, scale: Vec3, mass: f32) -> Result<()> {
        if !scale.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, settings, geometry| {
            body.set_scale_mass(scale, mass, settings, geometry)?;
            Ok(())
        })?;
        self.collision.invalidate(id);
        Ok(())
    }

    pub fn set_collidable(&mut self, id: ObjectId, collidable: bool) -> Result<()> {
        self.modify(id, |body, _, _| {
            body.is_collidable = collidable;
            Ok(())
        })?;
        if !collidable {
            self.collision.forget(id);
        }
        Ok(())
    }

    pub fn set_static(&mut self, id: ObjectId, is_static: bool) -> Result<()> {
        self.modify(id, |body, settings, _| {
            body.set_static(is_static, settings);
            Ok(())
        })
    }

    pub fn set_buoyancy(&mut self, id: ObjectId, buoyancy: f32) -> Result<()> {
        if !buoyancy.is_finite() {
            return Err(ObjectError::NonFinite(id));
        }
        self.modify(id, |body, _, _| {
            body.buoyancy = buoyancy.clamp(-1.0, 1.0);
            Ok(())
        })
    }

    fn slot(&self, id: ObjectId) -> Result<usize> {
        self.index.get(&id).copied().ok_or(ObjectError::NotFound(id))
    }

    /// Runs a host write against one body, then wakes it and drops its
    /// cached bounds.
    fn modify<F>(&mut self, id: ObjectId, write: F) -> Result<()>
    where
        F: FnOnce(&mut SimBody, &WorldSettings, &dyn GeometryCache) -> Result<()>,
    {
        let slot = self.slot(id)?;
        let body = self.bodies.get_mut(slot).ok_or(ObjectError::NotFound(id))?;
        write(body, &self.settings, self.geometry.as_ref())?;
        body.wake();
        self.collision.broadphase.invalidate(id);
        Ok(())
    }

    // Deferred commands

    /// Queues a command for the start of the next step.
    pub fn submit(&mut self, command: WorldCommand) {
        self.pending.push(command);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applies every queued command now, in submission order.
    pub fn apply_pending(&mut self) -> CommandReport {
        let commands = std::mem::take(&mut self.pending);
        let mut report = CommandReport::default();
        if commands.is_empty() {
            return report;
        }
        let _timer = ScopedTimer::new("commands::apply");
        for command in commands {
            command.apply(self, &mut report);
        }
        debug!(
            "commands: {} applied, {} rejected",
            report.applied,
            report.rejected.len()
        );
        report
    }

    // Stepping

    /// Advances the world by one interval of `dt` seconds. A zero or
    /// unusable `dt` still applies queued commands and reports changes.
    pub fn step(&mut self, dt: f32) -> StepOutput {
        let mut output = self.begin_step();
        if dt.is_finite() && dt > 0.0 {
            self.substep(dt, &mut output);
            output.substeps = 1;
        }
        self.finish_step(&mut output);
        output
    }

    /// Accumulates `elapsed` and runs as many fixed steps of `fixed_dt` as
    /// fit, at most `max_substeps`. Time beyond the cap is dropped. With
    /// `max_substeps == 0` a single variable step of `elapsed` runs instead.
    pub fn step_accumulated(
        &mut self,
        elapsed: f32,
        max_substeps: u32,
        fixed_dt: f32,
    ) -> StepOutput {
        if max_substeps == 0 {
            return self.step(elapsed);
        }
        let mut output = self.begin_step();
        let fixed = if fixed_dt.is_finite() && fixed_dt > 0.0 {
            fixed_dt
        } else {
            DEFAULT_TIME_STEP
        };
        if elapsed.is_finite() && elapsed > 0.0 {
            self.time_accumulated += elapsed;
        }

        let due = (self.time_accumulated / fixed).floor();
        self.time_accumulated -= due * fixed;
        let due = due as u32;
        let runs = due.min(max_substeps);
        if due > runs {
            debug!("step: {} substep(s) dropped past the cap of {max_substeps}", due - runs);
        }
        for _ in 0..runs {
            self.substep(fixed, &mut output);
        }
        output.substeps = runs;

        self.finish_step(&mut output);
        output
    }

    fn begin_step(&mut self) -> StepOutput {
        self.profile.reset();
        let report = self.apply_pending();
        StepOutput {
            rejected: report.rejected,
            diagnostics: report.diagnostics,
            ..StepOutput::default()
        }
    }

    fn finish_step(&mut self, output: &mut StepOutput) {
        let _timer = ScopedTimer::new("sync::collect");
        output.collisions.sort_unstable_by_key(|desc| desc.pair());
        if output.collisions.len() > self.limits.max_collisions {
            debug!(
                "sync: {} collision(s) dropped past the cap of {}",
                output.collisions.len() - self.limits.max_collisions,
                self.limits.max_collisions
            );
            output.collisions.truncate(self.limits.max_collisions);
        }
        output.frozen.sort_unstable();
        output.frozen.dedup();
        output.updates = self.sync.collect_updates(&self.bodies, self.limits.max_updates);
        output.removed = self.sync.take_removed();
        self.profile.report();
    }

    fn substep(&mut self, dt: f32, output: &mut StepOutput) {
        self.step_count += 1;
        let mut profile = StepProfile {
            body_count: self.bodies.len(),
            ..StepProfile::default()
        };
        let mut total_time = std::time::Duration::ZERO;

        {
            let _total = PhaseTimer::new(&mut total_time);
            let snapshot: Vec<(Transform, Velocity)> = self
                .bodies
                .iter()
                .map(|body| (body.transform, body.velocity))
                .collect();

            {
                let _timer = ScopedTimer::new("integrator::velocities");
                let _phase = PhaseTimer::new(&mut profile.integrator_time);
                self.dynamics.integrator.integrate_velocities(&mut self.bodies, dt);
            }

            let pairs = {
                let _timer = ScopedTimer::new("broadphase::pairs");
                let _phase = PhaseTimer::new(&mut profile.broad_phase_time);
                self.collision.find_pairs(&self.bodies, &self.settings)
            };
            profile.pair_count = pairs.len();

            let frame = {
                let _timer = ScopedTimer::new("contacts::generate");
                let _phase = PhaseTimer::new(&mut profile.narrow_phase_time);
                self.collision
                    .process(&self.bodies, &self.index, &pairs, &self.settings)
            };
            profile.contact_count = frame.contacts.len();
            profile.dropped_contacts = frame.dropped;
            output.collisions.extend(frame.began);

            {
                let label = if self.dynamics.integrator.parallel() {
                    "solver::parallel"
                } else {
                    "solver::sequential"
                };
                let _timer = ScopedTimer::new(label);
                let _phase = PhaseTimer::new(&mut profile.solver_time);
                let solved = self.dynamics.solve(
                    &mut self.bodies,
                    &self.index,
                    frame.contacts,
                    &self.settings,
                    self.step_count,
                );
                self.collision.manifold_cache.store_impulses(&solved);
            }
            profile.active_island_count = self.dynamics.islands.awake_count();

            {
                let _timer = ScopedTimer::new("integrator::positions");
                let _phase = PhaseTimer::new(&mut profile.integrator_time);
                self.dynamics.integrator.integrate_positions(&mut self.bodies, dt);
            }

            {
                let _timer = ScopedTimer::new("ccd::clamp");
                let starts: Vec<Vec3> = snapshot.iter().map(|(t, _)| t.position).collect();
                for (slot, hit) in self.collision.continuous_hits(&self.bodies, &starts) {
                    let id = self.bodies[slot].id;
                    debug!("ccd: {id} clamped at {:.3} by {}", hit.fraction, hit.target);
                    CCDDetector::apply(&mut self.bodies[slot], starts[slot], &hit);
                }
            }

            {
                let _timer = ScopedTimer::new("contacts::correct");
                for p in &frame.penetrations {
                    let (a, b) = pair_mut(&mut self.bodies, &self.index, p.pair.0, p.pair.1);
                    correct_position(
                        a,
                        b,
                        p.normal,
                        p.depth,
                        self.settings.collision_margin,
                        POSITION_CORRECTION_FACTOR,
                    );
                }
            }

            {
                let _timer = ScopedTimer::new("sleeping::update");
                let slept = self.dynamics.update_sleeping(
                    &mut self.bodies,
                    &self.index,
                    &self.settings,
                    dt,
                );
                if slept > 0 {
                    debug!("sleeping: {slept} object(s) deactivated");
                }
            }

            self.guard_non_finite(&snapshot, output);
            for (body, (_, before)) in self.bodies.iter_mut().zip(&snapshot) {
                body.acceleration = if body.is_static || body.is_frozen {
                    Vec3::ZERO
                } else {
                    sync::acceleration(before.linear, body.velocity.linear, dt)
                };
            }
        }

        profile.total_step_time = total_time;
        profile.sleeping_count = self
            .bodies
            .iter()
            .filter(|body| body.is_dynamic() && !body.is_awake)
            .count();
        self.profile.accumulate(&profile);
    }

    /// Restores any body whose state went non-finite to its pre-step state
    /// and freezes it until the host writes to it.
    fn guard_non_finite(&mut self, snapshot: &[(Transform, Velocity)], output: &mut StepOutput) {
        for (body, (transform, _)) in self.bodies.iter_mut().zip(snapshot) {
            if body.state_is_finite() {
                continue;
            }
            warn!("object {} produced a non-finite state and was frozen", body.id);
            body.transform = *transform;
            body.velocity = Velocity::default();
            body.acceleration = Vec3::ZERO;
            body.force = Vec3::ZERO;
            body.is_frozen = true;
            self.collision.manifold_cache.forget(body.id);
            output.frozen.push(body.id);
        }
    }

    // Queries

    /// Closest hit along the segment, or the invalid-hit record.
    pub fn raycast(&self, from: Vec3, to: Vec3) -> RaycastHit {
        RaycastHit::or_miss(queries::raycast(
            &self.bodies,
            self.terrain(),
            from,
            to,
            None,
        ))
    }

    /// Like [`raycast`](Self::raycast) but ignores one object, usually the
    /// caster.
    pub fn raycast_excluding(&self, from: Vec3, to: Vec3, exclude: ObjectId) -> RaycastHit {
        RaycastHit::or_miss(queries::raycast(
            &self.bodies,
            self.terrain(),
            from,
            to,
            Some(exclude),
        ))
    }

    pub fn convex_sweep(
        &self,
        shape: &SweepShape,
        rotation: Quat,
        from: Vec3,
        to: Vec3,
        extra_margin: f32,
    ) -> SweepHit {
        let Some(shape) = shape.to_collision_shape() else {
            return SweepHit::MISS;
        };
        let query = SweepQuery {
            shape: &shape,
            rotation,
            from,
            to,
            extra_margin,
        };
        SweepHit::or_miss(queries::convex_sweep(&self.bodies, self.terrain(), &query, None))
    }

    /// Sweeps an existing object's shape, at its current rotation, along the
    /// segment. The object itself is ignored.
    pub fn convex_sweep_object(
        &self,
        id: ObjectId,
        from: Vec3,
        to: Vec3,
        extra_margin: f32,
    ) -> SweepHit {
        let Some(body) = self.body(id) else {
            return SweepHit::MISS;
        };
        let query = SweepQuery {
            shape: &body.shape,
            rotation: body.transform.rotation,
            from,
            to,
            extra_margin,
        };
        SweepHit::or_miss(queries::convex_sweep(
            &self.bodies,
            self.terrain(),
            &query,
            Some(id),
        ))
    }

    // Diagnostics

    pub fn statistics(&self) -> WorldStatistics {
        let count = |pred: fn(&SimBody) -> bool| self.bodies.iter().filter(|b| pred(b)).count();
        WorldStatistics {
            step_count: self.step_count,
            objects: self.bodies.len(),
            static_objects: count(|b| b.is_static),
            sleeping_objects: count(|b| b.is_dynamic() && !b.is_awake),
            frozen_objects: count(|b| b.is_frozen),
            phantom_objects: count(|b| !b.is_collidable),
            manifolds: self.collision.manifold_cache.len(),
            active_contacts: self.collision.tracker.active_count(),
            islands: self.dynamics.islands.islands().len(),
            pending_commands: self.pending.len(),
            has_terrain: self.collision.terrain.is_some(),
        }
    }

    /// Logs a one-shot summary of the world at info level.
    pub fn dump_statistics(&self) -> WorldStatistics {
        let stats = self.statistics();
        info!(
            "world: step {} | objects {} ({} static, {} sleeping, {} frozen, {} phantom)",
            stats.step_count,
            stats.objects,
            stats.static_objects,
            stats.sleeping_objects,
            stats.frozen_objects,
            stats.phantom_objects
        );
        info!(
            "world: manifolds {} | active contacts {} | islands {} | pending {} | terrain {}",
            stats.manifolds,
            stats.active_contacts,
            stats.islands,
            stats.pending_commands,
            stats.has_terrain
        );
        let metrics = &self.dynamics.metrics;
        info!(
            "solver: {} | islands {} | contacts {} | normal impulse {:.3}",
            self.dynamics.solver.name(),
            metrics.islands_solved,
            metrics.contacts_solved,
            metrics.normal_impulse_sum
        );
        stats
    }
}
