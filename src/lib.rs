//! Phys Bridge – the step synchronization core between a rigid-body world
//! and a simulation host.
//!
//! The host creates objects from fixed-layout [`ShapeData`] records, advances
//! time, and gets back per-step batches of changed [`EntityProperties`] and
//! new [`CollisionDesc`] contacts. Raycasts and convex sweeps can be issued
//! between steps. The [`ffi`] module exposes the same surface over a C ABI.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod ffi;
pub mod utils;
pub mod world;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    contact::CollisionDesc,
    queries::{RaycastHit, SweepHit, SweepShape},
    terrain::{GroundPlane, Heightmap},
};
pub use config::{ConfigDiagnostic, ParamBlock, WorldLimits, WorldSettings, PARAM_BLOCK_VERSION};
pub use core::{
    ids::{ObjectId, GROUND_PLANE_ID, INVALID_HIT_ID, TERRAIN_ID},
    math::{Quaternion, Vector3},
    mesh::{GeometryCache, GeometryStore, HullGeometry, TriangleMesh},
    rigidbody::SimBody,
    shape::{ConvexHull, RawConvexHull, ShapeData, ShapeType},
};
pub use dynamics::solver::{SequentialImpulseSolver, Solver, SolverParams};
pub use error::{CreateError, GeometryError, ObjectError};
pub use world::{
    CommandReport, EntityProperties, PhysicsWorld, StepOutput, UpdatePolicy, WorldCommand,
    WorldStatistics,
};

/// Shared handle that owns a [`PhysicsWorld`].
///
/// Steps take the write lock and queries the read lock, so a query sees the
/// world either before or after a step. Mutations submitted here wait in a
/// queue until the next step (or [`apply_pending`](Self::apply_pending)).
pub struct PhysicsBridge {
    world: RwLock<PhysicsWorld>,
    queue: Mutex<Vec<WorldCommand>>,
}

impl Default for PhysicsBridge {
    fn default() -> Self {
        Self::new(PhysicsWorld::default())
    }
}

impl PhysicsBridge {
    pub fn new(world: PhysicsWorld) -> Self {
        Self {
            world: RwLock::new(world),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Queues a mutation for the next step boundary.
    pub fn submit(&self, command: WorldCommand) {
        self.queue.lock().push(command);
    }

    pub fn create_object(&self, data: ShapeData) {
        self.submit(WorldCommand::Create(data));
    }

    pub fn update_object(&self, data: ShapeData) {
        self.submit(WorldCommand::Update(data));
    }

    pub fn destroy_object(&self, id: ObjectId) {
        self.submit(WorldCommand::Destroy(id));
    }

    pub fn update_params(&self, params: ParamBlock) {
        self.submit(WorldCommand::UpdateParams(Box::new(params)));
    }

    /// Commands waiting for the next step.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Applies the queue now instead of at the next step.
    pub fn apply_pending(&self) -> CommandReport {
        self.with_world(PhysicsWorld::apply_pending)
    }

    pub fn step(&self, dt: f32) -> StepOutput {
        self.with_world(|world| world.step(dt))
    }

    pub fn step_accumulated(&self, elapsed: f32, max_substeps: u32, fixed_dt: f32) -> StepOutput {
        self.with_world(|world| world.step_accumulated(elapsed, max_substeps, fixed_dt))
    }

    /// Runs `f` under the write lock after moving the queue into the world.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut PhysicsWorld) -> R) -> R {
        let mut world = self.world.write();
        for command in self.queue.lock().drain(..) {
            world.submit(command);
        }
        f(&mut world)
    }

    pub fn raycast(&self, from: Vec3, to: Vec3) -> RaycastHit {
        self.world.read().raycast(from, to)
    }

    pub fn raycast_excluding(&self, from: Vec3, to: Vec3, exclude: ObjectId) -> RaycastHit {
        self.world.read().raycast_excluding(from, to, exclude)
    }

    pub fn convex_sweep(
        &self,
        shape: &SweepShape,
        rotation: Quat,
        from: Vec3,
        to: Vec3,
        extra_margin: f32,
    ) -> SweepHit {
        self.world
            .read()
            .convex_sweep(shape, rotation, from, to, extra_margin)
    }

    pub fn convex_sweep_object(
        &self,
        id: ObjectId,
        from: Vec3,
        to: Vec3,
        extra_margin: f32,
    ) -> SweepHit {
        self.world
            .read()
            .convex_sweep_object(id, from, to, extra_margin)
    }

    pub fn entity_properties(&self, id: ObjectId) -> Option<EntityProperties> {
        self.world.read().entity_properties(id)
    }

    pub fn has_object(&self, id: ObjectId) -> bool {
        self.world.read().has_object(id)
    }

    /// Shared access for reads the bridge does not wrap.
    pub fn read(&self) -> RwLockReadGuard<'_, PhysicsWorld> {
        self.world.read()
    }

    /// Direct access that bypasses the command queue.
    pub fn write(&self) -> RwLockWriteGuard<'_, PhysicsWorld> {
        self.world.write()
    }
}
