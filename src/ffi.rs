//! C ABI over a [`PhysicsBridge`].
//!
//! Every entry point tolerates null pointers and catches panics, returning a
//! neutral value (`0`, a null handle or the invalid-hit record) instead.
//! Calls here act on the world immediately; the queued path is only
//! available from Rust.

use std::{
    panic::{self, AssertUnwindSafe},
    ptr, slice,
    sync::Arc,
};

use log::{error, warn};

use crate::{
    collision::{
        contact::CollisionDesc,
        queries::{RaycastHit, SweepHit},
        terrain::Heightmap,
    },
    config::{ParamBlock, WorldLimits},
    core::{
        ids::ObjectId,
        math::{Quaternion, Vector3},
        mesh::GeometryStore,
        shape::{RawConvexHull, ShapeData},
    },
    error::ObjectError,
    world::{EntityProperties, PhysicsWorld},
    PhysicsBridge,
};

/// Opaque handle handed to the host.
pub struct World {
    bridge: PhysicsBridge,
    geometry: Arc<GeometryStore>,
    limits: WorldLimits,
}

impl World {
    pub fn bridge(&self) -> &PhysicsBridge {
        &self.bridge
    }

    pub fn geometry(&self) -> &GeometryStore {
        &self.geometry
    }
}

fn guarded<T>(name: &str, fallback: T, call: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(value) => value,
        Err(_) => {
            error!("ffi: panic caught in {name}");
            fallback
        }
    }
}

fn status(result: Result<(), ObjectError>) -> i32 {
    match result {
        Ok(()) => 1,
        Err(err) => {
            warn!("ffi: {err}");
            0
        }
    }
}

/// # Safety
/// `world` must be null or a handle returned by [`phys_bridge_initialize`]
/// that has not been shut down.
unsafe fn handle<'a>(world: *mut World) -> Option<&'a World> {
    world.as_ref()
}

/// Creates a world. A null `params` uses the defaults.
///
/// # Safety
/// `params` must be null or point at a valid [`ParamBlock`].
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_initialize(
    params: *const ParamBlock,
    max_updates: u32,
    max_collisions: u32,
) -> *mut World {
    guarded("initialize", ptr::null_mut(), || {
        let params = params.as_ref().copied().unwrap_or_default();
        let limits = WorldLimits {
            max_updates: max_updates as usize,
            max_collisions: max_collisions as usize,
        };
        let geometry = Arc::new(GeometryStore::new());
        let cache = Box::new(Arc::clone(&geometry));
        let (world, _) = PhysicsWorld::from_params(&params, limits, cache);
        Box::into_raw(Box::new(World {
            bridge: PhysicsBridge::new(world),
            geometry,
            limits,
        }))
    })
}

/// # Safety
/// `world` must be null or a live handle; it is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_shutdown(world: *mut World) {
    if world.is_null() {
        return;
    }
    guarded("shutdown", (), || drop(Box::from_raw(world)));
}

/// Returns how many fields were clamped.
///
/// # Safety
/// `world` must be null or a live handle; `params` null or valid.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_update_params(
    world: *mut World,
    params: *const ParamBlock,
) -> u32 {
    let (Some(world), Some(params)) = (handle(world), params.as_ref()) else {
        return 0;
    };
    guarded("update_params", 0, || {
        world.bridge.write().update_params(params).len() as u32
    })
}

/// # Safety
/// `world` must be null or a live handle; `data` null or valid.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_create_object(
    world: *mut World,
    data: *const ShapeData,
) -> i32 {
    let (Some(world), Some(data)) = (handle(world), data.as_ref()) else {
        return 0;
    };
    guarded("create_object", 0, || status(world.bridge.write().create_object(data)))
}

/// # Safety
/// `world` must be null or a live handle; `data` null or valid.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_update_object(
    world: *mut World,
    data: *const ShapeData,
) -> i32 {
    let (Some(world), Some(data)) = (handle(world), data.as_ref()) else {
        return 0;
    };
    guarded("update_object", 0, || status(world.bridge.write().update_object(data)))
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_destroy_object(world: *mut World, id: u32) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("destroy_object", 0, || {
        status(world.bridge.write().destroy_object(ObjectId(id)))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_has_object(world: *mut World, id: u32) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("has_object", 0, || world.bridge.has_object(ObjectId(id)) as i32)
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_translation(
    world: *mut World,
    id: u32,
    position: Vector3,
    rotation: Quaternion,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_translation", 0, || {
        status(world.bridge.write().set_translation(
            ObjectId(id),
            position.into(),
            rotation.into(),
        ))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_velocity(
    world: *mut World,
    id: u32,
    velocity: Vector3,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_velocity", 0, || {
        status(world.bridge.write().set_velocity(ObjectId(id), velocity.into()))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_angular_velocity(
    world: *mut World,
    id: u32,
    velocity: Vector3,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_angular_velocity", 0, || {
        status(world.bridge.write().set_angular_velocity(ObjectId(id), velocity.into()))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_apply_force(
    world: *mut World,
    id: u32,
    force: Vector3,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("apply_force", 0, || {
        status(world.bridge.write().apply_force(ObjectId(id), force.into()))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_scale_mass(
    world: *mut World,
    id: u32,
    scale: Vector3,
    mass: f32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_scale_mass", 0, || {
        status(world.bridge.write().set_scale_mass(ObjectId(id), scale.into(), mass))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_collidable(
    world: *mut World,
    id: u32,
    collidable: i32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_collidable", 0, || {
        status(world.bridge.write().set_collidable(ObjectId(id), collidable != 0))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_static(world: *mut World, id: u32, is_static: i32) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_static", 0, || {
        status(world.bridge.write().set_static(ObjectId(id), is_static != 0))
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_buoyancy(
    world: *mut World,
    id: u32,
    buoyancy: f32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("set_buoyancy", 0, || {
        status(world.bridge.write().set_buoyancy(ObjectId(id), buoyancy))
    })
}

/// Copies the hull's vertices into the geometry cache under `key`.
///
/// # Safety
/// `world` must be null or a live handle; `hull` null or a valid record whose
/// vertex buffer holds `vertex_count` vertices for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_create_hull(
    world: *mut World,
    key: u64,
    hull: *const RawConvexHull,
) -> i32 {
    let (Some(world), Some(hull)) = (handle(world), hull.as_ref()) else {
        return 0;
    };
    guarded("create_hull", 0, || {
        let registered = hull
            .as_view()
            .and_then(|view| world.geometry.insert_hull(key, view));
        match registered {
            Ok(()) => 1,
            Err(err) => {
                warn!("ffi: hull {key:#x} rejected: {err}");
                0
            }
        }
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_destroy_hull(world: *mut World, key: u64) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("destroy_hull", 0, || world.geometry.remove_hull(key) as i32)
}

/// # Safety
/// `world` must be null or a live handle; `vertices` and `indices` null or
/// valid for `vertex_count` and `index_count` elements.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_create_mesh(
    world: *mut World,
    key: u64,
    vertex_count: u32,
    vertices: *const Vector3,
    index_count: u32,
    indices: *const u32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    if vertices.is_null() || indices.is_null() || vertex_count == 0 || index_count == 0 {
        return 0;
    }
    guarded("create_mesh", 0, || {
        let vertices = slice::from_raw_parts(vertices, vertex_count as usize);
        let indices = slice::from_raw_parts(indices, index_count as usize);
        match world.geometry.insert_mesh(key, vertices, indices) {
            Ok(()) => 1,
            Err(err) => {
                warn!("ffi: mesh {key:#x} rejected: {err}");
                0
            }
        }
    })
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_destroy_mesh(world: *mut World, key: u64) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("destroy_mesh", 0, || world.geometry.remove_mesh(key) as i32)
}

/// Installs a `size_x` by `size_z` height grid. A null `heights` removes the
/// terrain.
///
/// # Safety
/// `world` must be null or a live handle; `heights` null or valid for
/// `size_x * size_z` floats.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_set_heightmap(
    world: *mut World,
    size_x: u32,
    size_z: u32,
    cell_size: f32,
    heights: *const f32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    if heights.is_null() {
        guarded("set_heightmap", (), || world.bridge.write().set_heightmap(None));
        return 1;
    }
    let Some(count) = (size_x as usize).checked_mul(size_z as usize) else {
        return 0;
    };
    guarded("set_heightmap", 0, || {
        let samples = slice::from_raw_parts(heights, count).to_vec();
        match Heightmap::new(size_x as usize, size_z as usize, cell_size, samples) {
            Some(map) => {
                world.bridge.write().set_heightmap(Some(map));
                1
            }
            None => {
                warn!("ffi: heightmap {size_x}x{size_z} rejected");
                0
            }
        }
    })
}

/// Advances the world and copies out the step's updates and new collisions.
/// Updates that do not fit stay pending for a later step. Returns the number
/// of substeps run.
///
/// # Safety
/// `world` must be null or a live handle. Each output buffer must be null or
/// valid for its `max_*` elements, and each count pointer null or valid.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn phys_bridge_step(
    world: *mut World,
    time_step: f32,
    max_substeps: i32,
    fixed_time_step: f32,
    updates_out: *mut EntityProperties,
    max_updates: u32,
    update_count_out: *mut u32,
    collisions_out: *mut CollisionDesc,
    max_collisions: u32,
    collision_count_out: *mut u32,
) -> i32 {
    let Some(world) = handle(world) else {
        return 0;
    };
    guarded("step", 0, || {
        let update_room = if updates_out.is_null() { 0 } else { max_updates as usize };
        let collision_room = if collisions_out.is_null() { 0 } else { max_collisions as usize };
        let limits = WorldLimits {
            max_updates: update_room.min(world.limits.max_updates),
            max_collisions: collision_room.min(world.limits.max_collisions),
        };
        let output = world.bridge.with_world(|physics| {
            physics.set_limits(limits);
            physics.step_accumulated(time_step, max_substeps.max(0) as u32, fixed_time_step)
        });

        let update_count = copy_out(&output.updates, updates_out, update_room);
        let collision_count = copy_out(&output.collisions, collisions_out, collision_room);
        if let Some(count) = update_count_out.as_mut() {
            *count = update_count as u32;
        }
        if let Some(count) = collision_count_out.as_mut() {
            *count = collision_count as u32;
        }
        output.substeps as i32
    })
}

/// Copies as many records as fit; returns how many were written.
unsafe fn copy_out<T: Copy>(records: &[T], out: *mut T, room: usize) -> usize {
    if out.is_null() {
        return 0;
    }
    let count = records.len().min(room);
    ptr::copy_nonoverlapping(records.as_ptr(), out, count);
    count
}

/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_raycast(
    world: *mut World,
    from: Vector3,
    to: Vector3,
) -> RaycastHit {
    let Some(world) = handle(world) else {
        return RaycastHit::MISS;
    };
    guarded("raycast", RaycastHit::MISS, || {
        world.bridge.raycast(from.into(), to.into())
    })
}

/// Sweeps object `id`'s shape from `from` to `to`, ignoring the object.
///
/// # Safety
/// `world` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_convex_sweep(
    world: *mut World,
    id: u32,
    from: Vector3,
    to: Vector3,
    extra_margin: f32,
) -> SweepHit {
    let Some(world) = handle(world) else {
        return SweepHit::MISS;
    };
    guarded("convex_sweep", SweepHit::MISS, || {
        world
            .bridge
            .convex_sweep_object(ObjectId(id), from.into(), to.into(), extra_margin)
    })
}

/// # Safety
/// `world` must be null or a live handle; `out` null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn phys_bridge_entity_properties(
    world: *mut World,
    id: u32,
    out: *mut EntityProperties,
) -> i32 {
    let (Some(world), Some(out)) = (handle(world), out.as_mut()) else {
        return 0;
    };
    guarded("entity_properties", 0, || match world.bridge.entity_properties(ObjectId(id)) {
        Some(props) => {
            *out = props;
            1
        }
        None => 0,
    })
}
