//! World configuration: compile-time defaults, the host parameter block, and
//! the validated settings the engine actually runs on.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::warn;
use serde::{Deserialize, Serialize};

/// Gravity magnitude along Y (Y-up), m/s².
pub const DEFAULT_GRAVITY: f32 = -9.80665;

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of constraint solver iterations performed per step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 4.0;

/// Change-detection tolerances used when nothing else is configured.
pub const POSITION_TOLERANCE: f32 = 0.05;
pub const ROTATION_TOLERANCE: f32 = 0.01;
pub const VELOCITY_TOLERANCE: f32 = 0.001;
pub const ANGULAR_VELOCITY_TOLERANCE: f32 = 0.01;

/// Fraction of the remaining penetration removed by position correction each step.
pub const POSITION_CORRECTION_FACTOR: f32 = 0.8;

/// Per-step output caps used when the host does not pass its own.
pub const DEFAULT_MAX_UPDATES: usize = 2048;
pub const DEFAULT_MAX_COLLISIONS: usize = 2048;

/// Layout version of [`ParamBlock`]. Bump on any field change.
pub const PARAM_BLOCK_VERSION: u32 = 1;

/// Whole-world tuning block as the host lays it out: 28 `f32`s, in this order.
///
/// Flags are floats (non-zero = on) because boolean width is not portable
/// across the boundary. Never reorder or resize a field without bumping
/// [`PARAM_BLOCK_VERSION`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamBlock {
    pub default_friction: f32,
    pub default_density: f32,
    pub default_restitution: f32,
    pub collision_margin: f32,
    pub gravity: f32,

    pub linear_damping: f32,
    pub angular_damping: f32,
    pub deactivation_time: f32,
    pub linear_sleeping_threshold: f32,
    pub angular_sleeping_threshold: f32,
    pub ccd_motion_threshold: f32,
    pub ccd_swept_sphere_radius: f32,
    pub contact_processing_threshold: f32,

    pub terrain_friction: f32,
    pub terrain_hit_fraction: f32,
    pub terrain_restitution: f32,
    pub avatar_friction: f32,
    pub avatar_density: f32,
    pub avatar_restitution: f32,
    pub avatar_capsule_radius: f32,
    pub avatar_capsule_height: f32,

    pub max_persistent_manifold_pool_size: f32,
    pub should_disable_contact_pool_dynamic_allocation: f32,
    pub should_force_update_all_aabbs: f32,
    pub should_randomize_solver_order: f32,
    pub should_split_simulation_islands: f32,
    pub should_enable_friction_caching: f32,
    pub number_of_solver_iterations: f32,
}

impl Default for ParamBlock {
    fn default() -> Self {
        Self {
            default_friction: 0.2,
            default_density: 10.0,
            default_restitution: 0.0,
            collision_margin: 0.04,
            gravity: DEFAULT_GRAVITY,

            linear_damping: 0.0,
            angular_damping: 0.0,
            deactivation_time: 0.2,
            linear_sleeping_threshold: 0.8,
            angular_sleeping_threshold: 1.0,
            ccd_motion_threshold: 0.0,
            ccd_swept_sphere_radius: 0.2,
            contact_processing_threshold: 0.1,

            terrain_friction: 0.3,
            terrain_hit_fraction: 0.8,
            terrain_restitution: 0.0,
            avatar_friction: 0.2,
            avatar_density: 3.5,
            avatar_restitution: 0.0,
            avatar_capsule_radius: 0.37,
            avatar_capsule_height: 1.5,

            max_persistent_manifold_pool_size: 0.0,
            should_disable_contact_pool_dynamic_allocation: 1.0,
            should_force_update_all_aabbs: 1.0,
            should_randomize_solver_order: 1.0,
            should_split_simulation_islands: 1.0,
            should_enable_friction_caching: 1.0,
            number_of_solver_iterations: DEFAULT_SOLVER_ITERATIONS as f32,
        }
    }
}

/// One field of a [`ParamBlock`] that was replaced during validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigDiagnostic {
    pub field: &'static str,
    pub given: f32,
    pub applied: f32,
}

/// Validated, typed view of a [`ParamBlock`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSettings {
    pub default_friction: f32,
    pub default_density: f32,
    pub default_restitution: f32,
    pub collision_margin: f32,
    pub gravity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub deactivation_time: f32,
    pub linear_sleeping_threshold: f32,
    pub angular_sleeping_threshold: f32,
    pub ccd_motion_threshold: f32,
    pub ccd_swept_sphere_radius: f32,
    pub contact_processing_threshold: f32,
    pub terrain_friction: f32,
    pub terrain_hit_fraction: f32,
    pub terrain_restitution: f32,
    pub avatar_friction: f32,
    pub avatar_density: f32,
    pub avatar_restitution: f32,
    pub avatar_capsule_radius: f32,
    pub avatar_capsule_height: f32,
    /// `None` means the contact pool may grow without bound.
    pub contact_pool_limit: Option<usize>,
    pub force_update_all_aabbs: bool,
    pub randomize_solver_order: bool,
    pub split_simulation_islands: bool,
    pub enable_friction_caching: bool,
    pub solver_iterations: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self::from_params(&ParamBlock::default()).0
    }
}

impl WorldSettings {
    /// Validates every field of `params`. Invalid values are replaced with the
    /// field's default and reported; this never fails.
    pub fn from_params(params: &ParamBlock) -> (Self, Vec<ConfigDiagnostic>) {
        let d = ParamBlock::default();
        let mut v = Validator::default();

        let non_negative = |x: f32| x >= 0.0;
        let positive = |x: f32| x > 0.0;
        let unit = |x: f32| (0.0..=1.0).contains(&x);
        let any = |_: f32| true;

        macro_rules! field {
            ($name:ident, $rule:expr) => {
                v.check(stringify!($name), params.$name, d.$name, $rule)
            };
        }
        macro_rules! flag {
            ($name:ident) => {
                v.flag(stringify!($name), params.$name, d.$name)
            };
        }

        let default_friction = field!(default_friction, non_negative);
        let default_density = field!(default_density, positive);
        let default_restitution = field!(default_restitution, unit);
        let collision_margin = field!(collision_margin, non_negative);
        let gravity = field!(gravity, any);
        let linear_damping = field!(linear_damping, unit);
        let angular_damping = field!(angular_damping, unit);
        let deactivation_time = field!(deactivation_time, non_negative);
        let linear_sleeping_threshold = field!(linear_sleeping_threshold, non_negative);
        let angular_sleeping_threshold = field!(angular_sleeping_threshold, non_negative);
        let ccd_motion_threshold = field!(ccd_motion_threshold, non_negative);
        let ccd_swept_sphere_radius = field!(ccd_swept_sphere_radius, non_negative);
        let contact_processing_threshold = field!(contact_processing_threshold, non_negative);
        let terrain_friction = field!(terrain_friction, non_negative);
        let terrain_hit_fraction = field!(terrain_hit_fraction, unit);
        let terrain_restitution = field!(terrain_restitution, unit);
        let avatar_friction = field!(avatar_friction, non_negative);
        let avatar_density = field!(avatar_density, positive);
        let avatar_restitution = field!(avatar_restitution, unit);
        let avatar_capsule_radius = field!(avatar_capsule_radius, positive);
        let avatar_capsule_height = field!(avatar_capsule_height, positive);
        let pool_size = field!(max_persistent_manifold_pool_size, non_negative);
        let disable_pool_growth = flag!(should_disable_contact_pool_dynamic_allocation);
        let force_update_all_aabbs = flag!(should_force_update_all_aabbs);
        let randomize_solver_order = flag!(should_randomize_solver_order);
        let split_simulation_islands = flag!(should_split_simulation_islands);
        let enable_friction_caching = flag!(should_enable_friction_caching);
        let iterations = field!(number_of_solver_iterations, |x| (1.0..=1024.0).contains(&x));

        // A zero-sized pool means "no cap" even when growth is disabled.
        let contact_pool_limit = if disable_pool_growth && pool_size >= 1.0 {
            Some(pool_size as usize)
        } else {
            None
        };

        let settings = Self {
            default_friction,
            default_density,
            default_restitution,
            collision_margin,
            gravity: Vec3::new(0.0, gravity, 0.0),
            linear_damping,
            angular_damping,
            deactivation_time,
            linear_sleeping_threshold,
            angular_sleeping_threshold,
            ccd_motion_threshold,
            ccd_swept_sphere_radius,
            contact_processing_threshold,
            terrain_friction,
            terrain_hit_fraction,
            terrain_restitution,
            avatar_friction,
            avatar_density,
            avatar_restitution,
            avatar_capsule_radius,
            avatar_capsule_height,
            contact_pool_limit,
            force_update_all_aabbs,
            randomize_solver_order,
            split_simulation_islands,
            enable_friction_caching,
            solver_iterations: iterations.round() as u32,
        };

        (settings, v.diagnostics)
    }
}

#[derive(Default)]
struct Validator {
    diagnostics: Vec<ConfigDiagnostic>,
}

impl Validator {
    fn check(
        &mut self,
        field: &'static str,
        given: f32,
        fallback: f32,
        valid: impl Fn(f32) -> bool,
    ) -> f32 {
        if given.is_finite() && valid(given) {
            return given;
        }
        warn!("config: {field} = {given} is out of range, using {fallback}");
        self.diagnostics.push(ConfigDiagnostic {
            field,
            given,
            applied: fallback,
        });
        fallback
    }

    fn flag(&mut self, field: &'static str, given: f32, fallback: f32) -> bool {
        self.check(field, given, fallback, |_| true) != 0.0
    }
}

/// Per-step output caps, fixed when the world is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldLimits {
    pub max_updates: usize,
    pub max_collisions: usize,
}

impl Default for WorldLimits {
    fn default() -> Self {
        Self {
            max_updates: DEFAULT_MAX_UPDATES,
            max_collisions: DEFAULT_MAX_COLLISIONS,
        }
    }
}
