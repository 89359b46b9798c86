//! Change detection between the simulated state and what the host last saw.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    collision::contact::CollisionDesc,
    config::{
        ConfigDiagnostic, ANGULAR_VELOCITY_TOLERANCE, POSITION_TOLERANCE, ROTATION_TOLERANCE,
        VELOCITY_TOLERANCE,
    },
    core::{
        ids::ObjectId,
        math::{Quaternion, Vector3},
        rigidbody::SimBody,
    },
    error::ObjectError,
};

/// Per-object state snapshot handed to the host.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct EntityProperties {
    pub id: u32,
    pub position: Vector3,
    pub rotation: Quaternion,
    pub velocity: Vector3,
    pub acceleration: Vector3,
    pub angular_velocity: Vector3,
}

impl EntityProperties {
    pub fn from_body(body: &SimBody) -> Self {
        Self {
            id: body.id.raw(),
            position: body.transform.position.into(),
            rotation: body.transform.rotation.into(),
            velocity: body.velocity.linear.into(),
            acceleration: body.acceleration.into(),
            angular_velocity: body.velocity.angular.into(),
        }
    }

    /// What the host already knows right after creating the object: its
    /// transform, and no motion.
    pub fn at_creation(body: &SimBody) -> Self {
        Self {
            velocity: Vector3::ZERO,
            acceleration: Vector3::ZERO,
            angular_velocity: Vector3::ZERO,
            ..Self::from_body(body)
        }
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId(self.id)
    }
}

/// Tolerances below which a change is not worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub position_epsilon: f32,
    pub rotation_epsilon: f32,
    pub velocity_epsilon: f32,
    pub angular_velocity_epsilon: f32,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            position_epsilon: POSITION_TOLERANCE,
            rotation_epsilon: ROTATION_TOLERANCE,
            velocity_epsilon: VELOCITY_TOLERANCE,
            angular_velocity_epsilon: ANGULAR_VELOCITY_TOLERANCE,
        }
    }
}

impl UpdatePolicy {
    /// Acceleration is carried along but never triggers a report by itself.
    pub fn changed(&self, last: &EntityProperties, now: &EntityProperties) -> bool {
        !(now.position.almost_equal(&last.position, self.position_epsilon)
            && now.rotation.almost_equal(&last.rotation, self.rotation_epsilon)
            && now.velocity.almost_equal(&last.velocity, self.velocity_epsilon)
            && now
                .angular_velocity
                .almost_equal(&last.angular_velocity, self.angular_velocity_epsilon))
    }
}

/// Remembers the last snapshot reported for every live object and the
/// removals the host has not been told about yet.
#[derive(Debug, Default)]
pub struct SyncTracker {
    policy: UpdatePolicy,
    reported: HashMap<ObjectId, EntityProperties>,
    removed: Vec<ObjectId>,
}

impl SyncTracker {
    pub fn new(policy: UpdatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: UpdatePolicy) {
        self.policy = policy;
    }

    /// Records a snapshot the host already has, so it is not echoed back.
    pub fn seed(&mut self, properties: EntityProperties) {
        self.removed.retain(|id| id.raw() != properties.id);
        self.reported.insert(properties.object_id(), properties);
    }

    pub fn mark_removed(&mut self, id: ObjectId) {
        self.reported.remove(&id);
        if !self.removed.contains(&id) {
            self.removed.push(id);
        }
    }

    pub fn last_reported(&self, id: ObjectId) -> Option<&EntityProperties> {
        self.reported.get(&id)
    }

    /// Removals since the previous call, sorted by id.
    pub fn take_removed(&mut self) -> Vec<ObjectId> {
        let mut removed = std::mem::take(&mut self.removed);
        removed.sort_unstable();
        removed
    }

    /// Snapshots of non-static bodies that moved beyond tolerance, sorted by
    /// id and capped at `max_updates`. Bodies left out by the cap keep their
    /// old snapshot and come up again next time.
    pub fn collect_updates(
        &mut self,
        bodies: &[SimBody],
        max_updates: usize,
    ) -> Vec<EntityProperties> {
        let mut changed: Vec<EntityProperties> = bodies
            .iter()
            .filter(|body| !body.is_static && !body.id.is_reserved())
            .map(EntityProperties::from_body)
            .filter(|now| {
                self.reported
                    .get(&now.object_id())
                    .map_or(true, |last| self.policy.changed(last, now))
            })
            .collect();
        changed.sort_unstable_by_key(|props| props.id);

        if changed.len() > max_updates {
            debug!(
                "sync: {} update(s) deferred past the cap of {max_updates}",
                changed.len() - max_updates
            );
            changed.truncate(max_updates);
        }
        for props in &changed {
            self.reported.insert(props.object_id(), *props);
        }
        changed
    }

    pub fn clear(&mut self) {
        self.reported.clear();
        self.removed.clear();
    }
}

/// Everything one call to `step` has to tell the host.
#[derive(Debug, Default, Clone)]
pub struct StepOutput {
    /// Sorted by id.
    pub updates: Vec<EntityProperties>,
    /// New contacts, sorted by `(a_id, b_id)`.
    pub collisions: Vec<CollisionDesc>,
    pub removed: Vec<ObjectId>,
    /// Objects held at their last finite state this step.
    pub frozen: Vec<ObjectId>,
    /// Queued host commands that were refused.
    pub rejected: Vec<(ObjectId, ObjectError)>,
    /// Parameter fields clamped while applying queued configuration.
    pub diagnostics: Vec<ConfigDiagnostic>,
    pub substeps: u32,
}

impl StepOutput {
    pub fn is_quiet(&self) -> bool {
        self.updates.is_empty()
            && self.collisions.is_empty()
            && self.removed.is_empty()
            && self.frozen.is_empty()
            && self.rejected.is_empty()
    }

    pub fn update_for(&self, id: ObjectId) -> Option<&EntityProperties> {
        self.updates.iter().find(|props| props.id == id.raw())
    }
}

/// Acceleration over the last interval, zero when no time passed.
pub(crate) fn acceleration(before: Vec3, after: Vec3, dt: f32) -> Vec3 {
    if dt > 0.0 {
        (after - before) / dt
    } else {
        Vec3::ZERO
    }
}
