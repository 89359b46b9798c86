//! Host mutations that can be queued and applied at a step boundary.

use glam::{Quat, Vec3};
use log::debug;

use super::PhysicsWorld;
use crate::{
    collision::terrain::Heightmap,
    config::{ConfigDiagnostic, ParamBlock},
    core::{
        ids::{ObjectId, INVALID_HIT_ID},
        shape::ShapeData,
    },
    error::ObjectError,
};

/// One deferred host call against the world.
#[derive(Debug, Clone)]
pub enum WorldCommand {
    Create(ShapeData),
    Update(ShapeData),
    Destroy(ObjectId),
    SetTranslation {
        id: ObjectId,
        position: Vec3,
        rotation: Quat,
    },
    SetVelocity(ObjectId, Vec3),
    SetAngularVelocity(ObjectId, Vec3),
    ApplyForce(ObjectId, Vec3),
    SetScaleMass {
        id: ObjectId,
        scale: Vec3,
        mass: f32,
    },
    SetCollidable(ObjectId, bool),
    SetStatic(ObjectId, bool),
    SetBuoyancy(ObjectId, f32),
    UpdateParams(Box<ParamBlock>),
    SetHeightmap(Option<Heightmap>),
}

/// What applying a batch of commands refused or clamped.
#[derive(Debug, Default, Clone)]
pub struct CommandReport {
    pub applied: usize,
    pub rejected: Vec<(ObjectId, ObjectError)>,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl CommandReport {
    pub fn merge(&mut self, other: CommandReport) {
        self.applied += other.applied;
        self.rejected.extend(other.rejected);
        self.diagnostics.extend(other.diagnostics);
    }
}

impl WorldCommand {
    /// The object a command addresses, if any.
    pub fn target(&self) -> Option<ObjectId> {
        match self {
            WorldCommand::Create(data) | WorldCommand::Update(data) => Some(data.object_id()),
            WorldCommand::Destroy(id)
            | WorldCommand::SetTranslation { id, .. }
            | WorldCommand::SetVelocity(id, _)
            | WorldCommand::SetAngularVelocity(id, _)
            | WorldCommand::ApplyForce(id, _)
            | WorldCommand::SetScaleMass { id, .. }
            | WorldCommand::SetCollidable(id, _)
            | WorldCommand::SetStatic(id, _)
            | WorldCommand::SetBuoyancy(id, _) => Some(*id),
            WorldCommand::UpdateParams(_) | WorldCommand::SetHeightmap(_) => None,
        }
    }

    pub(crate) fn apply(self, world: &mut PhysicsWorld, report: &mut CommandReport) {
        let target = self.target();
        let result = match self {
            WorldCommand::Create(data) => world.create_object(&data),
            WorldCommand::Update(data) => world.update_object(&data),
            WorldCommand::Destroy(id) => world.destroy_object(id),
            WorldCommand::SetTranslation {
                id,
                position,
                rotation,
            } => world.set_translation(id, position, rotation),
            WorldCommand::SetVelocity(id, velocity) => world.set_velocity(id, velocity),
            WorldCommand::SetAngularVelocity(id, velocity) => {
                world.set_angular_velocity(id, velocity)
            }
            WorldCommand::ApplyForce(id, force) => world.apply_force(id, force),
            WorldCommand::SetScaleMass { id, scale, mass } => world.set_scale_mass(id, scale, mass),
            WorldCommand::SetCollidable(id, collidable) => world.set_collidable(id, collidable),
            WorldCommand::SetStatic(id, is_static) => world.set_static(id, is_static),
            WorldCommand::SetBuoyancy(id, buoyancy) => world.set_buoyancy(id, buoyancy),
            WorldCommand::UpdateParams(params) => {
                report.diagnostics.extend(world.update_params(&params));
                Ok(())
            }
            WorldCommand::SetHeightmap(terrain) => {
                world.set_heightmap(terrain);
                Ok(())
            }
        };

        match result {
            Ok(()) => report.applied += 1,
            Err(err) => {
                debug!("command rejected: {err}");
                let target = target.unwrap_or(ObjectId(INVALID_HIT_ID));
                report.rejected.push((target, err));
            }
        }
    }
}
