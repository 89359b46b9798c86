use std::collections::HashMap;

use glam::Vec3;

use crate::{
    collision::contact::Contact,
    core::{ids::ObjectId, rigidbody::SimBody},
    utils::math::XorShift32,
};

/// Closing speeds below this do not bounce, which keeps resting contacts
/// from jittering.
const RESTITUTION_VELOCITY_THRESHOLD: f32 = 0.5;

/// Tuning handed to a solver for one island.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverParams {
    pub iterations: u32,
    pub randomize_order: bool,
    pub warm_start: bool,
    /// Seed for the contact-order shuffle; callers derive it from the step
    /// counter so runs are reproducible.
    pub seed: u32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            iterations: crate::config::DEFAULT_SOLVER_ITERATIONS,
            randomize_order: false,
            warm_start: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SolverStepMetrics {
    pub islands_solved: usize,
    pub contacts_solved: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    pub fn record_island(&mut self, contacts: &[Contact]) {
        self.islands_solved += 1;
        self.contacts_solved += contacts.len();
        for contact in contacts {
            self.normal_impulse_sum += contact.accumulated_normal_impulse.abs();
            self.tangent_impulse_sum += contact.accumulated_tangent_impulse.length();
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.islands_solved += other.islands_solved;
        self.contacts_solved += other.contacts_solved;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Velocity-level contact solver driven by the world once per island.
///
/// `index` maps object ids to positions in `bodies`. A contact side that is
/// missing from `index` (the ground plane, the terrain, a body outside the
/// island) or that is not being simulated is treated as immovable.
pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    fn solve_island(
        &self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        contacts: &mut [Contact],
        params: &SolverParams,
    );
}

/// Projected Gauss-Seidel over contact impulses with Coulomb friction and
/// warm starting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialImpulseSolver;

impl SequentialImpulseSolver {
    pub fn new() -> Self {
        Self
    }

    fn warm_start(a: Option<&mut SimBody>, b: Option<&mut SimBody>, contact: &Contact) {
        let cached = contact.normal * contact.accumulated_normal_impulse
            + contact.accumulated_tangent_impulse;
        if cached.length_squared() <= f32::EPSILON {
            return;
        }
        apply_pair_impulse(a, b, cached, contact.point);
    }

    fn resolve_contact(
        mut a: Option<&mut SimBody>,
        mut b: Option<&mut SimBody>,
        contact: &mut Contact,
        bounce: f32,
    ) {
        if a.is_none() && b.is_none() {
            return;
        }
        let normal = contact.normal;
        let relative_vel = relative_velocity(a.as_deref(), b.as_deref(), contact.point);
        let vel_along_normal = relative_vel.dot(normal);

        let k_normal = effective_mass(a.as_deref(), b.as_deref(), contact.point, normal);
        if k_normal <= f32::EPSILON {
            return;
        }
        let lambda = -(vel_along_normal - bounce) / k_normal;
        let accumulated = (contact.accumulated_normal_impulse + lambda).max(0.0);
        let impulse_delta = accumulated - contact.accumulated_normal_impulse;
        contact.accumulated_normal_impulse = accumulated;
        apply_pair_impulse(
            a.as_deref_mut(),
            b.as_deref_mut(),
            normal * impulse_delta,
            contact.point,
        );

        Self::apply_friction(a, b, contact);
    }

    fn apply_friction(a: Option<&mut SimBody>, b: Option<&mut SimBody>, contact: &mut Contact) {
        let max_friction = contact.material.friction * contact.accumulated_normal_impulse;
        if max_friction <= f32::EPSILON {
            contact.accumulated_tangent_impulse = Vec3::ZERO;
            return;
        }

        let relative_vel = relative_velocity(a.as_deref(), b.as_deref(), contact.point);
        let tangent_velocity =
            relative_vel - contact.normal * relative_vel.dot(contact.normal);
        let speed = tangent_velocity.length();

        let mut new_impulse = contact.accumulated_tangent_impulse;
        if speed > 1e-6 {
            let direction = tangent_velocity / speed;
            let k_tangent = effective_mass(a.as_deref(), b.as_deref(), contact.point, direction);
            if k_tangent > f32::EPSILON {
                new_impulse -= direction * (speed / k_tangent);
            }
        }
        new_impulse -= contact.normal * new_impulse.dot(contact.normal);
        if new_impulse.length() > max_friction {
            new_impulse = new_impulse.normalize_or_zero() * max_friction;
        }

        let delta = new_impulse - contact.accumulated_tangent_impulse;
        contact.accumulated_tangent_impulse = new_impulse;
        apply_pair_impulse(a, b, delta, contact.point);
    }
}

impl Solver for SequentialImpulseSolver {
    fn name(&self) -> &str {
        "sequential-impulse"
    }

    fn solve_island(
        &self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        contacts: &mut [Contact],
        params: &SolverParams,
    ) {
        if contacts.is_empty() {
            return;
        }

        // Bounce targets come from the approach speed before any impulse.
        let bounces: Vec<f32> = contacts
            .iter()
            .map(|contact| {
                let (a, b) = pair_mut(bodies, index, contact.body_a, contact.body_b);
                let closing = relative_velocity(a.as_deref(), b.as_deref(), contact.point)
                    .dot(contact.normal);
                if closing < -RESTITUTION_VELOCITY_THRESHOLD {
                    -contact.material.restitution * closing
                } else {
                    0.0
                }
            })
            .collect();

        for contact in contacts.iter_mut() {
            if params.warm_start {
                let (a, b) = pair_mut(bodies, index, contact.body_a, contact.body_b);
                Self::warm_start(a, b, contact);
            } else {
                contact.accumulated_normal_impulse = 0.0;
                contact.accumulated_tangent_impulse = Vec3::ZERO;
            }
        }

        let mut order: Vec<usize> = (0..contacts.len()).collect();
        let mut rng = XorShift32::new(params.seed);
        for _ in 0..params.iterations.max(1) {
            if params.randomize_order {
                rng.shuffle(&mut order);
            }
            for &i in &order {
                let contact = &mut contacts[i];
                let (a, b) = pair_mut(bodies, index, contact.body_a, contact.body_b);
                Self::resolve_contact(a, b, contact, bounces[i]);
            }
        }
    }
}

/// Pushes two touching bodies apart along `normal` (A toward B) until at most
/// `slop` of `depth` remains. Immovable sides stay put.
pub fn correct_position(
    a: Option<&mut SimBody>,
    b: Option<&mut SimBody>,
    normal: Vec3,
    depth: f32,
    slop: f32,
    factor: f32,
) {
    let correction = (depth - slop).max(0.0) * factor;
    if correction <= 0.0 {
        return;
    }
    let inv_a = a.as_deref().map_or(0.0, |body| body.inverse_mass);
    let inv_b = b.as_deref().map_or(0.0, |body| body.inverse_mass);
    let total_inv_mass = inv_a + inv_b;
    if total_inv_mass <= 1e-6 {
        return;
    }
    let push = normal * (correction / total_inv_mass);
    if let Some(body) = a {
        body.transform.position -= push * inv_a;
    }
    if let Some(body) = b {
        body.transform.position += push * inv_b;
    }
}

/// Mutable access to both sides of a contact. Sides that are absent or not
/// simulated come back as `None`.
pub fn pair_mut<'a>(
    bodies: &'a mut [SimBody],
    index: &HashMap<ObjectId, usize>,
    a: ObjectId,
    b: ObjectId,
) -> (Option<&'a mut SimBody>, Option<&'a mut SimBody>) {
    let idx_a = index.get(&a).copied();
    let idx_b = index.get(&b).copied();
    let (body_a, body_b) = match (idx_a, idx_b) {
        (Some(i), Some(j)) if i < j => {
            let (left, right) = bodies.split_at_mut(j);
            (Some(&mut left[i]), Some(&mut right[0]))
        }
        (Some(i), Some(j)) if i > j => {
            let (left, right) = bodies.split_at_mut(i);
            (Some(&mut right[0]), Some(&mut left[j]))
        }
        (Some(i), _) => (bodies.get_mut(i), None),
        (None, Some(j)) => (None, bodies.get_mut(j)),
        (None, None) => (None, None),
    };
    (
        body_a.filter(|body| body.is_simulated()),
        body_b.filter(|body| body.is_simulated()),
    )
}

fn relative_velocity(a: Option<&SimBody>, b: Option<&SimBody>, point: Vec3) -> Vec3 {
    let v_a = a.map_or(Vec3::ZERO, |body| body.velocity_at(point));
    let v_b = b.map_or(Vec3::ZERO, |body| body.velocity_at(point));
    v_b - v_a
}

fn effective_mass(a: Option<&SimBody>, b: Option<&SimBody>, point: Vec3, axis: Vec3) -> f32 {
    let side = |body: &SimBody| {
        let r = point - body.transform.position;
        let angular = (body.world_inverse_inertia() * r.cross(axis)).cross(r);
        body.inverse_mass + angular.dot(axis)
    };
    a.map_or(0.0, side) + b.map_or(0.0, side)
}

fn apply_pair_impulse(
    a: Option<&mut SimBody>,
    b: Option<&mut SimBody>,
    impulse: Vec3,
    point: Vec3,
) {
    if let Some(body) = a {
        body.apply_impulse(-impulse, point);
    }
    if let Some(body) = b {
        body.apply_impulse(impulse, point);
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
            types::Material,
        },
    };

    fn sphere(id: u32, y: f32, vy: f32) -> SimBody {
        let data = ShapeData::new(id, ShapeType::Sphere)
            .with_position(Vector3::new(0.0, y, 0.0))
            .with_velocity(Vector3::new(0.0, vy, 0.0))
            .with_material(0.5, 0.0);
        SimBody::from_shape_data(&data, &WorldSettings::default(), &GeometryStore::new())
            .expect("sphere")
    }

    fn ground_contact(id: u32, friction: f32, restitution: f32) -> Contact {
        Contact {
            body_a: ObjectId(id),
            body_b: ObjectId::GROUND_PLANE,
            point: Vec3::new(0.0, -0.01, 0.0),
            normal: Vec3::NEG_Y,
            depth: 0.02,
            material: Material::new(friction, restitution),
            accumulated_normal_impulse: 0.0,
            accumulated_tangent_impulse: Vec3::ZERO,
            feature_id: 0,
        }
    }

    fn index_of(bodies: &[SimBody]) -> HashMap<ObjectId, usize> {
        bodies.iter().enumerate().map(|(i, b)| (b.id, i)).collect()
    }

    #[test]
    fn stops_approach_into_ground() {
        let mut bodies = vec![sphere(5, 0.49, -3.0)];
        let index = index_of(&bodies);
        let mut contacts = vec![ground_contact(5, 0.5, 0.0)];
        SequentialImpulseSolver.solve_island(
            &mut bodies,
            &index,
            &mut contacts,
            &SolverParams::default(),
        );
        assert!(bodies[0].velocity.linear.y.abs() < 1e-3);
        assert!(contacts[0].accumulated_normal_impulse > 0.0);
    }

    #[test]
    fn restitution_bounces_fast_impacts() {
        let mut bodies = vec![sphere(5, 0.49, -4.0)];
        let index = index_of(&bodies);
        let mut contacts = vec![ground_contact(5, 0.0, 0.5)];
        SequentialImpulseSolver.solve_island(
            &mut bodies,
            &index,
            &mut contacts,
            &SolverParams::default(),
        );
        assert!((bodies[0].velocity.linear.y - 2.0).abs() < 1e-2);
    }

    #[test]
    fn separating_contact_applies_nothing() {
        let mut bodies = vec![sphere(5, 0.49, 2.0)];
        let index = index_of(&bodies);
        let mut contacts = vec![ground_contact(5, 0.5, 0.0)];
        SequentialImpulseSolver.solve_island(
            &mut bodies,
            &index,
            &mut contacts,
            &SolverParams::default(),
        );
        assert_eq!(bodies[0].velocity.linear.y, 2.0);
        assert_eq!(contacts[0].accumulated_normal_impulse, 0.0);
    }

    #[test]
    fn friction_is_bounded_by_the_cone() {
        let mut body = sphere(5, 0.49, -1.0);
        body.velocity.linear.x = 10.0;
        let mut bodies = vec![body];
        let index = index_of(&bodies);
        let mut contacts = vec![ground_contact(5, 0.1, 0.0)];
        SequentialImpulseSolver.solve_island(
            &mut bodies,
            &index,
            &mut contacts,
            &SolverParams::default(),
        );
        let contact = &contacts[0];
        let limit = contact.material.friction * contact.accumulated_normal_impulse;
        assert!(contact.accumulated_tangent_impulse.length() <= limit + 1e-4);
        assert!(bodies[0].velocity.linear.x < 10.0);
        assert!(bodies[0].velocity.linear.x > 0.0);
    }

    #[test]
    fn pair_mut_hides_static_sides() {
        let mut bodies = vec![sphere(5, 0.0, 0.0), sphere(6, 1.0, 0.0)];
        bodies[1].set_static(true, &WorldSettings::default());
        let index = index_of(&bodies);
        let (a, b) = pair_mut(&mut bodies, &index, ObjectId(6), ObjectId(5));
        assert!(a.is_none());
        assert_eq!(b.map(|body| body.id), Some(ObjectId(5)));
    }

    #[test]
    fn position_correction_splits_by_inverse_mass() {
        let mut a = sphere(5, 0.0, 0.0);
        let mut b = sphere(6, 0.9, 0.0);
        correct_position(Some(&mut a), Some(&mut b), Vec3::Y, 0.14, 0.04, 1.0);
        assert!((a.transform.position.y + 0.05).abs() < 1e-5);
        assert!((b.transform.position.y - 0.95).abs() < 1e-5);
    }

    #[test]
    fn metrics_merge_adds_up() {
        let mut total = SolverStepMetrics::default();
        let mut island = SolverStepMetrics::default();
        island.record_island(&[ground_contact(5, 0.5, 0.0)]);
        total.merge(&island);
        total.merge(&island);
        assert_eq!(total.islands_solved, 2);
        assert_eq!(total.contacts_solved, 2);
    }
}
