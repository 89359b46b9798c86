use std::collections::{HashMap, HashSet};

use crate::{
    collision::contact::Contact,
    core::{ids::ObjectId, rigidbody::SimBody},
};

/// A connected set of dynamic bodies and the contacts touching them.
/// Static bodies and the pseudo-objects never join two islands.
#[derive(Debug, Clone, Default)]
pub struct Island {
    pub bodies: Vec<ObjectId>,
    pub contacts: Vec<Contact>,
    pub is_awake: bool,
}

/// Sleep tuning taken from the world settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepParams {
    pub linear_threshold: f32,
    pub angular_threshold: f32,
    /// Seconds an island must stay below both thresholds. Zero or less never
    /// puts anything to sleep.
    pub deactivation_time: f32,
}

/// Builds islands each step and manages sleeping state.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: HashMap<ObjectId, Vec<ObjectId>>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups the dynamic, unfrozen bodies by contact connectivity and hands
    /// each island the contacts that touch it. An island with any awake
    /// member wakes the rest.
    pub fn build_islands(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        contacts: Vec<Contact>,
    ) {
        self.islands.clear();
        self.adjacency.clear();

        let is_node = |id: &ObjectId| {
            index
                .get(id)
                .and_then(|&i| bodies.get(i))
                .is_some_and(|body| body.is_dynamic() && !body.is_frozen)
        };

        let mut nodes: Vec<ObjectId> = bodies
            .iter()
            .filter(|body| body.is_dynamic() && !body.is_frozen)
            .map(|body| body.id)
            .collect();
        nodes.sort_unstable();

        for contact in &contacts {
            if is_node(&contact.body_a) && is_node(&contact.body_b) {
                self.adjacency
                    .entry(contact.body_a)
                    .or_default()
                    .push(contact.body_b);
                self.adjacency
                    .entry(contact.body_b)
                    .or_default()
                    .push(contact.body_a);
            }
        }

        let mut visited = HashSet::new();
        let mut island_of: HashMap<ObjectId, usize> = HashMap::new();
        for body_id in nodes {
            if visited.contains(&body_id) {
                continue;
            }
            let members = self.depth_first_collect(body_id, &mut visited);
            let slot = self.islands.len();
            for id in &members {
                island_of.insert(*id, slot);
            }
            self.islands.push(Island {
                bodies: members,
                contacts: Vec::new(),
                is_awake: false,
            });
        }

        for contact in contacts {
            let slot = island_of
                .get(&contact.body_a)
                .or_else(|| island_of.get(&contact.body_b));
            if let Some(&slot) = slot {
                self.islands[slot].contacts.push(contact);
            }
        }

        for island in &mut self.islands {
            island.is_awake = island
                .bodies
                .iter()
                .filter_map(|id| index.get(id).and_then(|&i| bodies.get(i)))
                .any(|body| body.is_awake);
            if !island.is_awake {
                continue;
            }
            for id in &island.bodies {
                if let Some(body) = index.get(id).and_then(|&i| bodies.get_mut(i)) {
                    if !body.is_awake {
                        body.is_awake = true;
                        body.sleep_timer = 0.0;
                    }
                }
            }
        }
    }

    fn depth_first_collect(
        &self,
        start: ObjectId,
        visited: &mut HashSet<ObjectId>,
    ) -> Vec<ObjectId> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                result.push(node);
                if let Some(neighbors) = self.adjacency.get(&node) {
                    stack.extend(neighbors.iter().copied());
                }
            }
        }

        result.sort_unstable();
        result
    }

    /// Advances sleep timers of awake islands. An island whose every member
    /// has stayed under both thresholds for the deactivation time goes to
    /// sleep as a whole with its velocities zeroed. Returns how many bodies
    /// fell asleep.
    pub fn update_sleeping(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        params: &SleepParams,
        dt: f32,
    ) -> usize {
        let mut slept = 0;
        for island in &mut self.islands {
            if !island.is_awake {
                continue;
            }
            let members: Vec<usize> = island
                .bodies
                .iter()
                .filter_map(|id| index.get(id).copied())
                .filter(|&i| i < bodies.len())
                .collect();

            let resting = members.iter().all(|&i| {
                let velocity = &bodies[i].velocity;
                velocity.linear.length() < params.linear_threshold
                    && velocity.angular.length() < params.angular_threshold
            });
            if !resting || params.deactivation_time <= 0.0 {
                for &i in &members {
                    bodies[i].sleep_timer = 0.0;
                }
                continue;
            }

            let mut ready = true;
            for &i in &members {
                bodies[i].sleep_timer += dt;
                ready &= bodies[i].sleep_timer >= params.deactivation_time;
            }
            if ready {
                for &i in &members {
                    let body = &mut bodies[i];
                    body.is_awake = false;
                    body.velocity = Default::default();
                }
                island.is_awake = false;
                slept += members.len();
            }
        }
        slept
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn islands_mut(&mut self) -> &mut [Island] {
        &mut self.islands
    }

    pub fn awake_count(&self) -> usize {
        self.islands.iter().filter(|island| island.is_awake).count()
    }
}
