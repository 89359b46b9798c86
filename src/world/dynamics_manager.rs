use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::collision::contact::Contact;
use crate::config::WorldSettings;
use crate::core::{ids::ObjectId, rigidbody::SimBody};
use crate::dynamics::{
    integrator::Integrator,
    island::{Island, IslandManager, SleepParams},
    solver::{SequentialImpulseSolver, Solver, SolverParams, SolverStepMetrics},
};

/// Integration, the pluggable contact solver and island bookkeeping.
pub struct DynamicsManager {
    pub integrator: Integrator,
    pub solver: Box<dyn Solver>,
    pub islands: IslandManager,
    pub metrics: SolverStepMetrics,
}

impl Default for DynamicsManager {
    fn default() -> Self {
        Self::new(&WorldSettings::default())
    }
}

impl DynamicsManager {
    pub fn new(settings: &WorldSettings) -> Self {
        Self {
            integrator: Integrator::from_settings(settings),
            solver: Box::new(SequentialImpulseSolver::new()),
            islands: IslandManager::new(),
            metrics: SolverStepMetrics::default(),
        }
    }

    pub fn apply_settings(&mut self, settings: &WorldSettings) {
        let parallel = self.integrator.parallel();
        self.integrator = Integrator::from_settings(settings);
        self.integrator.set_parallel(parallel);
    }

    pub fn sleep_params(settings: &WorldSettings) -> SleepParams {
        SleepParams {
            linear_threshold: settings.linear_sleeping_threshold,
            angular_threshold: settings.angular_sleeping_threshold,
            deactivation_time: settings.deactivation_time,
        }
    }

    /// Builds islands from this step's contacts and solves the awake ones.
    /// Returns the solved contacts so their impulses can be cached.
    pub fn solve(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        contacts: Vec<Contact>,
        settings: &WorldSettings,
        step: u64,
    ) -> Vec<Contact> {
        self.metrics = SolverStepMetrics::default();
        self.islands.build_islands(bodies, index, contacts);

        let params = SolverParams {
            iterations: settings.solver_iterations,
            randomize_order: settings.randomize_solver_order,
            warm_start: settings.enable_friction_caching,
            seed: step as u32,
        };

        if !settings.split_simulation_islands {
            return self.solve_merged(bodies, index, &params);
        }
        if self.integrator.parallel() {
            self.solve_islands_parallel(bodies, index, &params)
        } else {
            self.solve_islands_sequential(bodies, index, &params)
        }
    }

    /// One solve over every awake contact, as if the world were one island.
    fn solve_merged(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        params: &SolverParams,
    ) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self
            .islands
            .islands_mut()
            .iter_mut()
            .filter(|island| island.is_awake)
            .flat_map(|island| std::mem::take(&mut island.contacts))
            .collect();
        if contacts.is_empty() {
            return contacts;
        }
        self.solver.solve_island(bodies, index, &mut contacts, params);
        self.metrics.record_island(&contacts);
        contacts
    }

    fn solve_islands_sequential(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        params: &SolverParams,
    ) -> Vec<Contact> {
        let mut solved = Vec::new();
        for island in self.islands.islands_mut() {
            if !island.is_awake || island.contacts.is_empty() {
                continue;
            }
            let params = island_params(island, params);
            self.solver
                .solve_island(bodies, index, &mut island.contacts, &params);
            self.metrics.record_island(&island.contacts);
            solved.append(&mut island.contacts);
        }
        solved
    }

    fn solve_islands_parallel(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        params: &SolverParams,
    ) -> Vec<Contact> {
        let mut jobs: Vec<IslandJob> = self
            .islands
            .islands_mut()
            .iter_mut()
            .filter(|island| island.is_awake && !island.contacts.is_empty())
            .filter_map(|island| IslandJob::prepare(island, bodies, index, params))
            .collect();

        let solver = self.solver.as_ref();
        #[cfg(feature = "parallel")]
        jobs.par_iter_mut().for_each(|job| job.run(solver));
        #[cfg(not(feature = "parallel"))]
        jobs.iter_mut().for_each(|job| job.run(solver));

        let mut solved = Vec::new();
        for job in jobs {
            self.metrics.record_island(&job.contacts);
            for (id, state) in job.ids.into_iter().zip(job.bodies) {
                if let Some(slot) = index.get(&id).and_then(|&i| bodies.get_mut(i)) {
                    *slot = state;
                }
            }
            solved.extend(job.contacts);
        }
        solved
    }

    pub fn update_sleeping(
        &mut self,
        bodies: &mut [SimBody],
        index: &HashMap<ObjectId, usize>,
        settings: &WorldSettings,
        dt: f32,
    ) -> usize {
        let params = Self::sleep_params(settings);
        self.islands.update_sleeping(bodies, index, &params, dt)
    }
}

/// Seeds each island's shuffle differently but reproducibly.
fn island_params(island: &Island, params: &SolverParams) -> SolverParams {
    let first = island.bodies.first().map_or(0, |id| id.raw());
    SolverParams {
        seed: params.seed ^ first,
        ..*params
    }
}

/// A detached copy of one island so islands can be solved side by side.
/// Static bodies are left out; the solver treats missing sides as fixed.
struct IslandJob {
    ids: Vec<ObjectId>,
    bodies: Vec<SimBody>,
    id_map: HashMap<ObjectId, usize>,
    contacts: Vec<Contact>,
    params: SolverParams,
}

impl IslandJob {
    fn prepare(
        island: &mut Island,
        bodies: &[SimBody],
        index: &HashMap<ObjectId, usize>,
        params: &SolverParams,
    ) -> Option<Self> {
        let mut ids = Vec::with_capacity(island.bodies.len());
        let mut copies = Vec::with_capacity(island.bodies.len());
        let mut id_map = HashMap::with_capacity(island.bodies.len());

        for body_id in &island.bodies {
            if let Some(body) = index.get(body_id).and_then(|&i| bodies.get(i)) {
                id_map.insert(*body_id, copies.len());
                ids.push(*body_id);
                copies.push(body.clone());
            }
        }
        if copies.is_empty() {
            return None;
        }

        Some(Self {
            ids,
            bodies: copies,
            id_map,
            contacts: std::mem::take(&mut island.contacts),
            params: island_params(island, params),
        })
    }

    fn run(&mut self, solver: &dyn Solver) {
        solver.solve_island(&mut self.bodies, &self.id_map, &mut self.contacts, &self.params);
    }
}
