//! Simulation dynamics: integration, the contact solver, and islands.

pub mod integrator;
pub mod island;
pub mod solver;

pub use integrator::Integrator;
pub use island::{Island, IslandManager, SleepParams};
pub use solver::{SequentialImpulseSolver, Solver, SolverParams, SolverStepMetrics};
