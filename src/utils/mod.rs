//! Utility helpers: math extensions, scoped logging timers and step profiling.

pub mod logging;
pub mod math;
pub mod profiling;

pub use logging::ScopedTimer;
pub use math::*;
pub use profiling::{PhaseTimer, StepProfile};
