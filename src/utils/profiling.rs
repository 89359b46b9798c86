use std::time::{Duration, Instant};

use log::{debug, log_enabled, Level};
use serde::Serialize;

/// Phase timings and counts of the most recent step, reported via `log`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StepProfile {
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub solver_time: Duration,
    pub integrator_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub pair_count: usize,
    pub contact_count: usize,
    pub dropped_contacts: usize,
    pub active_island_count: usize,
    pub sleeping_count: usize,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds a substep into the running totals; counts keep the latest value.
    pub fn accumulate(&mut self, other: &Self) {
        self.broad_phase_time += other.broad_phase_time;
        self.narrow_phase_time += other.narrow_phase_time;
        self.solver_time += other.solver_time;
        self.integrator_time += other.integrator_time;
        self.total_step_time += other.total_step_time;
        self.body_count = other.body_count;
        self.pair_count = other.pair_count;
        self.contact_count = other.contact_count;
        self.dropped_contacts += other.dropped_contacts;
        self.active_island_count = other.active_island_count;
        self.sleeping_count = other.sleeping_count;
    }

    pub fn report(&self) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }
        let share = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;

        debug!(
            "profile: bodies {}, pairs {}, contacts {} ({} dropped), islands {}, sleeping {}",
            self.body_count,
            self.pair_count,
            self.contact_count,
            self.dropped_contacts,
            self.active_island_count,
            self.sleeping_count
        );
        debug!(
            "profile: step {:.2} ms | broad {:.1}% | narrow {:.1}% | solver {:.1}% | \
             integrate {:.1}%",
            self.total_step_time.as_secs_f32() * 1000.0,
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.solver_time),
            share(self.integrator_time)
        );
    }
}

/// Adds the lifetime of the guard to a profile slot.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timer_adds_elapsed_time() {
        let mut slot = Duration::ZERO;
        {
            let _timer = PhaseTimer::new(&mut slot);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(slot >= Duration::from_millis(2));
    }

    #[test]
    fn accumulate_sums_times_and_keeps_latest_counts() {
        let mut total = StepProfile::default();
        let step = StepProfile {
            solver_time: Duration::from_micros(10),
            body_count: 3,
            dropped_contacts: 1,
            ..StepProfile::default()
        };
        total.accumulate(&step);
        total.accumulate(&step);
        assert_eq!(total.solver_time, Duration::from_micros(20));
        assert_eq!(total.body_count, 3);
        assert_eq!(total.dropped_contacts, 2);
    }
}
