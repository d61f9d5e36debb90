//! Synthetic load against a live manager.

mod generator;
mod report;

pub use generator::LoadGenerator;
pub use report::{AdmissionTally, SimulationReport};

use std::time::{Duration, Instant};

use backpressure::BackpressureManager;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Submission tick; the rate is spread evenly across ticks
const TICK: Duration = Duration::from_millis(10);

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// How long to generate load
    pub duration: Duration,
    /// Offered operations per second
    pub rate: u64,
    /// Every n-th operation always fails (0 = never)
    pub fail_every: u64,
    /// Simulated per-operation cost
    pub work_cost: Duration,
    /// Upper bound on waiting for lanes to drain after load stops
    pub drain_timeout: Duration,
}

/// Feeds a manager at a fixed rate and tallies admission outcomes
pub struct Simulation {
    config: SimulationConfig,
    generator: LoadGenerator,
    tally: AdmissionTally,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let generator = LoadGenerator::new(config.fail_every, config.work_cost);
        Self {
            config,
            generator,
            tally: AdmissionTally::default(),
        }
    }

    /// Outcomes so far; still valid if `run` was cancelled
    pub fn tally(&self) -> &AdmissionTally {
        &self.tally
    }

    /// Generate load for the configured duration, then wait for the lanes to drain
    pub async fn run(&mut self, manager: &BackpressureManager) {
        let started = Instant::now();
        let per_tick = self.config.rate as f64 * TICK.as_secs_f64();
        let mut credit = 0.0;

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            rate = self.config.rate,
            duration_secs = self.config.duration.as_secs_f64(),
            "Generating load"
        );

        while started.elapsed() < self.config.duration {
            ticker.tick().await;
            credit += per_tick;
            while credit >= 1.0 {
                credit -= 1.0;
                let outcome = manager.try_submit(self.generator.next_operation());
                self.tally.record(outcome);
            }

            if self.generator.generated() % 1000 == 0 {
                debug!(
                    offered = self.tally.offered,
                    state = %manager.load_state(),
                    "Simulation progress"
                );
            }
        }

        info!(
            offered = self.tally.offered,
            accepted = self.tally.accepted,
            "Load generation finished, draining lanes"
        );
        self.drain(manager).await;
    }

    async fn drain(&self, manager: &BackpressureManager) {
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let queued: usize = manager.lane_depths().values().sum();
            if queued == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!(queued, "Lanes not drained before timeout");
                return;
            }
            tokio::time::sleep(TICK).await;
        }
    }
}
