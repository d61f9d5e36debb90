//! Simulation results

use std::time::Duration;

use backpressure::Rejection;
use contracts::{HealthReport, StatsSnapshot};
use serde::Serialize;

/// Admission outcomes seen by the load generator
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdmissionTally {
    pub offered: u64,
    pub accepted: u64,
    pub shed: u64,
    pub lane_full: u64,
    pub internal: u64,
}

impl AdmissionTally {
    pub fn record(&mut self, outcome: Result<(), Rejection>) {
        self.offered += 1;
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(Rejection::Shed { .. }) => self.shed += 1,
            Err(Rejection::LaneFull { .. }) => self.lane_full += 1,
            Err(Rejection::Internal { .. }) => self.internal += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.shed + self.lane_full + self.internal
    }
}

/// Everything printed at the end of `run`
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub duration_secs: f64,
    pub interrupted: bool,
    pub admission: AdmissionTally,
    pub stats: StatsSnapshot,
    pub health: HealthReport,
}

impl SimulationReport {
    pub fn new(
        duration: Duration,
        interrupted: bool,
        admission: AdmissionTally,
        stats: StatsSnapshot,
        health: HealthReport,
    ) -> Self {
        Self {
            duration_secs: duration.as_secs_f64(),
            interrupted,
            admission,
            stats,
            health,
        }
    }

    /// Offered operations per second
    pub fn offered_rate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.admission.offered as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Backpressure Simulation                    ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Load");
        println!("   ├─ Duration: {:.2}s", self.duration_secs);
        if self.interrupted {
            println!("   ├─ Interrupted by signal");
        }
        println!("   ├─ Offered: {} ({:.0} ops/s)", self.admission.offered, self.offered_rate());
        println!("   ├─ Accepted: {}", self.admission.accepted);
        println!(
            "   └─ Rejected: {} (shed {}, lane full {}, internal {})",
            self.admission.rejected(),
            self.admission.shed,
            self.admission.lane_full,
            self.admission.internal
        );

        println!("\nHealth");
        println!("   ├─ Healthy: {}", self.health.healthy);
        println!("   ├─ Processing rate: {:.1} ops/s", self.health.processing_rate);
        println!("   └─ Drop rate: {:.2}%", self.health.drop_rate * 100.0);

        println!("\n{}", self.stats);
    }
}
