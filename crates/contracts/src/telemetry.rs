//! Telemetry snapshots returned by the manager's introspection API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{LoadState, Priority, SheddingPolicy, ThresholdConfig};

/// Occupancy of each lane, keyed by priority in dispatch order
pub type LaneDepths = BTreeMap<Priority, usize>;

/// Full statistics view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub state: LoadState,
    pub utilization: f64,

    pub submitted_total: u64,
    pub processed_total: u64,
    pub dropped_total: u64,
    pub dropped_by_priority: BTreeMap<Priority, u64>,
    /// Rejections by shedding policy
    pub shed_total: u64,
    /// Rejections because a lane was at capacity
    pub lane_full_total: u64,
    pub retried_total: u64,
    pub retries_exhausted_total: u64,

    pub cycles_total: u64,
    pub state_transitions: u64,
    pub backpressure_events: u64,
    pub emergency_events: u64,

    pub lane_depths: LaneDepths,

    /// Cycle processing time (milliseconds)
    pub avg_cycle_ms: f64,
    pub max_cycle_ms: f64,
    pub p50_cycle_ms: f64,
    pub p95_cycle_ms: f64,
    pub p99_cycle_ms: f64,

    pub thresholds: ThresholdConfig,
    pub shedding: SheddingPolicy,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backpressure Stats ===")?;
        writeln!(
            f,
            "State: {} (utilization {:.2}%)",
            self.state,
            self.utilization * 100.0
        )?;
        writeln!(f, "Submitted: {}", self.submitted_total)?;
        writeln!(f, "Processed: {}", self.processed_total)?;
        writeln!(
            f,
            "Dropped: {} (shed {}, lane full {}, retries exhausted {})",
            self.dropped_total, self.shed_total, self.lane_full_total, self.retries_exhausted_total
        )?;
        writeln!(f, "Retried: {}", self.retried_total)?;
        writeln!(
            f,
            "Events: {} backpressure, {} emergency ({} transitions)",
            self.backpressure_events, self.emergency_events, self.state_transitions
        )?;
        writeln!(
            f,
            "Cycle time (ms): mean={:.3}, max={:.3}, p50={:.3}, p95={:.3}, p99={:.3} (n={})",
            self.avg_cycle_ms,
            self.max_cycle_ms,
            self.p50_cycle_ms,
            self.p95_cycle_ms,
            self.p99_cycle_ms,
            self.cycles_total
        )?;

        writeln!(f, "Lanes:")?;
        for (priority, depth) in &self.lane_depths {
            let dropped = self.dropped_by_priority.get(priority).copied().unwrap_or(0);
            writeln!(f, "  {}: depth={}, dropped={}", priority, depth, dropped)?;
        }

        Ok(())
    }
}

/// Reduced health view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// True iff state is NORMAL or WARNING
    pub healthy: bool,
    pub state: LoadState,
    pub utilization: f64,
    pub lane_depths: LaneDepths,
    /// Processed operations per second since start or last reset
    pub processing_rate: f64,
    /// Dropped ÷ submitted, 0 when nothing was submitted
    pub drop_rate: f64,
}

/// Structured payload delivered to alert observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub state: LoadState,
    pub lane_depths: LaneDepths,
    pub utilization: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_payload_json() {
        let payload = AlertPayload {
            state: LoadState::Emergency,
            lane_depths: LaneDepths::from([(Priority::Critical, 3), (Priority::Low, 7)]),
            utilization: 0.97,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["state"], "emergency");
        assert_eq!(json["lane_depths"]["critical"], 3);
        assert_eq!(json["lane_depths"]["low"], 7);
    }
}
