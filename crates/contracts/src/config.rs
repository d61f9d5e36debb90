//! Backpressure manager configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::Priority;

/// Top-level manager configuration
///
/// Immutable once the manager is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackpressureConfig {
    /// Maximum operations dispatched per cycle
    #[serde(default = "default_max_ops_per_cycle")]
    #[validate(range(min = 1))]
    pub max_ops_per_cycle: usize,

    /// Per-cycle timeout hint in milliseconds
    #[serde(default = "default_cycle_timeout_ms")]
    #[validate(range(min = 1))]
    pub cycle_timeout_ms: u64,

    /// Number of recent cycle latencies kept for percentiles
    #[serde(default = "default_latency_window")]
    #[validate(range(min = 1))]
    pub latency_window: usize,

    /// Utilization thresholds
    #[serde(default)]
    #[validate(nested)]
    pub thresholds: ThresholdConfig,

    /// Shedding toggles
    #[serde(default)]
    pub shedding: SheddingPolicy,

    /// Per-lane capacities
    #[serde(default)]
    #[validate(nested)]
    pub lanes: LaneCapacities,

    /// Dispatch loop timing
    #[serde(default)]
    #[validate(nested)]
    pub timing: LoopTiming,
}

fn default_max_ops_per_cycle() -> usize {
    100
}

fn default_cycle_timeout_ms() -> u64 {
    10
}

fn default_latency_window() -> usize {
    1000
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_ops_per_cycle: default_max_ops_per_cycle(),
            cycle_timeout_ms: default_cycle_timeout_ms(),
            latency_window: default_latency_window(),
            thresholds: ThresholdConfig::default(),
            shedding: SheddingPolicy::default(),
            lanes: LaneCapacities::default(),
            timing: LoopTiming::default(),
        }
    }
}

impl BackpressureConfig {
    /// Per-cycle timeout hint as a `Duration`
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

/// Occupancy-ratio thresholds, strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Informational only, never gates a transition
    #[validate(range(min = 0.0, max = 1.0))]
    pub normal: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub warning: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub critical: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub emergency: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            normal: 0.50,
            warning: 0.70,
            critical: 0.85,
            emergency: 0.95,
        }
    }
}

/// Which priorities are shed at which load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheddingPolicy {
    /// Drop LOW while in WARNING
    #[serde(default = "default_true")]
    pub drop_low_on_warning: bool,
    /// Drop MEDIUM while in CRITICAL
    #[serde(default = "default_true")]
    pub drop_medium_on_critical: bool,
    /// Drop HIGH while in EMERGENCY (opt-in)
    #[serde(default)]
    pub drop_high_on_emergency: bool,
    /// Apply each toggle at its state and every more severe state
    /// instead of only at exactly that state
    #[serde(default)]
    pub cumulative: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SheddingPolicy {
    fn default() -> Self {
        Self {
            drop_low_on_warning: true,
            drop_medium_on_critical: true,
            drop_high_on_emergency: false,
            cumulative: false,
        }
    }
}

/// Upper bound for a single lane's capacity
pub const MAX_LANE_CAPACITY: usize = 1 << 24;

/// Maximum capacity of each priority lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LaneCapacities {
    #[validate(range(min = 1, max = 16777216))]
    pub critical: usize,
    #[validate(range(min = 1, max = 16777216))]
    pub high: usize,
    #[validate(range(min = 1, max = 16777216))]
    pub medium: usize,
    #[validate(range(min = 1, max = 16777216))]
    pub low: usize,
    #[validate(range(min = 1, max = 16777216))]
    pub background: usize,
}

impl Default for LaneCapacities {
    fn default() -> Self {
        Self {
            critical: 1000,
            high: 2000,
            medium: 5000,
            low: 10000,
            background: 5000,
        }
    }
}

impl LaneCapacities {
    /// Same capacity for every lane
    pub fn uniform(capacity: usize) -> Self {
        Self {
            critical: capacity,
            high: capacity,
            medium: capacity,
            low: capacity,
            background: capacity,
        }
    }

    /// Capacity of the lane serving `priority`
    pub fn capacity(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
            Priority::Background => self.background,
        }
    }

    /// Sum of all lane capacities, `None` on overflow
    pub fn checked_total(&self) -> Option<usize> {
        Priority::ALL
            .iter()
            .try_fold(0usize, |acc, p| acc.checked_add(self.capacity(*p)))
    }

    /// Sum of all lane capacities, saturating at `usize::MAX`
    pub fn total(&self) -> usize {
        self.checked_total().unwrap_or(usize::MAX)
    }
}

/// Dispatch loop timing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LoopTiming {
    /// Sleep between cycles
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    /// Back-off after an internal cycle failure
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Bounded wait for the worker on stop
    #[serde(default = "default_stop_timeout_ms")]
    #[validate(range(min = 1))]
    pub stop_timeout_ms: u64,
}

fn default_idle_sleep_ms() -> u64 {
    1
}

fn default_error_backoff_ms() -> u64 {
    10
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            idle_sleep_ms: default_idle_sleep_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl LoopTiming {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
