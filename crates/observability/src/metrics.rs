//! Backpressure metrics
//!
//! Thin helpers over the `metrics` facade plus the in-memory statistics used
//! for the manager's own snapshots. Without an installed recorder the facade
//! calls are no-ops.

use std::collections::VecDeque;

use contracts::{LoadState, Priority};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// Register help text and units for every `backpressure_*` series
///
/// Called once the exporter is installed; a no-op without a recorder.
pub fn describe_metrics() {
    describe_counter!(
        "backpressure_submissions_total",
        Unit::Count,
        "Operations offered, by priority and admission outcome"
    );
    describe_counter!(
        "backpressure_dropped_total",
        Unit::Count,
        "Operations dropped, by priority and reason (shed, lane_full, internal, retries_exhausted)"
    );
    describe_counter!(
        "backpressure_dispatched_total",
        Unit::Count,
        "Work units invoked by the dispatch loop, by priority and status"
    );
    describe_counter!(
        "backpressure_retries_total",
        Unit::Count,
        "Failed work units re-submitted for another attempt"
    );
    describe_counter!(
        "backpressure_cycles_total",
        Unit::Count,
        "Dispatch cycles completed"
    );
    describe_counter!(
        "backpressure_state_transitions_total",
        Unit::Count,
        "Load state changes, by source and target state"
    );
    describe_histogram!(
        "backpressure_queue_wait_ms",
        Unit::Milliseconds,
        "Time from operation creation to dispatch"
    );
    describe_histogram!(
        "backpressure_cycle_duration_ms",
        Unit::Milliseconds,
        "Wall time of one dispatch cycle"
    );
    describe_histogram!(
        "backpressure_cycle_processed",
        Unit::Count,
        "Successful work units per cycle"
    );
    describe_gauge!(
        "backpressure_lane_depth",
        Unit::Count,
        "Operations queued in each priority lane"
    );
    describe_gauge!(
        "backpressure_utilization",
        "Aggregate lane occupancy ratio in [0, 1]"
    );
    describe_gauge!(
        "backpressure_load_state",
        "Current load state (0 normal, 1 warning, 2 critical, 3 emergency)"
    );
}

/// Record an admission decision
pub fn record_submission(priority: Priority, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(
        "backpressure_submissions_total",
        "priority" => priority.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a rejection with its reason (`shed` / `lane_full` / `internal`)
pub fn record_drop(priority: Priority, reason: &'static str) {
    counter!(
        "backpressure_dropped_total",
        "priority" => priority.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a dispatched operation
///
/// `queue_wait_ms` is the time between creation and dispatch.
pub fn record_dispatch(priority: Priority, success: bool, queue_wait_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "backpressure_dispatched_total",
        "priority" => priority.as_str(),
        "status" => status
    )
    .increment(1);
    histogram!("backpressure_queue_wait_ms", "priority" => priority.as_str()).record(queue_wait_ms);
}

/// Record a retry re-submission
pub fn record_retry(priority: Priority) {
    counter!("backpressure_retries_total", "priority" => priority.as_str()).increment(1);
}

/// Record one completed dispatch cycle
pub fn record_cycle(duration_ms: f64, processed: usize) {
    counter!("backpressure_cycles_total").increment(1);
    histogram!("backpressure_cycle_duration_ms").record(duration_ms);
    histogram!("backpressure_cycle_processed").record(processed as f64);
}

/// Record lane occupancy
pub fn record_lane_depth(priority: Priority, depth: usize) {
    gauge!("backpressure_lane_depth", "priority" => priority.as_str()).set(depth as f64);
}

/// Record aggregate utilization and current state
pub fn record_load(state: LoadState, utilization: f64) {
    gauge!("backpressure_utilization").set(utilization);
    gauge!("backpressure_load_state").set(state as u8 as f64);
}

/// Record a load-state transition
pub fn record_transition(from: LoadState, to: LoadState) {
    counter!(
        "backpressure_state_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Online statistics calculator (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Minimum
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum
    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Bounded history of recent samples for percentile queries
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    /// Window keeping at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest when full
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Maximum number of samples kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Nearest-rank percentile, `q` in [0, 1]. Returns 0 when empty.
    pub fn percentile(&self, q: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let rank = (q.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }
}
