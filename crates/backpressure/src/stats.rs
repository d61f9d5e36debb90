//! Shared mutable state: load state plus cumulative statistics
//!
//! Everything here lives behind the manager's single coarse lock.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use contracts::{LaneDepths, LoadState, Priority};
use observability::{LatencyWindow, RunningStats};

use crate::admission::Rejection;

/// State guarded by the manager lock
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: LoadState,
    pub stats: Stats,
}

impl Shared {
    pub fn new(latency_window: usize) -> Self {
        Self {
            state: LoadState::Normal,
            stats: Stats::new(latency_window),
        }
    }
}

/// Cumulative counters and rolling latency history
#[derive(Debug)]
pub(crate) struct Stats {
    pub submitted: u64,
    pub processed: u64,
    pub dropped: u64,
    pub dropped_by_priority: [u64; Priority::COUNT],
    pub shed: u64,
    pub lane_full: u64,
    pub retried: u64,
    pub retries_exhausted: u64,
    pub cycles: u64,
    pub transitions: u64,
    pub backpressure_events: u64,
    pub emergency_events: u64,
    pub cycle_ms: RunningStats,
    pub recent_cycle_ms: LatencyWindow,
    /// Occupancy and utilization as of the last recomputation
    pub lane_depths: LaneDepths,
    pub utilization: f64,
    /// Start of the rate window (construction or last reset)
    pub since: Instant,
}

impl Stats {
    pub fn new(latency_window: usize) -> Self {
        Self {
            submitted: 0,
            processed: 0,
            dropped: 0,
            dropped_by_priority: [0; Priority::COUNT],
            shed: 0,
            lane_full: 0,
            retried: 0,
            retries_exhausted: 0,
            cycles: 0,
            transitions: 0,
            backpressure_events: 0,
            emergency_events: 0,
            cycle_ms: RunningStats::default(),
            recent_cycle_ms: LatencyWindow::new(latency_window),
            lane_depths: LaneDepths::new(),
            utilization: 0.0,
            since: Instant::now(),
        }
    }

    /// Zero counters and history; the occupancy snapshot is kept
    pub fn reset(&mut self) {
        let lane_depths = std::mem::take(&mut self.lane_depths);
        let utilization = self.utilization;
        let window = self.recent_cycle_ms.capacity();

        *self = Self {
            lane_depths,
            utilization,
            ..Self::new(window)
        };
    }

    pub fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::Shed { .. } => self.shed += 1,
            Rejection::LaneFull { .. } => self.lane_full += 1,
            Rejection::Internal { .. } => {}
        }
        self.record_drop(rejection.priority());
    }

    pub fn record_drop(&mut self, priority: Priority) {
        self.dropped += 1;
        self.dropped_by_priority[priority.index()] += 1;
    }

    pub fn record_cycle(&mut self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        self.cycles += 1;
        self.cycle_ms.push(ms);
        self.recent_cycle_ms.push(ms);
    }

    pub fn dropped_by_priority(&self) -> BTreeMap<Priority, u64> {
        Priority::ALL
            .iter()
            .map(|p| (*p, self.dropped_by_priority[p.index()]))
            .collect()
    }

    /// Processed operations per second over the rate window
    pub fn processing_rate(&self) -> f64 {
        let elapsed = self.since.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Dropped ÷ submitted, 0 when nothing was submitted
    pub fn drop_rate(&self) -> f64 {
        if self.submitted == 0 {
            0.0
        } else {
            self.dropped as f64 / self.submitted as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rejection_by_reason() {
        let mut stats = Stats::new(10);
        stats.record_rejection(&Rejection::Shed {
            priority: Priority::Low,
            state: LoadState::Warning,
        });
        stats.record_rejection(&Rejection::LaneFull {
            priority: Priority::Critical,
            capacity: 1,
        });

        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.shed, 1);
        assert_eq!(stats.lane_full, 1);
        let by_priority = stats.dropped_by_priority();
        assert_eq!(by_priority[&Priority::Low], 1);
        assert_eq!(by_priority[&Priority::Critical], 1);
        assert_eq!(by_priority[&Priority::High], 0);
    }

    #[test]
    fn test_drop_rate_guards_zero() {
        let mut stats = Stats::new(10);
        assert_eq!(stats.drop_rate(), 0.0);
        stats.record_drop(Priority::Low);
        assert_eq!(stats.drop_rate(), 0.0);

        stats.submitted = 4;
        assert!((stats.drop_rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reset_keeps_snapshot_and_window_size() {
        let mut stats = Stats::new(3);
        stats.submitted = 10;
        stats.processed = 7;
        stats.record_cycle(Duration::from_millis(2));
        stats.lane_depths.insert(Priority::High, 4);
        stats.utilization = 0.4;

        stats.reset();

        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.cycles, 0);
        assert_eq!(stats.cycle_ms.count(), 0);
        assert!(stats.recent_cycle_ms.is_empty());
        assert_eq!(stats.lane_depths[&Priority::High], 4);
        assert_eq!(stats.utilization, 0.4);

        for ms in [1, 2, 3, 4] {
            stats.record_cycle(Duration::from_millis(ms));
        }
        assert_eq!(stats.recent_cycle_ms.len(), 3);
    }
}
