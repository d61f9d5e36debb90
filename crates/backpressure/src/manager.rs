//! BackpressureManager - lifecycle, submission and introspection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    AlertPayload, BackpressureConfig, HealthReport, LaneDepths, LoadState, Operation,
    StatsSnapshot,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::admission::{AdmissionPolicy, Rejection};
use crate::dispatcher::{dispatch_loop, CycleReport};
use crate::error::BackpressureError;
use crate::lane::LaneSet;
use crate::observers::ObserverSet;
use crate::stats::Shared;

/// State shared between the manager handle and its dispatch worker
pub(crate) struct Core {
    pub(crate) config: BackpressureConfig,
    pub(crate) lanes: LaneSet,
    pub(crate) policy: AdmissionPolicy,
    pub(crate) observers: ObserverSet,
    shared: Mutex<Shared>,
}

impl Core {
    fn new(config: BackpressureConfig) -> Self {
        let lanes = LaneSet::new(&config.lanes);
        let mut shared = Shared::new(config.latency_window);
        shared.stats.lane_depths = lanes.depths();

        Self {
            policy: AdmissionPolicy::new(config.shedding),
            lanes,
            observers: ObserverSet::new(),
            shared: Mutex::new(shared),
            config,
        }
    }

    /// Lock load state and stats, recovering from poisoning
    pub(crate) fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> StatsSnapshot {
        let shared = self.lock_shared();
        let stats = &shared.stats;

        StatsSnapshot {
            state: shared.state,
            utilization: stats.utilization,
            submitted_total: stats.submitted,
            processed_total: stats.processed,
            dropped_total: stats.dropped,
            dropped_by_priority: stats.dropped_by_priority(),
            shed_total: stats.shed,
            lane_full_total: stats.lane_full,
            retried_total: stats.retried,
            retries_exhausted_total: stats.retries_exhausted,
            cycles_total: stats.cycles,
            state_transitions: stats.transitions,
            backpressure_events: stats.backpressure_events,
            emergency_events: stats.emergency_events,
            lane_depths: stats.lane_depths.clone(),
            avg_cycle_ms: stats.cycle_ms.mean(),
            max_cycle_ms: stats.cycle_ms.max(),
            p50_cycle_ms: stats.recent_cycle_ms.percentile(0.50),
            p95_cycle_ms: stats.recent_cycle_ms.percentile(0.95),
            p99_cycle_ms: stats.recent_cycle_ms.percentile(0.99),
            thresholds: self.config.thresholds,
            shedding: self.config.shedding,
        }
    }

    fn health(&self) -> HealthReport {
        let shared = self.lock_shared();
        HealthReport {
            healthy: shared.state.is_healthy(),
            state: shared.state,
            utilization: shared.stats.utilization,
            lane_depths: shared.stats.lane_depths.clone(),
            processing_rate: shared.stats.processing_rate(),
            drop_rate: shared.stats.drop_rate(),
        }
    }
}

/// A spawned dispatch worker and its private run flag
struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Priority-lane admission control with a continuous dispatch loop
///
/// Every method takes `&self`; wrap the manager in an `Arc` to share it
/// between producers.
pub struct BackpressureManager {
    core: Arc<Core>,
    worker: Mutex<Option<Worker>>,
}

impl BackpressureManager {
    /// Validate `config` and build a stopped manager
    pub fn new(config: BackpressureConfig) -> Result<Self, BackpressureError> {
        config_loader::ConfigLoader::validate(&config)?;

        info!(
            max_ops_per_cycle = config.max_ops_per_cycle,
            warning = config.thresholds.warning,
            critical = config.thresholds.critical,
            emergency = config.thresholds.emergency,
            total_capacity = config.lanes.total(),
            "Backpressure manager created"
        );

        Ok(Self {
            core: Arc::new(Core::new(config)),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.core.config
    }

    /// Offer an operation; `false` means it was rejected and counted as dropped
    pub fn submit(&self, operation: Operation) -> bool {
        self.core.submit(operation)
    }

    /// Offer an operation and learn why it was rejected
    pub fn try_submit(&self, operation: Operation) -> Result<(), Rejection> {
        self.core.try_submit(operation)
    }

    /// Spawn the dispatch worker on the current tokio runtime.
    ///
    /// A no-op when already running.
    #[instrument(name = "backpressure_start", skip(self))]
    pub fn start(&self) -> Result<(), BackpressureError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            info!("Dispatch worker already running");
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| BackpressureError::NoRuntime)?;
        let running = Arc::new(AtomicBool::new(true));
        let handle = runtime.spawn(dispatch_loop(Arc::clone(&self.core), Arc::clone(&running)));
        *worker = Some(Worker { running, handle });

        info!("Backpressure manager started");
        Ok(())
    }

    /// Stop the dispatch worker, waiting at most `stop_timeout_ms`.
    ///
    /// Idempotent. Operations still queued stay in their lanes.
    #[instrument(name = "backpressure_stop", skip(self))]
    pub async fn stop(&self) {
        let worker = {
            let mut guard = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        let Some(worker) = worker else {
            debug!("Dispatch worker not running");
            return;
        };

        worker.running.store(false, Ordering::Release);

        let stop_timeout = self.core.config.timing.stop_timeout();
        match tokio::time::timeout(stop_timeout, worker.handle).await {
            Ok(Ok(())) => info!("Backpressure manager stopped"),
            Ok(Err(e)) => error!(error = %e, "Dispatch worker terminated abnormally"),
            Err(_) => warn!(
                timeout_ms = stop_timeout.as_millis() as u64,
                "Dispatch worker did not stop in time, detaching"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire) && !w.handle.is_finished())
    }

    /// Register an observer invoked with the new state on every transition
    pub fn add_state_callback<F>(&self, callback: F)
    where
        F: Fn(LoadState) + Send + Sync + 'static,
    {
        self.core.observers.add_state(Arc::new(callback));
    }

    /// Register an observer invoked on entry into CRITICAL or EMERGENCY
    pub fn add_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &AlertPayload) + Send + Sync + 'static,
    {
        self.core.observers.add_alert(Arc::new(callback));
    }

    /// Cumulative statistics and the last occupancy snapshot
    pub fn get_stats(&self) -> StatsSnapshot {
        self.core.snapshot()
    }

    pub fn get_health(&self) -> HealthReport {
        self.core.health()
    }

    /// Enter EMERGENCY now, notifying observers as a natural transition would
    pub fn force_emergency(&self) {
        self.core.force_emergency();
    }

    /// Zero counters and latency history; lanes and load state are kept
    pub fn reset_stats(&self) {
        self.core.lock_shared().stats.reset();
        info!("Backpressure statistics reset");
    }

    /// State as of the last recomputation
    pub fn load_state(&self) -> LoadState {
        self.core.lock_shared().state
    }

    /// Live aggregate occupancy ratio
    pub fn utilization(&self) -> f64 {
        self.core.lanes.utilization()
    }

    /// Live per-lane occupancy
    pub fn lane_depths(&self) -> LaneDepths {
        self.core.lanes.depths()
    }

    /// Run one dispatch cycle on the calling thread
    pub fn run_cycle(&self) -> CycleReport {
        self.core.run_cycle()
    }

    /// Recompute the load state without draining any lane
    pub fn refresh_load_state(&self) -> LoadState {
        self.core.refresh_load_state().0
    }
}

impl Drop for BackpressureManager {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = worker.as_ref() {
            worker.running.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LaneCapacities, Priority, SheddingPolicy};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Five lanes of 20: one operation is exactly 1% utilization
    fn config() -> BackpressureConfig {
        BackpressureConfig {
            max_ops_per_cycle: 100,
            cycle_timeout_ms: 1_000,
            lanes: LaneCapacities::uniform(20),
            ..BackpressureConfig::default()
        }
    }

    fn op(id: impl Into<String>, priority: Priority) -> Operation {
        Operation::new(id, priority, "test", "")
    }

    /// Fill lanes in priority order until `count` operations are queued
    fn fill(manager: &BackpressureManager, count: usize) {
        let mut queued = manager.lane_depths().values().sum::<usize>();
        for priority in Priority::ALL {
            while queued < count && manager.lane_depths()[&priority] < 20 {
                assert!(manager.submit(op(format!("fill-{queued}"), priority)));
                queued += 1;
            }
        }
        assert_eq!(queued, count);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = config();
        config.thresholds.critical = 0.6;
        assert!(matches!(
            BackpressureManager::new(config),
            Err(BackpressureError::Config(_))
        ));
    }

    #[test]
    fn test_new_rejects_oversized_lane() {
        let config = BackpressureConfig {
            lanes: LaneCapacities {
                critical: 1 << 62,
                ..LaneCapacities::default()
            },
            ..BackpressureConfig::default()
        };
        assert!(matches!(
            BackpressureManager::new(config),
            Err(BackpressureError::Config(_))
        ));
    }

    #[test]
    fn test_start_requires_runtime() {
        let manager = BackpressureManager::new(config()).unwrap();
        assert!(matches!(manager.start(), Err(BackpressureError::NoRuntime)));
        assert!(!manager.is_running());
    }

    #[test]
    fn test_critical_admitted_in_any_state() {
        let manager = BackpressureManager::new(config()).unwrap();
        manager.force_emergency();
        assert_eq!(manager.load_state(), LoadState::Emergency);

        assert!(manager.submit(op("c1", Priority::Critical)));
        assert_eq!(manager.get_stats().dropped_total, 0);
    }

    #[test]
    fn test_full_critical_lane_rejects() {
        let config = BackpressureConfig {
            lanes: LaneCapacities {
                critical: 1,
                ..LaneCapacities::default()
            },
            ..BackpressureConfig::default()
        };
        let manager = BackpressureManager::new(config).unwrap();

        assert!(manager.submit(op("c1", Priority::Critical)));
        assert!(!manager.submit(op("c2", Priority::Critical)));
        assert_eq!(
            manager.try_submit(op("c3", Priority::Critical)),
            Err(Rejection::LaneFull {
                priority: Priority::Critical,
                capacity: 1
            })
        );

        let stats = manager.get_stats();
        assert_eq!(stats.submitted_total, 1);
        assert_eq!(stats.dropped_total, 2);
        assert_eq!(stats.lane_full_total, 2);
        assert_eq!(stats.dropped_by_priority[&Priority::Critical], 2);
    }

    #[test]
    fn test_low_shed_above_warning_threshold() {
        let manager = BackpressureManager::new(config()).unwrap();
        fill(&manager, 71);
        assert_eq!(manager.refresh_load_state(), LoadState::Warning);

        assert_eq!(
            manager.try_submit(op("low", Priority::Low)),
            Err(Rejection::Shed {
                priority: Priority::Low,
                state: LoadState::Warning
            })
        );
        assert!(!manager.submit(op("low-2", Priority::Low)));
        assert!(manager.submit(op("bg", Priority::Background)));

        let stats = manager.get_stats();
        assert_eq!(stats.shed_total, 2);
        assert_eq!(stats.dropped_by_priority[&Priority::Low], 2);
    }

    #[test]
    fn test_low_admitted_below_warning_threshold() {
        let manager = BackpressureManager::new(config()).unwrap();
        fill(&manager, 69);
        assert_eq!(manager.refresh_load_state(), LoadState::Normal);
        assert!(manager.submit(op("low", Priority::Low)));
    }

    #[test]
    fn test_shedding_toggle_disabled() {
        let config = BackpressureConfig {
            shedding: SheddingPolicy {
                drop_low_on_warning: false,
                ..SheddingPolicy::default()
            },
            ..config()
        };
        let manager = BackpressureManager::new(config).unwrap();
        fill(&manager, 75);
        assert_eq!(manager.refresh_load_state(), LoadState::Warning);
        assert!(manager.submit(op("low", Priority::Low)));
    }

    #[test]
    fn test_cycle_drains_in_priority_order_within_budget() {
        let config = BackpressureConfig {
            max_ops_per_cycle: 3,
            ..config()
        };
        let manager = BackpressureManager::new(config).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let submissions = [
            ("bg", Priority::Background),
            ("low", Priority::Low),
            ("high-1", Priority::High),
            ("crit", Priority::Critical),
            ("high-2", Priority::High),
        ];
        for (id, priority) in submissions {
            let order = Arc::clone(&order);
            let operation = op(id, priority).with_work(move |_| {
                order.lock().unwrap().push(id);
                Ok(())
            });
            assert!(manager.submit(operation));
        }

        let report = manager.run_cycle();
        assert_eq!(report.processed, 3);
        assert_eq!(*order.lock().unwrap(), vec!["crit", "high-1", "high-2"]);

        manager.run_cycle();
        assert_eq!(
            *order.lock().unwrap(),
            vec!["crit", "high-1", "high-2", "low", "bg"]
        );
        assert_eq!(manager.get_stats().processed_total, 5);
    }

    #[test]
    fn test_retry_exhaustion_dispatches_max_plus_one() {
        let manager = BackpressureManager::new(config()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&attempts);
        let operation = op("flaky", Priority::High)
            .with_max_retries(3)
            .with_work(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("always fails")
            });
        assert!(manager.submit(operation));

        for _ in 0..5 {
            manager.run_cycle();
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let stats = manager.get_stats();
        assert_eq!(stats.retried_total, 3);
        assert_eq!(stats.retries_exhausted_total, 1);
        assert_eq!(stats.dropped_total, 1);
        assert_eq!(stats.submitted_total, 4);
        assert_eq!(stats.processed_total, 0);
        assert_eq!(manager.lane_depths()[&Priority::High], 0);
    }

    #[test]
    fn test_panicking_work_unit_is_retried() {
        let manager = BackpressureManager::new(config()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&attempts);
        let operation = op("panics-once", Priority::Medium).with_work(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first attempt explodes");
            }
            Ok(())
        });
        assert!(manager.submit(operation));

        let report = manager.run_cycle();
        assert_eq!(report.failed, 1);
        assert_eq!(report.retried, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_notification_per_transition() {
        let config = BackpressureConfig {
            max_ops_per_cycle: 1,
            ..config()
        };
        let manager = BackpressureManager::new(config).unwrap();
        let emergencies = Arc::new(AtomicUsize::new(0));
        let alerts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&emergencies);
        manager.add_state_callback(move |state| {
            if state == LoadState::Emergency {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counter = Arc::clone(&alerts);
        manager.add_alert_callback(move |_, payload| {
            assert_eq!(payload.state, LoadState::Emergency);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        fill(&manager, 41);
        assert_eq!(manager.run_cycle().state, LoadState::Normal);

        fill(&manager, 98);
        assert_eq!(manager.run_cycle().state, LoadState::Emergency);
        assert_eq!(manager.run_cycle().state, LoadState::Emergency);

        assert_eq!(emergencies.load(Ordering::SeqCst), 1);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        let stats = manager.get_stats();
        assert_eq!(stats.emergency_events, 1);
        assert_eq!(stats.state_transitions, 1);
    }

    #[test]
    fn test_force_emergency_notifies_once() {
        let manager = BackpressureManager::new(config()).unwrap();
        let states = Arc::new(Mutex::new(Vec::new()));
        let alerts = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&states);
        manager.add_state_callback(move |state| seen.lock().unwrap().push(state));
        let counter = Arc::clone(&alerts);
        manager.add_alert_callback(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.force_emergency();
        manager.force_emergency();

        assert_eq!(*states.lock().unwrap(), vec![LoadState::Emergency]);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert!(!manager.get_health().healthy);

        // Utilization is recomputed on the next cycle
        manager.run_cycle();
        assert_eq!(manager.load_state(), LoadState::Normal);
        assert_eq!(
            *states.lock().unwrap(),
            vec![LoadState::Emergency, LoadState::Normal]
        );
    }

    #[test]
    fn test_health_degrades_and_recovers() {
        let manager = BackpressureManager::new(config()).unwrap();
        fill(&manager, 86);
        manager.refresh_load_state();

        let health = manager.get_health();
        assert!(!health.healthy);
        assert_eq!(health.state, LoadState::Critical);
        assert!((health.utilization - 0.86).abs() < 1e-9);

        manager.run_cycle();
        let health = manager.get_health();
        assert!(health.healthy);
        assert_eq!(health.state, LoadState::Normal);
        assert_eq!(health.drop_rate, 0.0);
    }

    #[test]
    fn test_reset_stats_keeps_lanes_and_state() {
        let manager = BackpressureManager::new(config()).unwrap();
        fill(&manager, 72);
        manager.refresh_load_state();
        assert!(!manager.submit(op("shed", Priority::Low)));

        manager.reset_stats();

        let stats = manager.get_stats();
        assert_eq!(stats.submitted_total, 0);
        assert_eq!(stats.dropped_total, 0);
        assert_eq!(stats.state, LoadState::Warning);
        assert_eq!(manager.lane_depths().values().sum::<usize>(), 72);
    }

    #[tokio::test]
    async fn test_worker_drains_and_stop_is_idempotent() {
        let manager = BackpressureManager::new(config()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());

        for i in 0..10 {
            let done = Arc::clone(&done);
            let operation = op(format!("op-{i}"), Priority::Medium).with_work(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            assert!(manager.submit(operation));
        }

        wait_for(|| done.load(Ordering::SeqCst) == 10).await;

        manager.stop().await;
        manager.stop().await;
        assert!(!manager.is_running());

        // Queued while stopped, dispatched after restart
        let counter = Arc::clone(&done);
        assert!(manager.submit(op("late", Priority::Low).with_work(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(done.load(Ordering::SeqCst), 10);

        manager.start().unwrap();
        wait_for(|| done.load(Ordering::SeqCst) == 11).await;
        manager.stop().await;

        assert_eq!(manager.get_stats().processed_total, 11);
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}
