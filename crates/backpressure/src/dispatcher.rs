//! Dispatch loop - drains lanes in strict priority order

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use contracts::{LoadState, Operation};
use observability::metrics;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::panic_message;
use crate::manager::Core;

/// Outcome of one dispatch cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Work units that completed successfully
    pub processed: usize,
    /// Work units that failed (returned an error or panicked)
    pub failed: usize,
    /// Failures re-submitted for another attempt
    pub retried: usize,
    /// Failures dropped with their retry budget spent
    pub exhausted: usize,
    pub duration: Duration,
    /// Load state after the end-of-cycle recomputation
    pub state: LoadState,
    pub utilization: f64,
    /// The cycle stopped early on its time budget
    pub timed_out: bool,
}

impl CycleReport {
    /// Operations taken off a lane this cycle
    pub fn dispatched(&self) -> usize {
        self.processed + self.failed
    }

    fn empty() -> Self {
        Self {
            processed: 0,
            failed: 0,
            retried: 0,
            exhausted: 0,
            duration: Duration::ZERO,
            state: LoadState::Normal,
            utilization: 0.0,
            timed_out: false,
        }
    }
}

impl Core {
    /// Run one cycle: drain, record timing, recompute load state
    pub(crate) fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let budget = self.config.max_ops_per_cycle;
        let time_budget = self.config.cycle_timeout();
        let mut report = CycleReport::empty();

        'lanes: for lane in self.lanes.iter() {
            while report.dispatched() < budget {
                if started.elapsed() >= time_budget {
                    report.timed_out = true;
                    break 'lanes;
                }
                let Some(operation) = lane.pop() else {
                    break;
                };
                self.dispatch(operation, &mut report);
            }

            if report.dispatched() >= budget {
                break;
            }
        }

        report.duration = started.elapsed();
        {
            let mut shared = self.lock_shared();
            shared.stats.processed += report.processed as u64;
            shared.stats.record_cycle(report.duration);
        }
        metrics::record_cycle(report.duration.as_secs_f64() * 1000.0, report.processed);

        let (state, utilization) = self.refresh_load_state();
        report.state = state;
        report.utilization = utilization;

        if report.timed_out {
            debug!(
                dispatched = report.dispatched(),
                elapsed_ms = report.duration.as_millis() as u64,
                "Cycle hit its time budget"
            );
        }

        report
    }

    /// Invoke one work unit; failures are retried through admission
    fn dispatch(&self, mut operation: Operation, report: &mut CycleReport) {
        let priority = operation.priority();
        let queue_wait_ms = operation.age().as_secs_f64() * 1000.0;

        let result = match panic::catch_unwind(AssertUnwindSafe(|| operation.invoke())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow!(
                "work unit panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        metrics::record_dispatch(priority, result.is_ok(), queue_wait_ms);

        let Err(err) = result else {
            report.processed += 1;
            return;
        };
        report.failed += 1;

        let operation_id = operation.id().to_string();
        if operation.record_retry() {
            report.retried += 1;
            self.lock_shared().stats.retried += 1;
            metrics::record_retry(priority);
            debug!(
                operation_id = %operation_id,
                priority = %priority,
                attempt = operation.retry_count(),
                max_retries = operation.max_retries(),
                error = %err,
                "Work unit failed, re-submitting"
            );

            if let Err(rejection) = self.try_submit(operation) {
                debug!(
                    operation_id = %operation_id,
                    reason = rejection.reason(),
                    "Retry not admitted"
                );
            }
        } else {
            report.exhausted += 1;
            {
                let mut shared = self.lock_shared();
                shared.stats.retries_exhausted += 1;
                shared.stats.record_drop(priority);
            }
            metrics::record_drop(priority, "retries_exhausted");
            warn!(
                operation_id = %operation_id,
                op_type = %operation.op_type(),
                priority = %priority,
                retries = operation.retry_count(),
                error = %err,
                "Retries exhausted, operation dropped"
            );
        }
    }
}

/// Worker body: cycle until `running` is cleared
#[instrument(name = "backpressure_dispatch_loop", skip_all)]
pub(crate) async fn dispatch_loop(core: Arc<Core>, running: Arc<AtomicBool>) {
    let idle_sleep = core.config.timing.idle_sleep();
    let error_backoff = core.config.timing.error_backoff();

    info!(
        max_ops_per_cycle = core.config.max_ops_per_cycle,
        cycle_timeout_ms = core.config.cycle_timeout_ms,
        "Dispatch loop started"
    );

    let mut cycles: u64 = 0;
    while running.load(Ordering::Acquire) {
        let pause = match panic::catch_unwind(AssertUnwindSafe(|| core.run_cycle())) {
            Ok(report) => {
                cycles += 1;
                if report.dispatched() > 0 {
                    trace!(
                        processed = report.processed,
                        failed = report.failed,
                        state = %report.state,
                        "Cycle complete"
                    );
                }
                idle_sleep
            }
            Err(payload) => {
                error!(
                    error = %panic_message(payload.as_ref()),
                    backoff_ms = error_backoff.as_millis() as u64,
                    "Dispatch cycle failed"
                );
                error_backoff
            }
        };

        if pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(pause).await;
        }
    }

    info!(cycles, "Dispatch loop stopped");
}
