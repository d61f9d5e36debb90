//! Admission control
//!
//! Decides at submission time whether an operation enters its lane. The
//! shedding decision itself is a pure function of priority, load state and the
//! configured toggles; lane capacity is checked afterwards.

use std::panic::{self, AssertUnwindSafe};

use contracts::{LoadState, Operation, Priority, SheddingPolicy};
use observability::metrics;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::error::panic_message;
use crate::lane::PushError;
use crate::manager::Core;

/// Why an operation was not admitted
///
/// Every variant counts as a drop; the boolean `submit` contract folds them
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Shed by policy at the current load state
    #[error("{priority} operation shed while load state is {state}")]
    Shed { priority: Priority, state: LoadState },

    /// Lane physically at capacity
    #[error("{priority} lane full (capacity {capacity})")]
    LaneFull { priority: Priority, capacity: usize },

    /// Unexpected internal failure, handled fail-closed
    #[error("{priority} operation rejected after an internal failure")]
    Internal { priority: Priority },
}

impl Rejection {
    pub fn priority(&self) -> Priority {
        match self {
            Rejection::Shed { priority, .. }
            | Rejection::LaneFull { priority, .. }
            | Rejection::Internal { priority } => *priority,
        }
    }

    /// Metric label for the rejection reason
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Shed { .. } => "shed",
            Rejection::LaneFull { .. } => "lane_full",
            Rejection::Internal { .. } => "internal",
        }
    }
}

/// Shedding policy evaluation
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    shedding: SheddingPolicy,
}

impl AdmissionPolicy {
    pub fn new(shedding: SheddingPolicy) -> Self {
        Self { shedding }
    }

    /// Whether `priority` is shed at `state`.
    ///
    /// CRITICAL and BACKGROUND are never shed by policy. LOW, MEDIUM and HIGH
    /// each have one trigger state and one toggle; with `cumulative` the
    /// toggle also applies to every more severe state.
    pub fn should_shed(&self, priority: Priority, state: LoadState) -> bool {
        let (trigger, enabled) = match priority {
            Priority::Low => (LoadState::Warning, self.shedding.drop_low_on_warning),
            Priority::Medium => (LoadState::Critical, self.shedding.drop_medium_on_critical),
            Priority::High => (LoadState::Emergency, self.shedding.drop_high_on_emergency),
            Priority::Critical | Priority::Background => return false,
        };

        enabled
            && if self.shedding.cumulative {
                state >= trigger
            } else {
                state == trigger
            }
    }
}

impl Core {
    /// Admit or reject one operation
    pub(crate) fn try_submit(&self, operation: Operation) -> Result<(), Rejection> {
        let priority = operation.priority();
        let state = self.lock_shared().state;

        if self.policy.should_shed(priority, state) {
            let rejection = Rejection::Shed { priority, state };
            debug!(
                operation_id = %operation.id(),
                op_type = %operation.op_type(),
                priority = %priority,
                state = %state,
                "Operation shed by policy"
            );
            self.record_rejection(&rejection);
            return Err(rejection);
        }

        let lane = self.lanes.lane(priority);
        match lane.try_push(operation) {
            Ok(()) => {
                self.lock_shared().stats.submitted += 1;
                metrics::record_submission(priority, true);
                trace!(priority = %priority, depth = lane.len(), "Operation admitted");
                Ok(())
            }
            Err(PushError::Full(op)) => {
                let rejection = Rejection::LaneFull {
                    priority,
                    capacity: lane.capacity(),
                };
                warn!(
                    operation_id = %op.id(),
                    priority = %priority,
                    capacity = lane.capacity(),
                    "Lane full, operation dropped"
                );
                self.record_rejection(&rejection);
                Err(rejection)
            }
            Err(PushError::Closed(op)) => {
                let rejection = Rejection::Internal { priority };
                error!(
                    operation_id = %op.id(),
                    priority = %priority,
                    "Lane closed unexpectedly, operation dropped"
                );
                self.record_rejection(&rejection);
                Err(rejection)
            }
        }
    }

    /// Boolean submission contract; nothing escapes
    pub(crate) fn submit(&self, operation: Operation) -> bool {
        let priority = operation.priority();
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_submit(operation))) {
            Ok(result) => result.is_ok(),
            Err(payload) => {
                error!(
                    priority = %priority,
                    error = %panic_message(payload.as_ref()),
                    "Admission failed internally, rejecting operation"
                );
                self.record_rejection(&Rejection::Internal { priority });
                false
            }
        }
    }

    pub(crate) fn record_rejection(&self, rejection: &Rejection) {
        self.lock_shared().stats.record_rejection(rejection);
        metrics::record_submission(rejection.priority(), false);
        metrics::record_drop(rejection.priority(), rejection.reason());
    }
}
