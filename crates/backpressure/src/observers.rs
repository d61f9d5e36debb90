//! Observer fan-out for load-state transitions and alerts
//!
//! Observers are invoked outside the manager lock. Each invocation is
//! isolated: a panicking observer is logged and skipped, the remaining
//! observers still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use contracts::{AlertCallback, AlertPayload, LoadState, StateCallback};
use tracing::{error, info, warn};

use crate::error::panic_message;

/// Registered state and alert observers
#[derive(Default)]
pub struct ObserverSet {
    state: RwLock<Vec<StateCallback>>,
    alert: RwLock<Vec<AlertCallback>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&self, callback: StateCallback) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn add_alert(&self, callback: AlertCallback) {
        self.alert
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn state_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn alert_count(&self) -> usize {
        self.alert.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Notify every state observer; returns how many failed
    pub fn notify_state(&self, state: LoadState) -> usize {
        // Snapshot so observers may register further observers
        let callbacks = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (idx, callback) in callbacks.iter().enumerate() {
            if !invoke_isolated("state", idx, || callback(state)) {
                failures += 1;
            }
        }
        failures
    }

    /// Notify every alert observer; returns how many failed
    pub fn notify_alert(&self, message: &str, payload: &AlertPayload) -> usize {
        let callbacks = self
            .alert
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (idx, callback) in callbacks.iter().enumerate() {
            if !invoke_isolated("alert", idx, || callback(message, payload)) {
                failures += 1;
            }
        }
        failures
    }
}

/// Run one observer, catching a panic. Returns `true` on success.
fn invoke_isolated(kind: &'static str, index: usize, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                observer = kind,
                index,
                error = %panic_message(payload.as_ref()),
                "Observer failed"
            );
            false
        }
    }
}

/// State observer that logs every transition via tracing
pub fn log_state_observer() -> StateCallback {
    Arc::new(|state: LoadState| {
        if state.is_healthy() {
            info!(state = %state, "Load state changed");
        } else {
            warn!(state = %state, "Load state changed");
        }
    })
}

/// Alert observer that logs the alert payload via tracing
pub fn log_alert_observer() -> AlertCallback {
    Arc::new(|message: &str, payload: &AlertPayload| {
        let depths = payload
            .lane_depths
            .iter()
            .map(|(priority, depth)| format!("{}={}", priority.as_str(), depth))
            .collect::<Vec<_>>()
            .join(",");

        warn!(
            state = %payload.state,
            utilization = payload.utilization,
            lanes = %depths,
            timestamp = %payload.timestamp.to_rfc3339(),
            "{}",
            message
        );
    })
}
