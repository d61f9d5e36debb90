//! Load state machine
//!
//! Utilization is recomputed from lane occupancy; a change of state is
//! persisted under the shared lock, then observers are notified outside it.

use chrono::Utc;
use contracts::{AlertPayload, LaneDepths, LoadState};
use observability::metrics;
use tracing::{debug, info, warn};

use crate::manager::Core;

impl Core {
    /// Recompute utilization and state from current occupancy
    pub(crate) fn refresh_load_state(&self) -> (LoadState, f64) {
        let depths = self.lanes.depths();
        let utilization = self.lanes.utilization();
        let state = LoadState::from_utilization(utilization, &self.config.thresholds);

        self.transition_to(state, utilization, depths);
        (state, utilization)
    }

    /// Enter EMERGENCY regardless of utilization
    pub(crate) fn force_emergency(&self) {
        let depths = self.lanes.depths();
        let utilization = self.lanes.utilization();

        warn!(utilization, "Forcing EMERGENCY load state");
        if !self.transition_to(LoadState::Emergency, utilization, depths) {
            debug!("Load state already EMERGENCY");
        }
    }

    /// Persist the occupancy snapshot and, if the state changed, notify.
    ///
    /// Returns whether a transition happened.
    fn transition_to(&self, next: LoadState, utilization: f64, depths: LaneDepths) -> bool {
        let previous = {
            let mut shared = self.lock_shared();
            shared.stats.lane_depths = depths.clone();
            shared.stats.utilization = utilization;

            let previous = shared.state;
            if previous != next {
                shared.state = next;
                shared.stats.transitions += 1;
                match next {
                    LoadState::Warning | LoadState::Critical => {
                        shared.stats.backpressure_events += 1
                    }
                    LoadState::Emergency => shared.stats.emergency_events += 1,
                    LoadState::Normal => {}
                }
            }
            previous
        };

        metrics::record_load(next, utilization);
        for (priority, depth) in &depths {
            metrics::record_lane_depth(*priority, *depth);
        }

        if previous == next {
            return false;
        }

        metrics::record_transition(previous, next);
        if next > previous {
            warn!(from = %previous, to = %next, utilization, "Load state escalated");
        } else {
            info!(from = %previous, to = %next, utilization, "Load state recovered");
        }

        self.observers.notify_state(next);

        if next.is_alerting() {
            let message = format!(
                "Backpressure {} at {:.1}% utilization",
                next,
                utilization * 100.0
            );
            let payload = AlertPayload {
                state: next,
                lane_depths: depths,
                utilization,
                timestamp: Utc::now(),
            };
            self.observers.notify_alert(&message, &payload);
        }

        true
    }
}
