//! # Backpressure
//!
//! Priority-lane admission control and load shedding.
//!
//! Operations are offered to a [`BackpressureManager`], which either queues
//! them in one of five bounded priority lanes or rejects them according to the
//! current [`LoadState`](contracts::LoadState) and shedding policy. A single
//! dispatch worker drains the lanes in strict priority order under a
//! per-cycle budget, retries failed work units, recomputes utilization after
//! every cycle and notifies observers on state transitions.
//!
//! ```no_run
//! use backpressure::BackpressureManager;
//! use contracts::{BackpressureConfig, Operation, Priority};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manager = BackpressureManager::new(BackpressureConfig::default())?;
//! manager.start()?;
//!
//! let op = Operation::new("order-1", Priority::High, "order", "payload")
//!     .with_work(|payload| {
//!         println!("processing {} bytes", payload.len());
//!         Ok(())
//!     });
//! assert!(manager.submit(op));
//!
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

mod admission;
mod dispatcher;
mod error;
mod lane;
mod load;
mod manager;
pub mod observers;
pub mod registry;
mod stats;

pub use admission::{AdmissionPolicy, Rejection};
pub use dispatcher::CycleReport;
pub use error::BackpressureError;
pub use lane::{Lane, LaneSet};
pub use manager::BackpressureManager;
pub use observers::{log_alert_observer, log_state_observer, ObserverSet};
