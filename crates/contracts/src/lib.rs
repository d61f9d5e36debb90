//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! operation model, priority tiers, load states, configuration and telemetry
//! snapshots. Business crates depend on this crate, never the reverse.
//!
//! ## Time Model
//! - Monotonic `Instant` for submission timestamps and latency measurement
//! - Wall-clock `chrono::DateTime<Utc>` only on alert payloads

mod callback;
mod config;
mod error;
mod load_state;
mod operation;
mod priority;
mod telemetry;

pub use callback::*;
pub use config::*;
pub use error::*;
pub use load_state::LoadState;
pub use operation::{Operation, DEFAULT_MAX_RETRIES};
pub use priority::Priority;
pub use telemetry::*;
