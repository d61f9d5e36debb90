//! Callback types crossing the subsystem boundary
//!
//! Work units and observers are external collaborators. They are stored as
//! `Arc`'d closures so the manager can share them with its worker task.

use std::sync::Arc;

use bytes::Bytes;

use crate::{AlertPayload, LoadState};

/// Work unit attached to an operation
///
/// Invoked with the operation payload at dispatch time. Returning `Err` (or
/// panicking) counts as a failed attempt and may trigger a retry.
pub type WorkFn = Arc<dyn Fn(Bytes) -> anyhow::Result<()> + Send + Sync>;

/// Observer notified with the new state on every load-state transition
pub type StateCallback = Arc<dyn Fn(LoadState) + Send + Sync>;

/// Observer notified when the load state enters CRITICAL or EMERGENCY
///
/// Receives a human-readable message and the structured payload.
pub type AlertCallback = Arc<dyn Fn(&str, &AlertPayload) + Send + Sync>;
