//! Backpressure error types

use std::any::Any;

use thiserror::Error;

/// Errors surfaced by the manager's lifecycle and registry APIs
///
/// Admission outcomes are not errors; see [`crate::Rejection`].
#[derive(Debug, Error)]
pub enum BackpressureError {
    /// Configuration rejected at construction
    #[error("invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// `start` was called outside a tokio runtime
    #[error("no tokio runtime available to spawn the dispatch worker")]
    NoRuntime,

    /// Registry already holds a manager
    #[error("backpressure manager already initialized")]
    AlreadyInitialized,

    /// Registry is empty
    #[error("backpressure manager not initialized")]
    NotInitialized,
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
