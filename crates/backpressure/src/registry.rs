//! Process-wide manager registry
//!
//! Optional convenience for embedders that want one shared manager. The
//! manager itself never reads from here.

use std::sync::{Arc, Mutex, PoisonError};

use contracts::BackpressureConfig;
use tracing::{info, instrument};

use crate::error::BackpressureError;
use crate::manager::BackpressureManager;

static REGISTRY: Mutex<Option<Arc<BackpressureManager>>> = Mutex::new(None);

/// Create, start and register the process-wide manager
#[instrument(name = "backpressure_registry_initialize", skip(config))]
pub fn initialize(config: BackpressureConfig) -> Result<Arc<BackpressureManager>, BackpressureError> {
    let mut slot = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(BackpressureError::AlreadyInitialized);
    }

    let manager = Arc::new(BackpressureManager::new(config)?);
    manager.start()?;
    *slot = Some(Arc::clone(&manager));

    info!("Process-wide backpressure manager registered");
    Ok(manager)
}

/// The registered manager
pub fn get() -> Result<Arc<BackpressureManager>, BackpressureError> {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(BackpressureError::NotInitialized)
}

/// Stop and unregister the manager, if any
#[instrument(name = "backpressure_registry_shutdown")]
pub async fn shutdown() {
    let manager = {
        let mut slot = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take()
    };

    if let Some(manager) = manager {
        manager.stop().await;
        info!("Process-wide backpressure manager unregistered");
    }
}
