//! Basic Manager Example
//!
//! Embeds a backpressure manager, floods it past its thresholds and watches
//! LOW traffic being shed while CRITICAL traffic keeps flowing.
//!
//! Run with: cargo run -p demos --bin basic_manager [config.toml]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backpressure::{log_alert_observer, BackpressureManager};
use config_loader::ConfigLoader;
use contracts::{BackpressureConfig, LaneCapacities, Operation, Priority};
use observability::ObservabilityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_with_config(ObservabilityConfig::default())?;

    tracing::info!("Starting Basic Manager Demo");

    // ==== Stage 1: Use default config or load from file ====
    let config = if let Some(path) = std::env::args().nth(1) {
        tracing::info!(path = %path, "Loading backpressure config");
        ConfigLoader::load_from_path(std::path::Path::new(&path))?
    } else {
        small_config()
    };

    // ==== Stage 2: Build manager and observers ====
    let manager = Arc::new(BackpressureManager::new(config)?);
    manager.add_state_callback(|state| {
        tracing::info!(state = %state, "Observed load state change");
    });
    let alert = log_alert_observer();
    manager.add_alert_callback(move |message, payload| alert(message, payload));

    // ==== Stage 3: Flood the lanes before the worker starts ====
    let processed = Arc::new(AtomicU64::new(0));
    let mut accepted = 0;
    let mut rejected = 0;
    for i in 0..400u64 {
        let priority = Priority::ALL[(i % 5) as usize];
        let counter = Arc::clone(&processed);
        let operation = Operation::new(format!("demo-{i}"), priority, "demo", i.to_string())
            .with_work(move |_| {
                std::thread::sleep(Duration::from_micros(200));
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });

        if manager.submit(operation) {
            accepted += 1;
        } else {
            rejected += 1;
        }

        // Recompute every 50 submissions so shedding kicks in before the worker runs
        if i % 50 == 49 {
            manager.refresh_load_state();
        }
    }

    tracing::info!(
        accepted,
        rejected,
        state = %manager.load_state(),
        utilization = manager.utilization(),
        "Lanes flooded"
    );

    // ==== Stage 4: Drain ====
    manager.start()?;
    while manager.lane_depths().values().sum::<usize>() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    manager.stop().await;

    tracing::info!(
        processed = processed.load(Ordering::Relaxed),
        "Demo completed"
    );
    println!("{}", manager.get_stats());

    Ok(())
}

/// Small lanes so a few hundred operations cross every threshold
fn small_config() -> BackpressureConfig {
    BackpressureConfig {
        max_ops_per_cycle: 20,
        lanes: LaneCapacities::uniform(60),
        ..BackpressureConfig::default()
    }
}
