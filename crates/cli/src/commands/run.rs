//! `run` command implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use backpressure::{log_alert_observer, log_state_observer, BackpressureManager};
use tracing::{error, info, warn};

use super::load_config;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::simulation::{Simulation, SimulationConfig, SimulationReport};

/// Execute the `run` command
pub async fn run_simulation(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(max_ops) = args.max_ops_per_cycle {
        info!(max_ops_per_cycle = max_ops, "Overriding max_ops_per_cycle from CLI");
        config.max_ops_per_cycle = max_ops;
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!(port = args.metrics_port, "Metrics endpoint available");
    }

    let manager = Arc::new(BackpressureManager::new(config).map_err(CliError::from)?);
    let state_observer = log_state_observer();
    manager.add_state_callback(move |state| state_observer(state));
    let alert_observer = log_alert_observer();
    manager.add_alert_callback(move |message, payload| alert_observer(message, payload));

    manager.start().map_err(CliError::from)?;

    let mut simulation = Simulation::new(SimulationConfig {
        duration: Duration::from_secs(args.duration),
        rate: args.rate,
        fail_every: args.fail_every,
        work_cost: Duration::from_micros(args.work_cost_us),
        drain_timeout: manager.config().timing.stop_timeout() * 5,
    });

    let started = Instant::now();
    let interrupted = tokio::select! {
        _ = simulation.run(&manager) => false,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping simulation...");
            true
        }
    };
    let elapsed = started.elapsed();

    manager.stop().await;

    let report = SimulationReport::new(
        elapsed,
        interrupted,
        simulation.tally().clone(),
        manager.get_stats(),
        manager.get_health(),
    );

    info!(
        offered = report.admission.offered,
        accepted = report.admission.accepted,
        processed = report.stats.processed_total,
        dropped = report.stats.dropped_total,
        state = %report.stats.state,
        "Simulation finished"
    );

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize simulation report")?;
        println!("{}", json);
    } else {
        report.print_summary();
    }

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
