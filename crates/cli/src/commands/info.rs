//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{BackpressureConfig, LoopTiming, Priority, SheddingPolicy, ThresholdConfig};
use serde::Serialize;
use std::collections::BTreeMap;

use super::load_config;
use crate::cli::InfoArgs;

/// Effective configuration for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    source: String,
    max_ops_per_cycle: usize,
    cycle_timeout_ms: u64,
    latency_window: usize,
    thresholds: ThresholdConfig,
    shedding: SheddingPolicy,
    /// Load states at which each priority is shed
    shed_at: BTreeMap<Priority, Vec<String>>,
    lanes: BTreeMap<Priority, usize>,
    total_capacity: usize,
    timing: LoopTiming,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = args
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());

    let info = build_config_info(&config, source);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &BackpressureConfig, source: String) -> ConfigInfo {
    let policy = backpressure::AdmissionPolicy::new(config.shedding);
    let states = [
        contracts::LoadState::Normal,
        contracts::LoadState::Warning,
        contracts::LoadState::Critical,
        contracts::LoadState::Emergency,
    ];

    let shed_at = Priority::ALL
        .iter()
        .map(|&priority| {
            let shed: Vec<String> = states
                .iter()
                .filter(|&&state| policy.should_shed(priority, state))
                .map(|state| state.to_string())
                .collect();
            (priority, shed)
        })
        .collect();

    ConfigInfo {
        source,
        max_ops_per_cycle: config.max_ops_per_cycle,
        cycle_timeout_ms: config.cycle_timeout_ms,
        latency_window: config.latency_window,
        thresholds: config.thresholds,
        shedding: config.shedding,
        shed_at,
        lanes: Priority::ALL
            .iter()
            .map(|&p| (p, config.lanes.capacity(p)))
            .collect(),
        total_capacity: config.lanes.total(),
        timing: config.timing,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n=== Backpressure Configuration ({}) ===\n", info.source);

    println!("Dispatch:");
    println!("  Max ops per cycle: {}", info.max_ops_per_cycle);
    println!("  Cycle timeout: {} ms", info.cycle_timeout_ms);
    println!("  Idle sleep: {} ms", info.timing.idle_sleep_ms);
    println!("  Error back-off: {} ms", info.timing.error_backoff_ms);
    println!("  Stop timeout: {} ms", info.timing.stop_timeout_ms);
    println!("  Latency window: {} cycles", info.latency_window);

    println!("\nThresholds:");
    println!("  Normal: {:.2} (informational)", info.thresholds.normal);
    println!("  Warning: {:.2}", info.thresholds.warning);
    println!("  Critical: {:.2}", info.thresholds.critical);
    println!("  Emergency: {:.2}", info.thresholds.emergency);

    println!(
        "\nLanes (total capacity {}):",
        info.total_capacity
    );
    for (priority, capacity) in &info.lanes {
        let shed = info
            .shed_at
            .get(priority)
            .filter(|states| !states.is_empty())
            .map(|states| states.join(", "))
            .unwrap_or_else(|| "never".to_string());
        println!("  {:<10} capacity={:<6} shed at: {}", priority.to_string(), capacity, shed);
    }

    if info.shedding.cumulative {
        println!("\nShedding is cumulative: each toggle also applies to more severe states");
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shedding_table() {
        let info = build_config_info(&BackpressureConfig::default(), "defaults".to_string());

        assert_eq!(info.shed_at[&Priority::Low], vec!["WARNING"]);
        assert_eq!(info.shed_at[&Priority::Medium], vec!["CRITICAL"]);
        assert!(info.shed_at[&Priority::High].is_empty());
        assert!(info.shed_at[&Priority::Critical].is_empty());
        assert_eq!(info.total_capacity, 23_000);
    }

    #[test]
    fn test_info_serializes_lanes_by_name() {
        let info = build_config_info(&BackpressureConfig::default(), "defaults".to_string());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["lanes"]["critical"], 1000);
        assert_eq!(json["lanes"]["low"], 10000);
    }
}
