//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BackpressureConfig, Priority};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    max_ops_per_cycle: usize,
    cycle_timeout_ms: u64,
    total_capacity: usize,
    warning: f64,
    critical: f64,
    emergency: f64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(Some(&args.config)) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    max_ops_per_cycle: config.max_ops_per_cycle,
                    cycle_timeout_ms: config.cycle_timeout_ms,
                    total_capacity: config.lanes.total(),
                    warning: config.thresholds.warning,
                    critical: config.thresholds.critical,
                    emergency: config.thresholds.emergency,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BackpressureConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let shedding = &config.shedding;

    if !shedding.drop_low_on_warning
        && !shedding.drop_medium_on_critical
        && !shedding.drop_high_on_emergency
    {
        warnings.push("All shedding toggles are disabled - only full lanes reject".to_string());
    }

    if shedding.drop_high_on_emergency {
        warnings.push("shedding.drop_high_on_emergency is enabled - HIGH operations may be shed".to_string());
    }

    let critical_capacity = config.lanes.capacity(Priority::Critical);
    if config.max_ops_per_cycle > critical_capacity {
        warnings.push(format!(
            "max_ops_per_cycle ({}) exceeds the critical lane capacity ({})",
            config.max_ops_per_cycle, critical_capacity
        ));
    }

    if config.timing.idle_sleep_ms == 0 {
        warnings.push("timing.idle_sleep_ms is 0 - the dispatch loop only yields between cycles".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Max ops per cycle: {}", summary.max_ops_per_cycle);
            println!("  Cycle timeout: {} ms", summary.cycle_timeout_ms);
            println!("  Total lane capacity: {}", summary.total_capacity);
            println!(
                "  Thresholds: warning {:.2}, critical {:.2}, emergency {:.2}",
                summary.warning, summary.critical, summary.emergency
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SheddingPolicy;

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(collect_warnings(&BackpressureConfig::default()).is_empty());
    }

    #[test]
    fn test_disabled_shedding_warns() {
        let config = BackpressureConfig {
            shedding: SheddingPolicy {
                drop_low_on_warning: false,
                drop_medium_on_critical: false,
                drop_high_on_emergency: false,
                cumulative: false,
            },
            ..BackpressureConfig::default()
        };
        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("shedding"));
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let args = ValidateArgs {
            config: "/nonexistent/backpressure.toml".into(),
            json: true,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }
}
