//! Configuration validation
//!
//! Rules:
//! - field ranges declared on the contract types (`validator` derive)
//! - thresholds finite and strictly increasing: normal < warning < critical < emergency
//! - a single cycle budget never exceeds total lane capacity
//! - the error back-off is not shorter than the idle sleep

use contracts::{BackpressureConfig, ContractError};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a `BackpressureConfig`
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &BackpressureConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_thresholds(config)?;
    validate_cycle_budget(config)?;
    validate_timing(config)?;
    Ok(())
}

/// Field-level range checks
fn validate_ranges(config: &BackpressureConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_violation(&errors, "");
        ContractError::config_validation(field, message)
    })
}

/// Walk nested validation errors down to the first offending field
fn first_violation(errors: &ValidationErrors, prefix: &str) -> (String, String) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(violations) => {
                if let Some(violation) = violations.first() {
                    let message = match &violation.message {
                        Some(message) => message.to_string(),
                        None => match violation.params.get("value") {
                            Some(value) => format!("failed '{}' check, got {}", violation.code, value),
                            None => format!("failed '{}' check", violation.code),
                        },
                    };
                    return (path, message);
                }
            }
            ValidationErrorsKind::Struct(inner) => return first_violation(inner, &path),
            ValidationErrorsKind::List(items) => {
                if let Some((idx, inner)) = items.iter().next() {
                    return first_violation(inner, &format!("{path}[{idx}]"));
                }
            }
        }
    }

    (prefix.to_string(), errors.to_string())
}

/// Thresholds must be finite and strictly increasing
///
/// `range` lets NaN through, and every comparison against NaN is false.
fn validate_thresholds(config: &BackpressureConfig) -> Result<(), ContractError> {
    let t = &config.thresholds;
    let ordered = [
        ("normal", t.normal),
        ("warning", t.warning),
        ("critical", t.critical),
        ("emergency", t.emergency),
    ];

    if let Some((name, value)) = ordered.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ContractError::config_validation(
            format!("thresholds.{name}"),
            format!("{name} must be a finite number, got {value}"),
        ));
    }

    for pair in ordered.windows(2) {
        let (lower_name, lower) = pair[0];
        let (upper_name, upper) = pair[1];
        if lower >= upper {
            return Err(ContractError::config_validation(
                format!("thresholds.{upper_name}"),
                format!("{upper_name} ({upper}) must be > {lower_name} ({lower})"),
            ));
        }
    }
    Ok(())
}

/// A cycle budget larger than every lane combined can never be used
fn validate_cycle_budget(config: &BackpressureConfig) -> Result<(), ContractError> {
    let Some(total) = config.lanes.checked_total() else {
        return Err(ContractError::config_validation(
            "lanes",
            "total lane capacity overflows usize",
        ));
    };
    if config.max_ops_per_cycle > total {
        return Err(ContractError::config_validation(
            "max_ops_per_cycle",
            format!(
                "max_ops_per_cycle ({}) exceeds total lane capacity ({})",
                config.max_ops_per_cycle, total
            ),
        ));
    }
    Ok(())
}

/// Back-off after a failure should not be shorter than a normal idle pause
fn validate_timing(config: &BackpressureConfig) -> Result<(), ContractError> {
    let timing = &config.timing;
    if timing.error_backoff_ms < timing.idle_sleep_ms {
        return Err(ContractError::config_validation(
            "timing.error_backoff_ms",
            format!(
                "error_backoff_ms ({}) must be >= idle_sleep_ms ({})",
                timing.error_backoff_ms, timing.idle_sleep_ms
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::LaneCapacities;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&BackpressureConfig::default()).is_ok());
    }

    #[test]
    fn test_non_increasing_thresholds_rejected() {
        let mut config = BackpressureConfig::default();
        config.thresholds.critical = 0.70;
        let err = validate(&config).unwrap_err();
        assert!(
            matches!(err, ContractError::ConfigValidation { ref field, .. } if field == "thresholds.critical")
        );
    }

    #[test]
    fn test_normal_above_warning_rejected() {
        let mut config = BackpressureConfig::default();
        config.thresholds.normal = 0.8;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let mut config = BackpressureConfig::default();
        config.thresholds.emergency = f64::NAN;
        let err = validate(&config).unwrap_err();
        assert!(
            matches!(err, ContractError::ConfigValidation { ref field, .. } if field == "thresholds.emergency"),
            "got: {err}"
        );

        let mut config = BackpressureConfig::default();
        config.thresholds.normal = f64::NAN;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_oversized_lane_rejected() {
        let mut config = BackpressureConfig::default();
        config.lanes.critical = 1 << 62;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("lanes.critical"), "got: {err}");
    }

    #[test]
    fn test_zero_capacity_reports_nested_field() {
        let mut config = BackpressureConfig::default();
        config.lanes.low = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("lanes.low"), "got: {err}");
    }

    #[test]
    fn test_budget_larger_than_lanes_rejected() {
        let config = BackpressureConfig {
            max_ops_per_cycle: 200,
            lanes: LaneCapacities::uniform(10),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_ops_per_cycle"));
    }

    #[test]
    fn test_backoff_shorter_than_idle_rejected() {
        let mut config = BackpressureConfig::default();
        config.timing.idle_sleep_ms = 20;
        config.timing.error_backoff_ms = 5;
        assert!(validate(&config).is_err());
    }
}
