//! Load state derived from aggregate lane utilization

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ThresholdConfig;

/// System-wide load severity
///
/// Ordered by severity, `Normal < Warning < Critical < Emergency`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl LoadState {
    /// Classify a utilization ratio against the configured thresholds.
    ///
    /// Not hysteretic: the result depends only on `utilization`.
    pub fn from_utilization(utilization: f64, thresholds: &ThresholdConfig) -> Self {
        if utilization >= thresholds.emergency {
            LoadState::Emergency
        } else if utilization >= thresholds.critical {
            LoadState::Critical
        } else if utilization >= thresholds.warning {
            LoadState::Warning
        } else {
            LoadState::Normal
        }
    }

    /// Healthy states still accept all non-shed traffic
    pub fn is_healthy(self) -> bool {
        matches!(self, LoadState::Normal | LoadState::Warning)
    }

    /// States that raise an alert on entry
    pub fn is_alerting(self) -> bool {
        matches!(self, LoadState::Critical | LoadState::Emergency)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Normal => "NORMAL",
            LoadState::Warning => "WARNING",
            LoadState::Critical => "CRITICAL",
            LoadState::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_utilization_boundaries() {
        let t = ThresholdConfig::default();
        assert_eq!(LoadState::from_utilization(0.0, &t), LoadState::Normal);
        assert_eq!(LoadState::from_utilization(0.69, &t), LoadState::Normal);
        assert_eq!(LoadState::from_utilization(0.70, &t), LoadState::Warning);
        assert_eq!(LoadState::from_utilization(0.85, &t), LoadState::Critical);
        assert_eq!(LoadState::from_utilization(0.949, &t), LoadState::Critical);
        assert_eq!(LoadState::from_utilization(0.95, &t), LoadState::Emergency);
        assert_eq!(LoadState::from_utilization(1.0, &t), LoadState::Emergency);
    }

    #[test]
    fn test_normal_threshold_is_informational() {
        let t = ThresholdConfig::default();
        // 0.5 crosses `normal` but stays Normal
        assert_eq!(LoadState::from_utilization(0.55, &t), LoadState::Normal);
    }

    #[test]
    fn test_health_classification() {
        assert!(LoadState::Normal.is_healthy());
        assert!(LoadState::Warning.is_healthy());
        assert!(!LoadState::Critical.is_healthy());
        assert!(!LoadState::Emergency.is_healthy());
        assert!(!LoadState::Warning.is_alerting());
        assert!(LoadState::Critical.is_alerting());
    }
}
