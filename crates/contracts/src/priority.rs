//! Priority tiers
//!
//! Lowest ordinal is most urgent. The derived `Ord` follows the ordinal, so
//! `Priority::Critical < Priority::Background` and sorting ascending yields
//! dispatch order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// Operation priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Never shed by policy
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Background = 5,
}

impl Priority {
    /// All tiers in dispatch order (most urgent first)
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Background,
    ];

    /// Number of tiers
    pub const COUNT: usize = Self::ALL.len();

    /// Ordinal value (1 = most urgent)
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Zero-based lane index
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Lowercase name, used for config keys and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for Priority {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            _ => Err(ContractError::InvalidPriority {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut shuffled = vec![
            Priority::Low,
            Priority::Critical,
            Priority::Background,
            Priority::Medium,
            Priority::High,
        ];
        shuffled.sort();
        assert_eq!(shuffled, Priority::ALL.to_vec());
        assert!(Priority::Critical < Priority::High);
    }

    #[test]
    fn test_priority_index_and_ordinal() {
        for (idx, p) in Priority::ALL.iter().enumerate() {
            assert_eq!(p.index(), idx);
            assert_eq!(p.ordinal() as usize, idx + 1);
        }
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(
            "background".parse::<Priority>().unwrap(),
            Priority::Background
        );
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(back, Priority::Low);
    }
}
