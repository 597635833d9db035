//! Density to risk classification.
//!
//! Bands are half-open `[lower, upper)`: a density sitting exactly on a
//! threshold belongs to the higher band.

use serde::{Deserialize, Serialize};

pub mod trend;

pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.5;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// The band immediately below this one, if any.
    pub fn below(self) -> Option<RiskLevel> {
        match self {
            RiskLevel::Low => None,
            RiskLevel::Medium => Some(RiskLevel::Low),
            RiskLevel::High => Some(RiskLevel::Medium),
            RiskLevel::Critical => Some(RiskLevel::High),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Ascending lower bounds of the medium, high and critical bands.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: DEFAULT_MEDIUM_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
            critical: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    /// Checks that thresholds are strictly ascending inside `(0, 1]`.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.medium, self.high, self.critical];
        if ordered.iter().any(|t| !t.is_finite() || *t <= 0.0 || *t > 1.0) {
            return Err(format!(
                "risk thresholds must lie in (0, 1], got {ordered:?}"
            ));
        }
        if !(self.medium < self.high && self.high < self.critical) {
            return Err(format!(
                "risk thresholds must be strictly ascending, got {ordered:?}"
            ));
        }
        Ok(())
    }

    pub fn classify(&self, density: f64) -> RiskLevel {
        // NaN falls through every comparison and lands in the lowest band.
        if density >= self.critical {
            RiskLevel::Critical
        } else if density >= self.high {
            RiskLevel::High
        } else if density >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Smallest density that classifies as `level`.
    pub fn lower_bound(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Low => 0.0,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

/// Clamp a raw occupancy ratio into `[0, 1]`.
pub fn density(count: u64, capacity: f64) -> f64 {
    if capacity <= 0.0 || !capacity.is_finite() {
        return 1.0;
    }
    (count as f64 / capacity).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_half_open_bands() {
        let thresholds = RiskThresholds::default();

        assert_eq!(thresholds.classify(0.0), RiskLevel::Low);
        assert_eq!(thresholds.classify(0.49), RiskLevel::Low);
        assert_eq!(thresholds.classify(0.5), RiskLevel::Medium);
        assert_eq!(thresholds.classify(0.79), RiskLevel::Medium);
        assert_eq!(thresholds.classify(0.8), RiskLevel::High);
        assert_eq!(thresholds.classify(0.94), RiskLevel::High);
        assert_eq!(thresholds.classify(0.95), RiskLevel::Critical);
        assert_eq!(thresholds.classify(1.0), RiskLevel::Critical);
    }

    #[test]
    fn classify_is_monotonic_in_density() {
        let thresholds = RiskThresholds::default();
        let mut previous = RiskLevel::Low;
        for step in 0..=1000 {
            let level = thresholds.classify(step as f64 / 1000.0);
            assert!(level >= previous, "classification dropped at step {step}");
            previous = level;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }

    #[test]
    fn custom_thresholds_move_the_bands() {
        let thresholds = RiskThresholds {
            medium: 0.3,
            high: 0.6,
            critical: 0.9,
        };

        assert_eq!(thresholds.classify(0.35), RiskLevel::Medium);
        assert_eq!(thresholds.classify(0.6), RiskLevel::High);
        assert_eq!(thresholds.classify(0.89), RiskLevel::High);
    }

    #[test]
    fn validate_rejects_unordered_or_out_of_range_thresholds() {
        let unordered = RiskThresholds {
            medium: 0.8,
            high: 0.5,
            critical: 0.95,
        };
        assert!(unordered.validate().is_err());

        let above_one = RiskThresholds {
            medium: 0.5,
            high: 0.8,
            critical: 1.2,
        };
        assert!(above_one.validate().is_err());

        assert!(RiskThresholds::default().validate().is_ok());
    }

    #[test]
    fn density_is_clamped_to_unit_interval() {
        assert_eq!(density(500, 200.0), 1.0);
        assert_eq!(density(100, 200.0), 0.5);
        assert_eq!(density(0, 200.0), 0.0);
    }

    #[test]
    fn lower_bound_matches_classification() {
        let thresholds = RiskThresholds::default();
        for level in RiskLevel::ALL {
            assert_eq!(thresholds.classify(thresholds.lower_bound(level)), level);
        }
    }
}
