//! Trend direction and short-horizon risk prediction over a zone's density history.
//!
//! Both compare the latest sample against the sample closest to one lookback
//! window earlier. The window is measured by timestamp, not sample count, and
//! the observed change is rescaled to exactly one window so that irregular
//! ingestion rates produce comparable slopes.

use super::{RiskLevel, RiskThresholds};
use crate::state::History;
use serde::{Deserialize, Serialize};
use time::Duration;

pub const DEFAULT_LOOKBACK_SECS: u64 = 20;
pub const DEFAULT_NOISE_FLOOR: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    pub lookback: Duration,
    /// Minimum per-window change that counts as movement.
    pub noise_floor: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::seconds(DEFAULT_LOOKBACK_SECS as i64),
            noise_floor: DEFAULT_NOISE_FLOOR,
        }
    }
}

/// Density change over one lookback window, or `None` when the history does
/// not reach back at least half a window.
pub fn window_delta(history: &History, config: &TrendConfig) -> Option<f64> {
    let latest = history.latest()?;
    let target = latest.timestamp - config.lookback;
    let min_age = config.lookback / 2;

    let earlier = history
        .iter()
        .filter(|sample| latest.timestamp - sample.timestamp >= min_age)
        .min_by(|a, b| {
            let da = (a.timestamp - target).abs();
            let db = (b.timestamp - target).abs();
            da.cmp(&db)
        })?;

    let elapsed = (latest.timestamp - earlier.timestamp).as_seconds_f64();
    if elapsed <= 0.0 {
        return None;
    }
    let window = config.lookback.as_seconds_f64();
    Some((latest.density - earlier.density) * window / elapsed)
}

pub fn trend(history: &History, config: &TrendConfig) -> Trend {
    match window_delta(history, config) {
        Some(delta) if delta > config.noise_floor => Trend::Rising,
        Some(delta) if delta < -config.noise_floor => Trend::Falling,
        _ => Trend::Stable,
    }
}

/// Latest density extrapolated one window ahead, clamped to `[0, 1]`.
///
/// Without enough history the projection is the latest density itself.
pub fn predicted_density(history: &History, config: &TrendConfig) -> Option<f64> {
    let latest = history.latest()?;
    let delta = window_delta(history, config).unwrap_or(0.0);
    Some((latest.density + delta).clamp(0.0, 1.0))
}

pub fn predicted_risk(
    history: &History,
    config: &TrendConfig,
    thresholds: &RiskThresholds,
) -> Option<RiskLevel> {
    predicted_density(history, config).map(|density| thresholds.classify(density))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DensitySample;
    use time::OffsetDateTime;
    use time::macros::datetime;

    const START: OffsetDateTime = datetime!(2026-01-11 12:00:00 UTC);

    fn history(samples: &[(i64, f64)]) -> History {
        let mut history = History::new(50);
        for (second, density) in samples {
            history.push(DensitySample {
                timestamp: START + Duration::seconds(*second),
                density: *density,
            });
        }
        history
    }

    #[test]
    fn rising_history_is_rising() {
        let samples: Vec<_> = (0..=30).map(|s| (s * 2, 0.2 + s as f64 * 0.01)).collect();
        let history = history(&samples);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Rising);
    }

    #[test]
    fn falling_history_is_falling() {
        let history = history(&[(0, 0.9), (10, 0.8), (20, 0.7)]);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Falling);
    }

    #[test]
    fn constant_history_is_stable() {
        let samples: Vec<_> = (0..20).map(|s| (s * 3, 0.6)).collect();
        let history = history(&samples);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Stable);
    }

    #[test]
    fn jitter_below_noise_floor_is_stable() {
        let history = history(&[(0, 0.60), (10, 0.62), (20, 0.62)]);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Stable);
    }

    #[test]
    fn short_history_is_stable() {
        // Both samples fall inside half a window of each other.
        let history = history(&[(0, 0.1), (5, 0.9)]);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Stable);
        assert_eq!(window_delta(&history, &TrendConfig::default()), None);
    }

    #[test]
    fn empty_history_has_no_prediction() {
        let history = History::new(10);

        assert_eq!(trend(&history, &TrendConfig::default()), Trend::Stable);
        assert_eq!(
            predicted_risk(&history, &TrendConfig::default(), &RiskThresholds::default()),
            None
        );
    }

    #[test]
    fn earlier_sample_is_chosen_by_timestamp_not_count() {
        // Dense burst at the end must not shrink the window.
        let history = history(&[
            (0, 0.40),
            (20, 0.50),
            (38, 0.58),
            (39, 0.59),
            (40, 0.60),
        ]);

        let delta = window_delta(&history, &TrendConfig::default()).unwrap_or_default();
        assert!((delta - 0.10).abs() < 1e-9, "delta was {delta}");
    }

    #[test]
    fn delta_is_rescaled_to_one_window() {
        // 0.1 over 15s is 0.1333 per 20s window.
        let history = history(&[(0, 0.5), (15, 0.6)]);

        let delta = window_delta(&history, &TrendConfig::default()).unwrap_or_default();
        assert!((delta - 0.1 * 20.0 / 15.0).abs() < 1e-9, "delta was {delta}");
    }

    #[test]
    fn prediction_extrapolates_one_window_ahead() {
        let history = history(&[(0, 0.6), (20, 0.75)]);

        let predicted = predicted_density(&history, &TrendConfig::default()).unwrap_or_default();
        assert!((predicted - 0.9).abs() < 1e-9);
        assert_eq!(
            predicted_risk(&history, &TrendConfig::default(), &RiskThresholds::default()),
            Some(RiskLevel::High)
        );
    }

    #[test]
    fn prediction_is_clamped() {
        let history = history(&[(0, 0.5), (20, 0.9)]);

        assert_eq!(
            predicted_density(&history, &TrendConfig::default()),
            Some(1.0)
        );

        let history = self::history(&[(0, 0.4), (20, 0.1)]);
        assert_eq!(
            predicted_density(&history, &TrendConfig::default()),
            Some(0.0)
        );
    }

    #[test]
    fn prediction_without_window_repeats_current_risk() {
        let history = history(&[(0, 0.85)]);

        assert_eq!(
            predicted_risk(&history, &TrendConfig::default(), &RiskThresholds::default()),
            Some(RiskLevel::High)
        );
    }
}
