//! Per-zone alert state machine with hysteresis.
//!
//! A zone climbs NORMAL → WARNING → CRITICAL as its risk reaches the configured
//! entry levels (it may jump straight to CRITICAL). It only steps back down once
//! density falls a full band below the entry band, minus a release margin.
//! A zone has at most one active [`Alert`]; escalation and downgrade rewrite it
//! in place, and it is removed only on the return to NORMAL.

use crate::risk::{RiskLevel, RiskThresholds};
use crate::zone::ZoneConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tracing::{info, warn};

pub const DEFAULT_RELEASE_MARGIN: f64 = 0.05;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub zone_id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertLevel,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertState {
    pub level: AlertLevel,
    pub last_transition: Option<OffsetDateTime>,
    pub active: Option<Alert>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Raised(Alert),
    Escalated(Alert),
    Downgraded(Alert),
    Cleared {
        alert: Alert,
        cleared_at: OffsetDateTime,
    },
}

impl AlertEvent {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertEvent::Raised(alert)
            | AlertEvent::Escalated(alert)
            | AlertEvent::Downgraded(alert)
            | AlertEvent::Cleared { alert, .. } => alert,
        }
    }

    /// Log the transition. Call after the zone lock is released.
    pub fn log(&self, density: f64) {
        match self {
            AlertEvent::Raised(alert) | AlertEvent::Escalated(alert) => warn!(
                zone_id = %alert.zone_id,
                alert_id = %alert.id,
                severity = ?alert.severity,
                density,
                "Crowd alert raised"
            ),
            AlertEvent::Downgraded(alert) => info!(
                zone_id = %alert.zone_id,
                alert_id = %alert.id,
                severity = ?alert.severity,
                density,
                "Crowd alert downgraded"
            ),
            AlertEvent::Cleared { alert, .. } => info!(
                zone_id = %alert.zone_id,
                alert_id = %alert.id,
                density,
                "Crowd alert cleared"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicy {
    pub thresholds: RiskThresholds,
    /// Risk level that raises a WARNING from NORMAL.
    pub warning_entry: RiskLevel,
    /// Risk level that escalates to CRITICAL.
    pub critical_entry: RiskLevel,
    pub release_margin: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            warning_entry: RiskLevel::High,
            critical_entry: RiskLevel::Critical,
            release_margin: DEFAULT_RELEASE_MARGIN,
        }
    }
}

impl AlertPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.warning_entry == RiskLevel::Low {
            return Err("alerts.warning_entry must be above low".to_string());
        }
        if self.critical_entry < self.warning_entry {
            return Err(format!(
                "alerts.critical_entry ({}) must not be below warning_entry ({})",
                self.critical_entry.as_str(),
                self.warning_entry.as_str()
            ));
        }
        if !(self.release_margin.is_finite() && self.release_margin >= 0.0) {
            return Err(format!(
                "alerts.release_margin must be non-negative, got {}",
                self.release_margin
            ));
        }
        for entry in [self.warning_entry, self.critical_entry] {
            let release = self.release_density(entry);
            if release <= 0.0 {
                return Err(format!(
                    "alerts.release_margin {} leaves no release point for {} (got {release})",
                    self.release_margin,
                    entry.as_str()
                ));
            }
        }
        Ok(())
    }

    /// Density below which a state entered at `entry` is left.
    pub fn release_density(&self, entry: RiskLevel) -> f64 {
        let band = match entry.below() {
            Some(below) if below != RiskLevel::Low => below,
            _ => entry,
        };
        self.thresholds.lower_bound(band) - self.release_margin
    }

    pub fn next_level(&self, current: AlertLevel, density: f64, risk: RiskLevel) -> AlertLevel {
        if risk >= self.critical_entry {
            return AlertLevel::Critical;
        }
        let warning_release = self.release_density(self.warning_entry);
        match current {
            AlertLevel::Critical if density >= self.release_density(self.critical_entry) => {
                AlertLevel::Critical
            }
            AlertLevel::Critical | AlertLevel::Warning if density >= warning_release => {
                AlertLevel::Warning
            }
            AlertLevel::Critical | AlertLevel::Warning => AlertLevel::Normal,
            AlertLevel::Normal if risk >= self.warning_entry => AlertLevel::Warning,
            AlertLevel::Normal => AlertLevel::Normal,
        }
    }
}

/// Drives [`AlertState`] transitions and mints alert identifiers.
#[derive(Debug)]
pub struct AlertEngine {
    policy: AlertPolicy,
    sequence: AtomicU64,
}

impl AlertEngine {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Apply one classified reading to the zone's alert state.
    ///
    /// Returns the event to publish, if the level changed. Runs under the zone
    /// lock, so logging is left to the caller via [`AlertEvent::log`].
    pub fn transition(
        &self,
        state: &mut AlertState,
        zone: &ZoneConfig,
        density: f64,
        risk: RiskLevel,
        at: OffsetDateTime,
    ) -> Option<AlertEvent> {
        let next = self.policy.next_level(state.level, density, risk);
        if next == state.level {
            return None;
        }
        let previous = state.level;
        state.level = next;
        state.last_transition = Some(at);

        let event = match (state.active.take(), next) {
            (Some(alert), AlertLevel::Normal) => AlertEvent::Cleared {
                alert,
                cleared_at: at,
            },
            (Some(mut alert), severity) => {
                alert.severity = severity;
                (alert.title, alert.message) = describe(zone, severity, density, risk);
                state.active = Some(alert.clone());
                if severity > previous {
                    AlertEvent::Escalated(alert)
                } else {
                    AlertEvent::Downgraded(alert)
                }
            }
            (None, AlertLevel::Normal) => return None,
            (None, severity) => {
                let (title, message) = describe(zone, severity, density, risk);
                let alert = Alert {
                    id: format!(
                        "{}-{}",
                        zone.zone_id,
                        self.sequence.fetch_add(1, Ordering::Relaxed)
                    ),
                    zone_id: zone.zone_id.clone(),
                    title,
                    message,
                    severity,
                    created_at: at,
                };
                state.active = Some(alert.clone());
                AlertEvent::Raised(alert)
            }
        };

        Some(event)
    }
}

fn describe(
    zone: &ZoneConfig,
    severity: AlertLevel,
    density: f64,
    risk: RiskLevel,
) -> (String, String) {
    let percent = (density * 100.0).round();
    match severity {
        AlertLevel::Critical => (
            format!("Critical crowd density at {}", zone.display_name),
            format!(
                "{} is at {percent}% of capacity (risk {}). Stop inflow and open relief routes.",
                zone.display_name,
                risk.as_str()
            ),
        ),
        _ => (
            format!("High crowd density at {}", zone.display_name),
            format!(
                "{} is at {percent}% of capacity (risk {}). Monitor closely.",
                zone.display_name,
                risk.as_str()
            ),
        ),
    }
}
