use crate::alert::Alert;
use crate::error::AppError;
use crate::risk::trend::{self, Trend, TrendConfig};
use crate::risk::{RiskLevel, RiskThresholds};
use crate::state::{DensitySample, ZoneCell, ZoneStore};
use crate::zone::ZoneConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_STALE_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    /// No reading accepted yet.
    Unknown,
}

/// Derived view of one zone. Risk fields are `None` unless the zone is fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStatus {
    pub zone_id: String,
    pub display_name: String,
    pub freshness: Freshness,
    pub density: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub predicted_risk_level: Option<RiskLevel>,
    pub trend: Option<Trend>,
    pub last_updated: Option<OffsetDateTime>,
    pub alert: Option<Alert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDetail {
    pub status: ZoneStatus,
    pub aggregated_count: u64,
    pub history: Vec<DensitySample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    /// Registry order.
    pub zones: Vec<ZoneStatus>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSettings {
    pub thresholds: RiskThresholds,
    pub trend: TrendConfig,
    pub stale_after: Duration,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            trend: TrendConfig::default(),
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS as i64),
        }
    }
}

/// Read-only assembly of zone snapshots into a system-wide status.
///
/// Each zone is read under its own lock, so a zone's density, risk and alert
/// always agree; different zones may be captured at slightly different instants.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    store: Arc<ZoneStore>,
    settings: StatusSettings,
}

impl StatusAggregator {
    pub fn new(store: Arc<ZoneStore>, settings: StatusSettings) -> Self {
        Self { store, settings }
    }

    pub fn current_status(&self, now: OffsetDateTime) -> Result<SystemStatus, AppError> {
        let registry = self.store.registry();
        let mut zones = Vec::with_capacity(registry.zones().len());
        for zone in registry.zones() {
            let status = self
                .store
                .with_zone(&zone.zone_id, |cell| self.derive(zone, cell, now))?;
            zones.push(status);
        }
        let alerts = zones.iter().filter_map(|zone| zone.alert.clone()).collect();
        Ok(SystemStatus { zones, alerts })
    }

    pub fn zone_detail(&self, zone_id: &str, now: OffsetDateTime) -> Result<ZoneDetail, AppError> {
        let zone = self
            .store
            .registry()
            .zone(zone_id)
            .ok_or_else(|| AppError::UnknownZone(zone_id.to_string()))?;
        self.store.with_zone(zone_id, |cell| ZoneDetail {
            status: self.derive(zone, cell, now),
            aggregated_count: cell.state.aggregated_count,
            history: cell.state.history.to_vec(),
        })
    }

    /// Judged on the server's receive time, so sensor clock drift cannot make a
    /// zone look fresh or stale.
    pub fn freshness(&self, last_received: Option<OffsetDateTime>, now: OffsetDateTime) -> Freshness {
        match last_received {
            None => Freshness::Unknown,
            Some(at) if now - at > self.settings.stale_after => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }

    fn derive(&self, zone: &ZoneConfig, cell: &ZoneCell, now: OffsetDateTime) -> ZoneStatus {
        let state = &cell.state;
        let freshness = self.freshness(state.last_received, now);
        let mut status = ZoneStatus {
            zone_id: zone.zone_id.clone(),
            display_name: zone.display_name.clone(),
            freshness,
            density: None,
            risk_level: None,
            predicted_risk_level: None,
            trend: None,
            last_updated: state.last_updated,
            alert: cell.alert.active.clone(),
        };
        if freshness == Freshness::Fresh {
            let settings = &self.settings;
            status.density = Some(state.density);
            status.risk_level = Some(settings.thresholds.classify(state.density));
            status.predicted_risk_level =
                trend::predicted_risk(&state.history, &settings.trend, &settings.thresholds);
            status.trend = Some(trend::trend(&state.history, &settings.trend));
        }
        status
    }
}
