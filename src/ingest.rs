//! Ingestion gateway: validates raw sensor payloads, records them, and drives
//! the zone's alert state machine inside the same per-zone critical section.

use crate::alert::{AlertEngine, AlertEvent};
use crate::error::{IngestError, Rejection};
use crate::risk::{RiskLevel, RiskThresholds};
use crate::state::{SensorReading, ZoneStore};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

pub const ALERT_EVENT_CAPACITY: usize = 64;
pub const DEFAULT_MAX_FUTURE_SKEW_SECS: u64 = 30;

/// Wire shape of an ingest request. `count` stays untyped so that a
/// non-numeric count is reported as `invalid_value` rather than `malformed_payload`.
#[derive(Debug, Deserialize)]
struct IngestPayload {
    source_id: String,
    source_type: String,
    timestamp: String,
    data: PayloadData,
}

#[derive(Debug, Deserialize)]
struct PayloadData {
    count: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub source_id: String,
    pub zone_id: String,
    pub density: f64,
    pub risk_level: RiskLevel,
    pub alert_event: Option<AlertEvent>,
}

/// Parse and shape-check a raw ingest body received at `received_at`.
pub fn parse_payload(raw: &[u8], received_at: OffsetDateTime) -> Result<SensorReading, Rejection> {
    let payload: IngestPayload = serde_json::from_slice(raw)
        .map_err(|err| Rejection::malformed(format!("invalid ingest payload: {err}")))?;

    if payload.source_id.trim().is_empty() {
        return Err(Rejection::malformed("source_id must not be empty"));
    }

    let timestamp = OffsetDateTime::parse(&payload.timestamp, &Rfc3339).map_err(|err| {
        Rejection::malformed(format!(
            "timestamp {:?} is not an ISO-8601 instant with offset: {err}",
            payload.timestamp
        ))
    })?;

    let count = match &payload.data.count {
        serde_json::Value::Number(number) => number.as_i64().ok_or_else(|| {
            Rejection::invalid_value(format!("count must be a whole number, got {number}"))
        })?,
        serde_json::Value::Null => {
            return Err(Rejection::malformed("data.count is required"));
        }
        other => {
            return Err(Rejection::invalid_value(format!(
                "count must be numeric, got {other}"
            )));
        }
    };

    Ok(SensorReading {
        sensor_id: payload.source_id,
        source_type: payload.source_type,
        timestamp,
        received_at,
        count,
    })
}

/// Entry point for sensor feeds. Safe to call from many threads at once.
#[derive(Debug)]
pub struct IngestionGateway {
    store: Arc<ZoneStore>,
    engine: AlertEngine,
    thresholds: RiskThresholds,
    max_future_skew: Duration,
    events: broadcast::Sender<AlertEvent>,
}

impl IngestionGateway {
    pub fn new(store: Arc<ZoneStore>, engine: AlertEngine) -> Self {
        let (events, _events_rx) = broadcast::channel(ALERT_EVENT_CAPACITY);
        let thresholds = engine.policy().thresholds;
        Self {
            store,
            engine,
            thresholds,
            max_future_skew: Duration::seconds(DEFAULT_MAX_FUTURE_SKEW_SECS as i64),
            events,
        }
    }

    /// How far a sensor clock may run ahead of ours before its readings are refused.
    pub fn with_max_future_skew(mut self, max_future_skew: Duration) -> Self {
        self.max_future_skew = max_future_skew;
        self
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// Alert transitions, published after the zone lock is released.
    /// Receivers that fall behind lose the oldest events.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub fn ingest(&self, raw: &[u8], received_at: OffsetDateTime) -> Result<Accepted, IngestError> {
        let reading = parse_payload(raw, received_at).inspect_err(|rejection| {
            warn!(
                reason = %rejection.reason,
                detail = %rejection.detail,
                "Rejected ingest payload"
            );
        })?;
        self.submit(&reading)
    }

    /// Record an already-parsed reading and apply the resulting alert transition.
    pub fn submit(&self, reading: &SensorReading) -> Result<Accepted, IngestError> {
        let result = self.check_clock(reading).map_err(IngestError::from).and_then(|()| {
            let engine = &self.engine;
            let thresholds = &self.thresholds;
            self.store.record_then(reading, |zone, state, alert| {
                let risk = thresholds.classify(state.density);
                let event = engine.transition(alert, zone, state.density, risk, reading.timestamp);
                (risk, event)
            })
        });
        let recorded = result.inspect_err(|err| {
            warn!(
                sensor_id = %reading.sensor_id,
                source_type = %reading.source_type,
                error = %err,
                "Rejected sensor reading"
            );
        })?;

        let (risk_level, alert_event) = recorded.outcome;
        if let Some(event) = &alert_event {
            event.log(recorded.density);
            // No receivers is fine; nobody is listening yet.
            let _ = self.events.send(event.clone());
        }

        Ok(Accepted {
            source_id: reading.sensor_id.clone(),
            zone_id: recorded.zone_id,
            density: recorded.density,
            risk_level,
            alert_event,
        })
    }

    fn check_clock(&self, reading: &SensorReading) -> Result<(), Rejection> {
        let ahead = reading.timestamp - reading.received_at;
        if ahead > self.max_future_skew {
            return Err(Rejection::invalid_value(format!(
                "timestamp {} is {ahead} ahead of server time {}",
                reading.timestamp, reading.received_at
            )));
        }
        Ok(())
    }
}
