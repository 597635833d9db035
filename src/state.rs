use crate::alert::AlertState;
use crate::error::{AppError, IngestError, RejectReason, Rejection};
use crate::risk;
use crate::zone::{ZoneConfig, ZoneRegistry};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tracing::debug;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub sensor_id: String,
    pub source_type: String,
    /// Sensor clock. Orders readings within a zone.
    pub timestamp: OffsetDateTime,
    /// Server clock at ingestion. Drives freshness.
    pub received_at: OffsetDateTime,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensitySample {
    pub timestamp: OffsetDateTime,
    pub density: f64,
}

/// Fixed-capacity, timestamp-ordered window of density samples.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    samples: VecDeque<DensitySample>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: DensitySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&DensitySample> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DensitySample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<DensitySample> {
        self.samples.iter().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    pub zone_id: String,
    /// Latest count per contributing sensor. Sensors that never reported are absent.
    pub sensor_counts: HashMap<String, u64>,
    pub aggregated_count: u64,
    pub density: f64,
    pub last_updated: Option<OffsetDateTime>,
    pub last_received: Option<OffsetDateTime>,
    pub history: History,
}

impl ZoneState {
    pub fn new(zone_id: impl Into<String>, history_capacity: usize) -> Self {
        Self {
            zone_id: zone_id.into(),
            sensor_counts: HashMap::new(),
            aggregated_count: 0,
            density: 0.0,
            last_updated: None,
            last_received: None,
            history: History::new(history_capacity),
        }
    }
}

/// Everything guarded by one zone's lock: live readings and alert state move together.
#[derive(Debug, Clone)]
pub struct ZoneCell {
    pub state: ZoneState,
    pub alert: AlertState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<T> {
    pub zone_id: String,
    pub aggregated_count: u64,
    pub density: f64,
    pub outcome: T,
}

/// Per-zone serialized store of live readings.
///
/// The zone map is built once from the registry and never resized, so lookups
/// need no outer lock; writers to different zones never contend.
#[derive(Debug)]
pub struct ZoneStore {
    registry: Arc<ZoneRegistry>,
    zones: HashMap<String, Mutex<ZoneCell>>,
}

impl ZoneStore {
    pub fn new(registry: Arc<ZoneRegistry>, history_capacity: usize) -> Self {
        let zones = registry
            .zones()
            .iter()
            .map(|zone| {
                let cell = ZoneCell {
                    state: ZoneState::new(zone.zone_id.clone(), history_capacity),
                    alert: AlertState::default(),
                };
                (zone.zone_id.clone(), Mutex::new(cell))
            })
            .collect();
        Self { registry, zones }
    }

    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    /// Record a reading and, under the same lock, hand the updated zone to `then`.
    ///
    /// `then` runs only for accepted readings and may mutate the alert state; the
    /// zone is never observable between the density update and that callback.
    /// `then` runs under the zone lock and must not log or block.
    pub fn record_then<T>(
        &self,
        reading: &SensorReading,
        then: impl FnOnce(&ZoneConfig, &ZoneState, &mut AlertState) -> T,
    ) -> Result<Recorded<T>, IngestError> {
        let zone = self.registry.zone_for_sensor(&reading.sensor_id).ok_or_else(|| {
            Rejection::new(
                RejectReason::UnmappedSensor,
                format!("sensor {} is not assigned to any zone", reading.sensor_id),
            )
        })?;

        let count = u64::try_from(reading.count).map_err(|_| {
            Rejection::invalid_value(format!("count must be non-negative, got {}", reading.count))
        })?;

        let recorded = {
            let mut guard = self.lock(&zone.zone_id)?;
            let cell = &mut *guard;

            if let Some(last_updated) = cell.state.last_updated
                && reading.timestamp <= last_updated
            {
                return Err(Rejection::new(
                    RejectReason::StaleReading,
                    format!(
                        "reading at {} is not newer than zone {} last update at {}",
                        reading.timestamp, zone.zone_id, last_updated
                    ),
                )
                .into());
            }

            let state = &mut cell.state;
            state.sensor_counts.insert(reading.sensor_id.clone(), count);
            let aggregated_count = zone
                .sensor_ids
                .iter()
                .filter_map(|sensor_id| state.sensor_counts.get(sensor_id))
                .fold(0u64, |sum, count| sum.saturating_add(*count));
            state.aggregated_count = aggregated_count;
            state.density = risk::density(aggregated_count, zone.capacity);
            state.last_updated = Some(reading.timestamp);
            state.last_received = Some(reading.received_at);
            state.history.push(DensitySample {
                timestamp: reading.timestamp,
                density: state.density,
            });

            let outcome = then(zone, &cell.state, &mut cell.alert);
            Recorded {
                zone_id: zone.zone_id.clone(),
                aggregated_count,
                density: cell.state.density,
                outcome,
            }
        };

        debug!(
            zone_id = %recorded.zone_id,
            sensor_id = %reading.sensor_id,
            count,
            aggregated_count = recorded.aggregated_count,
            density = recorded.density,
            "Reading recorded"
        );
        Ok(recorded)
    }

    pub fn record(&self, reading: &SensorReading) -> Result<Recorded<()>, IngestError> {
        self.record_then(reading, |_, _, _| ())
    }

    /// Copy of the zone's live state.
    pub fn snapshot(&self, zone_id: &str) -> Result<ZoneState, AppError> {
        self.with_zone(zone_id, |cell| cell.state.clone())
    }

    /// Run `read` against a zone while holding its lock. Must not block.
    pub fn with_zone<T>(&self, zone_id: &str, read: impl FnOnce(&ZoneCell) -> T) -> Result<T, AppError> {
        let guard = self.lock(zone_id)?;
        Ok(read(&guard))
    }

    fn lock(&self, zone_id: &str) -> Result<std::sync::MutexGuard<'_, ZoneCell>, AppError> {
        let cell = self
            .zones
            .get(zone_id)
            .ok_or_else(|| AppError::UnknownZone(zone_id.to_string()))?;
        cell.lock()
            .map_err(|_| AppError::ZoneLock(zone_id.to_string()))
    }
}
