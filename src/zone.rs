use crate::config::ConfigError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// One monitored area as declared in `[[zones]]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneConfig {
    pub zone_id: String,
    pub display_name: String,
    /// Occupancy at which density reaches 1.0.
    pub capacity: f64,
    pub sensor_ids: Vec<String>,
}

/// Immutable sensor→zone mapping, ordered as configured.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<ZoneConfig>,
    sensor_index: HashMap<String, usize>,
}

impl ZoneRegistry {
    pub fn new(zones: Vec<ZoneConfig>) -> Result<Self, ConfigError> {
        if zones.is_empty() {
            return Err(ConfigError::Invalid("at least one zone is required".to_string()));
        }

        let mut zone_ids = HashSet::new();
        let mut sensor_index = HashMap::new();
        for (index, zone) in zones.iter().enumerate() {
            if zone.zone_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "zone #{} has an empty zone_id",
                    index + 1
                )));
            }
            if !zone_ids.insert(zone.zone_id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate zone_id: {}",
                    zone.zone_id
                )));
            }
            if !(zone.capacity.is_finite() && zone.capacity > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "zone {} capacity must be positive, got {}",
                    zone.zone_id, zone.capacity
                )));
            }
            for sensor_id in &zone.sensor_ids {
                if let Some(previous) = sensor_index.insert(sensor_id.clone(), index) {
                    return Err(ConfigError::Invalid(format!(
                        "sensor {sensor_id} is listed more than once ({} and {})",
                        zones[previous].zone_id, zone.zone_id
                    )));
                }
            }
        }

        Ok(Self {
            zones,
            sensor_index,
        })
    }

    /// Zones in configuration order.
    pub fn zones(&self) -> &[ZoneConfig] {
        &self.zones
    }

    pub fn zone(&self, zone_id: &str) -> Option<&ZoneConfig> {
        self.zones.iter().find(|zone| zone.zone_id == zone_id)
    }

    pub fn zone_for_sensor(&self, sensor_id: &str) -> Option<&ZoneConfig> {
        self.sensor_index
            .get(sensor_id)
            .and_then(|index| self.zones.get(*index))
    }
}
