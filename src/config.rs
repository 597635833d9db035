use crate::alert::{AlertPolicy, DEFAULT_RELEASE_MARGIN};
use crate::ingest::DEFAULT_MAX_FUTURE_SKEW_SECS;
use crate::risk::trend::{DEFAULT_LOOKBACK_SECS, DEFAULT_NOISE_FLOOR, TrendConfig};
use crate::risk::{RiskLevel, RiskThresholds};
use crate::state::DEFAULT_HISTORY_CAPACITY;
use crate::status::{DEFAULT_STALE_AFTER_SECS, StatusSettings};
use crate::zone::{ZoneConfig, ZoneRegistry};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub store: Option<StoreSection>,
    #[serde(default)]
    pub risk: Option<RiskThresholds>,
    #[serde(default)]
    pub trend: Option<TrendSection>,
    #[serde(default)]
    pub alerts: Option<AlertsSection>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    /// Density samples kept per zone (default: 50)
    pub history_capacity: Option<usize>,
    /// Seconds without a reading before a zone is reported stale (default: 60)
    pub stale_after_secs: Option<u64>,
    /// Seconds a reading's timestamp may run ahead of the server clock (default: 30)
    pub max_future_skew_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrendSection {
    pub lookback_secs: Option<u64>,
    pub noise_floor: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsSection {
    pub warning_entry: Option<RiskLevel>,
    pub critical_entry: Option<RiskLevel>,
    pub release_margin: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_thresholds()
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.alert_policy().validate().map_err(ConfigError::Invalid)?;

        let trend = self.trend_config();
        if trend.lookback <= time::Duration::ZERO {
            return Err(ConfigError::Invalid(
                "trend.lookback_secs must be positive".to_string(),
            ));
        }
        if !(trend.noise_floor.is_finite() && trend.noise_floor >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "trend.noise_floor must be non-negative, got {}",
                trend.noise_floor
            )));
        }
        if self.history_capacity() == 0 {
            return Err(ConfigError::Invalid(
                "store.history_capacity must be at least 1".to_string(),
            ));
        }

        self.zone_registry()?;
        Ok(())
    }

    pub fn zone_registry(&self) -> Result<ZoneRegistry, ConfigError> {
        ZoneRegistry::new(self.zones.clone())
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn history_capacity(&self) -> usize {
        self.store
            .as_ref()
            .and_then(|s| s.history_capacity)
            .unwrap_or(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn stale_after(&self) -> time::Duration {
        let secs = self
            .store
            .as_ref()
            .and_then(|s| s.stale_after_secs)
            .unwrap_or(DEFAULT_STALE_AFTER_SECS);
        seconds(secs)
    }

    pub fn max_future_skew(&self) -> time::Duration {
        let secs = self
            .store
            .as_ref()
            .and_then(|s| s.max_future_skew_secs)
            .unwrap_or(DEFAULT_MAX_FUTURE_SKEW_SECS);
        seconds(secs)
    }

    pub fn risk_thresholds(&self) -> RiskThresholds {
        self.risk.unwrap_or_default()
    }

    pub fn trend_config(&self) -> TrendConfig {
        let section = self.trend.as_ref();
        TrendConfig {
            lookback: seconds(
                section
                    .and_then(|s| s.lookback_secs)
                    .unwrap_or(DEFAULT_LOOKBACK_SECS),
            ),
            noise_floor: section
                .and_then(|s| s.noise_floor)
                .unwrap_or(DEFAULT_NOISE_FLOOR),
        }
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        let defaults = AlertPolicy::default();
        let section = self.alerts.as_ref();
        AlertPolicy {
            thresholds: self.risk_thresholds(),
            warning_entry: section
                .and_then(|s| s.warning_entry)
                .unwrap_or(defaults.warning_entry),
            critical_entry: section
                .and_then(|s| s.critical_entry)
                .unwrap_or(defaults.critical_entry),
            release_margin: section
                .and_then(|s| s.release_margin)
                .unwrap_or(DEFAULT_RELEASE_MARGIN),
        }
    }

    pub fn status_settings(&self) -> StatusSettings {
        StatusSettings {
            thresholds: self.risk_thresholds(),
            trend: self.trend_config(),
            stale_after: self.stale_after(),
        }
    }
}

fn seconds(secs: u64) -> time::Duration {
    time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
