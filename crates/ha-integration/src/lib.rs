//! Integration sensor
//!
//! Integrates the numeric state of a source sensor over time with a left,
//! right or trapezoidal Riemann sum. Configured from YAML
//! (`sensor: - platform: integration`) or through a config flow.

pub mod config_flow;
pub mod sensor;

use std::collections::HashMap;
use std::sync::Arc;

use ha_config_entries::ConfigEntry;
use ha_core::EntityId;
use ha_helpers::{EntityHandle, EntityPlatform, RestoreStateStore};
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub use config_flow::{IntegrationConfigFlow, IntegrationOptionsFlow};
pub use sensor::IntegrationSensor;

pub const DOMAIN: &str = "integration";
pub const DEFAULT_NAME: &str = "integration";
pub const DEFAULT_ROUND: u32 = 3;
pub const MAX_ROUND: u32 = 3;
pub const ICON: &str = "mdi:chart-histogram";
pub const ATTR_SOURCE_ID: &str = "source";

pub const CONF_SOURCE: &str = "source";
pub const CONF_NAME: &str = "name";
pub const CONF_ROUND: &str = "round";
pub const CONF_UNIT_PREFIX: &str = "unit_prefix";
pub const CONF_UNIT_TIME: &str = "unit_time";
pub const CONF_UNIT: &str = "unit";
pub const CONF_METHOD: &str = "method";

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("invalid integration config: {0}")]
    InvalidConfig(String),
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// SI prefix applied to the integral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitPrefix {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "k")]
    Kilo,
    #[serde(rename = "M")]
    Mega,
    #[serde(rename = "G")]
    Giga,
    #[serde(rename = "T")]
    Tera,
}

impl UnitPrefix {
    pub const ALL: [UnitPrefix; 5] = [
        UnitPrefix::None,
        UnitPrefix::Kilo,
        UnitPrefix::Mega,
        UnitPrefix::Giga,
        UnitPrefix::Tera,
    ];

    pub fn factor(self) -> f64 {
        match self {
            UnitPrefix::None => 1.0,
            UnitPrefix::Kilo => 1e3,
            UnitPrefix::Mega => 1e6,
            UnitPrefix::Giga => 1e9,
            UnitPrefix::Tera => 1e12,
        }
    }

    /// Symbol as written in configuration (`none` for no prefix)
    pub fn key(self) -> &'static str {
        match self {
            UnitPrefix::None => "none",
            UnitPrefix::Kilo => "k",
            UnitPrefix::Mega => "M",
            UnitPrefix::Giga => "G",
            UnitPrefix::Tera => "T",
        }
    }

    /// Symbol used in a unit of measurement
    pub fn symbol(self) -> &'static str {
        match self {
            UnitPrefix::None => "",
            other => other.key(),
        }
    }
}

/// Time unit the integral is expressed per
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitTime {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "min")]
    Minutes,
    #[default]
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
}

impl UnitTime {
    pub const ALL: [UnitTime; 4] = [
        UnitTime::Seconds,
        UnitTime::Minutes,
        UnitTime::Hours,
        UnitTime::Days,
    ];

    pub fn seconds(self) -> f64 {
        match self {
            UnitTime::Seconds => 1.0,
            UnitTime::Minutes => 60.0,
            UnitTime::Hours => 3600.0,
            UnitTime::Days => 86400.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnitTime::Seconds => "s",
            UnitTime::Minutes => "min",
            UnitTime::Hours => "h",
            UnitTime::Days => "d",
        }
    }
}

/// Riemann sum variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Left,
    Right,
    #[default]
    Trapezoidal,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Left, Method::Right, Method::Trapezoidal];

    pub fn key(self) -> &'static str {
        match self {
            Method::Left => "left",
            Method::Right => "right",
            Method::Trapezoidal => "trapezoidal",
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_round() -> u32 {
    DEFAULT_ROUND
}

/// Configuration of one integration sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Entity id of the sensor being integrated
    pub source: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Decimal places of the reported state
    #[serde(default = "default_round")]
    pub round: u32,
    #[serde(default)]
    pub unit_prefix: UnitPrefix,
    #[serde(default)]
    pub unit_time: UnitTime,
    /// Fixed unit; derived from the source unit when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub method: Method,
}

impl IntegrationConfig {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: default_name(),
            round: DEFAULT_ROUND,
            unit_prefix: UnitPrefix::default(),
            unit_time: UnitTime::default(),
            unit: None,
            method: Method::default(),
        }
    }

    /// Parse and validate a config map
    pub fn from_value(value: Value) -> IntegrationResult<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| IntegrationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IntegrationResult<()> {
        if self.round > MAX_ROUND {
            return Err(IntegrationError::InvalidConfig(format!(
                "round must be between 0 and {}, got {}",
                MAX_ROUND, self.round
            )));
        }
        if self.source.parse::<EntityId>().is_err() {
            return Err(IntegrationError::InvalidConfig(format!(
                "invalid source entity id '{}'",
                self.source
            )));
        }
        Ok(())
    }

    /// Entry data overlaid with entry options
    pub fn from_entry(entry: &ConfigEntry) -> IntegrationResult<Self> {
        let mut merged: HashMap<String, Value> = entry.data.clone();
        merged.extend(entry.options.clone());
        merged.retain(|_, v| !v.is_null());
        Self::from_value(serde_json::to_value(merged).map_err(|e| {
            IntegrationError::InvalidConfig(e.to_string())
        })?)
    }
}

/// A running integration sensor
pub struct IntegrationHandle {
    pub entity_id: EntityId,
    pub sensor: Arc<tokio::sync::Mutex<IntegrationSensor>>,
    task: JoinHandle<()>,
}

impl IntegrationHandle {
    /// Stop following the source
    pub fn unload(&self) {
        self.task.abort();
    }
}

/// Add an integration sensor to `platform` and start following its source
pub async fn setup_sensor(
    hass: &Hass,
    platform: &Arc<EntityPlatform>,
    config: IntegrationConfig,
    unique_id: Option<String>,
    restore: &RestoreStateStore,
) -> IntegrationResult<IntegrationHandle> {
    config.validate()?;
    let source = config.source.clone();
    let sensor = Arc::new(tokio::sync::Mutex::new(IntegrationSensor::new(
        config, unique_id,
    )));

    let added = platform
        .add_entities(vec![sensor.clone() as EntityHandle], false).await;
    let Some(entity_id) = added.into_iter().next() else {
        return Err(IntegrationError::InvalidConfig(
            "sensor was not added".to_string(),
        ));
    };

    sensor
        .lock()
        .await
        .restore(restore.last_state(&entity_id.to_string()).as_ref());
    platform.write_state(&entity_id).await;

    let task = sensor::track_source(hass, platform.clone(), entity_id.clone(), sensor.clone());
    info!(entity_id = %entity_id, source = %source, "Integration sensor set up");

    Ok(IntegrationHandle {
        entity_id,
        sensor,
        task,
    })
}

/// Set up the sensor of a config entry; the entry id is its unique id
pub async fn setup_entry(
    hass: &Hass,
    platform: &Arc<EntityPlatform>,
    entry: &ConfigEntry,
    restore: &RestoreStateStore,
) -> IntegrationResult<IntegrationHandle> {
    let config = IntegrationConfig::from_entry(entry)?;
    setup_sensor(hass, platform, config, Some(entry.entry_id.clone()), restore).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = IntegrationConfig::from_value(json!({"source": "sensor.power"})).unwrap();
        assert_eq!(config.name, "integration");
        assert_eq!(config.round, 3);
        assert_eq!(config.unit_prefix, UnitPrefix::None);
        assert_eq!(config.unit_time, UnitTime::Hours);
        assert_eq!(config.method, Method::Trapezoidal);
    }

    #[test]
    fn test_config_validation() {
        assert!(IntegrationConfig::from_value(json!({"source": "sensor.power", "round": 4})).is_err());
        assert!(IntegrationConfig::from_value(json!({"source": "power"})).is_err());
        assert!(
            IntegrationConfig::from_value(json!({"source": "sensor.power", "unit_prefix": "m"}))
                .is_err()
        );
    }

    #[test]
    fn test_options_override_data() {
        let entry = ConfigEntry::new(DOMAIN, "Energy")
            .with_data(HashMap::from([
                (CONF_SOURCE.to_string(), json!("sensor.power")),
                (CONF_NAME.to_string(), json!("Energy")),
                (CONF_UNIT_PREFIX.to_string(), json!("k")),
                (CONF_METHOD.to_string(), json!("left")),
            ]))
            .with_options(HashMap::from([(CONF_METHOD.to_string(), json!("right"))]));

        let config = IntegrationConfig::from_entry(&entry).unwrap();
        assert_eq!(config.unit_prefix, UnitPrefix::Kilo);
        assert_eq!(config.method, Method::Right);
    }
}
