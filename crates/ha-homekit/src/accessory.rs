//! The accessory seam and the type registry

use std::str::FromStr;

use ha_core::constants::ATTR_FRIENDLY_NAME;
use ha_core::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::camera::{CameraConfig, NestCamera};
use crate::characteristic::{CharValues, HkService};
use crate::fan::Fan;
use crate::humidifier::NestHumidifier;
use crate::sensors::{NestCameraSensor, NestProtect, NestTemperatureSensor};
use crate::smartthings::{SmartThingsButton, SmartThingsMotionSensor};
use crate::thermostat::NestThermostat;
use crate::HomeKitError;

pub const DEFAULT_LOW_BATTERY_THRESHOLD: f64 = 20.0;

/// HomeKit accessory category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Camera = 17,
    Fan = 3,
    Humidifier = 22,
    ProgrammableSwitch = 15,
    Sensor = 10,
    Thermostat = 9,
}

/// A host service call produced by a characteristic write
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub domain: &'static str,
    pub service: &'static str,
    pub data: Map<String, Value>,
    /// Human readable summary of the writes, for the logbook
    pub event: String,
}

impl ServiceRequest {
    pub fn new(domain: &'static str, service: &'static str, entity_id: &str) -> Self {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
        Self {
            domain,
            service,
            data,
            event: String::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }
}

/// Per accessory options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryConfig {
    /// Prefix of every service name; the display name when unset
    #[serde(default, rename = "service_name_prefix", skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default = "default_low_battery_threshold")]
    pub low_battery_threshold: f64,
    #[serde(flatten)]
    pub camera: CameraConfig,
}

fn default_low_battery_threshold() -> f64 {
    DEFAULT_LOW_BATTERY_THRESHOLD
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name_prefix: None,
            low_battery_threshold: DEFAULT_LOW_BATTERY_THRESHOLD,
            camera: CameraConfig::default(),
        }
    }
}

impl AccessoryConfig {
    /// Service name prefix for an entity's state
    pub fn prefix(&self, state: &State) -> String {
        if let Some(prefix) = &self.name_prefix {
            return prefix.clone();
        }
        state
            .attributes
            .get(ATTR_FRIENDLY_NAME)
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| state.entity_id.to_string())
    }
}

/// A bridged accessory
///
/// Accessories are pure: they map host states onto characteristic values
/// and characteristic writes onto host service calls.
pub trait Accessory: Send + Sync {
    fn category(&self) -> Category;

    fn services(&self) -> &[HkService];

    /// Sync characteristics with a new host state
    fn update_state(&mut self, state: &State);

    /// Translate a controller write to the service at `service`
    fn set_chars(&mut self, _service: usize, _values: &CharValues, _state: &State) -> Vec<ServiceRequest> {
        Vec::new()
    }
}

/// The accessory types that can be bridged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessoryType {
    Fan,
    NestCamera,
    NestCameraSensor,
    NestHumidifier,
    NestProtect,
    NestTemperatureSensor,
    NestThermostat,
    SmartThingsButton,
    SmartThingsMotionSensor,
}

impl FromStr for AccessoryType {
    type Err = HomeKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| HomeKitError::UnknownType(s.to_string()))
    }
}

/// Build the accessory of `kind` for an entity's current state
pub fn create_accessory(kind: AccessoryType, state: &State, config: &AccessoryConfig) -> Box<dyn Accessory> {
    match kind {
        AccessoryType::Fan => Box::new(Fan::new(state, config)),
        AccessoryType::NestCamera => Box::new(NestCamera::new(state, config)),
        AccessoryType::NestCameraSensor => Box::new(NestCameraSensor::new(state, config)),
        AccessoryType::NestHumidifier => Box::new(NestHumidifier::new(state, config)),
        AccessoryType::NestProtect => Box::new(NestProtect::new(state, config)),
        AccessoryType::NestTemperatureSensor => Box::new(NestTemperatureSensor::new(state, config)),
        AccessoryType::NestThermostat => Box::new(NestThermostat::new(state, config)),
        AccessoryType::SmartThingsButton => Box::new(SmartThingsButton::new(state, config)),
        AccessoryType::SmartThingsMotionSensor => {
            Box::new(SmartThingsMotionSensor::new(state, config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessory_type_from_str() {
        assert_eq!(
            "NestThermostat".parse::<AccessoryType>().unwrap(),
            AccessoryType::NestThermostat
        );
        assert!(matches!(
            "Lightbulb".parse::<AccessoryType>(),
            Err(HomeKitError::UnknownType(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: AccessoryConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.low_battery_threshold, 20.0);
        assert_eq!(config.name_prefix, None);
        assert_eq!(config.camera.max_fps, 30);
    }
}
