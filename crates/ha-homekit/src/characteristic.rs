//! HomeKit services, characteristics and value conversions

use std::collections::HashMap;

use ha_core::constants::{TEMP_CELSIUS, TEMP_FAHRENHEIT};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::trace;

// Characteristics
pub const CHAR_ACTIVE: &str = "Active";
pub const CHAR_CARBON_MONOXIDE_DETECTED: &str = "CarbonMonoxideDetected";
pub const CHAR_COOLING_THRESHOLD_TEMPERATURE: &str = "CoolingThresholdTemperature";
pub const CHAR_CURRENT_HEATING_COOLING: &str = "CurrentHeatingCoolingState";
pub const CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER: &str = "CurrentHumidifierDehumidifierState";
pub const CHAR_CURRENT_HUMIDITY: &str = "CurrentRelativeHumidity";
pub const CHAR_CURRENT_TEMPERATURE: &str = "CurrentTemperature";
pub const CHAR_HEATING_THRESHOLD_TEMPERATURE: &str = "HeatingThresholdTemperature";
pub const CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY: &str = "RelativeHumidityHumidifierThreshold";
pub const CHAR_MOTION_DETECTED: &str = "MotionDetected";
pub const CHAR_NAME: &str = "Name";
pub const CHAR_OCCUPANCY_DETECTED: &str = "OccupancyDetected";
pub const CHAR_ON: &str = "On";
pub const CHAR_PROGRAMMABLE_SWITCH_EVENT: &str = "ProgrammableSwitchEvent";
pub const CHAR_ROTATION_DIRECTION: &str = "RotationDirection";
pub const CHAR_ROTATION_SPEED: &str = "RotationSpeed";
pub const CHAR_SMOKE_DETECTED: &str = "SmokeDetected";
pub const CHAR_STATUS_ACTIVE: &str = "StatusActive";
pub const CHAR_STATUS_LOW_BATTERY: &str = "StatusLowBattery";
pub const CHAR_SWING_MODE: &str = "SwingMode";
pub const CHAR_TARGET_HEATING_COOLING: &str = "TargetHeatingCoolingState";
pub const CHAR_TARGET_HUMIDIFIER_DEHUMIDIFIER: &str = "TargetHumidifierDehumidifierState";
pub const CHAR_TARGET_HUMIDITY: &str = "TargetRelativeHumidity";
pub const CHAR_TARGET_TEMPERATURE: &str = "TargetTemperature";
pub const CHAR_TEMP_DISPLAY_UNITS: &str = "TemperatureDisplayUnits";

// Services
pub const SERV_CARBON_MONOXIDE_SENSOR: &str = "CarbonMonoxideSensor";
pub const SERV_FAN: &str = "Fan";
pub const SERV_HUMIDIFIER_DEHUMIDIFIER: &str = "HumidifierDehumidifier";
pub const SERV_MOTION_SENSOR: &str = "MotionSensor";
pub const SERV_OCCUPANCY_SENSOR: &str = "OccupancySensor";
pub const SERV_SMOKE_SENSOR: &str = "SmokeSensor";
pub const SERV_STATELESS_PROGRAMMABLE_SWITCH: &str = "StatelessProgrammableSwitch";
pub const SERV_SWITCH: &str = "Switch";
pub const SERV_TEMPERATURE_SENSOR: &str = "TemperatureSensor";
pub const SERV_THERMOSTAT: &str = "Thermostat";

// Properties
pub const PROP_MAX_VALUE: &str = "maxValue";
pub const PROP_MIN_STEP: &str = "minStep";
pub const PROP_MIN_VALUE: &str = "minValue";

/// Characteristic values written by a controller, keyed by characteristic
pub type CharValues = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub value: Value,
    pub properties: IndexMap<&'static str, Value>,
}

/// One HomeKit service of an accessory
#[derive(Debug, Clone, PartialEq)]
pub struct HkService {
    pub kind: &'static str,
    chars: IndexMap<&'static str, Characteristic>,
}

impl HkService {
    /// A service with its `Name` characteristic set
    pub fn new(kind: &'static str, name: impl Into<String>) -> Self {
        let mut service = Self {
            kind,
            chars: IndexMap::new(),
        };
        service.add(CHAR_NAME, json!(name.into()));
        service
    }

    pub fn with(mut self, char: &'static str, value: Value) -> Self {
        self.add(char, value);
        self
    }

    pub fn with_properties(
        mut self,
        char: &'static str,
        value: Value,
        properties: &[(&'static str, Value)],
    ) -> Self {
        self.add(char, value);
        if let Some(c) = self.chars.get_mut(char) {
            c.properties.extend(properties.iter().cloned());
        }
        self
    }

    fn add(&mut self, char: &'static str, value: Value) {
        self.chars.insert(
            char,
            Characteristic {
                value,
                properties: IndexMap::new(),
            },
        );
    }

    pub fn name(&self) -> &str {
        self.value(CHAR_NAME).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn has(&self, char: &str) -> bool {
        self.chars.contains_key(char)
    }

    pub fn value(&self, char: &str) -> Option<&Value> {
        self.chars.get(char).map(|c| &c.value)
    }

    pub fn f64(&self, char: &str) -> Option<f64> {
        self.value(char).and_then(Value::as_f64)
    }

    pub fn property(&self, char: &str, property: &str) -> Option<&Value> {
        self.chars.get(char)?.properties.get(property)
    }

    pub fn characteristics(&self) -> impl Iterator<Item = (&'static str, &Characteristic)> {
        self.chars.iter().map(|(k, v)| (*k, v))
    }

    /// Set a value; returns whether it changed
    ///
    /// Unknown characteristics are ignored.
    pub fn set_value(&mut self, char: &str, value: Value) -> bool {
        let Some(c) = self.chars.get_mut(char) else {
            return false;
        };
        if c.value == value {
            return false;
        }
        trace!(service = self.kind, char, value = %value, "Characteristic changed");
        c.value = value;
        true
    }
}

/// Parse a state or attribute as a number
pub fn convert_to_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// A temperature in `unit` as HomeKit Celsius, one decimal
pub fn temperature_to_homekit(temperature: f64, unit: &str) -> f64 {
    let celsius = if unit == TEMP_FAHRENHEIT {
        (temperature - 32.0) / 1.8
    } else {
        temperature
    };
    (celsius * 10.0).round() / 10.0
}

/// A HomeKit Celsius temperature in `unit`, rounded to halves
pub fn temperature_to_states(temperature: f64, unit: &str) -> f64 {
    let converted = if unit == TEMP_FAHRENHEIT {
        temperature * 1.8 + 32.0
    } else {
        temperature
    };
    (converted * 2.0).round() / 2.0
}

/// The unit a state reports temperatures in
pub fn temperature_unit(attributes: &HashMap<String, Value>) -> &str {
    attributes
        .get(ha_core::constants::ATTR_UNIT_OF_MEASUREMENT)
        .and_then(Value::as_str)
        .unwrap_or(TEMP_CELSIUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_reports_change() {
        let mut service = HkService::new(SERV_SWITCH, "Eco").with(CHAR_ON, json!(false));
        assert_eq!(service.name(), "Eco");
        assert!(service.set_value(CHAR_ON, json!(true)));
        assert!(!service.set_value(CHAR_ON, json!(true)));
        assert!(!service.set_value(CHAR_MOTION_DETECTED, json!(true)));
        assert_eq!(service.value(CHAR_ON), Some(&json!(true)));
    }

    #[test]
    fn test_temperature_conversion() {
        assert_eq!(temperature_to_homekit(68.0, TEMP_FAHRENHEIT), 20.0);
        assert_eq!(temperature_to_homekit(21.46, TEMP_CELSIUS), 21.5);
        assert_eq!(temperature_to_states(20.0, TEMP_FAHRENHEIT), 68.0);
        assert_eq!(temperature_to_states(21.3, TEMP_CELSIUS), 21.5);
    }

    #[test]
    fn test_convert_to_float() {
        assert_eq!(convert_to_float(Some(&json!("21.5"))), Some(21.5));
        assert_eq!(convert_to_float(Some(&json!(40))), Some(40.0));
        assert_eq!(convert_to_float(Some(&json!("unknown"))), None);
        assert_eq!(convert_to_float(None), None);
    }
}
