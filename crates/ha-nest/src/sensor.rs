//! Nest sensors
//!
//! [`NestSensor`] reads the developer API tree, [`NestWebSensor`] the web
//! client's property maps (backplate and remote temperature sensors,
//! outdoor temperature, target humidity).

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{
    ATTR_BATTERY_LEVEL, DEVICE_CLASS_BATTERY, DEVICE_CLASS_HUMIDITY, DEVICE_CLASS_TEMPERATURE,
    DEVICE_CLASS_TIMESTAMP, PERCENTAGE, PLATFORM_SENSOR,
};
use ha_core::util::round_to;
use ha_helpers::{DeviceInfo, Entity};
use serde_json::{json, Value};

use crate::entity::{NestDevice, WebLink, MODEL_TEMPERATURE_SENSOR};
use crate::models::{DeviceRef, NestData, Target, TemperatureScale};
use crate::{DOMAIN, MANUFACTURER};

const TIME_MINUTES: &str = "min";

/// Which part of the tree a sensor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    Structure,
    Thermostat,
    SmokeCoAlarm,
    Camera,
    TemperatureSensor,
}

#[derive(Debug)]
pub struct SensorType {
    pub key: &'static str,
    pub source: SensorSource,
    pub label: &'static str,
    pub device_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub icon: Option<&'static str>,
}

const fn sensor(
    key: &'static str,
    source: SensorSource,
    label: &'static str,
    device_class: Option<&'static str>,
    unit: Option<&'static str>,
    icon: Option<&'static str>,
) -> SensorType {
    SensorType {
        key,
        source,
        label,
        device_class,
        unit,
        icon,
    }
}

pub const SENSOR_TYPES: &[SensorType] = &[
    sensor("battery_health", SensorSource::SmokeCoAlarm, "Battery Health", None, None, None),
    sensor("co_status", SensorSource::SmokeCoAlarm, "CO Status", None, None, None),
    sensor("color_status", SensorSource::SmokeCoAlarm, "Color Status", None, None, None),
    sensor(
        "eta_begin",
        SensorSource::Structure,
        "ETA",
        Some(DEVICE_CLASS_TIMESTAMP),
        None,
        Some("mdi:calendar-clock"),
    ),
    sensor(
        "fan_timer",
        SensorSource::Thermostat,
        "Fan Timer Duration",
        None,
        Some(TIME_MINUTES),
        Some("mdi:timer-outline"),
    ),
    sensor(
        "fan_timeout",
        SensorSource::Thermostat,
        "Fan Timer Timeout",
        Some(DEVICE_CLASS_TIMESTAMP),
        None,
        Some("mdi:calendar-clock"),
    ),
    sensor(
        "humidity",
        SensorSource::Thermostat,
        "Humidity",
        Some(DEVICE_CLASS_HUMIDITY),
        Some(PERCENTAGE),
        None,
    ),
    sensor("hvac_state", SensorSource::Thermostat, "HVAC State", None, None, None),
    sensor("mode", SensorSource::Thermostat, "Operation Mode", None, None, None),
    sensor("security_state", SensorSource::Structure, "Security State", None, None, None),
    sensor("smoke_status", SensorSource::SmokeCoAlarm, "Smoke Status", None, None, None),
    sensor(
        "target",
        SensorSource::Thermostat,
        "Target Temperature",
        Some(DEVICE_CLASS_TEMPERATURE),
        None,
        None,
    ),
    sensor(
        "time_to_target",
        SensorSource::Thermostat,
        "Time to Target",
        None,
        Some(TIME_MINUTES),
        Some("mdi:clock-outline"),
    ),
    sensor(
        "temperature",
        SensorSource::Thermostat,
        "Current Temperature",
        Some(DEVICE_CLASS_TEMPERATURE),
        None,
        None,
    ),
];

pub const WEB_SENSOR_TYPES: &[SensorType] = &[
    sensor(
        "backplate_temperature",
        SensorSource::Thermostat,
        "Temperature",
        Some(DEVICE_CLASS_TEMPERATURE),
        None,
        None,
    ),
    sensor(
        "battery_level",
        SensorSource::TemperatureSensor,
        "Temperature Sensor Battery",
        Some(DEVICE_CLASS_BATTERY),
        None,
        None,
    ),
    sensor(
        "current_temperature",
        SensorSource::TemperatureSensor,
        "Temperature",
        Some(DEVICE_CLASS_TEMPERATURE),
        None,
        None,
    ),
    sensor(
        "target_humidity",
        SensorSource::Thermostat,
        "Thermostat Target Humidity",
        Some(DEVICE_CLASS_HUMIDITY),
        Some(PERCENTAGE),
        None,
    ),
    sensor(
        "temp_c",
        SensorSource::Structure,
        "Outdoor Temperature",
        Some(DEVICE_CLASS_TEMPERATURE),
        None,
        None,
    ),
];

pub fn sensor_types(source: SensorSource) -> impl Iterator<Item = &'static SensorType> {
    SENSOR_TYPES.iter().filter(move |s| s.source == source)
}

pub fn web_sensor_types(source: SensorSource) -> impl Iterator<Item = &'static SensorType> {
    WEB_SENSOR_TYPES.iter().filter(move |s| s.source == source)
}

fn is_temperature(sensor: &SensorType) -> bool {
    sensor.device_class == Some(DEVICE_CLASS_TEMPERATURE)
}

/// Raw value of a developer API sensor
pub fn sensor_value(data: &NestData, device: &DeviceRef, key: &str) -> Option<Value> {
    match device {
        DeviceRef::Structure(id) => {
            let structure = data.structure(id)?;
            match key {
                "eta_begin" => structure.eta_begin.clone().map(Value::from),
                "security_state" => structure.wwn_security_state.clone().map(Value::from),
                _ => None,
            }
        }
        DeviceRef::SmokeCoAlarm(id) => {
            let protect = data.smoke_co_alarm(id)?;
            let value = match key {
                "battery_health" => &protect.battery_health,
                "co_status" => &protect.co_alarm_state,
                "color_status" => &protect.ui_color_state,
                "smoke_status" => &protect.smoke_alarm_state,
                _ => return None,
            };
            Some(json!(value))
        }
        DeviceRef::Thermostat(id) => {
            let thermostat = data.thermostat(id)?;
            match key {
                "fan_timer" => thermostat.fan_timer_duration.map(Value::from),
                "fan_timeout" => thermostat.fan_timer_timeout.clone().map(Value::from),
                "humidity" => thermostat.humidity.map(Value::from),
                "hvac_state" => Some(json!(thermostat.hvac_state)),
                "mode" => Some(json!(thermostat.hvac_mode)),
                "time_to_target" => thermostat.time_to_target.clone().map(Value::from),
                "temperature" => thermostat.temperature().map(|t| json!(round_to(t, 1))),
                "target" => thermostat.target().map(|target| match target {
                    Target::Range(low, high) => json!(format!("{}-{}", low as i64, high as i64)),
                    Target::Single(t) => json!(round_to(t, 1)),
                }),
                _ => None,
            }
        }
        DeviceRef::Camera(_) => None,
    }
}

fn state_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// One developer API value
pub struct NestSensor {
    base: NestDevice,
    sensor: &'static SensorType,
    name: String,
}

impl NestSensor {
    pub(crate) fn new(base: NestDevice, sensor: &'static SensorType, device_name: &str) -> Self {
        let name = match base.device {
            DeviceRef::Structure(_) => format!("{} Nest {}", device_name, sensor.label),
            _ => format!("{} {}", device_name, sensor.label),
        };
        Self { base, sensor, name }
    }

    fn scale(&self) -> Option<TemperatureScale> {
        self.base
            .read(|data| data.thermostat(self.base.serial()).map(|t| t.temperature_scale))
    }
}

#[async_trait]
impl Entity for NestSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-{}", self.base.serial(), self.sensor.key))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        self.base
            .read(|data| sensor_value(data, &self.base.device, self.sensor.key))
            .map(state_string)
    }

    fn attributes(&self) -> HashMap<String, Value> {
        self.base.base_attributes()
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn icon(&self) -> Option<String> {
        self.sensor.icon.map(String::from)
    }

    fn device_class(&self) -> Option<String> {
        self.sensor.device_class.map(String::from)
    }

    fn unit_of_measurement(&self) -> Option<String> {
        if is_temperature(self.sensor) {
            return self.scale().map(|s| s.unit().to_string());
        }
        self.sensor.unit.map(String::from)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }
}

/// One web client value
///
/// `base` is the structure or thermostat the value belongs to; remote
/// temperature sensors hang off their thermostat.
pub struct NestWebSensor {
    base: NestDevice,
    web: WebLink,
    sensor: &'static SensorType,
    name: String,
}

impl NestWebSensor {
    pub(crate) fn new(
        base: NestDevice,
        web: WebLink,
        sensor: &'static SensorType,
        structure_name: &str,
    ) -> Self {
        let name = match base.device {
            DeviceRef::Structure(_) => format!("{} {}", structure_name, sensor.label),
            _ => {
                let location = web
                    .value("location")
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                format!("{} {}", location, sensor.label).trim().to_string()
            }
        };
        Self {
            base,
            web,
            sensor,
            name,
        }
    }

    fn scale(&self) -> TemperatureScale {
        self.base
            .read(|data| Some(data.structure_scale(&self.base.structure_id)))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Entity for NestWebSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-{}", self.web.id, self.sensor.key))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        if is_temperature(self.sensor) {
            let celsius = self.web.number(self.sensor.key)?;
            return Some(match self.scale() {
                TemperatureScale::C => celsius.to_string(),
                TemperatureScale::F => TemperatureScale::F.from_celsius(celsius).round().to_string(),
            });
        }
        self.web.value(self.sensor.key).map(state_string)
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.base.base_attributes();
        if self.sensor.source == SensorSource::TemperatureSensor {
            if let Some(level) = self.web.value("battery_level") {
                attrs.insert(ATTR_BATTERY_LEVEL.to_string(), level);
            }
        }
        attrs
    }

    fn available(&self) -> bool {
        self.web.available() && self.web.value("name").is_some()
    }

    fn icon(&self) -> Option<String> {
        self.sensor.icon.map(String::from)
    }

    fn device_class(&self) -> Option<String> {
        self.sensor.device_class.map(String::from)
    }

    fn unit_of_measurement(&self) -> Option<String> {
        if is_temperature(self.sensor) {
            return Some(self.scale().unit().to_string());
        }
        self.sensor.unit.map(String::from)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        if self.sensor.source != SensorSource::TemperatureSensor {
            return self.base.device_info();
        }
        let name = self
            .web
            .value("name")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| self.web.id.clone());
        Some(
            DeviceInfo::new(DOMAIN, self.web.id.clone())
                .with_name(name)
                .with_manufacturer(MANUFACTURER)
                .with_model(MODEL_TEMPERATURE_SENSOR)
                .with_via_device(DOMAIN, self.base.serial()),
        )
    }

    fn should_poll(&self) -> bool {
        false
    }
}
