//! Nest binary sensors

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ha_core::constants::{
    DEVICE_CLASS_BATTERY, DEVICE_CLASS_CONNECTIVITY, DEVICE_CLASS_GAS, DEVICE_CLASS_HEAT,
    DEVICE_CLASS_MOTION, DEVICE_CLASS_OCCUPANCY, DEVICE_CLASS_PROBLEM, DEVICE_CLASS_SAFETY,
    DEVICE_CLASS_SMOKE, DEVICE_CLASS_SOUND, PLATFORM_BINARY_SENSOR, STATE_OFF, STATE_ON,
};
use ha_helpers::{DeviceInfo, Entity};
use serde_json::{json, Value};

use crate::entity::NestDevice;
use crate::models::{ActivityZone, Camera, DeviceRef, NestData, STATE_OK};
use crate::sensor::SensorSource;
use crate::{
    ATTR_ACTIVITY_DETECTED, ATTR_BATTERY_HEALTH, ATTR_CO_STATUS, ATTR_COLOR_STATUS,
    ATTR_MOTION_DETECTED, ATTR_ONLINE, ATTR_PERSON_DETECTED, ATTR_SMOKE_STATUS,
    ATTR_SOUND_DETECTED,
};

#[derive(Debug)]
pub struct BinarySensorType {
    pub key: &'static str,
    /// `None` applies to every device (not structures)
    pub source: Option<SensorSource>,
    pub label: &'static str,
    pub device_class: Option<&'static str>,
}

const fn binary(
    key: &'static str,
    source: Option<SensorSource>,
    label: &'static str,
    device_class: Option<&'static str>,
) -> BinarySensorType {
    BinarySensorType {
        key,
        source,
        label,
        device_class,
    }
}

const STRUCTURE: Option<SensorSource> = Some(SensorSource::Structure);
const THERMOSTAT: Option<SensorSource> = Some(SensorSource::Thermostat);
const PROTECT: Option<SensorSource> = Some(SensorSource::SmokeCoAlarm);
const CAMERA: Option<SensorSource> = Some(SensorSource::Camera);

pub static ACTIVITY_ZONE: BinarySensorType =
    binary("activity_zone", CAMERA, "Activity", Some(DEVICE_CLASS_MOTION));

pub const BINARY_SENSOR_TYPES: &[BinarySensorType] = &[
    binary("away", STRUCTURE, "Away", None),
    binary("battery_low", PROTECT, "Battery Low", Some(DEVICE_CLASS_BATTERY)),
    binary("camera_status", CAMERA, "Status", Some(DEVICE_CLASS_PROBLEM)),
    binary("co_detected", PROTECT, "CO Detected", Some(DEVICE_CLASS_GAS)),
    binary("doorbell", CAMERA, "Doorbell", Some(DEVICE_CLASS_OCCUPANCY)),
    binary("fan", THERMOSTAT, "Fan", None),
    binary("has_leaf", THERMOSTAT, "Has Leaf", None),
    binary("is_locked", THERMOSTAT, "Is Locked", None),
    binary(
        "is_using_emergency_heat",
        THERMOSTAT,
        "Is Using Emergency Heat",
        Some(DEVICE_CLASS_HEAT),
    ),
    binary("motion_detected", CAMERA, "Motion Detected", Some(DEVICE_CLASS_MOTION)),
    binary("online", None, "Online", Some(DEVICE_CLASS_CONNECTIVITY)),
    binary("person_detected", CAMERA, "Person Detected", Some(DEVICE_CLASS_OCCUPANCY)),
    binary("protect_status", PROTECT, "Status", Some(DEVICE_CLASS_PROBLEM)),
    binary("security_state", STRUCTURE, "Security State", Some(DEVICE_CLASS_SAFETY)),
    binary("smoke_detected", PROTECT, "Smoke Detected", Some(DEVICE_CLASS_SMOKE)),
    binary("sound_detected", CAMERA, "Sound Detected", Some(DEVICE_CLASS_SOUND)),
];

/// Sensor types that apply to a device
pub fn binary_sensor_types(device: &DeviceRef) -> impl Iterator<Item = &'static BinarySensorType> {
    let source = match device {
        DeviceRef::Structure(_) => STRUCTURE,
        DeviceRef::Thermostat(_) => THERMOSTAT,
        DeviceRef::SmokeCoAlarm(_) => PROTECT,
        DeviceRef::Camera(_) => CAMERA,
    };
    let is_structure = matches!(device, DeviceRef::Structure(_));
    BINARY_SENSOR_TYPES
        .iter()
        .filter(move |s| s.source == source || (s.source.is_none() && !is_structure))
}

fn not_ok(value: &str) -> bool {
    value != STATE_OK
}

/// Current value of a binary sensor
pub fn binary_value(
    data: &NestData,
    device: &DeviceRef,
    key: &str,
    now: DateTime<Utc>,
) -> Option<bool> {
    match device {
        DeviceRef::Structure(id) => {
            let structure = data.structure(id)?;
            match key {
                "away" => Some(structure.is_away()),
                "security_state" => structure.wwn_security_state.as_deref().map(not_ok),
                _ => None,
            }
        }
        DeviceRef::SmokeCoAlarm(id) => {
            let protect = data.smoke_co_alarm(id)?;
            match key {
                "battery_low" => Some(not_ok(&protect.battery_health)),
                "co_detected" => Some(not_ok(&protect.co_alarm_state)),
                "smoke_detected" => Some(not_ok(&protect.smoke_alarm_state)),
                "protect_status" => Some(protect.has_problem()),
                "online" => Some(protect.is_online),
                _ => None,
            }
        }
        DeviceRef::Thermostat(id) => {
            let thermostat = data.thermostat(id)?;
            match key {
                "fan" => Some(thermostat.fan_timer_active),
                "has_leaf" => Some(thermostat.has_leaf),
                "is_locked" => Some(thermostat.is_locked),
                "is_using_emergency_heat" => Some(thermostat.is_using_emergency_heat),
                "online" => Some(thermostat.is_online),
                _ => None,
            }
        }
        DeviceRef::Camera(id) => {
            let camera = data.camera(id)?;
            match key {
                "camera_status" => Some(camera.activity_detected(now)),
                "doorbell" => Some(camera.is_doorbell && doorbell_ringing(camera, now)),
                "motion_detected" => Some(camera.motion_detected(now)),
                "person_detected" => Some(camera.person_detected(now)),
                "sound_detected" => Some(camera.sound_detected(now)),
                "online" => Some(camera.is_online),
                _ => None,
            }
        }
    }
}

/// A doorbell rings while a person or motion event is ongoing
fn doorbell_ringing(camera: &Camera, now: DateTime<Utc>) -> bool {
    camera.person_detected(now) || camera.motion_detected(now)
}

/// `online`, detections and one `{zone}_activity_detected` per zone
pub fn camera_attributes(camera: &Camera, now: DateTime<Utc>) -> HashMap<String, Value> {
    let mut attrs = HashMap::from([
        (ATTR_ONLINE.to_string(), json!(camera.is_online)),
        (ATTR_MOTION_DETECTED.to_string(), json!(camera.motion_detected(now))),
        (ATTR_PERSON_DETECTED.to_string(), json!(camera.person_detected(now))),
        (ATTR_SOUND_DETECTED.to_string(), json!(camera.sound_detected(now))),
    ]);
    for zone in &camera.activity_zones {
        attrs.insert(
            format!("{}_{}", zone.name.to_lowercase(), ATTR_ACTIVITY_DETECTED),
            json!(camera.has_ongoing_motion_in_zone(zone.id, now)),
        );
    }
    attrs
}

/// A boolean reading of a structure or device, or one camera activity zone
pub struct NestBinarySensor {
    base: NestDevice,
    sensor: &'static BinarySensorType,
    zone: Option<ActivityZone>,
    name: String,
}

impl NestBinarySensor {
    pub(crate) fn new(base: NestDevice, sensor: &'static BinarySensorType, device_name: &str) -> Self {
        let name = match base.device {
            DeviceRef::Structure(_) => format!("{} Nest {}", device_name, sensor.label),
            _ => format!("{} {}", device_name, sensor.label),
        };
        Self {
            base,
            sensor,
            zone: None,
            name,
        }
    }

    pub(crate) fn activity_zone(base: NestDevice, zone: ActivityZone, device_name: &str) -> Self {
        Self {
            name: format!("{} {} Activity", device_name, zone.name),
            base,
            sensor: &ACTIVITY_ZONE,
            zone: Some(zone),
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        let now = Utc::now();
        self.base.read(|data| match &self.zone {
            Some(zone) => data
                .camera(self.base.serial())
                .map(|c| c.has_ongoing_motion_in_zone(zone.id, now)),
            None => binary_value(data, &self.base.device, self.sensor.key, now),
        })
    }
}

#[async_trait]
impl Entity for NestBinarySensor {
    fn domain(&self) -> &'static str {
        PLATFORM_BINARY_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(match &self.zone {
            Some(zone) => format!("{}-{}", self.base.serial(), zone.id),
            None => format!("{}-{}", self.base.serial(), self.sensor.key),
        })
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        self.is_on()
            .map(|on| if on { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.base.base_attributes();
        let now = Utc::now();
        match self.sensor.key {
            "camera_status" => {
                if let Some(camera) = self.base.read(|data| data.camera(self.base.serial()).cloned()) {
                    attrs.extend(camera_attributes(&camera, now));
                }
            }
            "protect_status" => {
                if let Some(protect) =
                    self.base.read(|data| data.smoke_co_alarm(self.base.serial()).cloned())
                {
                    attrs.insert(ATTR_ONLINE.into(), json!(protect.is_online));
                    attrs.insert(ATTR_COLOR_STATUS.into(), json!(protect.ui_color_state));
                    attrs.insert(ATTR_BATTERY_HEALTH.into(), json!(protect.battery_health));
                    attrs.insert(ATTR_CO_STATUS.into(), json!(protect.co_alarm_state));
                    attrs.insert(ATTR_SMOKE_STATUS.into(), json!(protect.smoke_alarm_state));
                }
            }
            _ => {}
        }
        attrs
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn device_class(&self) -> Option<String> {
        self.sensor.device_class.map(String::from)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn data(now: DateTime<Utc>) -> NestData {
        serde_json::from_value(json!({
            "structures": {
                "s1": {"structure_id": "s1", "name": "Home", "away": "away", "wwn_security_state": "deter"}
            },
            "devices": {
                "smoke_co_alarms": {
                    "p1": {
                        "device_id": "p1",
                        "is_online": true,
                        "battery_health": "ok",
                        "co_alarm_state": "ok",
                        "smoke_alarm_state": "warning",
                        "ui_color_state": "yellow"
                    }
                },
                "cameras": {
                    "c1": {
                        "device_id": "c1",
                        "is_online": true,
                        "is_doorbell": true,
                        "activity_zones": [{"id": 7, "name": "Porch"}],
                        "last_event": {
                            "has_person": true,
                            "start_time": (now - Duration::seconds(10)).to_rfc3339(),
                            "activity_zone_ids": ["7"]
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_binary_values() {
        let now = Utc::now();
        let data = data(now);

        let structure = DeviceRef::Structure("s1".to_string());
        assert_eq!(binary_value(&data, &structure, "away", now), Some(true));
        assert_eq!(binary_value(&data, &structure, "security_state", now), Some(true));

        let protect = DeviceRef::SmokeCoAlarm("p1".to_string());
        assert_eq!(binary_value(&data, &protect, "smoke_detected", now), Some(true));
        assert_eq!(binary_value(&data, &protect, "co_detected", now), Some(false));
        assert_eq!(binary_value(&data, &protect, "protect_status", now), Some(true));

        let camera = DeviceRef::Camera("c1".to_string());
        assert_eq!(binary_value(&data, &camera, "person_detected", now), Some(true));
        assert_eq!(binary_value(&data, &camera, "sound_detected", now), Some(false));
        assert_eq!(binary_value(&data, &camera, "doorbell", now), Some(true));
        assert_eq!(binary_value(&data, &camera, "camera_status", now), Some(true));
    }

    #[test]
    fn test_camera_attributes_include_zones() {
        let now = Utc::now();
        let data = data(now);
        let attrs = camera_attributes(data.camera("c1").unwrap(), now);
        assert_eq!(attrs["porch_activity_detected"], json!(true));
        assert_eq!(attrs[ATTR_PERSON_DETECTED], json!(true));
    }

    #[test]
    fn test_types_per_device() {
        let keys = |device: DeviceRef| -> Vec<&'static str> {
            binary_sensor_types(&device).map(|s| s.key).collect()
        };
        assert_eq!(keys(DeviceRef::Structure("s".into())), vec!["away", "security_state"]);
        assert!(keys(DeviceRef::Thermostat("t".into())).contains(&"online"));
        assert!(keys(DeviceRef::Camera("c".into())).contains(&"camera_status"));
        assert!(!keys(DeviceRef::Camera("c".into())).contains(&"fan"));
    }
}
