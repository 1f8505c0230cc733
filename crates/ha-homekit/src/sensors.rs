//! Nest temperature, protect and camera motion sensors

use std::collections::HashMap;

use ha_core::constants::ATTR_BATTERY_LEVEL;
use ha_core::util::title_case;
use ha_core::State;
use ha_nest::{
    ATTR_ACTIVITY_DETECTED, ATTR_BATTERY_HEALTH, ATTR_CO_STATUS, ATTR_MOTION_DETECTED, ATTR_ONLINE,
    ATTR_PERSON_DETECTED, ATTR_SMOKE_STATUS,
};
use serde_json::{json, Value};

use crate::accessory::{Accessory, AccessoryConfig, Category};
use crate::characteristic::*;

fn low_battery(attrs: &HashMap<String, Value>, threshold: f64) -> Option<u8> {
    convert_to_float(attrs.get(ATTR_BATTERY_LEVEL)).map(|level| (level < threshold) as u8)
}

/// Temperature sensor reporting its state in its own unit
pub struct NestTemperatureSensor {
    services: Vec<HkService>,
    low_battery_threshold: f64,
}

impl NestTemperatureSensor {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let service = HkService::new(SERV_TEMPERATURE_SENSOR, format!("{} Temperature", config.prefix(state)))
            .with(CHAR_STATUS_LOW_BATTERY, json!(0))
            .with(CHAR_CURRENT_TEMPERATURE, json!(0));
        let mut sensor = Self {
            services: vec![service],
            low_battery_threshold: config.low_battery_threshold,
        };
        sensor.update_state(state);
        sensor
    }
}

impl Accessory for NestTemperatureSensor {
    fn category(&self) -> Category {
        Category::Sensor
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let attrs = &state.attributes;
        let service = &mut self.services[0];
        if let Some(temperature) = state.as_f64() {
            let unit = temperature_unit(attrs);
            service.set_value(
                CHAR_CURRENT_TEMPERATURE,
                json!(temperature_to_homekit(temperature, unit)),
            );
        }
        if let Some(low) = low_battery(attrs, self.low_battery_threshold) {
            service.set_value(CHAR_STATUS_LOW_BATTERY, json!(low));
        }
    }
}

fn low_battery_from_health(health: &str) -> Option<u8> {
    match health {
        "ok" => Some(0),
        "replace" => Some(1),
        _ => None,
    }
}

fn detected_from_status(status: &str) -> Option<u8> {
    match status {
        "ok" => Some(0),
        "warning" | "emergency" => Some(1),
        _ => None,
    }
}

/// Smoke and carbon monoxide alarm
pub struct NestProtect {
    services: Vec<HkService>,
}

impl NestProtect {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let prefix = config.prefix(state);
        let co = HkService::new(SERV_CARBON_MONOXIDE_SENSOR, format!("{prefix} Carbon Monoxide"))
            .with(CHAR_STATUS_ACTIVE, json!(0))
            .with(CHAR_STATUS_LOW_BATTERY, json!(0))
            .with(CHAR_CARBON_MONOXIDE_DETECTED, json!(0));
        let smoke = HkService::new(SERV_SMOKE_SENSOR, format!("{prefix} Smoke"))
            .with(CHAR_STATUS_ACTIVE, json!(0))
            .with(CHAR_STATUS_LOW_BATTERY, json!(0))
            .with(CHAR_SMOKE_DETECTED, json!(0));
        let mut protect = Self {
            services: vec![co, smoke],
        };
        protect.update_state(state);
        protect
    }
}

impl Accessory for NestProtect {
    fn category(&self) -> Category {
        Category::Sensor
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let attrs = &state.attributes;
        let text = |key: &str| attrs.get(key).and_then(Value::as_str);

        let online = attrs.get(ATTR_ONLINE).and_then(Value::as_bool);
        let low = text(ATTR_BATTERY_HEALTH).and_then(low_battery_from_health);
        for service in &mut self.services {
            if let Some(online) = online {
                service.set_value(CHAR_STATUS_ACTIVE, json!(online));
            }
            if let Some(low) = low {
                service.set_value(CHAR_STATUS_LOW_BATTERY, json!(low));
            }
        }

        if let Some(co) = text(ATTR_CO_STATUS).and_then(detected_from_status) {
            self.services[0].set_value(CHAR_CARBON_MONOXIDE_DETECTED, json!(co));
        }
        if let Some(smoke) = text(ATTR_SMOKE_STATUS).and_then(detected_from_status) {
            self.services[1].set_value(CHAR_SMOKE_DETECTED, json!(smoke));
        }
    }
}

/// Motion, occupancy and per-zone motion services of a Nest camera
///
/// Zones are the `{zone}_activity_detected` attributes present when the
/// accessory is created.
#[derive(Debug, Clone)]
pub(crate) struct MotionServices {
    motion: usize,
    occupancy: usize,
    zones: Vec<(String, usize)>,
}

impl MotionServices {
    pub(crate) fn add(services: &mut Vec<HkService>, prefix: &str, state: &State) -> Self {
        services.push(
            HkService::new(SERV_MOTION_SENSOR, format!("{prefix} Motion"))
                .with(CHAR_STATUS_ACTIVE, json!(0))
                .with(CHAR_MOTION_DETECTED, json!(0)),
        );
        let motion = services.len() - 1;
        services.push(
            HkService::new(SERV_OCCUPANCY_SENSOR, format!("{prefix} Occupancy"))
                .with(CHAR_STATUS_ACTIVE, json!(0))
                .with(CHAR_OCCUPANCY_DETECTED, json!(0)),
        );
        let occupancy = services.len() - 1;

        let mut zone_attrs: Vec<&String> = state
            .attributes
            .keys()
            .filter(|key| key.contains(ATTR_ACTIVITY_DETECTED))
            .collect();
        zone_attrs.sort();

        let zones = zone_attrs
            .into_iter()
            .map(|attr| {
                let zone = attr
                    .replace(&format!("_{ATTR_ACTIVITY_DETECTED}"), "")
                    .replace('_', " ");
                services.push(
                    HkService::new(SERV_MOTION_SENSOR, format!("{prefix} {} Motion", title_case(&zone)))
                        .with(CHAR_STATUS_ACTIVE, json!(0))
                        .with(CHAR_MOTION_DETECTED, json!(0)),
                );
                (attr.clone(), services.len() - 1)
            })
            .collect();

        Self {
            motion,
            occupancy,
            zones,
        }
    }

    pub(crate) fn update(&self, services: &mut [HkService], state: &State) {
        let flag = |key: &str| state.attributes.get(key).and_then(Value::as_bool);
        let online = flag(ATTR_ONLINE);

        if let Some(online) = online {
            services[self.motion].set_value(CHAR_STATUS_ACTIVE, json!(online));
            services[self.occupancy].set_value(CHAR_STATUS_ACTIVE, json!(online));
        }
        if let Some(motion) = flag(ATTR_MOTION_DETECTED) {
            services[self.motion].set_value(CHAR_MOTION_DETECTED, json!(motion));
        }
        if let Some(person) = flag(ATTR_PERSON_DETECTED) {
            services[self.occupancy].set_value(CHAR_OCCUPANCY_DETECTED, json!(person));
        }
        for (attr, index) in &self.zones {
            if let Some(online) = online {
                services[*index].set_value(CHAR_STATUS_ACTIVE, json!(online));
            }
            if let Some(detected) = flag(attr) {
                services[*index].set_value(CHAR_MOTION_DETECTED, json!(detected));
            }
        }
    }
}

/// Motion and occupancy of a camera without its stream
pub struct NestCameraSensor {
    services: Vec<HkService>,
    motion: MotionServices,
}

impl NestCameraSensor {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let mut services = Vec::new();
        let motion = MotionServices::add(&mut services, &config.prefix(state), state);
        let mut sensor = Self { services, motion };
        sensor.update_state(state);
        sensor
    }
}

impl Accessory for NestCameraSensor {
    fn category(&self) -> Category {
        Category::Sensor
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        self.motion.update(&mut self.services, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};

    fn state(entity_id: &str, value: &str, attrs: Value) -> State {
        let attributes: HashMap<String, Value> = serde_json::from_value(attrs).unwrap();
        State::new(entity_id.parse::<EntityId>().unwrap(), value, attributes, Context::new())
    }

    #[test]
    fn test_temperature_sensor_converts_unit() {
        let sensor_state = state(
            "sensor.hallway_temperature",
            "68",
            json!({"friendly_name": "Hallway", "unit_of_measurement": "°F", "battery_level": 15}),
        );
        let sensor = NestTemperatureSensor::new(&sensor_state, &AccessoryConfig::default());
        let service = &sensor.services()[0];
        assert_eq!(service.name(), "Hallway Temperature");
        assert_eq!(service.f64(CHAR_CURRENT_TEMPERATURE), Some(20.0));
        assert_eq!(service.value(CHAR_STATUS_LOW_BATTERY), Some(&json!(1)));

        let config = AccessoryConfig {
            low_battery_threshold: 10.0,
            ..AccessoryConfig::default()
        };
        let sensor = NestTemperatureSensor::new(&sensor_state, &config);
        assert_eq!(sensor.services()[0].value(CHAR_STATUS_LOW_BATTERY), Some(&json!(0)));
    }

    #[test]
    fn test_protect_status_mapping() {
        let mut protect = NestProtect::new(
            &state(
                "binary_sensor.kitchen_protect_online",
                "on",
                json!({"friendly_name": "Kitchen", "online": true, "battery_health": "replace",
                       "co_status": "ok", "smoke_status": "emergency"}),
            ),
            &AccessoryConfig::default(),
        );
        let services = protect.services();
        assert_eq!(services[0].name(), "Kitchen Carbon Monoxide");
        assert_eq!(services[0].value(CHAR_STATUS_ACTIVE), Some(&json!(true)));
        assert_eq!(services[0].value(CHAR_CARBON_MONOXIDE_DETECTED), Some(&json!(0)));
        assert_eq!(services[1].value(CHAR_SMOKE_DETECTED), Some(&json!(1)));
        assert_eq!(services[1].value(CHAR_STATUS_LOW_BATTERY), Some(&json!(1)));

        // unknown statuses keep the previous value
        protect.update_state(&state(
            "binary_sensor.kitchen_protect_online",
            "on",
            json!({"co_status": "unknown", "smoke_status": "warning"}),
        ));
        assert_eq!(protect.services()[1].value(CHAR_SMOKE_DETECTED), Some(&json!(1)));
        assert_eq!(protect.services()[0].value(CHAR_STATUS_ACTIVE), Some(&json!(true)));
    }

    #[test]
    fn test_camera_sensor_zones() {
        let camera = state(
            "camera.front_door",
            "idle",
            json!({
                "friendly_name": "Front Door",
                "online": true,
                "motion_detected": true,
                "person_detected": false,
                "back_yard_activity_detected": false,
                "driveway_activity_detected": true
            }),
        );
        let sensor = NestCameraSensor::new(&camera, &AccessoryConfig::default());
        let services = sensor.services();
        assert_eq!(services.len(), 4);
        assert_eq!(services[0].name(), "Front Door Motion");
        assert_eq!(services[0].value(CHAR_MOTION_DETECTED), Some(&json!(true)));
        assert_eq!(services[1].name(), "Front Door Occupancy");
        assert_eq!(services[1].value(CHAR_OCCUPANCY_DETECTED), Some(&json!(false)));
        assert_eq!(services[2].name(), "Front Door Back Yard Motion");
        assert_eq!(services[3].name(), "Front Door Driveway Motion");
        assert_eq!(services[3].value(CHAR_MOTION_DETECTED), Some(&json!(true)));
        assert_eq!(services[3].value(CHAR_STATUS_ACTIVE), Some(&json!(true)));
    }
}
