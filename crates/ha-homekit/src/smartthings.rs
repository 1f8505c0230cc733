//! SmartThings multi-sensor buttons and motion sensors
//!
//! Both report their temperature attribute in Fahrenheit.

use ha_core::constants::{ATTR_TEMPERATURE, STATE_ON, TEMP_FAHRENHEIT};
use ha_core::State;
use serde_json::{json, Value};
use tracing::debug;

use crate::accessory::{Accessory, AccessoryConfig, Category};
use crate::characteristic::*;

pub const ATTR_LAST_ACTION: &str = "last_action";

fn switch_event(action: &str) -> Option<u8> {
    match action {
        "pushed" => Some(0),
        "double" => Some(1),
        "held" => Some(2),
        _ => None,
    }
}

fn temperature_service(prefix: &str) -> HkService {
    HkService::new(SERV_TEMPERATURE_SENSOR, format!("{prefix} Temperature"))
        .with(CHAR_STATUS_LOW_BATTERY, json!(0))
        .with(CHAR_CURRENT_TEMPERATURE, json!(0))
}

fn update_temperature(service: &mut HkService, state: &State, threshold: f64) {
    let attrs = &state.attributes;
    if let Some(level) = convert_to_float(attrs.get(ha_core::constants::ATTR_BATTERY_LEVEL)) {
        service.set_value(CHAR_STATUS_LOW_BATTERY, json!((level < threshold) as u8));
    }
    if let Some(temperature) = convert_to_float(attrs.get(ATTR_TEMPERATURE)) {
        service.set_value(
            CHAR_CURRENT_TEMPERATURE,
            json!(temperature_to_homekit(temperature, TEMP_FAHRENHEIT)),
        );
    }
}

pub struct SmartThingsButton {
    services: Vec<HkService>,
    low_battery_threshold: f64,
    last_event: Option<u8>,
}

impl SmartThingsButton {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let prefix = config.prefix(state);
        let switch = HkService::new(SERV_STATELESS_PROGRAMMABLE_SWITCH, format!("{prefix} Switch"))
            .with(CHAR_PROGRAMMABLE_SWITCH_EVENT, Value::Null);
        let mut button = Self {
            services: vec![switch, temperature_service(&prefix)],
            low_battery_threshold: config.low_battery_threshold,
            last_event: None,
        };
        button.update_state(state);
        button
    }

    /// Take the switch event raised by the last update
    ///
    /// The switch is stateless: two presses of the same kind are two events
    /// even though the characteristic value does not change.
    pub fn take_event(&mut self) -> Option<u8> {
        self.last_event.take()
    }
}

impl Accessory for SmartThingsButton {
    fn category(&self) -> Category {
        Category::ProgrammableSwitch
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        update_temperature(&mut self.services[1], state, self.low_battery_threshold);

        if state.state != STATE_ON {
            return;
        }
        let action = state.attributes.get(ATTR_LAST_ACTION).and_then(Value::as_str);
        if let Some(event) = action.and_then(switch_event) {
            debug!(entity_id = %state.entity_id, event, "Button pressed");
            self.services[0].set_value(CHAR_PROGRAMMABLE_SWITCH_EVENT, json!(event));
            self.last_event = Some(event);
        }
    }
}

pub struct SmartThingsMotionSensor {
    services: Vec<HkService>,
    low_battery_threshold: f64,
}

impl SmartThingsMotionSensor {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let prefix = config.prefix(state);
        let motion = HkService::new(SERV_MOTION_SENSOR, format!("{prefix} Motion"))
            .with(CHAR_STATUS_LOW_BATTERY, json!(0))
            .with(CHAR_MOTION_DETECTED, json!(false));
        let mut sensor = Self {
            services: vec![motion, temperature_service(&prefix)],
            low_battery_threshold: config.low_battery_threshold,
        };
        sensor.update_state(state);
        sensor
    }
}

impl Accessory for SmartThingsMotionSensor {
    fn category(&self) -> Category {
        Category::Sensor
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let threshold = self.low_battery_threshold;
        let motion = &mut self.services[0];
        if let Some(level) = convert_to_float(state.attributes.get(ha_core::constants::ATTR_BATTERY_LEVEL)) {
            motion.set_value(CHAR_STATUS_LOW_BATTERY, json!((level < threshold) as u8));
        }
        motion.set_value(CHAR_MOTION_DETECTED, json!(state.state == STATE_ON));
        update_temperature(&mut self.services[1], state, threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};
    use std::collections::HashMap;

    fn state(entity_id: &str, value: &str, attrs: Value) -> State {
        let attributes: HashMap<String, Value> = serde_json::from_value(attrs).unwrap();
        State::new(entity_id.parse::<EntityId>().unwrap(), value, attributes, Context::new())
    }

    #[test]
    fn test_button_events() {
        let attrs = json!({
            "friendly_name": "Hall Button",
            "last_action": "double",
            "temperature": 68,
            "battery_level": 80
        });
        let mut button = SmartThingsButton::new(
            &state("binary_sensor.hall_button_pressed", "off", attrs.clone()),
            &AccessoryConfig::default(),
        );
        assert_eq!(button.services()[0].name(), "Hall Button Switch");
        assert_eq!(button.take_event(), None);
        assert_eq!(button.services()[1].f64(CHAR_CURRENT_TEMPERATURE), Some(20.0));
        assert_eq!(button.services()[1].value(CHAR_STATUS_LOW_BATTERY), Some(&json!(0)));

        let pressed = state("binary_sensor.hall_button_pressed", "on", attrs);
        button.update_state(&pressed);
        assert_eq!(button.take_event(), Some(1));
        button.update_state(&pressed);
        assert_eq!(button.take_event(), Some(1));
        assert_eq!(button.take_event(), None);
    }

    #[test]
    fn test_motion_sensor() {
        let sensor = SmartThingsMotionSensor::new(
            &state(
                "binary_sensor.porch_motion",
                "on",
                json!({"friendly_name": "Porch", "temperature": 50, "battery_level": 9}),
            ),
            &AccessoryConfig::default(),
        );
        let services = sensor.services();
        assert_eq!(services[0].name(), "Porch Motion");
        assert_eq!(services[0].value(CHAR_MOTION_DETECTED), Some(&json!(true)));
        assert_eq!(services[0].value(CHAR_STATUS_LOW_BATTERY), Some(&json!(1)));
        assert_eq!(services[1].f64(CHAR_CURRENT_TEMPERATURE), Some(10.0));
    }
}
