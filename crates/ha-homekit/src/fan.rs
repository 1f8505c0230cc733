//! Fan accessory for `fan` entities with a speed list

use ha_core::constants::{ATTR_SUPPORTED_FEATURES, PLATFORM_FAN, STATE_OFF, STATE_ON};
use ha_core::State;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::accessory::{Accessory, AccessoryConfig, Category, ServiceRequest};
use crate::characteristic::*;

pub const SUPPORT_SET_SPEED: u64 = 1;
pub const SUPPORT_OSCILLATE: u64 = 2;
pub const SUPPORT_DIRECTION: u64 = 4;

pub const DIRECTION_FORWARD: &str = "forward";
pub const DIRECTION_REVERSE: &str = "reverse";

pub struct Fan {
    entity_id: String,
    services: Vec<HkService>,
    speed_list: Vec<String>,
    min_step: f64,
}

impl Fan {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let attrs = &state.attributes;
        let features = attrs
            .get(ATTR_SUPPORTED_FEATURES)
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut service = HkService::new(SERV_FAN, config.prefix(state)).with(CHAR_ON, json!(0));
        if features & SUPPORT_DIRECTION != 0 {
            service = service.with(CHAR_ROTATION_DIRECTION, json!(0));
        }
        if features & SUPPORT_OSCILLATE != 0 {
            service = service.with(CHAR_SWING_MODE, json!(0));
        }

        let mut speed_list = Vec::new();
        let mut min_step = 1.0;
        if features & SUPPORT_SET_SPEED != 0 {
            speed_list = attrs
                .get("speed_list")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            if speed_list.len() > 1 {
                min_step = 100.0 / (speed_list.len() - 1) as f64;
            }
            service = service.with_properties(
                CHAR_ROTATION_SPEED,
                json!(100),
                &[(PROP_MIN_STEP, json!(min_step))],
            );
        }

        let mut fan = Self {
            entity_id: state.entity_id.to_string(),
            services: vec![service],
            speed_list,
            min_step,
        };
        fan.update_state(state);
        fan
    }

    fn request(&self, service: &'static str) -> ServiceRequest {
        ServiceRequest::new(PLATFORM_FAN, service, &self.entity_id)
    }

    fn set_state(&self, on: bool) -> ServiceRequest {
        debug!(entity_id = %self.entity_id, on, "Set state");
        self.request(if on { "turn_on" } else { "turn_off" })
    }

    fn set_speed(&self, value: f64) -> Option<ServiceRequest> {
        if value == 0.0 {
            return Some(self.set_state(false));
        }
        let index = (value / self.min_step).round() as usize;
        let Some(speed) = self
            .speed_list
            .get(index.min(self.speed_list.len().saturating_sub(1)))
        else {
            warn!(entity_id = %self.entity_id, value, "Fan has no speed list");
            return None;
        };
        debug!(entity_id = %self.entity_id, speed, "Set speed");
        Some(
            self.request("set_speed")
                .with("speed", json!(speed))
                .with_event(format!("speed at {speed}")),
        )
    }
}

impl Accessory for Fan {
    fn category(&self) -> Category {
        Category::Fan
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let service = &mut self.services[0];
        match state.state.as_str() {
            STATE_ON => {
                service.set_value(CHAR_ON, json!(1));
            }
            STATE_OFF => {
                service.set_value(CHAR_ON, json!(0));
            }
            _ => {}
        }

        match state.attributes.get("direction").and_then(Value::as_str) {
            Some(DIRECTION_FORWARD) => {
                service.set_value(CHAR_ROTATION_DIRECTION, json!(0));
            }
            Some(DIRECTION_REVERSE) => {
                service.set_value(CHAR_ROTATION_DIRECTION, json!(1));
            }
            _ => {}
        }

        if let Some(oscillating) = state.attributes.get("oscillating").and_then(Value::as_bool) {
            service.set_value(CHAR_SWING_MODE, json!(oscillating as u8));
        }

        // The speed is kept while off so turning on restores it
        if service.has(CHAR_ROTATION_SPEED) && state.state != STATE_OFF {
            let speed = state.attributes.get("speed").and_then(Value::as_str);
            if let Some(index) = speed.and_then(|s| self.speed_list.iter().position(|l| l == s)) {
                service.set_value(CHAR_ROTATION_SPEED, json!(index as f64 * self.min_step));
            }
        }
    }

    fn set_chars(&mut self, _service: usize, values: &CharValues, _state: &State) -> Vec<ServiceRequest> {
        debug!(entity_id = %self.entity_id, ?values, "Fan set_chars");
        let mut requests = Vec::new();
        let has_speed = self.services[0].has(CHAR_ROTATION_SPEED);

        if let Some(on) = values.get(CHAR_ON) {
            let on = on.as_bool().unwrap_or_else(|| on.as_u64() == Some(1));
            if !on {
                // Further writes would turn it back on
                return vec![self.set_state(false)];
            }
            // Setting the speed turns the fan on at that speed
            if !has_speed || !values.contains_key(CHAR_ROTATION_SPEED) {
                requests.push(self.set_state(true));
            }
        }

        if let Some(direction) = values.get(CHAR_ROTATION_DIRECTION).and_then(Value::as_u64) {
            let direction = if direction == 1 {
                DIRECTION_REVERSE
            } else {
                DIRECTION_FORWARD
            };
            requests.push(
                self.request("set_direction")
                    .with("direction", json!(direction))
                    .with_event(direction),
            );
        }

        if let Some(swing) = values.get(CHAR_SWING_MODE).and_then(Value::as_u64) {
            let oscillating = swing == 1;
            requests.push(
                self.request("oscillate")
                    .with("oscillating", json!(oscillating))
                    .with_event(format!("oscillating to {oscillating}")),
            );
        }

        if let Some(speed) = values.get(CHAR_ROTATION_SPEED).and_then(Value::as_f64) {
            requests.extend(self.set_speed(speed));
        }
        requests
    }
}
