//! Nest humidifier as a humidifier-only HumidifierDehumidifier

use ha_core::constants::{PLATFORM_HUMIDIFIER, STATE_ON};
use ha_core::State;
use ha_nest::humidifier::STATE_HUMIDIFYING;
use ha_nest::{ATTR_HUMIDIFIER_ACTION, HUMIDITY_MAX, HUMIDITY_MIN, HUMIDITY_STEP};
use serde_json::{json, Value};
use tracing::debug;

use crate::accessory::{Accessory, AccessoryConfig, Category, ServiceRequest};
use crate::characteristic::*;

/// TargetHumidifierDehumidifierState for "humidifier"
const TARGET_HUMIDIFIER: u8 = 1;

pub struct NestHumidifier {
    entity_id: String,
    services: Vec<HkService>,
}

impl NestHumidifier {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let service = HkService::new(
            SERV_HUMIDIFIER_DEHUMIDIFIER,
            format!("{} Humidifier", config.prefix(state)),
        )
        .with(CHAR_CURRENT_HUMIDITY, json!(0))
        .with(CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER, json!(0))
        .with(CHAR_TARGET_HUMIDIFIER_DEHUMIDIFIER, json!(TARGET_HUMIDIFIER))
        .with(CHAR_ACTIVE, json!(false))
        .with_properties(
            CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY,
            json!(35),
            &[(PROP_MIN_STEP, json!(HUMIDITY_STEP))],
        );
        let mut humidifier = Self {
            entity_id: state.entity_id.to_string(),
            services: vec![service],
        };
        humidifier.update_state(state);
        humidifier
    }
}

impl Accessory for NestHumidifier {
    fn category(&self) -> Category {
        Category::Humidifier
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let attrs = &state.attributes;
        let service = &mut self.services[0];

        if let Some(humidity) = convert_to_float(attrs.get("current_humidity")) {
            service.set_value(CHAR_CURRENT_HUMIDITY, json!(humidity));
        }
        if let Some(humidity) = convert_to_float(attrs.get("humidity")) {
            service.set_value(CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY, json!(humidity));
        }

        let active = state.state == STATE_ON;
        service.set_value(CHAR_ACTIVE, json!(active));
        let humidifying =
            attrs.get(ATTR_HUMIDIFIER_ACTION).and_then(Value::as_str) == Some(STATE_HUMIDIFYING);
        let current = match (active, humidifying) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        };
        service.set_value(CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER, json!(current));
    }

    fn set_chars(&mut self, _service: usize, values: &CharValues, _state: &State) -> Vec<ServiceRequest> {
        debug!(entity_id = %self.entity_id, ?values, "Humidifier set_chars");
        let mut service = None;
        let mut params = serde_json::Map::new();
        let mut events = Vec::new();

        if let Some(active) = values.get(CHAR_ACTIVE) {
            let on = active.as_bool().unwrap_or_else(|| active.as_u64() == Some(1));
            service = Some(if on { "turn_on" } else { "turn_off" });
            events.push(format!("{CHAR_ACTIVE} to {active}"));
        }

        if let Some(humidity) = values
            .get(CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY)
            .and_then(Value::as_f64)
        {
            let clamped = humidity.clamp(HUMIDITY_MIN as f64, HUMIDITY_MAX as f64);
            if clamped != humidity {
                self.services[0].set_value(CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY, json!(clamped));
            }
            service = Some("set_humidity");
            params.insert("humidity".into(), json!(clamped));
            events.push(format!("{CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY} to {clamped}"));
        }

        let Some(service) = service else {
            return Vec::new();
        };
        let mut request = ServiceRequest::new(PLATFORM_HUMIDIFIER, service, &self.entity_id)
            .with_event(events.join(", "));
        request.data.extend(params);
        vec![request]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};
    use std::collections::HashMap;

    fn state(value: &str, action: &str) -> State {
        let attributes: HashMap<String, Value> = serde_json::from_value(json!({
            "friendly_name": "Home",
            "current_humidity": 31,
            "humidity": 40,
            "humidifier_action": action
        }))
        .unwrap();
        State::new(
            EntityId::new("humidifier", "home").unwrap(),
            value,
            attributes,
            Context::new(),
        )
    }

    #[test]
    fn test_current_state() {
        let mut humidifier = NestHumidifier::new(&state("off", "idle"), &AccessoryConfig::default());
        let service = &humidifier.services()[0];
        assert_eq!(service.name(), "Home Humidifier");
        assert_eq!(service.value(CHAR_ACTIVE), Some(&json!(false)));
        assert_eq!(service.value(CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER), Some(&json!(0)));
        assert_eq!(service.f64(CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY), Some(40.0));

        humidifier.update_state(&state("on", "idle"));
        assert_eq!(
            humidifier.services()[0].value(CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER),
            Some(&json!(1))
        );
        humidifier.update_state(&state("on", "humidifying"));
        assert_eq!(
            humidifier.services()[0].value(CHAR_CURRENT_HUMIDIFIER_DEHUMIDIFIER),
            Some(&json!(2))
        );
    }

    #[test]
    fn test_writes() {
        let current = state("on", "idle");
        let mut humidifier = NestHumidifier::new(&current, &AccessoryConfig::default());
        let values: CharValues = [(CHAR_HUMIDIFIER_THRESHOLD_HUMIDITY.to_string(), json!(5))]
            .into_iter()
            .collect();
        let requests = humidifier.set_chars(0, &values, &current);
        assert_eq!(requests[0].domain, "humidifier");
        assert_eq!(requests[0].service, "set_humidity");
        assert_eq!(requests[0].data["humidity"], 10.0);

        let values: CharValues = [(CHAR_ACTIVE.to_string(), json!(0))].into_iter().collect();
        let requests = humidifier.set_chars(0, &values, &current);
        assert_eq!(requests[0].service, "turn_off");
    }
}
