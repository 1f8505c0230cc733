//! Nest thermostat with eco and fan switches

use std::collections::HashMap;

use ha_core::constants::{ATTR_SUPPORTED_FEATURES, ATTR_TEMPERATURE, STATE_OFF, STATE_ON};
use ha_core::State;
use ha_nest::climate::{
    HVAC_MODE_COOL, HVAC_MODE_HEAT, HVAC_MODE_HEAT_COOL, HVAC_MODE_OFF, PRESET_ECO,
    SUPPORT_TARGET_HUMIDITY,
};
use ha_nest::services::{ATTR_ECO_MODE, SERVICE_SET_ECO_MODE, SERVICE_SET_TEMPERATURE_SCALE};
use ha_nest::{
    ATTR_TEMPERATURE_SCALE, ATTR_THERMOSTAT_TEMPERATURE, HUMIDITY_MAX, HUMIDITY_MIN, HUMIDITY_STEP,
    PRESET_AWAY_AND_ECO,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::accessory::{Accessory, AccessoryConfig, Category, ServiceRequest};
use crate::characteristic::*;

pub const HK_MIN_TEMP: f64 = 10.0;
pub const HK_MAX_TEMP: f64 = 38.0;

const DEFAULT_MIN_TEMP: f64 = 7.0;
const DEFAULT_MAX_TEMP: f64 = 35.0;

const HVAC_ACTION_IDLE: &str = "idle";

const THERMOSTAT: usize = 0;

fn display_unit_to_hk(scale: &str) -> Option<u8> {
    match scale {
        "C" => Some(0),
        "F" => Some(1),
        _ => None,
    }
}

fn display_unit_to_hass(value: u64) -> Option<&'static str> {
    match value {
        0 => Some("C"),
        1 => Some("F"),
        _ => None,
    }
}

fn current_state_to_hk(action: &str) -> Option<u8> {
    match action {
        "idle" => Some(0),
        "heat" => Some(1),
        "cool" => Some(2),
        _ => None,
    }
}

fn target_state_to_hass(value: u64) -> Option<&'static str> {
    match value {
        0 => Some(HVAC_MODE_OFF),
        1 => Some(HVAC_MODE_HEAT),
        2 => Some(HVAC_MODE_COOL),
        3 => Some(HVAC_MODE_HEAT_COOL),
        _ => None,
    }
}

fn is_eco(state: &State) -> bool {
    matches!(
        state.attributes.get("preset_mode").and_then(Value::as_str),
        Some(PRESET_ECO) | Some(PRESET_AWAY_AND_ECO)
    )
}

/// Target heating/cooling state; eco presets read as auto
fn target_state(state: &State) -> u8 {
    if is_eco(state) {
        return 3;
    }
    match state.state.as_str() {
        HVAC_MODE_HEAT => 1,
        HVAC_MODE_COOL => 2,
        HVAC_MODE_HEAT_COOL | "auto" => 3,
        _ => 0,
    }
}

fn fan_running(attrs: &HashMap<String, Value>) -> bool {
    attrs.get("fan_mode").and_then(Value::as_str) == Some(STATE_ON)
        && attrs.get("hvac_action").and_then(Value::as_str) == Some(HVAC_ACTION_IDLE)
}

fn number(attrs: &HashMap<String, Value>, key: &str) -> Option<f64> {
    attrs.get(key).and_then(Value::as_f64)
}

pub struct NestThermostat {
    entity_id: String,
    services: Vec<HkService>,
    features: u64,
    unit: String,
    min_temp: f64,
    max_temp: f64,
    sensor: Option<usize>,
    eco: usize,
    fan: usize,
}

impl NestThermostat {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let prefix = config.prefix(state);
        let attrs = &state.attributes;
        let features = attrs
            .get(ATTR_SUPPORTED_FEATURES)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let unit = temperature_unit(attrs).to_string();

        let min_temp = number(attrs, "min_temp")
            .map(|t| temperature_to_homekit(t, &unit))
            .unwrap_or(DEFAULT_MIN_TEMP);
        let max_temp = number(attrs, "max_temp")
            .map(|t| temperature_to_homekit(t, &unit))
            .unwrap_or(DEFAULT_MAX_TEMP);
        let min_temp = (min_temp * 2.0).round() / 2.0;
        let max_temp = (max_temp * 2.0).round() / 2.0;

        let range = [
            (PROP_MIN_VALUE, json!(min_temp.max(HK_MIN_TEMP))),
            (PROP_MAX_VALUE, json!(max_temp.min(HK_MAX_TEMP))),
        ];
        let mut thermostat = HkService::new(SERV_THERMOSTAT, format!("{prefix} Thermostat"))
            .with(CHAR_CURRENT_HEATING_COOLING, json!(0))
            .with(CHAR_TARGET_HEATING_COOLING, json!(0))
            .with(CHAR_CURRENT_TEMPERATURE, json!(21.0))
            .with_properties(CHAR_TARGET_TEMPERATURE, json!(21.0), &range)
            .with(CHAR_TEMP_DISPLAY_UNITS, json!(0))
            .with(CHAR_CURRENT_HUMIDITY, json!(0))
            .with_properties(CHAR_COOLING_THRESHOLD_TEMPERATURE, json!(23.0), &range)
            .with_properties(CHAR_HEATING_THRESHOLD_TEMPERATURE, json!(19.0), &range);
        if features & SUPPORT_TARGET_HUMIDITY as u64 != 0 {
            thermostat = thermostat.with_properties(
                CHAR_TARGET_HUMIDITY,
                json!(35),
                &[(PROP_MIN_STEP, json!(HUMIDITY_STEP))],
            );
        }

        let mut services = vec![thermostat];
        let sensor = attrs.contains_key(ATTR_THERMOSTAT_TEMPERATURE).then(|| {
            services.push(
                HkService::new(SERV_TEMPERATURE_SENSOR, format!("{prefix} Temperature"))
                    .with(CHAR_CURRENT_TEMPERATURE, json!(0)),
            );
            services.len() - 1
        });
        services.push(
            HkService::new(SERV_SWITCH, format!("{prefix} Thermostat Eco Mode"))
                .with(CHAR_ON, json!(false)),
        );
        let eco = services.len() - 1;
        services.push(
            HkService::new(SERV_FAN, format!("{prefix} Thermostat Fan")).with(CHAR_ON, json!(false)),
        );
        let fan = services.len() - 1;

        let mut accessory = Self {
            entity_id: state.entity_id.to_string(),
            services,
            features,
            unit,
            min_temp,
            max_temp,
            sensor,
            eco,
            fan,
        };
        accessory.update_state(state);
        accessory
    }

    pub fn temperature_range(&self) -> (f64, f64) {
        (self.min_temp, self.max_temp)
    }

    fn to_homekit(&self, temperature: f64) -> f64 {
        temperature_to_homekit(temperature, &self.unit)
    }

    fn to_states(&self, temperature: f64) -> f64 {
        temperature_to_states(temperature, &self.unit)
    }

    fn set(&mut self, service: usize, char: &str, value: Value) {
        self.services[service].set_value(char, value);
    }

    fn reset_thresholds(&mut self, state: &State) {
        for (attr, char) in [
            ("target_temp_high", CHAR_COOLING_THRESHOLD_TEMPERATURE),
            ("target_temp_low", CHAR_HEATING_THRESHOLD_TEMPERATURE),
        ] {
            if let Some(t) = number(&state.attributes, attr) {
                let hk = self.to_homekit(t);
                self.set(THERMOSTAT, char, json!(hk));
            }
        }
    }

    fn set_thermostat_chars(&mut self, values: &CharValues, state: &State) -> Option<ServiceRequest> {
        debug!(entity_id = %self.entity_id, ?values, "Thermostat set_chars");
        let mut domain = ha_core::constants::PLATFORM_CLIMATE;
        let mut service = None;
        let mut params = serde_json::Map::new();
        let mut events = Vec::new();

        if let Some(target) = values.get(CHAR_TARGET_HEATING_COOLING).and_then(Value::as_u64) {
            // Controllers rewrite the mode when the temperature is only viewed
            if target != target_state(state) as u64 {
                if let Some(mode) = target_state_to_hass(target) {
                    service = Some("set_hvac_mode");
                    params.insert("hvac_mode".into(), json!(mode));
                    events.push(format!("{CHAR_TARGET_HEATING_COOLING} to {target}"));
                }
            }
        }

        if let Some(temperature) = values.get(CHAR_TARGET_TEMPERATURE).and_then(Value::as_f64) {
            if !is_eco(state) {
                service = Some("set_temperature");
                params.insert(ATTR_TEMPERATURE.into(), json!(self.to_states(temperature)));
                events.push(format!("{CHAR_TARGET_TEMPERATURE} to {temperature}°C"));
            }
        }

        if let Some(units) = values.get(CHAR_TEMP_DISPLAY_UNITS).and_then(Value::as_u64) {
            if let Some(scale) = display_unit_to_hass(units) {
                domain = ha_nest::DOMAIN;
                service = Some(SERVICE_SET_TEMPERATURE_SCALE);
                params.insert(ATTR_TEMPERATURE_SCALE.into(), json!(scale));
                events.push(format!("{CHAR_TEMP_DISPLAY_UNITS} to {units}"));
            }
        }

        let high = values.get(CHAR_COOLING_THRESHOLD_TEMPERATURE).and_then(Value::as_f64);
        let low = values.get(CHAR_HEATING_THRESHOLD_TEMPERATURE).and_then(Value::as_f64);
        if high.is_some() || low.is_some() {
            if is_eco(state) {
                self.reset_thresholds(state);
            } else {
                let thermostat = &self.services[THERMOSTAT];
                let current_high = thermostat.f64(CHAR_COOLING_THRESHOLD_TEMPERATURE).unwrap_or(23.0);
                let current_low = thermostat.f64(CHAR_HEATING_THRESHOLD_TEMPERATURE).unwrap_or(19.0);
                if let Some(high) = high {
                    events.push(format!("{CHAR_COOLING_THRESHOLD_TEMPERATURE} to {high}°C"));
                }
                if let Some(low) = low {
                    events.push(format!("{CHAR_HEATING_THRESHOLD_TEMPERATURE} to {low}°C"));
                }
                let high = high.unwrap_or(current_high).min(self.max_temp);
                let low = low.unwrap_or(current_low).max(self.min_temp);
                service = Some("set_temperature");
                params.insert("target_temp_high".into(), json!(self.to_states(high)));
                params.insert("target_temp_low".into(), json!(self.to_states(low)));
            }
        }

        if let Some(humidity) = values.get(CHAR_TARGET_HUMIDITY).and_then(Value::as_f64) {
            let clamped = humidity.clamp(HUMIDITY_MIN as f64, HUMIDITY_MAX as f64);
            if clamped != humidity {
                self.set(THERMOSTAT, CHAR_TARGET_HUMIDITY, json!(clamped));
            }
            service = Some("set_humidity");
            params.insert("humidity".into(), json!(clamped));
            events.push(format!("{CHAR_TARGET_HUMIDITY} to {clamped}"));
        }

        let service = service?;
        let mut request = ServiceRequest::new(domain, service, &self.entity_id).with_event(events.join(", "));
        request.data.extend(params);
        Some(request)
    }

    fn set_fan_mode(&mut self, on: bool, state: &State) -> Option<ServiceRequest> {
        let action = state.attributes.get("hvac_action").and_then(Value::as_str);
        if matches!(action, Some("heat") | Some("cool")) || state.state == HVAC_MODE_OFF {
            // The fan only runs on its own while the system is idle
            let running = fan_running(&state.attributes);
            self.set(self.fan, CHAR_ON, json!(running));
            return None;
        }
        debug!(entity_id = %self.entity_id, on, "Set fan mode");
        let mode = if on { STATE_ON } else { STATE_OFF };
        Some(
            ServiceRequest::new(ha_core::constants::PLATFORM_CLIMATE, "set_fan_mode", &self.entity_id)
                .with("fan_mode", json!(mode))
                .with_event(format!("Fan mode: {CHAR_ON} to {mode}")),
        )
    }
}

impl Accessory for NestThermostat {
    fn category(&self) -> Category {
        Category::Thermostat
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let attrs = &state.attributes;

        if let Some(current) = attrs
            .get("hvac_action")
            .and_then(Value::as_str)
            .and_then(current_state_to_hk)
        {
            self.set(THERMOSTAT, CHAR_CURRENT_HEATING_COOLING, json!(current));
        }
        self.set(THERMOSTAT, CHAR_TARGET_HEATING_COOLING, json!(target_state(state)));

        for (attr, char) in [
            ("current_temperature", CHAR_CURRENT_TEMPERATURE),
            (ATTR_TEMPERATURE, CHAR_TARGET_TEMPERATURE),
            ("target_temp_high", CHAR_COOLING_THRESHOLD_TEMPERATURE),
            ("target_temp_low", CHAR_HEATING_THRESHOLD_TEMPERATURE),
        ] {
            if let Some(t) = number(attrs, attr) {
                let hk = self.to_homekit(t);
                self.set(THERMOSTAT, char, json!(hk));
            }
        }

        if let Some(units) = attrs
            .get(ATTR_TEMPERATURE_SCALE)
            .and_then(Value::as_str)
            .and_then(display_unit_to_hk)
        {
            self.set(THERMOSTAT, CHAR_TEMP_DISPLAY_UNITS, json!(units));
        }

        if let Some(humidity) = convert_to_float(attrs.get("current_humidity")) {
            self.set(THERMOSTAT, CHAR_CURRENT_HUMIDITY, json!(humidity));
        }
        if self.features & SUPPORT_TARGET_HUMIDITY as u64 != 0 {
            if let Some(humidity) = convert_to_float(attrs.get("humidity")) {
                self.set(THERMOSTAT, CHAR_TARGET_HUMIDITY, json!(humidity));
            }
        }

        if let Some(sensor) = self.sensor {
            if let Some(t) = convert_to_float(attrs.get(ATTR_THERMOSTAT_TEMPERATURE)) {
                self.set(sensor, CHAR_CURRENT_TEMPERATURE, json!(t));
            }
        }

        self.set(self.eco, CHAR_ON, json!(is_eco(state)));
        self.set(self.fan, CHAR_ON, json!(fan_running(attrs)));
    }

    fn set_chars(&mut self, service: usize, values: &CharValues, state: &State) -> Vec<ServiceRequest> {
        let request = if service == THERMOSTAT {
            self.set_thermostat_chars(values, state)
        } else if service == self.eco {
            values.get(CHAR_ON).and_then(Value::as_bool).map(|on| {
                debug!(entity_id = %self.entity_id, on, "Set eco mode");
                ServiceRequest::new(ha_nest::DOMAIN, SERVICE_SET_ECO_MODE, &self.entity_id)
                    .with(ATTR_ECO_MODE, json!(on))
                    .with_event(format!("Eco mode: {CHAR_ON} to {on}"))
            })
        } else if service == self.fan {
            match values.get(CHAR_ON).and_then(Value::as_bool) {
                Some(on) => self.set_fan_mode(on, state),
                None => None,
            }
        } else {
            None
        };
        request.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};

    fn state(mode: &str, attrs: Value) -> State {
        let attributes: HashMap<String, Value> = serde_json::from_value(attrs).unwrap();
        State::new(
            EntityId::new("climate", "hallway").unwrap(),
            mode,
            attributes,
            Context::new(),
        )
    }

    fn heating() -> State {
        state(
            "heat",
            json!({
                "friendly_name": "Hallway",
                "hvac_action": "heat",
                "current_temperature": 19.5,
                "temperature": 21.0,
                "min_temp": 9.0,
                "max_temp": 32.0,
                "preset_mode": "none",
                "fan_mode": "auto",
                "temperature_scale": "F",
                "current_humidity": 41,
                "humidity": 35,
                "supported_features": 31,
                "thermostat_temperature": 20.4
            }),
        )
    }

    fn values(entries: &[(&str, Value)]) -> CharValues {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_services_and_initial_values() {
        let accessory = NestThermostat::new(&heating(), &AccessoryConfig::default());
        let services = accessory.services();
        assert_eq!(services.len(), 4);
        assert_eq!(services[0].name(), "Hallway Thermostat");
        assert_eq!(services[1].name(), "Hallway Temperature");
        assert_eq!(services[2].name(), "Hallway Thermostat Eco Mode");
        assert_eq!(services[3].name(), "Hallway Thermostat Fan");

        let thermostat = &services[0];
        assert_eq!(thermostat.value(CHAR_CURRENT_HEATING_COOLING), Some(&json!(1)));
        assert_eq!(thermostat.value(CHAR_TARGET_HEATING_COOLING), Some(&json!(1)));
        assert_eq!(thermostat.f64(CHAR_CURRENT_TEMPERATURE), Some(19.5));
        assert_eq!(thermostat.value(CHAR_TEMP_DISPLAY_UNITS), Some(&json!(1)));
        assert_eq!(thermostat.f64(CHAR_TARGET_HUMIDITY), Some(35.0));
        assert_eq!(
            thermostat.property(CHAR_TARGET_TEMPERATURE, PROP_MIN_VALUE),
            Some(&json!(10.0))
        );
        assert_eq!(
            thermostat.property(CHAR_TARGET_TEMPERATURE, PROP_MAX_VALUE),
            Some(&json!(32.0))
        );
        assert_eq!(services[1].f64(CHAR_CURRENT_TEMPERATURE), Some(20.4));
    }

    #[test]
    fn test_eco_preset_reads_as_auto() {
        let mut eco = heating();
        eco.attributes.insert("preset_mode".into(), json!("Away and Eco"));
        let accessory = NestThermostat::new(&eco, &AccessoryConfig::default());
        assert_eq!(
            accessory.services()[0].value(CHAR_TARGET_HEATING_COOLING),
            Some(&json!(3))
        );
        assert_eq!(accessory.services()[2].value(CHAR_ON), Some(&json!(true)));

        let unknown = state("dry", json!({}));
        assert_eq!(target_state(&unknown), 0);
    }

    #[test]
    fn test_target_state_auto_is_heat_cool() {
        // HomeKit's auto target is written as heat_cool, the climate mode
        // the thermostat reports back while holding a range
        assert_eq!(target_state_to_hass(0), Some("off"));
        assert_eq!(target_state_to_hass(1), Some("heat"));
        assert_eq!(target_state_to_hass(2), Some("cool"));
        assert_eq!(target_state_to_hass(3), Some("heat_cool"));
        assert_eq!(target_state_to_hass(4), None);

        assert_eq!(target_state(&state("heat_cool", json!({}))), 3);
        assert_eq!(target_state(&state("auto", json!({}))), 3);
    }

    #[test]
    fn test_unchanged_mode_is_ignored() {
        let state = heating();
        let mut accessory = NestThermostat::new(&state, &AccessoryConfig::default());
        let requests = accessory.set_chars(
            0,
            &values(&[(CHAR_TARGET_HEATING_COOLING, json!(1))]),
            &state,
        );
        assert!(requests.is_empty());

        let requests = accessory.set_chars(
            0,
            &values(&[(CHAR_TARGET_HEATING_COOLING, json!(3))]),
            &state,
        );
        assert_eq!(requests[0].service, "set_hvac_mode");
        assert_eq!(requests[0].data["hvac_mode"], "heat_cool");
    }

    #[test]
    fn test_last_write_wins_and_params_merge() {
        let state = heating();
        let mut accessory = NestThermostat::new(&state, &AccessoryConfig::default());
        let requests = accessory.set_chars(
            0,
            &values(&[
                (CHAR_TARGET_HEATING_COOLING, json!(2)),
                (CHAR_TARGET_HUMIDITY, json!(75)),
            ]),
            &state,
        );
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.domain, "climate");
        assert_eq!(request.service, "set_humidity");
        assert_eq!(request.data["humidity"], 60.0);
        assert_eq!(request.data["hvac_mode"], "cool");
        assert_eq!(request.data["entity_id"], "climate.hallway");
        assert_eq!(
            accessory.services()[0].f64(CHAR_TARGET_HUMIDITY),
            Some(60.0)
        );
    }

    #[test]
    fn test_temperature_writes() {
        let state = heating();
        let mut accessory = NestThermostat::new(&state, &AccessoryConfig::default());
        let requests = accessory.set_chars(
            0,
            &values(&[(CHAR_TARGET_TEMPERATURE, json!(20.0))]),
            &state,
        );
        assert_eq!(requests[0].service, "set_temperature");
        assert_eq!(requests[0].data["temperature"], 20.0);

        let requests = accessory.set_chars(
            0,
            &values(&[(CHAR_COOLING_THRESHOLD_TEMPERATURE, json!(40.0))]),
            &state,
        );
        assert_eq!(requests[0].data["target_temp_high"], 32.0);
        assert_eq!(requests[0].data["target_temp_low"], 19.0);

        let requests = accessory.set_chars(
            0,
            &values(&[(CHAR_TEMP_DISPLAY_UNITS, json!(0))]),
            &state,
        );
        assert_eq!(requests[0].domain, "nest");
        assert_eq!(requests[0].service, "set_temperature_scale");
        assert_eq!(requests[0].data["temperature_scale"], "C");
    }

    #[test]
    fn test_eco_preset_ignores_temperature() {
        let mut accessory = NestThermostat::new(&heating(), &AccessoryConfig::default());
        let mut eco = heating();
        eco.attributes.insert("preset_mode".into(), json!("eco"));
        eco.attributes.insert("target_temp_low".into(), json!(10.0));
        eco.attributes.insert("target_temp_high".into(), json!(30.0));

        let requests = accessory.set_chars(
            0,
            &values(&[
                (CHAR_TARGET_TEMPERATURE, json!(22.0)),
                (CHAR_HEATING_THRESHOLD_TEMPERATURE, json!(15.0)),
            ]),
            &eco,
        );
        assert!(requests.is_empty());
        assert_eq!(
            accessory.services()[0].f64(CHAR_HEATING_THRESHOLD_TEMPERATURE),
            Some(10.0)
        );
        assert_eq!(
            accessory.services()[0].f64(CHAR_COOLING_THRESHOLD_TEMPERATURE),
            Some(30.0)
        );
    }

    #[test]
    fn test_fan_switch_refused_while_heating() {
        let state = heating();
        let mut accessory = NestThermostat::new(&state, &AccessoryConfig::default());
        let requests = accessory.set_chars(3, &values(&[(CHAR_ON, json!(true))]), &state);
        assert!(requests.is_empty());
        assert_eq!(accessory.services()[3].value(CHAR_ON), Some(&json!(false)));

        let mut idle = heating();
        idle.attributes.insert("hvac_action".into(), json!("idle"));
        let requests = accessory.set_chars(3, &values(&[(CHAR_ON, json!(true))]), &idle);
        assert_eq!(requests[0].service, "set_fan_mode");
        assert_eq!(requests[0].data["fan_mode"], "on");
    }

    #[test]
    fn test_eco_switch() {
        let state = heating();
        let mut accessory = NestThermostat::new(&state, &AccessoryConfig::default());
        let requests = accessory.set_chars(2, &values(&[(CHAR_ON, json!(true))]), &state);
        assert_eq!(requests[0].domain, "nest");
        assert_eq!(requests[0].service, "set_eco_mode");
        assert_eq!(requests[0].data["eco_mode"], true);
    }
}
