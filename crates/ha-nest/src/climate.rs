//! Nest thermostats as climate entities

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{ATTR_TEMPERATURE, PLATFORM_CLIMATE};
use ha_helpers::{DeviceInfo, Entity, EntityError};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::entity::{clamp_humidity, NestDevice, WebLink};
use crate::models::{
    Target, TemperatureScale, Thermostat, MODE_COOL, MODE_ECO, MODE_HEAT, MODE_HEAT_COOL,
    MODE_OFF, STATE_AWAY,
};
use crate::{
    ATTR_STRUCTURE, ATTR_TEMPERATURE_SCALE, ATTR_THERMOSTAT_TEMPERATURE, HUMIDITY_MAX,
    HUMIDITY_MIN, PRESET_AWAY_AND_ECO,
};

pub const HVAC_MODE_HEAT_COOL: &str = "heat_cool";
pub const HVAC_MODE_HEAT: &str = "heat";
pub const HVAC_MODE_COOL: &str = "cool";
pub const HVAC_MODE_OFF: &str = "off";

pub const PRESET_NONE: &str = "none";
pub const PRESET_AWAY: &str = "away";
pub const PRESET_ECO: &str = "eco";

pub const FAN_ON: &str = "on";
pub const FAN_AUTO: &str = "auto";

pub const SUPPORT_TARGET_TEMPERATURE: u32 = 1;
pub const SUPPORT_TARGET_TEMPERATURE_RANGE: u32 = 2;
pub const SUPPORT_TARGET_HUMIDITY: u32 = 4;
pub const SUPPORT_FAN_MODE: u32 = 8;
pub const SUPPORT_PRESET_MODE: u32 = 16;

pub const PRESET_MODES: [&str; 4] = [PRESET_NONE, PRESET_AWAY, PRESET_ECO, PRESET_AWAY_AND_ECO];

/// Host hvac mode for a Nest mode
pub fn hvac_mode_from_nest(mode: &str) -> Option<&'static str> {
    match mode {
        MODE_HEAT_COOL => Some(HVAC_MODE_HEAT_COOL),
        MODE_HEAT => Some(HVAC_MODE_HEAT),
        MODE_COOL => Some(HVAC_MODE_COOL),
        MODE_OFF => Some(HVAC_MODE_OFF),
        _ => None,
    }
}

/// Nest mode for a host hvac mode
pub fn hvac_mode_to_nest(mode: &str) -> Option<&'static str> {
    match mode {
        HVAC_MODE_HEAT_COOL => Some(MODE_HEAT_COOL),
        HVAC_MODE_HEAT => Some(MODE_HEAT),
        HVAC_MODE_COOL => Some(MODE_COOL),
        HVAC_MODE_OFF => Some(MODE_OFF),
        _ => None,
    }
}

/// Host hvac action for a Nest `hvac_state`
pub fn hvac_action(state: &str) -> Option<&'static str> {
    match state {
        "off" => Some("idle"),
        "heating" => Some("heat"),
        "cooling" => Some("cool"),
        _ => None,
    }
}

/// Modes a thermostat offers, auto first when it can both heat and cool
pub fn hvac_modes(thermostat: &Thermostat) -> Vec<&'static str> {
    let mut modes = Vec::new();
    if thermostat.can_heat && thermostat.can_cool {
        modes.push(HVAC_MODE_HEAT_COOL);
    }
    if thermostat.can_heat {
        modes.push(HVAC_MODE_HEAT);
    }
    if thermostat.can_cool {
        modes.push(HVAC_MODE_COOL);
    }
    modes.push(HVAC_MODE_OFF);
    modes
}

/// Current hvac mode; eco reports the mode it replaced
pub fn current_hvac_mode(thermostat: &Thermostat) -> &'static str {
    if thermostat.hvac_mode == MODE_ECO {
        return hvac_mode_from_nest(&thermostat.previous_hvac_mode)
            .unwrap_or_else(|| hvac_modes(thermostat)[0]);
    }
    hvac_mode_from_nest(&thermostat.hvac_mode).unwrap_or(HVAC_MODE_OFF)
}

pub fn preset_mode(away: bool, eco: bool) -> &'static str {
    match (away, eco) {
        (true, true) => PRESET_AWAY_AND_ECO,
        (true, false) => PRESET_AWAY,
        (false, true) => PRESET_ECO,
        (false, false) => PRESET_NONE,
    }
}

/// A thermostat; `web` is set when the web client reports a humidistat
pub struct NestThermostat {
    base: NestDevice,
    web: Option<WebLink>,
    name: String,
}

impl NestThermostat {
    pub(crate) fn new(base: NestDevice, web: Option<WebLink>, name: impl Into<String>) -> Self {
        Self {
            base,
            web,
            name: name.into(),
        }
    }

    fn thermostat(&self) -> Option<Thermostat> {
        self.base
            .read(|data| data.thermostat(self.base.serial()).cloned())
    }

    fn require(&self) -> Result<Thermostat, EntityError> {
        self.thermostat()
            .ok_or_else(|| EntityError::Failed(format!("{} is not available", self.name)))
    }

    fn away(&self) -> bool {
        self.base.structure().map_or(false, |s| s.is_away())
    }

    fn features(&self, thermostat: &Thermostat) -> u32 {
        let mut features = SUPPORT_TARGET_TEMPERATURE | SUPPORT_PRESET_MODE;
        if thermostat.can_heat && thermostat.can_cool {
            features |= SUPPORT_TARGET_TEMPERATURE_RANGE;
        }
        if thermostat.has_fan {
            features |= SUPPORT_FAN_MODE;
        }
        if self.web.is_some() {
            features |= SUPPORT_TARGET_HUMIDITY;
        }
        features
    }

    async fn write(&self, fields: Value, what: &str) -> Result<(), EntityError> {
        let result = self.base.api.set_thermostat(self.base.serial(), fields).await;
        self.base.after_write(result, what).await
    }

    pub async fn set_hvac_mode(&mut self, mode: &str) -> Result<(), EntityError> {
        let nest_mode = hvac_mode_to_nest(mode)
            .ok_or_else(|| EntityError::Failed(format!("Unsupported hvac mode {}", mode)))?;
        self.write(json!({"hvac_mode": nest_mode}), "set hvac mode").await
    }

    /// Set the target; a range is only written in `heat-cool`
    pub async fn set_temperature(
        &mut self,
        temperature: Option<f64>,
        low: Option<f64>,
        high: Option<f64>,
    ) -> Result<(), EntityError> {
        let thermostat = self.require()?;
        let mut fields = Map::new();
        if thermostat.hvac_mode == MODE_HEAT_COOL {
            let (Some(low), Some(high)) = (low, high) else {
                return Ok(());
            };
            fields.insert(thermostat.target_field("target_temperature_low"), json!(low));
            fields.insert(thermostat.target_field("target_temperature_high"), json!(high));
        } else {
            let Some(temperature) = temperature else {
                return Ok(());
            };
            fields.insert(thermostat.target_field("target_temperature"), json!(temperature));
        }
        let fields = Value::Object(fields);
        debug!("Nest set_temperature {}", fields);
        self.write(fields, "set temperature").await
    }

    pub async fn set_eco_mode(&mut self, eco: bool) -> Result<(), EntityError> {
        let thermostat = self.require()?;
        let mode = if eco {
            MODE_ECO.to_string()
        } else {
            thermostat.previous_hvac_mode.clone()
        };
        self.write(json!({"hvac_mode": mode}), "set eco mode").await
    }

    pub async fn set_preset_mode(&mut self, preset: &str) -> Result<(), EntityError> {
        if !PRESET_MODES.contains(&preset) {
            return Err(EntityError::Failed(format!("Unsupported preset {}", preset)));
        }
        let thermostat = self.require()?;
        let is_away = self.away();
        let is_eco = thermostat.hvac_mode == MODE_ECO;
        if preset == preset_mode(is_away, is_eco) {
            return Ok(());
        }

        let need_away = preset == PRESET_AWAY || preset == PRESET_AWAY_AND_ECO;
        let need_eco = preset == PRESET_ECO || preset == PRESET_AWAY_AND_ECO;
        if is_away != need_away {
            let away = if need_away { STATE_AWAY } else { "home" };
            let result = self.base.api.set_away(&self.base.structure_id, away).await;
            self.base.after_write(result, "set away").await?;
        }
        if is_eco != need_eco {
            self.set_eco_mode(need_eco).await?;
        }
        Ok(())
    }

    pub async fn set_fan_mode(&mut self, fan_mode: &str) -> Result<(), EntityError> {
        if !self.require()?.has_fan {
            return Ok(());
        }
        let active = fan_mode.eq_ignore_ascii_case(FAN_ON);
        self.write(json!({"fan_timer_active": active}), "set fan mode")
            .await
    }

    pub async fn set_fan_timer(&mut self, minutes: u32) -> Result<(), EntityError> {
        if !self.require()?.has_fan {
            return Ok(());
        }
        self.write(json!({"fan_timer_duration": minutes}), "set fan timer")
            .await
    }

    pub async fn set_temperature_scale(&mut self, scale: TemperatureScale) -> Result<(), EntityError> {
        self.write(json!({"temperature_scale": scale.as_str()}), "set temperature scale")
            .await
    }

    /// Write a target humidity through the web client
    pub async fn set_humidity(&mut self, humidity: f64) -> Result<(), EntityError> {
        let Some(web) = &self.web else {
            return Err(EntityError::NotSupported("set_humidity"));
        };
        let humidity = clamp_humidity(humidity);
        info!(entity = %self.name, humidity, "Setting Nest target humidity");
        let result = web.client.set_target_humidity(&web.id, humidity).await;
        web.after_write(result, "set humidity").await
    }
}

#[async_trait]
impl Entity for NestThermostat {
    fn domain(&self) -> &'static str {
        PLATFORM_CLIMATE
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.base.serial().to_string())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        self.thermostat().map(|t| current_hvac_mode(&t).to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.base.base_attributes();
        let Some(thermostat) = self.thermostat() else {
            return attrs;
        };
        let eco = thermostat.hvac_mode == MODE_ECO;

        attrs.insert("hvac_modes".into(), json!(hvac_modes(&thermostat)));
        attrs.insert("hvac_action".into(), json!(hvac_action(&thermostat.hvac_state)));
        attrs.insert("current_temperature".into(), json!(thermostat.temperature()));
        attrs.insert("min_temp".into(), json!(thermostat.min_temperature()));
        attrs.insert("max_temp".into(), json!(thermostat.max_temperature()));
        attrs.insert("preset_mode".into(), json!(preset_mode(self.away(), eco)));
        attrs.insert("preset_modes".into(), json!(PRESET_MODES));

        let (target, low, high) = if eco {
            match thermostat.eco_temperature() {
                Some((low, high)) => (None, Some(low), Some(high)),
                None => (None, None, None),
            }
        } else {
            match thermostat.target() {
                Some(Target::Single(t)) => (Some(t), None, None),
                Some(Target::Range(low, high)) => (None, Some(low), Some(high)),
                None => (None, None, None),
            }
        };
        attrs.insert(ATTR_TEMPERATURE.into(), json!(target));
        attrs.insert("target_temp_low".into(), json!(low));
        attrs.insert("target_temp_high".into(), json!(high));

        if thermostat.has_fan {
            let fan = if thermostat.fan_timer_active { FAN_ON } else { FAN_AUTO };
            attrs.insert("fan_mode".into(), json!(fan));
            attrs.insert("fan_modes".into(), json!([FAN_ON, FAN_AUTO]));
        }
        if let Some(structure) = self.base.structure() {
            attrs.insert(ATTR_STRUCTURE.into(), json!(structure.name));
        }
        attrs.insert(
            ATTR_TEMPERATURE_SCALE.into(),
            json!(thermostat.temperature_scale.as_str()),
        );

        match &self.web {
            Some(web) => {
                attrs.insert("current_humidity".into(), json!(thermostat.humidity));
                attrs.insert("humidity".into(), json!(web.value("target_humidity")));
                attrs.insert("min_humidity".into(), json!(HUMIDITY_MIN));
                attrs.insert("max_humidity".into(), json!(HUMIDITY_MAX));
                if let Some(backplate) = web.value("backplate_temperature") {
                    attrs.insert(ATTR_THERMOSTAT_TEMPERATURE.into(), backplate);
                }
            }
            None => {
                if let Some(humidity) = thermostat.humidity {
                    attrs.insert("current_humidity".into(), json!(humidity));
                }
            }
        }
        attrs
    }

    fn available(&self) -> bool {
        self.base.available() && self.web.as_ref().map_or(true, WebLink::available)
    }

    fn unit_of_measurement(&self) -> Option<String> {
        self.thermostat()
            .map(|t| t.temperature_scale.unit().to_string())
    }

    fn supported_features(&self) -> u32 {
        self.thermostat().map_or(0, |t| self.features(&t))
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

    fn thermostat(can_heat: bool, can_cool: bool, mode: &str, previous: &str) -> Thermostat {
        Thermostat {
            can_heat,
            can_cool,
            hvac_mode: mode.to_string(),
            previous_hvac_mode: previous.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_hvac_modes_follow_capabilities() {
        assert_eq!(
            hvac_modes(&thermostat(true, true, MODE_HEAT, "")),
            vec![HVAC_MODE_HEAT_COOL, HVAC_MODE_HEAT, HVAC_MODE_COOL, HVAC_MODE_OFF]
        );
        assert_eq!(
            hvac_modes(&thermostat(true, false, MODE_HEAT, "")),
            vec![HVAC_MODE_HEAT, HVAC_MODE_OFF]
        );
    }

    #[test]
    fn test_eco_reports_previous_mode() {
        assert_eq!(current_hvac_mode(&thermostat(true, true, MODE_ECO, MODE_COOL)), HVAC_MODE_COOL);
        assert_eq!(
            current_hvac_mode(&thermostat(true, true, MODE_ECO, "")),
            HVAC_MODE_HEAT_COOL
        );
        assert_eq!(
            current_hvac_mode(&thermostat(true, true, MODE_HEAT_COOL, "")),
            HVAC_MODE_HEAT_COOL
        );
    }

    #[test]
    fn test_presets_and_actions() {
        assert_eq!(preset_mode(true, true), PRESET_AWAY_AND_ECO);
        assert_eq!(preset_mode(false, true), PRESET_ECO);
        assert_eq!(preset_mode(false, false), PRESET_NONE);
        assert_eq!(hvac_action("heating"), Some("heat"));
        assert_eq!(hvac_action("off"), Some("idle"));
        assert_eq!(hvac_mode_to_nest(HVAC_MODE_HEAT_COOL), Some(MODE_HEAT_COOL));
    }
}
