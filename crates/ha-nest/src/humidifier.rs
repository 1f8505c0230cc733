//! Humidifiers of thermostats the web client reports

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_HUMIDIFIER, STATE_IDLE, STATE_OFF, STATE_ON};
use ha_helpers::{DeviceInfo, Entity, EntityError};
use serde_json::{json, Value};

use crate::entity::{clamp_humidity, NestDevice, WebLink};
use crate::models::MODE_OFF;
use crate::{ATTR_HUMIDIFIER_ACTION, HUMIDITY_MAX, HUMIDITY_MIN};

pub const SUPPORT_MODES: u32 = 1;

pub const MODE_AUTO: &str = "auto";
pub const STATE_HUMIDIFYING: &str = "humidifying";

pub struct NestHumidifier {
    base: NestDevice,
    web: WebLink,
    name: String,
}

impl NestHumidifier {
    pub(crate) fn new(base: NestDevice, web: WebLink, name: impl Into<String>) -> Self {
        Self {
            base,
            web,
            name: name.into(),
        }
    }

    fn hvac_mode(&self) -> Option<String> {
        self.base
            .read(|data| data.thermostat(self.base.serial()).map(|t| t.hvac_mode.clone()))
    }

    pub fn is_on(&self) -> bool {
        self.web.flag("target_humidity_enabled")
            && self.hvac_mode().map_or(false, |mode| mode != MODE_OFF)
    }

    pub fn action(&self) -> &'static str {
        if self.web.flag("humidifier_state") {
            STATE_HUMIDIFYING
        } else {
            STATE_IDLE
        }
    }

    async fn enable(&self, enabled: bool) -> Result<(), EntityError> {
        let result = self.web.client.enable_target_humidity(&self.web.id, enabled).await;
        self.web.after_write(result, "enable target humidity").await
    }

    /// Only `auto` is offered; any other mode disables the target
    pub async fn set_mode(&mut self, mode: &str) -> Result<(), EntityError> {
        self.enable(mode == MODE_AUTO).await
    }

    pub async fn set_humidity(&mut self, humidity: f64) -> Result<(), EntityError> {
        let result = self
            .web
            .client
            .set_target_humidity(&self.web.id, clamp_humidity(humidity))
            .await;
        self.web.after_write(result, "set humidity").await
    }
}

#[async_trait]
impl Entity for NestHumidifier {
    fn domain(&self) -> &'static str {
        PLATFORM_HUMIDIFIER
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-humidifier", self.base.serial()))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        Some(if self.is_on() { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.base.base_attributes();
        attrs.insert("humidity".into(), json!(self.web.value("target_humidity")));
        attrs.insert("min_humidity".into(), json!(HUMIDITY_MIN));
        attrs.insert("max_humidity".into(), json!(HUMIDITY_MAX));
        attrs.insert("mode".into(), json!(MODE_AUTO));
        attrs.insert("available_modes".into(), json!([MODE_AUTO]));
        attrs.insert(ATTR_HUMIDIFIER_ACTION.into(), json!(self.action()));
        let humidity = self
            .base
            .read(|data| data.thermostat(self.base.serial()).and_then(|t| t.humidity));
        if let Some(humidity) = humidity {
            attrs.insert("current_humidity".into(), json!(humidity));
        }
        attrs
    }

    fn available(&self) -> bool {
        self.web.available()
    }

    fn device_class(&self) -> Option<String> {
        Some("humidifier".to_string())
    }

    fn supported_features(&self) -> u32 {
        SUPPORT_MODES
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.enable(true).await
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.enable(false).await
    }
}
