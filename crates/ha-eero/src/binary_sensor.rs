//! eero binary sensors

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_BINARY_SENSOR, STATE_OFF, STATE_ON};
use ha_helpers::{DeviceInfo, Entity};
use serde_json::{json, Value};

use crate::entity::{EeroEntity, VariableInfo};
use crate::models::{Resource, ResourceKind};

pub(crate) const BINARY_SENSOR_TYPES: &[(&str, VariableInfo)] = &[(
    "update_available",
    VariableInfo {
        kinds: &[ResourceKind::Eero],
        label: "Update Available",
    },
)];

pub struct EeroBinarySensor {
    pub(crate) inner: EeroEntity,
}

impl EeroBinarySensor {
    pub(crate) fn new(inner: EeroEntity) -> Self {
        Self { inner }
    }

    fn is_on(&self) -> Option<bool> {
        let variable = self.inner.variable;
        self.inner
            .with_resource(|_, resource| resource.flag(variable))
            .flatten()
    }
}

#[async_trait]
impl Entity for EeroBinarySensor {
    fn domain(&self) -> &'static str {
        PLATFORM_BINARY_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.inner.unique_id())
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn state(&self) -> Option<String> {
        self.is_on()
            .map(|on| if on { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.inner.base_attributes();
        let on = self.is_on().unwrap_or(false);
        self.inner.with_resource(|network, resource| {
            if let Resource::Eero(eero) = resource {
                attrs.insert("installed_version".to_string(), json!(eero.os_version()));
                if on {
                    attrs.insert("latest_version".to_string(), json!(network.target_firmware()));
                }
            }
        });
        attrs
    }

    fn available(&self) -> bool {
        self.inner.available()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }
}
