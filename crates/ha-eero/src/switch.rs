//! eero switches

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_SWITCH, STATE_OFF, STATE_ON};
use ha_helpers::{DeviceInfo, Entity, EntityError};
use serde_json::{json, Value};
use tracing::debug;

use crate::entity::{EeroEntity, VariableInfo};
use crate::models::{Resource, ResourceKind};

pub(crate) const SWITCH_TYPES: &[(&str, VariableInfo)] = &[
    (
        "guest_network_enabled",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Guest Network",
        },
    ),
    (
        "led_on",
        VariableInfo {
            kinds: &[ResourceKind::Eero],
            label: "LED Status Light",
        },
    ),
    (
        "paused",
        VariableInfo {
            kinds: &[ResourceKind::Client, ResourceKind::Profile],
            label: "Paused",
        },
    ),
    (
        "ad_block",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Ad Blocking",
        },
    ),
    (
        "block_illegal_content",
        VariableInfo {
            kinds: &[ResourceKind::Profile],
            label: "Illegal Content Filter",
        },
    ),
    (
        "block_malware",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Advanced Security",
        },
    ),
    (
        "block_pornographic_content",
        VariableInfo {
            kinds: &[ResourceKind::Profile],
            label: "Adult Content Filter",
        },
    ),
    (
        "block_violent_content",
        VariableInfo {
            kinds: &[ResourceKind::Profile],
            label: "Violent Content Filter",
        },
    ),
    (
        "safe_search_enabled",
        VariableInfo {
            kinds: &[ResourceKind::Profile],
            label: "SafeSearch",
        },
    ),
];

/// Switches that only exist while eero Secure is active
pub(crate) const PREMIUM_SWITCHES: &[&str] = &[
    "ad_block",
    "block_illegal_content",
    "block_malware",
    "block_pornographic_content",
    "block_violent_content",
    "safe_search_enabled",
];

pub struct EeroSwitch {
    pub(crate) inner: EeroEntity,
}

impl EeroSwitch {
    pub(crate) fn new(inner: EeroEntity) -> Self {
        Self { inner }
    }

    fn is_on(&self) -> bool {
        let variable = self.inner.variable;
        self.inner
            .with_resource(|_, resource| resource.flag(variable))
            .flatten()
            .unwrap_or(false)
    }

    async fn set(&self, on: bool) -> Result<(), EntityError> {
        let api = &self.inner.api;
        let network_id = self.inner.network_id.as_str();
        let resource_id = self.inner.resource_id.as_deref().unwrap_or_default();
        let variable = self.inner.variable;
        let kind = self
            .inner
            .with_resource(|_, resource| resource.kind())
            .ok_or_else(|| EntityError::Failed(format!("{} is not available", self.name())))?;
        debug!(variable = %variable, on = on, "Setting eero switch");

        let result = match (kind, variable) {
            (ResourceKind::Network, "guest_network_enabled") => {
                api.set_guest_network(network_id, on).await
            }
            (ResourceKind::Network, policy) => {
                api.set_network_dns_policy(network_id, policy, on).await
            }
            (ResourceKind::Eero, "led_on") => api.set_led(resource_id, on).await,
            (ResourceKind::Profile, "paused") => {
                api.set_profile_paused(network_id, resource_id, on).await
            }
            (ResourceKind::Profile, policy) => {
                api.set_profile_dns_policy(network_id, resource_id, policy, on)
                    .await
            }
            (ResourceKind::Client, "paused") => {
                api.set_client_paused(network_id, resource_id, on).await
            }
            _ => return Err(EntityError::NotSupported("set")),
        };
        result.map_err(|e| EntityError::Failed(e.to_string()))?;

        let _ = self.inner.coordinator.refresh().await;
        Ok(())
    }
}

#[async_trait]
impl Entity for EeroSwitch {
    fn domain(&self) -> &'static str {
        PLATFORM_SWITCH
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.inner.unique_id())
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn state(&self) -> Option<String> {
        Some(if self.is_on() { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn device_class(&self) -> Option<String> {
        Some("switch".to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.inner.base_attributes();
        if self.inner.variable == "guest_network_enabled" && self.is_on() {
            self.inner.with_resource(|network, _| {
                attrs.insert(
                    "guest_network_name".to_string(),
                    json!(network.guest_network_name()),
                );
            });
        }
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

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.set(true).await
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.set(false).await
    }
}
