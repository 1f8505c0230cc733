//! eero sensors

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::PLATFORM_SENSOR;
use ha_core::util::round_to;
use ha_helpers::{DeviceInfo, Entity};
use serde_json::{json, Value};

use crate::entity::{EeroEntity, VariableInfo};
use crate::models::{Resource, ResourceKind};

pub(crate) const SENSOR_TYPES: &[(&str, VariableInfo)] = &[
    (
        "connected_clients_count",
        VariableInfo {
            kinds: &[ResourceKind::Eero],
            label: "Connected Clients",
        },
    ),
    (
        "public_ip",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Public IP",
        },
    ),
    (
        "speed_down",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Download Speed",
        },
    ),
    (
        "speed_up",
        VariableInfo {
            kinds: &[ResourceKind::Network],
            label: "Upload Speed",
        },
    ),
    (
        "status",
        VariableInfo {
            kinds: &[ResourceKind::Eero, ResourceKind::Network],
            label: "Status",
        },
    ),
];

pub struct EeroSensor {
    pub(crate) inner: EeroEntity,
}

impl EeroSensor {
    pub(crate) fn new(inner: EeroEntity) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Entity for EeroSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.inner.unique_id())
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    fn state(&self) -> Option<String> {
        let variable = self.inner.variable;
        self.inner
            .with_resource(|_, resource| match (resource, variable) {
                (Resource::Eero(e), "connected_clients_count") => {
                    e.connected_clients_count().map(|c| c.to_string())
                }
                (Resource::Eero(e), "status") => e.status().map(String::from),
                (Resource::Network(n), "status") => n.status().map(String::from),
                (Resource::Network(n), "public_ip") => n.public_ip().map(String::from),
                (Resource::Network(n), "speed_down") => {
                    n.speed_down().value.map(|v| round_to(v, 1).to_string())
                }
                (Resource::Network(n), "speed_up") => {
                    n.speed_up().value.map(|v| round_to(v, 1).to_string())
                }
                _ => None,
            })
            .flatten()
    }

    fn unit_of_measurement(&self) -> Option<String> {
        match self.inner.variable {
            "connected_clients_count" => Some("clients".to_string()),
            "speed_down" => self
                .inner
                .with_resource(|network, _| network.speed_down().units)
                .flatten(),
            "speed_up" => self
                .inner
                .with_resource(|network, _| network.speed_up().units)
                .flatten(),
            _ => None,
        }
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.inner.base_attributes();
        let variable = self.inner.variable;
        self.inner.with_resource(|_, resource| match (resource, variable) {
            (Resource::Network(n), "speed_down" | "speed_up") => {
                attrs.insert("last_updated".to_string(), json!(n.speed_date()));
            }
            (Resource::Network(n), "status") => {
                attrs.insert(
                    "health_eero_network_status".to_string(),
                    json!(n.health_eero_network_status()),
                );
                attrs.insert(
                    "health_internet_isp_up".to_string(),
                    json!(n.health_internet_isp_up()),
                );
                attrs.insert(
                    "health_internet_status".to_string(),
                    json!(n.health_internet_status()),
                );
            }
            _ => {}
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
