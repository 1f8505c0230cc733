//! System monitor
//!
//! Sensors for disk, memory, swap, CPU, load, network and process state of
//! the machine the host runs on. Configured from YAML
//! (`sensor: - platform: systemmonitor`) or one config entry per resource.

pub mod config_flow;
pub mod sensor;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use ha_config_entries::ConfigEntry;
use ha_core::EntityId;
use ha_helpers::{entity_handle, EntityHandle, EntityPlatform};
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

pub use config_flow::SystemMonitorConfigFlow;
pub use sensor::{sensor_type_for, SensorType, SystemMonitorSensor, SENSOR_TYPES};
pub use source::{SysinfoSource, SystemSource};

pub const DOMAIN: &str = "systemmonitor";
pub const CONF_TYPE: &str = "type";
pub const CONF_ARG: &str = "arg";
pub const DEFAULT_SCAN_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_DISK_ARG: &str = "/";

#[derive(Debug, Error)]
pub enum SystemMonitorError {
    #[error("invalid system monitor config: {0}")]
    InvalidConfig(String),

    #[error("unknown resource type '{0}'")]
    UnknownType(String),
}

pub type SystemMonitorResult<T> = Result<T, SystemMonitorError>;

/// One monitored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

impl ResourceConfig {
    pub fn new(resource_type: impl Into<String>, arg: Option<&str>) -> Self {
        Self {
            resource_type: resource_type.into(),
            arg: arg.map(String::from),
        }
    }
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECONDS
}

/// `sensor: - platform: systemmonitor` block
#[derive(Debug, Clone, Deserialize)]
pub struct SystemMonitorPlatformConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Seconds between polls
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

/// Build the sensor of one resource, or `None` when it cannot be read here
fn build_sensor(
    source: &Arc<dyn SystemSource>,
    resource: &ResourceConfig,
) -> SystemMonitorResult<Option<SystemMonitorSensor>> {
    let sensor_type = sensor_type_for(&resource.resource_type)
        .ok_or_else(|| SystemMonitorError::UnknownType(resource.resource_type.clone()))?;

    let mut arg = resource.arg.clone().filter(|a| !a.is_empty());
    if arg.is_none() && sensor_type.key.starts_with("disk_") {
        arg = Some(DEFAULT_DISK_ARG.to_string());
    }
    if sensor_type.requires_arg && arg.is_none() {
        return Err(SystemMonitorError::InvalidConfig(format!(
            "resource '{}' needs an argument",
            sensor_type.key
        )));
    }

    if sensor_type.key == "processor_temperature"
        && sensor::cpu_temperature(&source.temperatures()).is_none()
    {
        warn!("Cannot read CPU / processor temperature information");
        return Ok(None);
    }

    Ok(Some(SystemMonitorSensor::new(source.clone(), sensor_type, arg)))
}

/// Add a sensor per resource to `platform`
///
/// Every resource is validated before anything is added.
#[instrument(skip(platform, source, resources), fields(count = resources.len()))]
pub async fn setup_resources(
    platform: &Arc<EntityPlatform>,
    source: Arc<dyn SystemSource>,
    resources: &[ResourceConfig],
) -> SystemMonitorResult<Vec<EntityId>> {
    let mut entities: Vec<EntityHandle> = Vec::new();
    for resource in resources {
        if let Some(sensor) = build_sensor(&source, resource)? {
            entities.push(entity_handle(sensor));
        }
    }

    let added = platform.add_entities(entities, true).await;
    info!("Set up {} system monitor sensors", added.len());
    Ok(added)
}

/// Set up a YAML platform block and poll it on its scan interval
pub async fn setup_platform(
    hass: &Hass,
    config: &SystemMonitorPlatformConfig,
    source: Arc<dyn SystemSource>,
) -> SystemMonitorResult<(Arc<EntityPlatform>, JoinHandle<()>)> {
    if config.scan_interval == 0 {
        return Err(SystemMonitorError::InvalidConfig(
            "scan_interval must be positive".to_string(),
        ));
    }
    let platform = Arc::new(EntityPlatform::new(hass.clone(), DOMAIN));
    setup_resources(&platform, source, &config.resources).await?;
    let task = platform.spawn_polling(Duration::from_secs(config.scan_interval));
    Ok((platform, task))
}

/// Set up the single resource of a config entry
pub async fn setup_entry(
    platform: &Arc<EntityPlatform>,
    entry: &ConfigEntry,
    source: Arc<dyn SystemSource>,
) -> SystemMonitorResult<Vec<EntityId>> {
    let resource: ResourceConfig = entry
        .typed_data()
        .map_err(|e| SystemMonitorError::InvalidConfig(e.to_string()))?;
    setup_resources(platform, source, &[resource]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        DiskUsage, LoadAverage, MemoryUsage, NetIo, SwapUsage, TemperatureReading,
    };
    use std::collections::HashMap;
    use std::net::IpAddr;

    struct StaticSource {
        temperatures: Vec<TemperatureReading>,
    }

    impl SystemSource for StaticSource {
        fn disk_usage(&self, _mount_point: &str) -> Option<DiskUsage> {
            Some(DiskUsage {
                total: 200,
                used: 50,
                free: 150,
            })
        }

        fn memory(&self) -> MemoryUsage {
            MemoryUsage {
                total: 100,
                available: 40,
            }
        }

        fn swap(&self) -> SwapUsage {
            SwapUsage {
                total: 10,
                used: 5,
                free: 5,
            }
        }

        fn cpu_percent(&self) -> f64 {
            3.2
        }

        fn temperatures(&self) -> Vec<TemperatureReading> {
            self.temperatures.clone()
        }

        fn process_running(&self, _name: &str) -> bool {
            false
        }

        fn net_io(&self, _interface: &str) -> Option<NetIo> {
            None
        }

        fn interface_addresses(&self, _interface: &str) -> Option<Vec<IpAddr>> {
            None
        }

        fn boot_time(&self) -> u64 {
            0
        }

        fn load_average(&self) -> LoadAverage {
            LoadAverage::default()
        }
    }

    fn source(with_cpu_temp: bool) -> Arc<dyn SystemSource> {
        let temperatures = if with_cpu_temp {
            vec![TemperatureReading {
                name: "coretemp".to_string(),
                label: "Package id 0".to_string(),
                current: 48.0,
            }]
        } else {
            Vec::new()
        };
        Arc::new(StaticSource { temperatures })
    }

    #[tokio::test]
    async fn test_setup_resources_defaults_disk_arg() {
        let hass = Hass::default();
        let platform = Arc::new(EntityPlatform::new(hass.clone(), DOMAIN));
        let ids = setup_resources(
            &platform,
            source(true),
            &[
                ResourceConfig::new("disk_use_percent", None),
                ResourceConfig::new("memory_use_percent", None),
                ResourceConfig::new("processor_temperature", None),
            ],
        )
        .await
        .unwrap();

        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "sensor.disk_use_percent",
                "sensor.memory_use_percent",
                "sensor.processor_temperature"
            ]
        );
        let disk = hass.states.get("sensor.disk_use_percent").unwrap();
        assert_eq!(disk.state, "25.0");
        assert_eq!(disk.attributes["friendly_name"], "Disk use (percent) /");
        assert_eq!(disk.attributes["unit_of_measurement"], "%");
        assert_eq!(hass.states.get("sensor.memory_use_percent").unwrap().state, "60.0");
        assert_eq!(hass.states.get("sensor.processor_temperature").unwrap().state, "48.0");
    }

    #[tokio::test]
    async fn test_unreadable_temperature_skipped() {
        let platform = Arc::new(EntityPlatform::new(Hass::default(), DOMAIN));
        let ids = setup_resources(
            &platform,
            source(false),
            &[ResourceConfig::new("processor_temperature", None)],
        )
        .await
        .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_resources() {
        let platform = Arc::new(EntityPlatform::new(Hass::default(), DOMAIN));
        let err = setup_resources(&platform, source(true), &[ResourceConfig::new("gpu_use", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, SystemMonitorError::UnknownType(_)));

        let err = setup_resources(&platform, source(true), &[ResourceConfig::new("network_in", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, SystemMonitorError::InvalidConfig(_)));
        assert!(platform.entity_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_setup_entry() {
        let hass = Hass::default();
        let platform = Arc::new(EntityPlatform::new(hass.clone(), DOMAIN));
        let entry = ConfigEntry::new(DOMAIN, "swap_use_percent").with_data(HashMap::from([(
            CONF_TYPE.to_string(),
            serde_json::json!("swap_use_percent"),
        )]));

        setup_entry(&platform, &entry, source(true)).await.unwrap();
        assert_eq!(hass.states.get("sensor.swap_use_percent").unwrap().state, "50.0");
    }

    #[test]
    fn test_platform_config_defaults() {
        let config: SystemMonitorPlatformConfig = serde_json::from_value(serde_json::json!({
            "platform": "systemmonitor",
            "resources": [{"type": "process", "arg": "sshd"}]
        }))
        .unwrap();
        assert_eq!(config.scan_interval, 30);
        assert_eq!(config.resources[0], ResourceConfig::new("process", Some("sshd")));
    }
}
