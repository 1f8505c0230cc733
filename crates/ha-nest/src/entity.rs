//! Behaviour shared by every Nest entity

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::constants::ATTR_ATTRIBUTION;
use ha_helpers::{DataUpdateCoordinator, DeviceInfo, EntityError};
use serde_json::{json, Value};
use tracing::warn;

use crate::api::{NestApi, NestResult};
use crate::models::{DeviceRef, NestData, Structure};
use crate::web_client::{NestWebClient, WebData};
use crate::{ATTRIBUTION, DOMAIN, MANUFACTURER};

pub const MODEL_CAMERA: &str = "Camera";
pub const MODEL_PROTECT: &str = "Protect";
pub const MODEL_STRUCTURE: &str = "Structure";
pub const MODEL_TEMPERATURE_SENSOR: &str = "Temperature Sensor";
pub const MODEL_THERMOSTAT: &str = "Thermostat";

/// An entity bound to one structure or device of the data tree
pub(crate) struct NestDevice {
    pub coordinator: Arc<DataUpdateCoordinator<NestData>>,
    pub api: Arc<NestApi>,
    pub device: DeviceRef,
    pub structure_id: String,
}

impl NestDevice {
    pub fn new(
        coordinator: Arc<DataUpdateCoordinator<NestData>>,
        api: Arc<NestApi>,
        device: DeviceRef,
        structure_id: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            api,
            device,
            structure_id: structure_id.into(),
        }
    }

    /// Read from the latest snapshot
    pub fn read<R>(&self, f: impl FnOnce(&NestData) -> Option<R>) -> Option<R> {
        let data = self.coordinator.data()?;
        f(&data)
    }

    pub fn structure(&self) -> Option<Structure> {
        self.read(|data| data.structure(&self.structure_id).cloned())
    }

    fn present(&self) -> bool {
        self.read(|data| {
            let id = self.device.id();
            let found = match &self.device {
                DeviceRef::Structure(_) => data.structure(id).is_some(),
                DeviceRef::Thermostat(_) => data.thermostat(id).is_some(),
                DeviceRef::SmokeCoAlarm(_) => data.smoke_co_alarm(id).is_some(),
                DeviceRef::Camera(_) => data.camera(id).is_some(),
            };
            Some(found)
        })
        .unwrap_or(false)
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.present()
    }

    /// Id used for unique ids and device identifiers
    pub fn serial(&self) -> &str {
        self.device.id()
    }

    pub fn base_attributes(&self) -> HashMap<String, Value> {
        HashMap::from([(ATTR_ATTRIBUTION.to_string(), json!(ATTRIBUTION))])
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.read(|data| {
            let id = self.device.id();
            let (name, model, sw_version) = match &self.device {
                DeviceRef::Structure(_) => (data.structure(id)?.name.clone(), MODEL_STRUCTURE, None),
                DeviceRef::Thermostat(_) => {
                    let t = data.thermostat(id)?;
                    (t.name_long.clone(), MODEL_THERMOSTAT, t.software_version.clone())
                }
                DeviceRef::SmokeCoAlarm(_) => {
                    let p = data.smoke_co_alarm(id)?;
                    (p.name_long.clone(), MODEL_PROTECT, p.software_version.clone())
                }
                DeviceRef::Camera(_) => {
                    let c = data.camera(id)?;
                    (c.name_long.clone(), MODEL_CAMERA, c.software_version.clone())
                }
            };
            let mut info = DeviceInfo::new(DOMAIN, id)
                .with_name(name)
                .with_manufacturer(MANUFACTURER)
                .with_model(model);
            if let Some(sw_version) = sw_version {
                info = info.with_sw_version(sw_version);
            }
            Some(info)
        })
    }

    /// Refresh after a write so the entity shows the new value
    pub async fn after_write(&self, result: NestResult<()>, what: &str) -> Result<(), EntityError> {
        result.map_err(|e| EntityError::Failed(format!("Failed to {}: {}", what, e)))?;
        if let Err(err) = self.coordinator.refresh().await {
            warn!("Refresh after {} failed: {}", what, err);
        }
        Ok(())
    }
}

/// Web client data of one id
#[derive(Clone)]
pub(crate) struct WebLink {
    pub client: Arc<NestWebClient>,
    pub coordinator: Arc<DataUpdateCoordinator<WebData>>,
    pub id: String,
}

impl WebLink {
    pub fn value(&self, key: &str) -> Option<Value> {
        let data = self.coordinator.data()?;
        data.get(&self.id)?.get(key).filter(|v| !v.is_null()).cloned()
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.value(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
            _ => false,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key)?.as_f64()
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    /// Refresh the web data after a write
    pub async fn after_write(&self, result: NestResult<()>, what: &str) -> Result<(), EntityError> {
        result.map_err(|e| EntityError::Failed(format!("Failed to {}: {}", what, e)))?;
        if let Err(err) = self.coordinator.refresh().await {
            warn!("Refresh after {} failed: {}", what, err);
        }
        Ok(())
    }
}

/// Round a requested humidity to the thermostat's step and range
pub fn clamp_humidity(humidity: f64) -> u32 {
    let stepped = (humidity / crate::HUMIDITY_STEP as f64).round() * crate::HUMIDITY_STEP as f64;
    (stepped as u32).clamp(crate::HUMIDITY_MIN, crate::HUMIDITY_MAX)
}
