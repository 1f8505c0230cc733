//! HomeKit bridge accessories for Nest and SmartThings entities
//!
//! Each accessory maps a host entity's state onto HomeKit characteristics
//! and turns controller writes back into host service calls. The
//! [`HomeKit`] bridge owns the accessories, follows `state_changed` and
//! forwards writes.
//!
//! # Key Types
//!
//! - [`Accessory`] - state and write mapping of one bridged entity
//! - [`AccessoryType`] - the types that can be configured per entity
//! - [`HomeKit`] - the bridge

pub mod accessory;
pub mod camera;
pub mod characteristic;
pub mod fan;
pub mod humidifier;
pub mod sensors;
pub mod smartthings;
pub mod thermostat;

use std::sync::Arc;

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::Context;
use ha_host::{Hass, ServiceError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub use accessory::{create_accessory, Accessory, AccessoryConfig, AccessoryType, Category, ServiceRequest};
pub use camera::{CameraConfig, NestCamera, StreamConfig};
pub use characteristic::{CharValues, HkService};
pub use fan::Fan;
pub use humidifier::NestHumidifier;
pub use sensors::{NestCameraSensor, NestProtect, NestTemperatureSensor};
pub use smartthings::{SmartThingsButton, SmartThingsMotionSensor};
pub use thermostat::NestThermostat;

pub const DOMAIN: &str = "homekit";

#[derive(Debug, Error)]
pub enum HomeKitError {
    #[error("unknown accessory type: {0}")]
    UnknownType(String),

    /// The entity has no state or no accessory
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("camera {0} has no stream source")]
    NoStreamSource(String),

    #[error("failed to start stream: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Options of one bridged entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(rename = "type")]
    pub kind: AccessoryType,
    #[serde(flatten)]
    pub accessory: AccessoryConfig,
}

/// The `homekit:` configuration block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeKitConfig {
    #[serde(default)]
    pub entity_config: IndexMap<String, EntityConfig>,
}

type AccessoryHandle = Arc<Mutex<Box<dyn Accessory>>>;

/// Bridge of accessories keyed by entity id
pub struct HomeKit {
    hass: Hass,
    accessories: DashMap<String, AccessoryHandle>,
}

impl HomeKit {
    pub fn new(hass: Hass) -> Arc<Self> {
        Arc::new(Self {
            hass,
            accessories: DashMap::new(),
        })
    }

    /// Bridge every configured entity that has a state
    ///
    /// Entities without a state are skipped with a warning.
    pub fn setup(hass: Hass, config: &HomeKitConfig) -> Arc<Self> {
        let homekit = Self::new(hass);
        for (entity_id, entity) in &config.entity_config {
            if let Err(e) = homekit.add_accessory(entity_id, entity.kind, &entity.accessory) {
                warn!(entity_id, error = %e, "Not bridging entity");
            }
        }
        info!(accessories = homekit.accessories.len(), "HomeKit bridge set up");
        homekit
    }

    /// Create the accessory for an entity from its current state
    #[instrument(skip(self, config))]
    pub fn add_accessory(
        &self,
        entity_id: &str,
        kind: AccessoryType,
        config: &AccessoryConfig,
    ) -> Result<(), HomeKitError> {
        let state = self
            .hass
            .states
            .get(entity_id)
            .ok_or_else(|| HomeKitError::UnknownEntity(entity_id.to_string()))?;
        let accessory = create_accessory(kind, &state, config);
        debug!(category = ?accessory.category(), "Adding accessory");
        self.accessories
            .insert(entity_id.to_string(), Arc::new(Mutex::new(accessory)));
        Ok(())
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.accessories.iter().map(|a| a.key().clone()).collect()
    }

    fn handle(&self, entity_id: &str) -> Result<AccessoryHandle, HomeKitError> {
        self.accessories
            .get(entity_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| HomeKitError::UnknownEntity(entity_id.to_string()))
    }

    /// Snapshot of an accessory's services
    pub async fn services(&self, entity_id: &str) -> Option<Vec<HkService>> {
        let handle = self.handle(entity_id).ok()?;
        let accessory = handle.lock().await;
        Some(accessory.services().to_vec())
    }

    /// Apply a controller write to the service at `service`
    ///
    /// The resulting host service calls run in order; the first failure
    /// stops the rest.
    #[instrument(skip(self, values))]
    pub async fn set_chars(
        &self,
        entity_id: &str,
        service: usize,
        values: &CharValues,
    ) -> Result<(), HomeKitError> {
        let handle = self.handle(entity_id)?;
        let state = self
            .hass
            .states
            .get(entity_id)
            .ok_or_else(|| HomeKitError::UnknownEntity(entity_id.to_string()))?;
        let requests = handle.lock().await.set_chars(service, values, &state);

        for request in requests {
            debug!(
                domain = request.domain,
                service = request.service,
                event = %request.event,
                "Calling service"
            );
            self.hass
                .services
                .call(
                    request.domain,
                    request.service,
                    Value::Object(request.data),
                    Context::new(),
                    false,
                )
                .await?;
        }
        Ok(())
    }

    /// Keep accessories in sync with their entities' states
    pub fn spawn_state_tracking(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.hass.bus.subscribe_typed::<StateChangedData>();
        let homekit = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} state changes", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(new_state) = &event.data.new_state else {
                    continue;
                };
                let Ok(handle) = homekit.handle(&event.data.entity_id.to_string()) else {
                    continue;
                };
                handle.lock().await.update_state(new_state);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_parsing() {
        let config: HomeKitConfig = serde_json::from_value(json!({
            "entity_config": {
                "climate.hallway": {"type": "NestThermostat", "service_name_prefix": "Hall"},
                "camera.front_door": {"type": "NestCamera", "stream_source": "rtsp://cam", "max_fps": 15}
            }
        }))
        .unwrap();
        let hallway = &config.entity_config["climate.hallway"];
        assert_eq!(hallway.kind, AccessoryType::NestThermostat);
        assert_eq!(hallway.accessory.name_prefix.as_deref(), Some("Hall"));
        let camera = &config.entity_config["camera.front_door"];
        assert_eq!(camera.accessory.camera.stream_source.as_deref(), Some("rtsp://cam"));
        assert_eq!(camera.accessory.camera.max_fps, 15);
    }
}
