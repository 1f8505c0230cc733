//! Entity trait and device metadata

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by entity updates and commands
#[derive(Debug, Clone, Error)]
pub enum EntityError {
    /// A command or update failed; the message is shown to the user
    #[error("{0}")]
    Failed(String),

    /// The entity does not implement the requested operation
    #[error("{0} is not supported by this entity")]
    NotSupported(&'static str),
}

/// Device registry metadata attached to an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    /// `(type, value)` connections such as `("mac", "aa:bb:..")`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<(String, String)>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub sw_version: Option<String>,
    /// Identifier of the parent device (e.g. the network an eero belongs to)
    pub via_device: Option<(String, String)>,
}

impl DeviceInfo {
    /// Device info with a single identifier
    pub fn new(domain: &str, id: impl Into<String>) -> Self {
        Self {
            identifiers: vec![(domain.to_string(), id.into())],
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_sw_version(mut self, sw_version: impl Into<String>) -> Self {
        self.sw_version = Some(sw_version.into());
        self
    }

    pub fn with_via_device(mut self, domain: &str, id: impl Into<String>) -> Self {
        self.via_device = Some((domain.to_string(), id.into()));
        self
    }
}

/// An entity an integration exposes to the host
///
/// Everything but `domain`, `name` and `state` has a default. Entities that
/// read from a [`DataUpdateCoordinator`](crate::DataUpdateCoordinator)
/// return `false` from [`Entity::should_poll`] and report the coordinator's
/// `last_update_success` from [`Entity::available`].
#[async_trait]
pub trait Entity: Send + Sync {
    /// Entity platform domain (`sensor`, `switch`, `climate` …)
    fn domain(&self) -> &'static str;

    /// Stable unique id used for de-duplication
    fn unique_id(&self) -> Option<String> {
        None
    }

    /// Display name, also the source of the generated entity id
    fn name(&self) -> String;

    /// Current state value; `None` is written as `unknown`
    fn state(&self) -> Option<String>;

    /// Extra state attributes
    fn attributes(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    fn available(&self) -> bool {
        true
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn device_class(&self) -> Option<String> {
        None
    }

    fn unit_of_measurement(&self) -> Option<String> {
        None
    }

    fn supported_features(&self) -> u32 {
        0
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// Whether the platform should call [`Entity::update`] on each poll
    fn should_poll(&self) -> bool {
        true
    }

    /// Refresh the entity's cached readings
    async fn update(&mut self) -> Result<(), EntityError> {
        Ok(())
    }

    /// Turn the entity on (switches, camera streaming, humidifiers …)
    async fn turn_on(&mut self) -> Result<(), EntityError> {
        Err(EntityError::NotSupported("turn_on"))
    }

    /// Turn the entity off
    async fn turn_off(&mut self) -> Result<(), EntityError> {
        Err(EntityError::NotSupported("turn_off"))
    }
}

/// Shared handle to an entity owned by a platform
pub type EntityHandle = Arc<Mutex<dyn Entity>>;

/// Wrap an entity for handing to a platform
pub fn entity_handle<E: Entity + 'static>(entity: E) -> Arc<Mutex<E>> {
    Arc::new(Mutex::new(entity))
}
