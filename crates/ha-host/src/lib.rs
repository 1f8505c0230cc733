//! Host seam for the custom components
//!
//! The integrations in this workspace are written against a small slice of
//! the host: an event bus, a state machine and a service registry. This
//! crate provides that slice so the integrations can be exercised without
//! the host itself.
//!
//! # Key Types
//!
//! - [`Hass`] - bundle handed to every integration at setup
//! - [`EventBus`] - typed pub/sub
//! - [`StateMachine`] - entity states, fires `state_changed`
//! - [`ServiceRegistry`] - async service handlers

mod bus;
mod services;
mod states;

use std::path::PathBuf;
use std::sync::Arc;

pub use bus::{EventBus, TypedEventReceiver};
pub use services::{
    ServiceDescription, ServiceError, ServiceFuture, ServiceHandler, ServiceRegistry,
    ServiceResult,
};
pub use states::StateMachine;

/// The pieces of the host an integration can reach
#[derive(Clone)]
pub struct Hass {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// State machine for entity states
    pub states: Arc<StateMachine>,
    /// Service registry for service calls
    pub services: Arc<ServiceRegistry>,
    /// Configuration directory (`/config` on a typical install)
    pub config_dir: PathBuf,
}

impl Hass {
    /// Create a host seam rooted at `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());

        Self {
            bus,
            states,
            services,
            config_dir: config_dir.into(),
        }
    }

    /// Resolve a path relative to the configuration directory
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }
}

impl Default for Hass {
    fn default() -> Self {
        Self::new(".")
    }
}
