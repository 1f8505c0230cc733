//! Helpers for writing integrations
//!
//! - [`Entity`] - the trait every entity implements
//! - [`EntityPlatform`] - assigns entity ids and writes states
//! - [`DataUpdateCoordinator`] - one fetch function, cached snapshot
//! - [`RestoreStateStore`] - last known states across restarts

pub mod coordinator;
pub mod entity;
pub mod platform;
pub mod restore_state;

pub use coordinator::{DataUpdateCoordinator, UpdateFailed};
pub use entity::{entity_handle, DeviceInfo, Entity, EntityError, EntityHandle};
pub use platform::EntityPlatform;
pub use restore_state::RestoreStateStore;

/// Build an attribute map from `key => value` pairs
#[macro_export]
macro_rules! attributes {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = ::std::collections::HashMap::<String, ::serde_json::Value>::new();
        $(map.insert($key.to_string(), ::serde_json::json!($value));)*
        map
    }};
}
