//! Entity platform
//!
//! Owns the entities one integration instance created, gives them entity
//! ids and writes their states into the host state machine.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ha_core::constants::{
    ATTR_DEVICE_CLASS, ATTR_FRIENDLY_NAME, ATTR_ICON, ATTR_SUPPORTED_FEATURES,
    ATTR_UNIT_OF_MEASUREMENT, STATE_UNAVAILABLE, STATE_UNKNOWN,
};
use ha_core::{Context, EntityId};
use ha_host::Hass;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::coordinator::DataUpdateCoordinator;
use crate::entity::{EntityError, EntityHandle};

/// The entities of one integration instance
pub struct EntityPlatform {
    hass: Hass,
    integration: String,
    entities: DashMap<String, EntityHandle>,
    /// Unique ids only have to be unique within a domain
    unique_ids: DashMap<(String, String), EntityId>,
    order: Mutex<Vec<EntityId>>,
}

impl EntityPlatform {
    pub fn new(hass: Hass, integration: impl Into<String>) -> Self {
        Self {
            hass,
            integration: integration.into(),
            entities: DashMap::new(),
            unique_ids: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn hass(&self) -> &Hass {
        &self.hass
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    /// Add entities and write their first state
    ///
    /// With `update_before_add` each entity is updated first; an update
    /// error is logged and the entity is still added. Entities whose unique
    /// id is already present in their domain are skipped.
    #[instrument(skip(self, entities), fields(integration = %self.integration, count = entities.len()))]
    pub async fn add_entities(
        &self,
        entities: Vec<EntityHandle>,
        update_before_add: bool,
    ) -> Vec<EntityId> {
        let mut added = Vec::new();

        for handle in entities {
            let (name, domain, unique_id) = {
                let mut entity = handle.lock().await;
                if update_before_add {
                    if let Err(err) = entity.update().await {
                        warn!("Update of {} failed before add: {}", entity.name(), err);
                    }
                }
                (entity.name(), entity.domain(), entity.unique_id())
            };

            let unique_key = unique_id.map(|unique_id| (domain.to_string(), unique_id));
            if let Some(key) = &unique_key {
                if self.unique_ids.contains_key(key) {
                    warn!(domain, unique_id = %key.1, "Entity with this unique id already exists, skipping");
                    continue;
                }
            }

            let entity_id = match self.generate_entity_id(domain, &name) {
                Ok(id) => id,
                Err(err) => {
                    warn!("Cannot derive entity id for '{}': {}", name, err);
                    continue;
                }
            };

            if let Some(key) = unique_key {
                self.unique_ids.insert(key, entity_id.clone());
            }
            self.entities.insert(entity_id.to_string(), handle);
            self.order.lock().await.push(entity_id.clone());
            self.write_state(&entity_id).await;
            debug!(entity_id = %entity_id, "Added entity");
            added.push(entity_id);
        }

        added
    }

    fn generate_entity_id(&self, domain: &str, name: &str) -> Result<EntityId, ha_core::EntityIdError> {
        let base = EntityId::from_name(domain, name)?;
        let taken = |id: &EntityId| {
            let key = id.to_string();
            self.entities.contains_key(&key) || self.hass.states.contains(&key)
        };

        if !taken(&base) {
            return Ok(base);
        }
        let mut n = 2;
        loop {
            let candidate = base.with_suffix(n);
            if !taken(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Look up an entity by entity id
    pub fn entity(&self, entity_id: &str) -> Option<EntityHandle> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    /// Look up the entity id assigned to a unique id within `domain`
    pub fn entity_id_for(&self, domain: &str, unique_id: &str) -> Option<EntityId> {
        self.unique_ids
            .get(&(domain.to_string(), unique_id.to_string()))
            .map(|e| e.clone())
    }

    /// Entity ids in the order they were added
    pub async fn entity_ids(&self) -> Vec<EntityId> {
        self.order.lock().await.clone()
    }

    /// Write one entity's current state to the state machine
    pub async fn write_state(&self, entity_id: &EntityId) {
        let Some(handle) = self.entity(&entity_id.to_string()) else {
            return;
        };
        let entity = handle.lock().await;

        let mut attributes: HashMap<String, serde_json::Value> = entity.attributes();
        attributes.insert(ATTR_FRIENDLY_NAME.to_string(), json!(entity.name()));
        if let Some(icon) = entity.icon() {
            attributes.insert(ATTR_ICON.to_string(), json!(icon));
        }
        if let Some(unit) = entity.unit_of_measurement() {
            attributes.insert(ATTR_UNIT_OF_MEASUREMENT.to_string(), json!(unit));
        }
        if let Some(device_class) = entity.device_class() {
            attributes.insert(ATTR_DEVICE_CLASS.to_string(), json!(device_class));
        }
        let features = entity.supported_features();
        if features != 0 {
            attributes.insert(ATTR_SUPPORTED_FEATURES.to_string(), json!(features));
        }

        let state = if !entity.available() {
            STATE_UNAVAILABLE.to_string()
        } else {
            entity.state().unwrap_or_else(|| STATE_UNKNOWN.to_string())
        };
        drop(entity);

        self.hass
            .states
            .set(entity_id.clone(), state, attributes, Context::new());
    }

    /// Write every entity's state without updating
    pub async fn write_all(&self) {
        for entity_id in self.entity_ids().await {
            self.write_state(&entity_id).await;
        }
    }

    /// Update polled entities and write every state
    pub async fn poll(&self) {
        for entity_id in self.entity_ids().await {
            if let Some(handle) = self.entity(&entity_id.to_string()) {
                let mut entity = handle.lock().await;
                if entity.should_poll() {
                    if let Err(err) = entity.update().await {
                        warn!(entity_id = %entity_id, "Update failed: {}", err);
                    }
                }
            }
            self.write_state(&entity_id).await;
        }
    }

    /// Call `turn_on`/`turn_off` on an entity and write its new state
    pub async fn set_on(&self, entity_id: &str, on: bool) -> Result<(), EntityError> {
        let handle = self
            .entity(entity_id)
            .ok_or_else(|| EntityError::Failed(format!("Unknown entity {}", entity_id)))?;
        {
            let mut entity = handle.lock().await;
            if on {
                entity.turn_on().await?;
            } else {
                entity.turn_off().await?;
            }
        }
        if let Ok(id) = entity_id.parse() {
            self.write_state(&id).await;
        }
        Ok(())
    }

    /// Rewrite all states whenever `coordinator` refreshes
    pub fn track_coordinator<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        coordinator: &DataUpdateCoordinator<T>,
    ) -> JoinHandle<()> {
        let platform = self.clone();
        let mut rx = coordinator.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        platform.write_all().await
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Poll this platform's entities on a fixed interval
    pub fn spawn_polling(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let platform = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                platform.poll().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{entity_handle, Entity};
    use async_trait::async_trait;

    struct Counter {
        domain: &'static str,
        name: String,
        unique_id: Option<String>,
        value: u32,
        available: bool,
    }

    #[async_trait]
    impl Entity for Counter {
        fn domain(&self) -> &'static str {
            self.domain
        }

        fn unique_id(&self) -> Option<String> {
            self.unique_id.clone()
        }

        fn name(&self) -> String {
            self.name.clone()
        }

        fn state(&self) -> Option<String> {
            Some(self.value.to_string())
        }

        fn available(&self) -> bool {
            self.available
        }

        fn unit_of_measurement(&self) -> Option<String> {
            Some("clients".to_string())
        }

        async fn update(&mut self) -> Result<(), EntityError> {
            self.value += 1;
            Ok(())
        }
    }

    fn counter(name: &str, unique_id: Option<&str>) -> EntityHandle {
        counter_in("sensor", name, unique_id)
    }

    fn counter_in(domain: &'static str, name: &str, unique_id: Option<&str>) -> EntityHandle {
        entity_handle(Counter {
            domain,
            name: name.to_string(),
            unique_id: unique_id.map(String::from),
            value: 0,
            available: true,
        })
    }

    #[tokio::test]
    async fn test_add_entities_writes_state() {
        let hass = Hass::default();
        let platform = EntityPlatform::new(hass.clone(), "test");

        let ids = platform
            .add_entities(vec![counter("Home Clients", Some("a"))], true)
            .await;

        assert_eq!(ids[0].to_string(), "sensor.home_clients");
        let state = hass.states.get("sensor.home_clients").unwrap();
        assert_eq!(state.state, "1");
        assert_eq!(state.attributes["unit_of_measurement"], "clients");
        assert_eq!(state.attributes["friendly_name"], "Home Clients");
    }

    #[tokio::test]
    async fn test_duplicate_names_get_suffix_and_unique_ids_skip() {
        let hass = Hass::default();
        let platform = EntityPlatform::new(hass, "test");

        let ids = platform
            .add_entities(
                vec![
                    counter("Load", Some("a")),
                    counter("Load", Some("b")),
                    counter("Load", Some("a")),
                ],
                false,
            )
            .await;

        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["sensor.load", "sensor.load_2"]);
        assert_eq!(
            platform.entity_id_for("sensor", "b").unwrap().to_string(),
            "sensor.load_2"
        );
    }

    #[tokio::test]
    async fn test_unique_ids_scoped_by_domain() {
        let hass = Hass::default();
        let platform = EntityPlatform::new(hass.clone(), "test");

        let ids = platform
            .add_entities(
                vec![
                    counter_in("binary_sensor", "Home Away", Some("s1-away")),
                    counter_in("switch", "Home Nest Away", Some("s1-away")),
                    counter_in("switch", "Home Away Again", Some("s1-away")),
                ],
                false,
            )
            .await;

        assert_eq!(ids.len(), 2);
        assert_eq!(
            platform.entity_id_for("binary_sensor", "s1-away").unwrap().to_string(),
            "binary_sensor.home_away"
        );
        assert_eq!(
            platform.entity_id_for("switch", "s1-away").unwrap().to_string(),
            "switch.home_nest_away"
        );
        assert!(platform.entity_id_for("sensor", "s1-away").is_none());
        assert!(hass.states.get("switch.home_away_again").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_entity() {
        let hass = Hass::default();
        let platform = EntityPlatform::new(hass.clone(), "test");
        let handle: EntityHandle = entity_handle(Counter {
            domain: "sensor",
            name: "Offline".to_string(),
            unique_id: None,
            value: 3,
            available: false,
        });

        platform.add_entities(vec![handle], false).await;
        assert_eq!(hass.states.get("sensor.offline").unwrap().state, "unavailable");
    }

    #[tokio::test]
    async fn test_poll_updates_and_turn_on_not_supported() {
        let hass = Hass::default();
        let platform = EntityPlatform::new(hass.clone(), "test");
        platform.add_entities(vec![counter("Polled", None)], false).await;

        platform.poll().await;
        platform.poll().await;
        assert_eq!(hass.states.get("sensor.polled").unwrap().state, "2");

        let err = platform.set_on("sensor.polled", true).await.unwrap_err();
        assert!(matches!(err, EntityError::NotSupported("turn_on")));
    }
}
