//! Entity state machine

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::EventBus;

/// Tracks the current state of every entity
///
/// Every write fires `state_changed` with the previous and new state, which
/// is how the integration sensor follows its source.
pub struct StateMachine {
    states: DashMap<String, State>,
    event_bus: Arc<EventBus>,
}

impl StateMachine {
    /// Create a new state machine that fires on `event_bus`
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the value changes.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(state = %new_state.state, "Setting entity state");

        self.states.insert(key, new_state.clone());
        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Whether an entity id is already in use
    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }

    /// Sorted entity ids for a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|s| s.value().entity_id.domain() == domain)
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Remove an entity's state, firing `state_changed` with no new state
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(state) = &old_state {
            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, StateMachine) {
        let event_bus = Arc::new(EventBus::new());
        let states = StateMachine::new(event_bus.clone());
        (event_bus, states)
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, sm) = make_test_setup();
        let attrs = HashMap::from([("unit_of_measurement".to_string(), json!("%"))]);

        let state = sm.set(
            "sensor.processor_use".parse().unwrap(),
            "12",
            attrs.clone(),
            Context::new(),
        );

        assert_eq!(state.state, "12");
        assert_eq!(sm.get("sensor.processor_use").unwrap().attributes, attrs);
    }

    #[tokio::test]
    async fn test_set_fires_state_changed() {
        let (bus, sm) = make_test_setup();
        let mut rx = bus.subscribe_typed::<StateChangedData>();
        let id: EntityId = "sensor.power".parse().unwrap();

        sm.set(id.clone(), "1", HashMap::new(), Context::new());
        sm.set(id, "2", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.data.old_state.is_none());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.old_state.unwrap().state, "1");
        assert_eq!(second.data.new_state.unwrap().state, "2");
    }

    #[test]
    fn test_entity_ids_sorted_by_domain() {
        let (_, sm) = make_test_setup();
        for id in ["sensor.b", "switch.a", "sensor.a"] {
            sm.set(id.parse().unwrap(), "on", HashMap::new(), Context::new());
        }
        assert_eq!(sm.entity_ids("sensor"), vec!["sensor.a", "sensor.b"]);
    }

    #[test]
    fn test_remove() {
        let (_, sm) = make_test_setup();
        let id: EntityId = "switch.led".parse().unwrap();
        sm.set(id.clone(), "on", HashMap::new(), Context::new());

        assert!(sm.remove(&id, Context::new()).is_some());
        assert!(!sm.contains("switch.led"));
        assert!(sm.remove(&id, Context::new()).is_none());
    }
}
