//! State type representing an entity's current state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{STATE_UNAVAILABLE, STATE_UNKNOWN};
use crate::{Context, EntityId};

/// The state of an entity at a point in time
///
/// The state value is always a string; numeric sensors are parsed back with
/// [`State::as_f64`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value (e.g., "on", "off", "23.5", "unavailable")
    pub state: String,

    /// Additional attributes associated with the state
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if the value didn't change
    pub last_updated: DateTime<Utc>,

    /// Context of the change that created this state
    pub context: Context,
}

impl State {
    /// Create a new state with current timestamp
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create an updated state, preserving last_changed if state value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let state_changed = self.state != new_state;

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if state_changed {
                now
            } else {
                self.last_changed
            },
            last_updated: now,
            context,
        }
    }

    /// Whether the value is `unknown` or `unavailable`
    pub fn is_unknown_or_unavailable(&self) -> bool {
        self.state == STATE_UNKNOWN || self.state == STATE_UNAVAILABLE
    }

    /// Parse the state value as a number
    pub fn as_f64(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor(value: &str) -> State {
        State::new(
            "sensor.power".parse().unwrap(),
            value,
            HashMap::from([("unit_of_measurement".to_string(), json!("W"))]),
            Context::new(),
        )
    }

    #[test]
    fn test_with_update_keeps_last_changed() {
        let state = sensor("10");
        let same = state.with_update("10", state.attributes.clone(), Context::new());
        assert_eq!(same.last_changed, state.last_changed);

        let changed = state.with_update("11", state.attributes.clone(), Context::new());
        assert!(changed.last_changed >= state.last_changed);
        assert_eq!(changed.state, "11");
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(sensor("12.5").as_f64(), Some(12.5));
        assert_eq!(sensor("unknown").as_f64(), None);
        assert_eq!(sensor("nan").as_f64(), None);
        assert!(sensor("unavailable").is_unknown_or_unavailable());
    }

    #[test]
    fn test_attribute() {
        let state = sensor("1");
        assert_eq!(
            state.attribute::<String>("unit_of_measurement").as_deref(),
            Some("W")
        );
        assert_eq!(state.attribute::<String>("missing"), None);
    }
}
