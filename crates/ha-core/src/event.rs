//! Bus events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Context;

/// Data carried by a well-known event type
pub trait EventData: Clone + Send + Sync + 'static {
    fn event_type() -> &'static str;
}

/// Name of an event, e.g. `state_changed` or `smartthings.button`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for EventType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EventType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fired event; `T` defaults to untyped JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    pub event_type: EventType,
    pub data: T,
    pub time_fired: DateTime<Utc>,
    pub context: Context,
}

impl<T> Event<T> {
    /// Stamp a new event with the current time
    pub fn new(event_type: impl Into<EventType>, data: T, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
            context,
        }
    }

    /// Same event with its data replaced
    pub fn with_data<U>(self, data: U) -> Event<U> {
        Event {
            event_type: self.event_type,
            data,
            time_fired: self.time_fired,
            context: self.context,
        }
    }
}

impl<T: EventData> Event<T> {
    pub fn typed(data: T, context: Context) -> Self {
        Self::new(T::event_type(), data, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_compares_with_str() {
        let event = Event::new("smartthings.button", json!({"value": "pushed"}), Context::new());
        assert_eq!(event.event_type, "smartthings.button");
        assert_eq!(event.event_type.to_string(), "smartthings.button");
    }

    #[test]
    fn test_with_data_keeps_metadata() {
        let context = Context::new();
        let event = Event::new("nest.event", json!({"type": "doorbell"}), context.clone());
        let fired = event.time_fired;

        let typed = event.with_data(42u8);
        assert_eq!(typed.data, 42);
        assert_eq!(typed.time_fired, fired);
        assert_eq!(typed.context.id, context.id);
        assert_eq!(typed.event_type.as_str(), "nest.event");
    }
}
