//! Event bus with typed pub/sub

use dashmap::DashMap;
use ha_core::{Context, Event, EventData, EventType};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus integrations fire their events on
///
/// One broadcast channel per event type. Firing an event nobody listens to
/// is not an error.
pub struct EventBus {
    listeners: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to a typed event, receiving parsed data
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Fire an event to all subscribers of its type
    pub fn fire(&self, event: Event<serde_json::Value>) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // No active receivers is fine
            let _ = sender.send(event);
        }
    }

    /// Fire an event built from a type name and JSON data
    pub fn fire_json(
        &self,
        event_type: impl Into<EventType>,
        data: serde_json::Value,
        context: Context,
    ) {
        self.fire(Event::new(event_type, data, context));
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let json_data = serde_json::to_value(&data).unwrap_or_default();
        self.fire(Event::new(T::event_type(), json_data, context));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<serde_json::Value>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    /// Receive the next event whose data parses as `T`
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(event.with_data(data));
            }
        }
    }
}
