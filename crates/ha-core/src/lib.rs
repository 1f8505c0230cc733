//! Core types for the custom components
//!
//! This crate provides the fundamental types every integration speaks to the
//! host with: EntityId, State, Event, Context and ServiceCall, plus the
//! shared constants and text helpers.

pub mod constants;
mod context;
mod entity_id;
mod event;
mod service_call;
mod state;
pub mod util;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::{ServiceCall, SupportsResponse};
pub use state::State;

/// Standard event types fired by the host
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Fired once when the host shuts down
    pub const HOMEASSISTANT_STOP: &str = "homeassistant_stop";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
