//! Config Entries
//!
//! A config entry is one configured instance of an integration (one eero
//! account network, one TV, one monitored resource). Entries are created by
//! config flows, which walk the user through one or more form steps.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - a single integration configuration
//! - [`ConfigEntries`] - manager for all config entries
//! - [`ConfigFlow`] / [`OptionsFlow`] - onboarding and options wizards
//! - [`FlowManager`] - drives flows and creates entries

pub mod entry;
pub mod flow;
pub mod manager;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};
pub use flow::{
    parse_input, ConfigFlow, FieldType, FlowData, FlowError, FlowField, FlowManager, FlowResult,
    FlowStep, OptionsFlow,
};
pub use manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult};
