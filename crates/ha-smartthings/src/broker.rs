//! Device broker of one installed SmartApp
//!
//! Owns the devices of the location, decides which platform handles each
//! capability, applies pushed device events and keeps the OAuth refresh
//! token alive.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use ha_config_entries::{ConfigEntries, ConfigEntryUpdate};
use ha_core::Context;
use ha_host::Hass;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::api::{OAuthToken, SmartThingsApi, SmartThingsError, SmartThingsResult};
use crate::capability::{
    Platform, BUTTON, ENERGY_METER, IGNORED_CAPABILITIES, POWER_METER, SUPPORTED_PLATFORMS, SWITCH,
};
use crate::models::Device;
use crate::{SmartThingsEntryData, CONF_REFRESH_TOKEN, EVENT_BUTTON};

/// Event type of attribute changes
pub const EVENT_TYPE_DEVICE: &str = "DEVICE_EVENT";

/// Capability → platform assignments per device id
pub type Assignments = HashMap<String, IndexMap<String, Platform>>;

/// Devices touched by one webhook request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Button presses
    Button(HashSet<String>),
    /// Any other attribute change
    Update(HashSet<String>),
}

/// Body of a SmartApp `EVENT` lifecycle request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub event_data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub installed_app: InstalledApp,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub installed_app_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub device_event: Option<DeviceEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub location_id: String,
    pub device_id: String,
    pub component_id: String,
    pub capability: String,
    pub attribute: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Hand each device's capabilities to the platforms in order
///
/// A platform takes what it claims out of the remaining capabilities, so a
/// capability belongs to at most one platform.
pub fn assign_capabilities<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Assignments {
    let mut assignments = Assignments::new();
    for device in devices {
        let mut capabilities: Vec<String> = device
            .capabilities()
            .into_iter()
            .filter(|c| !IGNORED_CAPABILITIES.contains(&c.as_str()))
            .collect();
        let label = device.label();
        let mut slots = IndexMap::new();

        for platform in SUPPORTED_PLATFORMS {
            let mut assigned = platform.get_capabilities(&capabilities);
            let claims_nothing = assigned.as_ref().map_or(true, Vec::is_empty);

            if label.contains("Light") {
                if platform == Platform::Light && claims_nothing {
                    assigned = Some(vec![SWITCH]);
                }
                if platform == Platform::Switch && !claims_nothing {
                    assigned = None;
                }
            }
            if label.contains("Christmas Cactus") && platform == Platform::Sensor && claims_nothing {
                capabilities.extend([ENERGY_METER.to_string(), POWER_METER.to_string()]);
                assigned = Some(vec![ENERGY_METER, POWER_METER]);
            }

            for capability in assigned.unwrap_or_default() {
                let Some(index) = capabilities.iter().position(|c| c == capability) else {
                    continue;
                };
                capabilities.remove(index);
                slots.insert(capability.to_string(), platform);
            }
        }

        if !capabilities.is_empty() {
            debug!(device = %label, unassigned = ?capabilities, "Capabilities without a platform");
        }
        assignments.insert(device.device_id.clone(), slots);
    }
    assignments
}

/// Broker for one config entry
pub struct DeviceBroker {
    hass: Hass,
    entries: Arc<ConfigEntries>,
    entry_id: String,
    installed_app_id: String,
    api: Arc<SmartThingsApi>,
    token: RwLock<OAuthToken>,
    device_ids: Vec<String>,
    devices: DashMap<String, Device>,
    assignments: Assignments,
    signals: broadcast::Sender<Signal>,
}

impl DeviceBroker {
    pub fn new(
        hass: Hass,
        entries: Arc<ConfigEntries>,
        entry_id: impl Into<String>,
        installed_app_id: impl Into<String>,
        api: Arc<SmartThingsApi>,
        token: OAuthToken,
        devices: Vec<Device>,
    ) -> Self {
        let assignments = assign_capabilities(&devices);
        let (signals, _) = broadcast::channel(64);
        Self {
            hass,
            entries,
            entry_id: entry_id.into(),
            installed_app_id: installed_app_id.into(),
            api,
            token: RwLock::new(token),
            device_ids: devices.iter().map(|d| d.device_id.clone()).collect(),
            devices: devices
                .into_iter()
                .map(|d| (d.device_id.clone(), d))
                .collect(),
            assignments,
            signals,
        }
    }

    /// Device ids in listing order
    pub fn device_ids(&self) -> &[String] {
        &self.device_ids
    }

    /// Run `f` against the current state of a device
    pub fn with_device<R>(&self, device_id: &str, f: impl FnOnce(&Device) -> R) -> Option<R> {
        self.devices.get(device_id).map(|d| f(d.value()))
    }

    /// Capabilities assigned to `platform`
    pub fn get_assigned(&self, device_id: &str, platform: Platform) -> Vec<String> {
        self.assignments
            .get(device_id)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|(_, p)| **p == platform)
                    .map(|(capability, _)| capability.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn any_assigned(&self, device_id: &str, platform: Platform) -> bool {
        self.assignments
            .get(device_id)
            .map_or(false, |slots| slots.values().any(|p| *p == platform))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn refresh_token(&self) -> String {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .refresh_token
            .clone()
    }

    /// Apply the device events of a webhook request
    ///
    /// Requests for another installed app under the same SmartApp are
    /// ignored. Button presses fire `smartthings.button` on the bus.
    #[instrument(skip_all, fields(events = request.event_data.events.len()))]
    pub fn handle_request(&self, request: &EventRequest) {
        if request.event_data.installed_app.installed_app_id != self.installed_app_id {
            return;
        }

        let mut updated_buttons = HashSet::new();
        let mut updated_devices = HashSet::new();
        for event in &request.event_data.events {
            if event.event_type != EVENT_TYPE_DEVICE {
                continue;
            }
            let Some(evt) = &event.device_event else {
                continue;
            };
            let Some(mut device) = self.devices.get_mut(&evt.device_id) else {
                continue;
            };
            device.status.apply_attribute_update(
                &evt.component_id,
                &evt.attribute,
                evt.value.clone(),
                evt.data.clone(),
            );

            if evt.capability == BUTTON && evt.attribute == BUTTON {
                let data = json!({
                    "component_id": evt.component_id,
                    "device_id": evt.device_id,
                    "location_id": evt.location_id,
                    "value": evt.value,
                    "name": device.label(),
                    "data": evt.data,
                });
                drop(device);
                debug!("Fired button event: {}", data);
                self.hass.bus.fire_json(EVENT_BUTTON, data, Context::new());
                updated_buttons.insert(evt.device_id.clone());
            } else {
                debug!(
                    device_id = %evt.device_id,
                    component_id = %evt.component_id,
                    capability = %evt.capability,
                    attribute = %evt.attribute,
                    value = %evt.value,
                    "Push update received"
                );
                updated_devices.insert(evt.device_id.clone());
            }
        }

        if !updated_buttons.is_empty() {
            let _ = self.signals.send(Signal::Button(updated_buttons));
        }
        if !updated_devices.is_empty() {
            let _ = self.signals.send(Signal::Update(updated_devices));
        }
    }

    /// Generate a new token pair and store the refresh token in the entry
    pub async fn regenerate_refresh_token(&self) -> SmartThingsResult<()> {
        let entry = self
            .entries
            .get(&self.entry_id)
            .ok_or_else(|| SmartThingsError::InvalidEntry(self.entry_id.clone()))?;
        let data: SmartThingsEntryData = entry
            .typed_data()
            .map_err(|e| SmartThingsError::InvalidEntry(e.to_string()))?;

        let token = self
            .api
            .generate_tokens(&data.client_id, &data.client_secret, &self.refresh_token())
            .await?;

        let mut entry_data = entry.data.clone();
        entry_data.insert(CONF_REFRESH_TOKEN.to_string(), json!(token.refresh_token));
        self.entries
            .update(&self.entry_id, ConfigEntryUpdate::new().data(entry_data))
            .map_err(|e| SmartThingsError::InvalidEntry(e.to_string()))?;
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;

        debug!(
            installed_app_id = %self.installed_app_id,
            "Regenerated refresh token"
        );
        Ok(())
    }

    /// Regenerate the refresh token every `interval`
    pub fn spawn_token_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let broker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = broker.regenerate_refresh_token().await {
                    warn!("Could not regenerate refresh token: {}", err);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::*;
    use crate::models::{CapabilityRef, Component, DeviceStatus};

    fn device(id: &str, label: &str, capabilities: &[&str]) -> Device {
        Device {
            device_id: id.to_string(),
            name: label.to_string(),
            label: label.to_string(),
            location_id: "loc".to_string(),
            components: vec![Component {
                id: "main".to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|c| CapabilityRef { id: c.to_string() })
                    .collect(),
            }],
            status: DeviceStatus::default(),
        }
    }

    fn assigned(assignments: &Assignments, device_id: &str, platform: Platform) -> Vec<String> {
        assignments[device_id]
            .iter()
            .filter(|(_, p)| **p == platform)
            .map(|(c, _)| c.clone())
            .collect()
    }

    #[test]
    fn test_draw_down() {
        let devices = [device(
            "d1",
            "Garage",
            &[SWITCH, SWITCH_LEVEL, POWER_METER, "healthCheck", BATTERY, CONTACT_SENSOR],
        )];
        let assignments = assign_capabilities(&devices);
        assert_eq!(assigned(&assignments, "d1", Platform::Light), vec![SWITCH, SWITCH_LEVEL]);
        assert!(assigned(&assignments, "d1", Platform::Switch).is_empty());
        assert_eq!(assigned(&assignments, "d1", Platform::BinarySensor), vec![CONTACT_SENSOR]);
        assert_eq!(assigned(&assignments, "d1", Platform::Sensor), vec![BATTERY, POWER_METER]);
        assert!(!assignments["d1"].contains_key("healthCheck"));
    }

    #[test]
    fn test_light_label_override() {
        let devices = [device("d1", "Porch Light", &[SWITCH, POWER_METER])];
        let assignments = assign_capabilities(&devices);
        assert_eq!(assigned(&assignments, "d1", Platform::Light), vec![SWITCH]);
        assert!(assigned(&assignments, "d1", Platform::Switch).is_empty());
        assert_eq!(assigned(&assignments, "d1", Platform::Sensor), vec![POWER_METER]);
    }

    #[test]
    fn test_christmas_cactus_override() {
        let devices = [device("d1", "Christmas Cactus Plug", &[SWITCH, ENERGY_METER, POWER_METER])];
        let assignments = assign_capabilities(&devices);
        assert_eq!(assigned(&assignments, "d1", Platform::Switch), vec![SWITCH]);
        assert_eq!(
            assigned(&assignments, "d1", Platform::Sensor),
            vec![ENERGY_METER, POWER_METER]
        );
    }
}
