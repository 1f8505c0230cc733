//! eero integration
//!
//! One config entry per eero network. A [`DataUpdateCoordinator`] polls the
//! account snapshot; sensors, binary sensors and switches read their values
//! from it, and the `eero` services act on the networks and eeros it lists.

pub mod api;
pub mod binary_sensor;
pub mod config_flow;
mod entity;
pub mod models;
pub mod sensor;
pub mod services;
pub mod switch;

use std::sync::Arc;
use std::time::Duration;

use ha_config_entries::ConfigEntry;
use ha_helpers::{entity_handle, DataUpdateCoordinator, EntityHandle, EntityPlatform, UpdateFailed};
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

pub use api::{EeroApi, EeroError, EeroResult, NightlightMode};
pub use config_flow::{EeroConfigFlow, EeroOptionsFlow};
pub use models::{Account, Client, Eero, Network, Profile, Resource, ResourceKind};

use binary_sensor::{EeroBinarySensor, BINARY_SENSOR_TYPES};
use entity::{expand, EeroEntity};
use sensor::{EeroSensor, SENSOR_TYPES};
use switch::{EeroSwitch, PREMIUM_SWITCHES, SWITCH_TYPES};

pub const DOMAIN: &str = "eero";
pub const ATTRIBUTION: &str = "Data provided by Eero";
pub const MANUFACTURER: &str = "eero";

pub const MODEL_CLIENT: &str = "Client";
pub const MODEL_EERO: &str = "eero";
pub const MODEL_NETWORK: &str = "Network";
pub const MODEL_PROFILE: &str = "Profile";

pub const CONF_CODE: &str = "code";
pub const CONF_LOGIN: &str = "login";
pub const CONF_NETWORK_NAME: &str = "network_name";
pub const CONF_NETWORK_URL: &str = "network_url";
pub const CONF_USER_TOKEN: &str = "user_token";

pub const DEFAULT_SCAN_INTERVAL: u64 = 60;
pub const SCAN_INTERVALS: [u64; 5] = [30, 60, 90, 120, 300];

/// Directory under the config dir where `save_responses` dumps responses
pub const RESPONSES_DIR: &str = "eero_responses";

/// Data stored in the config entry by the config flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EeroEntryData {
    pub user_token: String,
    pub network_url: String,
    pub network_name: String,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

/// Options set through the options flow
///
/// Resource lists hold ids. Absent eero and profile lists select
/// everything; absent client lists select nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EeroOptions {
    #[serde(default)]
    pub save_responses: bool,
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    #[serde(default)]
    pub eeros: Option<Vec<String>>,
    #[serde(default)]
    pub profiles: Option<Vec<String>>,
    #[serde(default)]
    pub wired_clients: Vec<String>,
    #[serde(default)]
    pub wireless_clients: Vec<String>,
}

/// Resource ids that get entities
#[derive(Debug, Clone, Default)]
pub struct ResourceSelection {
    pub eeros: Vec<String>,
    pub profiles: Vec<String>,
    pub clients: Vec<String>,
}

impl ResourceSelection {
    pub fn from_options(options: &EeroOptions, network: Network<'_>) -> Self {
        Self {
            eeros: options.eeros.clone().unwrap_or_else(|| {
                network.eeros().iter().map(|e| e.id().to_string()).collect()
            }),
            profiles: options.profiles.clone().unwrap_or_else(|| {
                network
                    .profiles()
                    .iter()
                    .map(|p| p.id().to_string())
                    .collect()
            }),
            clients: options
                .wired_clients
                .iter()
                .chain(&options.wireless_clients)
                .cloned()
                .collect(),
        }
    }
}

/// A loaded eero config entry
pub struct EeroEntry {
    pub api: Arc<EeroApi>,
    pub coordinator: Arc<DataUpdateCoordinator<Value>>,
    pub platform: Arc<EntityPlatform>,
    pub network_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl EeroEntry {
    /// Stop polling
    pub fn unload(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Coordinator polling `api.update()`
pub fn build_coordinator(
    name: &str,
    api: Arc<EeroApi>,
    interval: Duration,
) -> DataUpdateCoordinator<Value> {
    DataUpdateCoordinator::new(format!("Eero ({})", name), interval, move || {
        let api = api.clone();
        async move {
            api.update()
                .await
                .map(|snapshot| (*snapshot).clone())
                .map_err(|e| UpdateFailed::new(format!("Error communicating with API: {}", e)))
        }
    })
}

/// Build every entity for the selected resources of `network_id`
pub fn build_entities(
    coordinator: &Arc<DataUpdateCoordinator<Value>>,
    api: &Arc<EeroApi>,
    network_id: &str,
    options: &EeroOptions,
) -> Vec<EntityHandle> {
    let Some(data) = coordinator.data() else {
        return Vec::new();
    };
    let Some(network) = Account::new(&data).network(network_id) else {
        return Vec::new();
    };
    let selection = ResourceSelection::from_options(options, network);
    let base = |resource_id: Option<&str>, variable: &'static str, label: &'static str| {
        EeroEntity::new(
            coordinator.clone(),
            api.clone(),
            network_id,
            resource_id,
            variable,
            label,
        )
    };

    let mut entities: Vec<EntityHandle> = Vec::new();
    for sensor in expand(network, &selection, SENSOR_TYPES, &[], |r, v, l| {
        EeroSensor::new(base(r, v, l))
    }) {
        entities.push(entity_handle(sensor));
    }
    for sensor in expand(network, &selection, BINARY_SENSOR_TYPES, &[], |r, v, l| {
        EeroBinarySensor::new(base(r, v, l))
    }) {
        entities.push(entity_handle(sensor));
    }
    for switch in expand(network, &selection, SWITCH_TYPES, PREMIUM_SWITCHES, |r, v, l| {
        EeroSwitch::new(base(r, v, l))
    }) {
        entities.push(entity_handle(switch));
    }
    entities
}

/// Set up an eero config entry
///
/// Fails when the entry data is malformed or the first fetch yields no
/// snapshot; the caller should retry later in the second case.
#[tracing::instrument(skip(hass, entry), fields(entry_id = %entry.entry_id))]
pub async fn setup_entry(hass: &Hass, entry: &ConfigEntry) -> EeroResult<Arc<EeroEntry>> {
    let data: EeroEntryData = entry
        .typed_data()
        .map_err(|e| EeroError::InvalidEntry(e.to_string()))?;
    let options: EeroOptions = entry
        .typed_options()
        .map_err(|e| EeroError::InvalidEntry(e.to_string()))?;

    let mut api = EeroApi::new(Some(data.user_token.clone()))?.with_network_url(&data.network_url);
    if options.save_responses {
        api = api.with_save_location(hass.config_path(RESPONSES_DIR));
    }
    let api = Arc::new(api);

    let coordinator = Arc::new(build_coordinator(
        &data.network_name,
        api.clone(),
        Duration::from_secs(options.scan_interval),
    ));
    if let Err(err) = coordinator.refresh().await {
        if coordinator.data().is_none() {
            return Err(EeroError::NotReady(err.to_string()));
        }
    }

    let network_id = api::parse_network_id(&data.network_url).to_string();
    let platform = Arc::new(EntityPlatform::new(hass.clone(), DOMAIN));
    let entities = build_entities(&coordinator, &api, &network_id, &options);
    let added = platform.add_entities(entities, false).await;
    info!(
        network = %data.network_name,
        entities = added.len(),
        "eero network set up"
    );

    let tasks = vec![
        platform.track_coordinator(&coordinator),
        coordinator.spawn_polling(),
    ];
    let loaded = Arc::new(EeroEntry {
        api,
        coordinator,
        platform,
        network_id,
        tasks,
    });
    services::register_services(hass, loaded.clone());

    Ok(loaded)
}
