//! SmartThings integration
//!
//! One config entry per installed SmartApp. Setup lists the devices of the
//! entry's location, hands their capabilities to platforms through the
//! [`DeviceBroker`] and creates the binary sensors. Device events pushed to
//! the SmartApp webhook go through [`DeviceBroker::handle_request`].

pub mod api;
pub mod binary_sensor;
pub mod broker;
pub mod capability;
mod entity;
pub mod models;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntryUpdate};
use ha_helpers::EntityPlatform;
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub use api::{OAuthToken, SmartThingsApi, SmartThingsError, SmartThingsResult};
pub use binary_sensor::{
    build_binary_sensors, SignalDispatch, SmartThingsBinarySensor, SmartThingsButtonBinarySensor,
};
pub use broker::{assign_capabilities, DeviceBroker, EventRequest, Signal};
pub use capability::{Platform, SUPPORTED_PLATFORMS};
pub use entity::{device_model, DEVICE_INFO_MAP};
pub use models::{Device, DeviceStatus};

pub const DOMAIN: &str = "smartthings";
pub const ATTRIBUTION: &str = "Data provided by SmartThings";

/// Bus event fired for every button press
pub const EVENT_BUTTON: &str = "smartthings.button";

pub const CONF_ACCESS_TOKEN: &str = "access_token";
pub const CONF_APP_ID: &str = "app_id";
pub const CONF_CLIENT_ID: &str = "client_id";
pub const CONF_CLIENT_SECRET: &str = "client_secret";
pub const CONF_INSTALLED_APP_ID: &str = "installed_app_id";
pub const CONF_LOCATION_ID: &str = "location_id";
pub const CONF_REFRESH_TOKEN: &str = "refresh_token";

/// Refresh tokens expire after 30 days
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Data stored in the config entry when the SmartApp was installed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartThingsEntryData {
    pub access_token: String,
    pub app_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub installed_app_id: String,
    pub location_id: String,
    pub refresh_token: String,
}

/// Unique id of an entry: one per app and location
pub fn format_unique_id(app_id: &str, location_id: &str) -> String {
    format!("{}_{}", app_id, location_id)
}

/// A loaded SmartThings config entry
pub struct SmartThingsEntry {
    pub broker: Arc<DeviceBroker>,
    pub platform: Arc<EntityPlatform>,
    tasks: Vec<JoinHandle<()>>,
}

impl SmartThingsEntry {
    /// Stop the token refresh and event dispatch
    pub fn unload(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Fetch every device's status; devices whose status fails are left out
async fn load_devices(api: &SmartThingsApi, location_id: &str) -> SmartThingsResult<Vec<Device>> {
    let devices = api.devices(location_id).await?;
    let statuses = join_all(devices.iter().map(|d| api.device_status(&d.device_id))).await;

    let mut loaded = Vec::with_capacity(devices.len());
    for (mut device, status) in devices.into_iter().zip(statuses) {
        match status {
            Ok(status) => {
                device.status = status;
                loaded.push(device);
            }
            Err(err) => debug!(
                "Unable to update status for device: {} ({}), the device will be excluded: {}",
                device.label(),
                device.device_id,
                err
            ),
        }
    }
    Ok(loaded)
}

/// Set up a SmartThings config entry against `api`
///
/// A 401/403 from SmartThings yields [`SmartThingsError::Unauthorized`] and
/// the entry has to be reconfigured; other failures yield
/// [`SmartThingsError::NotReady`].
#[tracing::instrument(skip(hass, entries, api, entry), fields(entry_id = %entry.entry_id))]
pub async fn setup_entry_with_api(
    hass: &Hass,
    entries: &Arc<ConfigEntries>,
    entry: &ConfigEntry,
    api: Arc<SmartThingsApi>,
) -> SmartThingsResult<Arc<SmartThingsEntry>> {
    let data: SmartThingsEntryData = entry
        .typed_data()
        .map_err(|e| SmartThingsError::InvalidEntry(e.to_string()))?;

    let setup = async {
        let token = api
            .generate_tokens(&data.client_id, &data.client_secret, &data.refresh_token)
            .await?;
        let mut entry_data = entry.data.clone();
        entry_data.insert(CONF_REFRESH_TOKEN.to_string(), json!(token.refresh_token));
        let mut update = ConfigEntryUpdate::new().data(entry_data);
        if entry.unique_id.is_none() {
            update = update.unique_id(format_unique_id(&data.app_id, &data.location_id));
        }
        entries
            .update(&entry.entry_id, update)
            .map_err(|e| SmartThingsError::InvalidEntry(e.to_string()))?;

        let devices = load_devices(&api, &data.location_id).await?;
        Ok::<_, SmartThingsError>((token, devices))
    };
    let (token, devices) = match setup.await {
        Ok(loaded) => loaded,
        Err(err) if err.is_auth_error() => {
            error!(
                "Unable to setup configuration entry '{}' - please reconfigure the integration",
                entry.title
            );
            return Err(SmartThingsError::Unauthorized(entry.title.clone()));
        }
        Err(err @ SmartThingsError::InvalidEntry(_)) => return Err(err),
        Err(err) => return Err(SmartThingsError::NotReady(err.to_string())),
    };

    let broker = Arc::new(DeviceBroker::new(
        hass.clone(),
        entries.clone(),
        entry.entry_id.clone(),
        data.installed_app_id.clone(),
        api,
        token,
        devices,
    ));

    let platform = Arc::new(EntityPlatform::new(hass.clone(), DOMAIN));
    let (entities, dispatch) = build_binary_sensors(&broker);
    let signals = broker.subscribe();
    let added = platform.add_entities(entities, false).await;
    info!(
        devices = broker.device_ids().len(),
        entities = added.len(),
        "SmartThings location set up"
    );

    let tasks = vec![
        dispatch.spawn(platform.clone(), signals),
        broker.spawn_token_refresh(TOKEN_REFRESH_INTERVAL),
    ];
    Ok(Arc::new(SmartThingsEntry {
        broker,
        platform,
        tasks,
    }))
}

/// Set up a SmartThings config entry against the cloud API
pub async fn setup_entry(
    hass: &Hass,
    entries: &Arc<ConfigEntries>,
    entry: &ConfigEntry,
) -> SmartThingsResult<Arc<SmartThingsEntry>> {
    let access_token: String = entry
        .data_value(CONF_ACCESS_TOKEN)
        .ok_or_else(|| SmartThingsError::InvalidEntry(CONF_ACCESS_TOKEN.to_string()))?;
    let api = Arc::new(SmartThingsApi::new(access_token)?);
    setup_entry_with_api(hass, entries, entry, api).await
}
