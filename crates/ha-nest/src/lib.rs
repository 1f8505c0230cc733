//! Nest integration
//!
//! The developer API tree is polled by one coordinator per account and
//! feeds climate, sensor, binary sensor, camera and switch entities. When a
//! web client login is configured a second coordinator polls the web
//! client's buckets for humidifiers, remote temperature sensors and the
//! outdoor temperature.

pub mod api;
pub mod binary_sensor;
pub mod camera;
pub mod climate;
pub mod entity;
pub mod humidifier;
pub mod models;
pub mod sensor;
pub mod services;
pub mod switch;
pub mod web_client;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_helpers::{entity_handle, DataUpdateCoordinator, EntityHandle, EntityPlatform, UpdateFailed};
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub use api::{NestApi, NestError, NestResult};
pub use binary_sensor::NestBinarySensor;
pub use camera::NestCamera;
pub use climate::NestThermostat;
pub use humidifier::NestHumidifier;
pub use models::{NestData, TemperatureScale};
pub use sensor::{NestSensor, NestWebSensor};
pub use switch::NestSwitch;
pub use web_client::{NestWebClient, WebData};

use binary_sensor::binary_sensor_types;
use entity::{NestDevice, WebLink};
use models::DeviceRef;
use sensor::{sensor_types, web_sensor_types, SensorSource};
use switch::SwitchKind;

pub const DOMAIN: &str = "nest";
pub const MANUFACTURER: &str = "Nest";
pub const ATTRIBUTION: &str = "Data provided by Nest";

pub const ATTR_ACTIVITY_DETECTED: &str = "activity_detected";
pub const ATTR_BATTERY_HEALTH: &str = "battery_health";
pub const ATTR_CO_STATUS: &str = "co_status";
pub const ATTR_COLOR_STATUS: &str = "color_status";
pub const ATTR_HUMIDIFIER_ACTION: &str = "humidifier_action";
pub const ATTR_MOTION_DETECTED: &str = "motion_detected";
pub const ATTR_ONLINE: &str = "online";
pub const ATTR_PERSON_DETECTED: &str = "person_detected";
pub const ATTR_SMOKE_STATUS: &str = "smoke_status";
pub const ATTR_SOUND_DETECTED: &str = "sound_detected";
pub const ATTR_STREAMING: &str = "streaming";
pub const ATTR_STRUCTURE: &str = "structure";
pub const ATTR_TEMPERATURE_SCALE: &str = "temperature_scale";
pub const ATTR_THERMOSTAT_TEMPERATURE: &str = "thermostat_temperature";

pub const PRESET_AWAY_AND_ECO: &str = "Away and Eco";

pub const HUMIDITY_MIN: u32 = 10;
pub const HUMIDITY_MAX: u32 = 60;
pub const HUMIDITY_STEP: u32 = 5;

pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30);
pub const WEB_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// A camera's stream URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    pub camera: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebClientConfig {
    pub user_id: String,
    pub access_token: String,
}

/// Config entry data, also the shape of the YAML `nest:` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub stream_source: Vec<StreamSource>,
    /// Structure names to load; all when empty
    #[serde(default)]
    pub structure: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_client: Option<WebClientConfig>,
}

/// An entity together with the platform that writes its state
pub struct Target<E: ?Sized> {
    pub entity: Arc<Mutex<E>>,
    pub platform: Arc<EntityPlatform>,
}

impl<E: ?Sized> Clone for Target<E> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            platform: self.platform.clone(),
        }
    }
}

/// A loaded account
pub struct NestAccount {
    pub api: Arc<NestApi>,
    pub coordinator: Arc<DataUpdateCoordinator<NestData>>,
    pub web: Option<(Arc<NestWebClient>, Arc<DataUpdateCoordinator<WebData>>)>,
    pub platform: Arc<EntityPlatform>,
    /// Configured structure filter
    pub structures: Vec<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl NestAccount {
    pub fn unload(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Names of the structures services act on by default
    pub fn default_structures(&self) -> Vec<String> {
        if !self.structures.is_empty() {
            return self.structures.clone();
        }
        self.coordinator
            .data()
            .map(|data| data.structures.values().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// The integration: loaded accounts and the entities its services act on
pub struct Nest {
    hass: Hass,
    pub(crate) accounts: Arc<DashMap<String, Arc<NestAccount>>>,
    pub(crate) thermostats: Arc<DashMap<String, Target<NestThermostat>>>,
    pub(crate) humidifiers: Arc<DashMap<String, Target<NestHumidifier>>>,
    /// Switches and cameras, toggled through `turn_on`/`turn_off`
    pub(crate) toggles: Arc<DashMap<String, Arc<EntityPlatform>>>,
}

impl Nest {
    /// Create the integration and register its services
    pub fn new(hass: Hass) -> Self {
        let integration = Self {
            hass,
            accounts: Arc::new(DashMap::new()),
            thermostats: Arc::new(DashMap::new()),
            humidifiers: Arc::new(DashMap::new()),
            toggles: Arc::new(DashMap::new()),
        };
        services::register_services(&integration);
        integration
    }

    pub fn hass(&self) -> &Hass {
        &self.hass
    }

    pub fn account(&self, entry_id: &str) -> Option<Arc<NestAccount>> {
        self.accounts.get(entry_id).map(|a| a.clone())
    }

    /// Set up an account from its config entry
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> NestResult<Arc<NestAccount>> {
        let config: NestConfig = entry
            .typed_data()
            .map_err(|e| NestError::InvalidEntry(e.to_string()))?;
        let api = NestApi::new(config.access_token.clone())?;
        let web = match &config.web_client {
            Some(web) => Some(NestWebClient::new(web.user_id.clone(), web.access_token.clone())?),
            None => None,
        };
        self.setup(&entry.entry_id, config, api, web).await
    }

    /// Set up an account with prepared clients
    pub async fn setup(
        &self,
        entry_id: &str,
        config: NestConfig,
        api: NestApi,
        web: Option<NestWebClient>,
    ) -> NestResult<Arc<NestAccount>> {
        let api = Arc::new(api);
        let polled = api.clone();
        let coordinator = Arc::new(DataUpdateCoordinator::new("Nest", UPDATE_INTERVAL, move || {
            let api = polled.clone();
            async move { api.fetch().await.map_err(UpdateFailed::new) }
        }));
        if let Err(err) = coordinator.refresh().await {
            return Err(NestError::InvalidResponse(format!(
                "Connection error while accessing Nest web service: {}",
                err
            )));
        }

        let web = match web {
            Some(client) => Some(start_web_client(client).await?),
            None => None,
        };

        let platform = Arc::new(EntityPlatform::new(self.hass.clone(), DOMAIN));
        let built = build_entities(&config, &api, &coordinator, web.as_ref());
        platform.add_entities(built.all, false).await;
        self.index(&platform, built.thermostats, built.humidifiers, built.toggles)
            .await;

        let mut tasks = vec![
            platform.track_coordinator(&coordinator),
            coordinator.spawn_polling(),
        ];
        if let Some((_, web_coordinator)) = &web {
            tasks.push(platform.track_coordinator(web_coordinator));
            tasks.push(web_coordinator.spawn_polling());
        }
        info!(
            entities = platform.entity_ids().await.len(),
            web_client = web.is_some(),
            "Nest set up"
        );

        let account = Arc::new(NestAccount {
            api,
            coordinator,
            web,
            platform,
            structures: config.structure,
            tasks,
        });
        self.accounts.insert(entry_id.to_string(), account.clone());
        Ok(account)
    }

    async fn index(
        &self,
        platform: &Arc<EntityPlatform>,
        thermostats: Vec<Arc<Mutex<NestThermostat>>>,
        humidifiers: Vec<Arc<Mutex<NestHumidifier>>>,
        toggles: Vec<EntityHandle>,
    ) {
        for entity in thermostats {
            let id = registered_id(platform, &*entity.lock().await);
            if let Some(id) = id {
                let platform = platform.clone();
                self.thermostats.insert(id, Target { entity, platform });
            }
        }
        for entity in humidifiers {
            let id = registered_id(platform, &*entity.lock().await);
            if let Some(id) = id {
                let platform = platform.clone();
                self.humidifiers.insert(id, Target { entity, platform });
            }
        }
        for entity in toggles {
            let id = registered_id(platform, &*entity.lock().await);
            if let Some(id) = id {
                self.toggles.insert(id, platform.clone());
            }
        }
    }

    /// Stop polling an account and forget its entities
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some((_, account)) = self.accounts.remove(entry_id) else {
            return false;
        };
        account.unload();
        for entity_id in account.platform.entity_ids().await {
            let key = entity_id.to_string();
            self.thermostats.remove(&key);
            self.humidifiers.remove(&key);
            self.toggles.remove(&key);
        }
        true
    }
}

fn registered_id(platform: &EntityPlatform, entity: &dyn ha_helpers::Entity) -> Option<String> {
    let unique_id = entity.unique_id()?;
    platform.entity_id_for(entity.domain(), &unique_id).map(|id| id.to_string())
}

async fn start_web_client(
    client: NestWebClient,
) -> NestResult<(Arc<NestWebClient>, Arc<DataUpdateCoordinator<WebData>>)> {
    client.connect().await.map_err(|e| {
        warn!("Web client authentication failed");
        e
    })?;
    let client = Arc::new(client);
    let polled = client.clone();
    let coordinator = Arc::new(DataUpdateCoordinator::new(
        "Nest Web Client",
        WEB_UPDATE_INTERVAL,
        move || {
            let client = polled.clone();
            async move {
                client
                    .update()
                    .await
                    .map_err(|e| UpdateFailed::new(format!("Error communicating with web client: {}", e)))
            }
        },
    ));
    coordinator
        .refresh()
        .await
        .map_err(|e| NestError::WebClient(e.to_string()))?;
    info!("Web client authentication valid");
    Ok((client, coordinator))
}

#[derive(Default)]
struct BuiltEntities {
    all: Vec<EntityHandle>,
    thermostats: Vec<Arc<Mutex<NestThermostat>>>,
    humidifiers: Vec<Arc<Mutex<NestHumidifier>>>,
    toggles: Vec<EntityHandle>,
}

fn build_entities(
    config: &NestConfig,
    api: &Arc<NestApi>,
    coordinator: &Arc<DataUpdateCoordinator<NestData>>,
    web: Option<&(Arc<NestWebClient>, Arc<DataUpdateCoordinator<WebData>>)>,
) -> BuiltEntities {
    let mut built = BuiltEntities::default();
    let Some(data) = coordinator.data() else {
        return built;
    };
    let names = &config.structure;
    let device = |device: DeviceRef, structure_id: &str| {
        NestDevice::new(coordinator.clone(), api.clone(), device, structure_id)
    };
    let web_link = |name: &str| -> Option<WebLink> {
        let (client, web_coordinator) = web?;
        let id = client.device_id(name)?;
        Some(WebLink {
            client: client.clone(),
            coordinator: web_coordinator.clone(),
            id,
        })
    };

    for structure in data.selected_structures(names) {
        let id = &structure.structure_id;
        let structure_ref = DeviceRef::Structure(id.clone());
        for sensor in sensor_types(SensorSource::Structure) {
            built.all.push(entity_handle(NestSensor::new(
                device(structure_ref.clone(), id),
                sensor,
                &structure.name,
            )));
        }
        for sensor in binary_sensor_types(&structure_ref) {
            built.all.push(entity_handle(NestBinarySensor::new(
                device(structure_ref.clone(), id),
                sensor,
                &structure.name,
            )));
        }
        let away = entity_handle(NestSwitch::new(
            device(structure_ref.clone(), id),
            SwitchKind::Away,
            &structure.name,
        ));
        built.toggles.push(away.clone());
        built.all.push(away);

        if let Some(link) = web_link(&structure.name) {
            for sensor in web_sensor_types(SensorSource::Structure) {
                built.all.push(entity_handle(NestWebSensor::new(
                    device(structure_ref.clone(), id),
                    link.clone(),
                    sensor,
                    &structure.name,
                )));
            }
        }
    }

    for (structure, camera) in data.cameras(names) {
        let camera_ref = DeviceRef::Camera(camera.device_id.clone());
        let sid = &structure.structure_id;
        let stream_url = config
            .stream_source
            .iter()
            .find(|s| s.camera == camera.name)
            .map(|s| s.url.clone());
        let entity = entity_handle(NestCamera::new(
            device(camera_ref.clone(), sid),
            camera.name.clone(),
            stream_url,
        ));
        built.toggles.push(entity.clone());
        built.all.push(entity);

        for sensor in binary_sensor_types(&camera_ref) {
            if sensor.key == "doorbell" && !camera.is_doorbell {
                continue;
            }
            built.all.push(entity_handle(NestBinarySensor::new(
                device(camera_ref.clone(), sid),
                sensor,
                &camera.name_long,
            )));
        }
        for zone in &camera.activity_zones {
            built.all.push(entity_handle(NestBinarySensor::activity_zone(
                device(camera_ref.clone(), sid),
                zone.clone(),
                &camera.name_long,
            )));
        }
        let streaming = entity_handle(NestSwitch::new(
            device(camera_ref.clone(), sid),
            SwitchKind::Streaming,
            &camera.name_long,
        ));
        built.toggles.push(streaming.clone());
        built.all.push(streaming);
    }

    for (structure, protect) in data.smoke_co_alarms(names) {
        let protect_ref = DeviceRef::SmokeCoAlarm(protect.device_id.clone());
        let sid = &structure.structure_id;
        for sensor in sensor_types(SensorSource::SmokeCoAlarm) {
            built.all.push(entity_handle(NestSensor::new(
                device(protect_ref.clone(), sid),
                sensor,
                &protect.name_long,
            )));
        }
        for sensor in binary_sensor_types(&protect_ref) {
            built.all.push(entity_handle(NestBinarySensor::new(
                device(protect_ref.clone(), sid),
                sensor,
                &protect.name_long,
            )));
        }
    }

    for (structure, thermostat) in data.thermostats(names) {
        let thermostat_ref = DeviceRef::Thermostat(thermostat.device_id.clone());
        let sid = &structure.structure_id;
        for sensor in sensor_types(SensorSource::Thermostat) {
            built.all.push(entity_handle(NestSensor::new(
                device(thermostat_ref.clone(), sid),
                sensor,
                &thermostat.name_long,
            )));
        }
        for sensor in binary_sensor_types(&thermostat_ref) {
            built.all.push(entity_handle(NestBinarySensor::new(
                device(thermostat_ref.clone(), sid),
                sensor,
                &thermostat.name_long,
            )));
        }

        let link = web_link(&thermostat.name_long);
        let humidistat = link
            .as_ref()
            .filter(|l| l.flag("has_humidifier") || l.flag("has_dehumidifier"));
        let climate = entity_handle(NestThermostat::new(
            device(thermostat_ref.clone(), sid),
            humidistat.cloned(),
            thermostat.name_long.clone(),
        ));
        built.thermostats.push(climate.clone());
        built.all.push(climate);

        let Some(link) = link else {
            continue;
        };
        if link.flag("has_humidifier") {
            let humidifier = entity_handle(NestHumidifier::new(
                device(thermostat_ref.clone(), sid),
                link.clone(),
                structure.name.clone(),
            ));
            built.humidifiers.push(humidifier.clone());
            built.toggles.push(humidifier.clone());
            built.all.push(humidifier);
        }
        for sensor in web_sensor_types(SensorSource::Thermostat) {
            built.all.push(entity_handle(NestWebSensor::new(
                device(thermostat_ref.clone(), sid),
                link.clone(),
                sensor,
                &structure.name,
            )));
        }
        for sensor_id in link.client.temperature_sensors() {
            let remote = WebLink {
                id: sensor_id,
                ..link.clone()
            };
            for sensor in web_sensor_types(SensorSource::TemperatureSensor) {
                built.all.push(entity_handle(NestWebSensor::new(
                    device(thermostat_ref.clone(), sid),
                    remote.clone(),
                    sensor,
                    &structure.name,
                )));
            }
        }
    }

    debug!(entities = built.all.len(), "Built Nest entities");
    built
}
