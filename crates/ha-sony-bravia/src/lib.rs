//! Sony BRAVIA TV integration
//!
//! One config entry per TV. A coordinator polls the TV every 30 seconds
//! and feeds a media player and a remote entity.

pub mod client;
pub mod config_flow;
pub mod media_player;
pub mod remote;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntryUpdate, FlowManager};
use ha_core::EntityId;
use ha_helpers::{entity_handle, DataUpdateCoordinator, DeviceInfo, EntityHandle, EntityPlatform};
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

pub use client::{BraviaClient, BraviaData, BraviaError, BraviaResult};
pub use config_flow::BraviaConfigFlow;
pub use media_player::BraviaMediaPlayer;
pub use remote::BraviaRemote;

pub const DOMAIN: &str = "sony_bravia";
pub const MANUFACTURER: &str = "Sony";
pub const SOURCE_APP: &str = "App";

pub const ATTR_APP: &str = "app";
pub const ATTR_APP_LIST: &str = "app_list";
pub const ATTR_COMMAND: &str = "command";
pub const ATTR_COMMAND_LIST: &str = "command_list";

pub const CONF_HOST: &str = "host";
pub const CONF_PSK: &str = "psk";
pub const CONF_EXT_SPEAKER: &str = "ext_speaker";
pub const CONF_SOURCE_CONFIG: &str = "source_config";
pub const CONF_TIME_FORMAT: &str = "time_format";

pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// How programme start and end times are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12H")]
    TwelveHour,
    #[default]
    #[serde(rename = "24H")]
    TwentyFourHour,
}

/// Per-source display override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Config entry data, also the shape of one YAML `sony_bravia:` item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BraviaConfig {
    pub host: String,
    pub psk: String,
    /// Volume is handled by an external speaker
    #[serde(default)]
    pub ext_speaker: bool,
    #[serde(default)]
    pub source_config: Vec<SourceConfig>,
    #[serde(default)]
    pub time_format: TimeFormat,
}

/// `"Sony {name} {model}"`
pub(crate) fn entity_name(data: &BraviaData) -> String {
    format!(
        "{} {} {}",
        MANUFACTURER,
        data.system.name.as_deref().unwrap_or_default(),
        data.system.model.as_deref().unwrap_or_default()
    )
}

pub(crate) fn device_info(data: &BraviaData) -> Option<DeviceInfo> {
    let system = &data.system;
    let mut info = DeviceInfo::new(DOMAIN, system.cid.clone()?).with_manufacturer(MANUFACTURER);
    if let Some(name) = &system.name {
        info = info.with_name(name.clone());
    }
    if let Some(model) = &system.model {
        info = info.with_model(model.clone());
    }
    if let Some(generation) = &system.generation {
        info = info.with_sw_version(generation.clone());
    }
    Some(info)
}

/// An entity together with the platform that writes its state
pub struct Target<E> {
    pub entity: Arc<Mutex<E>>,
    pub platform: Arc<EntityPlatform>,
}

impl<E> Clone for Target<E> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            platform: self.platform.clone(),
        }
    }
}

/// A loaded TV
pub struct BraviaEntry {
    pub client: Arc<BraviaClient>,
    pub coordinator: Arc<DataUpdateCoordinator<BraviaData>>,
    pub platform: Arc<EntityPlatform>,
    pub media_player: Option<EntityId>,
    pub remote: Option<EntityId>,
    tasks: Vec<JoinHandle<()>>,
}

impl BraviaEntry {
    pub fn unload(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// The integration: loaded TVs and the entities its services act on
pub struct SonyBravia {
    hass: Hass,
    pub(crate) players: Arc<DashMap<String, Target<BraviaMediaPlayer>>>,
    pub(crate) remotes: Arc<DashMap<String, Target<BraviaRemote>>>,
    entries: DashMap<String, Arc<BraviaEntry>>,
}

impl SonyBravia {
    /// Create the integration and register its services
    pub fn new(hass: Hass) -> Self {
        let integration = Self {
            hass,
            players: Arc::new(DashMap::new()),
            remotes: Arc::new(DashMap::new()),
            entries: DashMap::new(),
        };
        services::register_services(&integration);
        integration
    }

    pub fn hass(&self) -> &Hass {
        &self.hass
    }

    pub fn entry(&self, entry_id: &str) -> Option<Arc<BraviaEntry>> {
        self.entries.get(entry_id).map(|e| e.clone())
    }

    /// Set up a TV from its config entry
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> BraviaResult<Arc<BraviaEntry>> {
        let config: BraviaConfig = entry
            .typed_data()
            .map_err(|e| BraviaError::InvalidEntry(e.to_string()))?;
        let client = Arc::new(BraviaClient::new(&config.host, config.psk.clone())?);

        let polled = client.clone();
        let coordinator = Arc::new(DataUpdateCoordinator::new(
            format!("Sony BRAVIA ({})", config.host),
            UPDATE_INTERVAL,
            move || {
                let client = polled.clone();
                async move { Ok(client.update().await) }
            },
        ));
        // The TV being off is not a setup failure
        let _ = coordinator.refresh().await;

        let platform = Arc::new(EntityPlatform::new(self.hass.clone(), DOMAIN));
        let player = entity_handle(BraviaMediaPlayer::new(
            client.clone(),
            coordinator.clone(),
            config.ext_speaker,
            config.source_config.clone(),
            config.time_format,
        ));
        let remote = entity_handle(BraviaRemote::new(client.clone(), coordinator.clone()));

        let added = platform
            .add_entities(
                vec![player.clone() as EntityHandle, remote.clone() as EntityHandle],
                false,
            )
            .await;
        let media_player_id = added.iter().find(|id| id.domain() == "media_player").cloned();
        let remote_id = added.iter().find(|id| id.domain() == "remote").cloned();

        if let Some(id) = &media_player_id {
            self.players.insert(
                id.to_string(),
                Target {
                    entity: player.clone(),
                    platform: platform.clone(),
                },
            );
        }
        if let Some(id) = &remote_id {
            self.remotes.insert(
                id.to_string(),
                Target {
                    entity: remote,
                    platform: platform.clone(),
                },
            );
        }

        let tasks = vec![
            track_snapshots(&coordinator, platform.clone(), player),
            coordinator.spawn_polling(),
        ];
        info!(host = %config.host, "BRAVIA TV set up");

        let loaded = Arc::new(BraviaEntry {
            client,
            coordinator,
            platform,
            media_player: media_player_id,
            remote: remote_id,
            tasks,
        });
        self.entries.insert(entry.entry_id.clone(), loaded.clone());
        Ok(loaded)
    }

    /// Stop polling a TV and forget its entities
    pub fn unload_entry(&self, entry_id: &str) -> bool {
        let Some((_, loaded)) = self.entries.remove(entry_id) else {
            return false;
        };
        loaded.unload();
        if let Some(id) = &loaded.media_player {
            self.players.remove(&id.to_string());
        }
        if let Some(id) = &loaded.remote {
            self.remotes.remove(&id.to_string());
        }
        true
    }

    /// Import YAML configured TVs
    ///
    /// A TV whose host already has an entry gets that entry's data replaced;
    /// any other TV goes through the config flow's `import` step.
    pub async fn import(&self, flows: &FlowManager, configs: Vec<BraviaConfig>) -> Vec<ConfigEntry> {
        let entries: &Arc<ConfigEntries> = flows.entries();
        let mut imported = Vec::new();
        for config in configs {
            let data = match serde_json::to_value(&config)
                .and_then(serde_json::from_value::<ha_config_entries::FlowData>)
            {
                Ok(data) => data,
                Err(err) => {
                    warn!(host = %config.host, "Cannot import TV: {}", err);
                    continue;
                }
            };

            if let Some(existing) = entries.find_by_unique_id(DOMAIN, &config.host) {
                match entries.update(&existing.entry_id, ConfigEntryUpdate::new().data(data)) {
                    Ok(entry) => imported.push(entry),
                    Err(err) => warn!(host = %config.host, "Cannot update entry: {}", err),
                }
                continue;
            }

            let started = flows.init(DOMAIN, Box::new(BraviaConfigFlow::new())).await;
            let step = match started {
                Ok(step) => flows.configure(&step.flow_id, data).await,
                Err(err) => Err(err),
            };
            match step {
                Ok(step) => match step.entry {
                    Some(entry) => imported.push(entry),
                    None => {
                        warn!(host = %config.host, "TV import did not finish");
                        flows.abort(&step.flow_id).await;
                    }
                },
                Err(err) => warn!(host = %config.host, "TV import failed: {}", err),
            }
        }
        imported
    }
}

/// Rewrite the entity states after every poll
fn track_snapshots(
    coordinator: &DataUpdateCoordinator<BraviaData>,
    platform: Arc<EntityPlatform>,
    player: Arc<Mutex<BraviaMediaPlayer>>,
) -> JoinHandle<()> {
    let mut rx = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(()) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    player.lock().await.observe_snapshot();
                    platform.write_all().await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
