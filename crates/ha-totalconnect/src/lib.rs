//! TotalConnect security panels
//!
//! Every location of the account becomes an alarm control panel and every
//! zone a binary sensor. A coordinator fetches all locations every
//! 30 seconds; arming commands refresh it right away.
//!
//! This crate does not talk to the TotalConnect service itself. The caller
//! supplies the transport as an implementation of
//! [`client::TotalConnectClient`] and hands it to [`TotalConnect::setup`].

pub mod alarm_control_panel;
pub mod binary_sensor;
pub mod client;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_core::constants::PLATFORM_ALARM_CONTROL_PANEL;
use ha_core::ServiceCall;
use ha_helpers::{entity_handle, DataUpdateCoordinator, EntityHandle, EntityPlatform, UpdateFailed};
use ha_host::{Hass, ServiceDescription, ServiceError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

pub use alarm_control_panel::{PanelAction, TotalConnectAlarm};
pub use binary_sensor::TotalConnectZoneSensor;
pub use client::{Location, TotalConnectClient, TotalConnectError, TotalConnectResult, Zone};

pub const DOMAIN: &str = "totalconnect";
pub const MANUFACTURER: &str = "Honeywell";
pub const ATTRIBUTION: &str = "Data provided by Total Connect";
pub const PANEL_MODEL: &str = "VISTA-21iP";

pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Locations keyed by location id
pub type Locations = BTreeMap<String, Location>;

const PANEL_SERVICES: &[(&str, PanelAction)] = &[
    ("alarm_disarm", PanelAction::Disarm),
    ("alarm_arm_home", PanelAction::ArmHome),
    ("alarm_arm_away", PanelAction::ArmAway),
    ("alarm_arm_night", PanelAction::ArmNight),
];

struct Panel {
    entity: Arc<Mutex<TotalConnectAlarm>>,
    platform: Arc<EntityPlatform>,
}

/// A loaded account
pub struct TotalConnectAccount {
    pub coordinator: Arc<DataUpdateCoordinator<Locations>>,
    pub platform: Arc<EntityPlatform>,
    tasks: Vec<JoinHandle<()>>,
}

impl TotalConnectAccount {
    pub fn unload(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// The integration: loaded accounts and the panels its services act on
pub struct TotalConnect {
    hass: Hass,
    panels: Arc<DashMap<String, Panel>>,
}

impl TotalConnect {
    /// Create the integration and register the panel services
    pub fn new(hass: Hass) -> Self {
        let panels: Arc<DashMap<String, Panel>> = Arc::new(DashMap::new());
        for (service, action) in PANEL_SERVICES {
            let panels = panels.clone();
            let action = *action;
            hass.services.register_with_description(
                ServiceDescription::new(PLATFORM_ALARM_CONTROL_PANEL, *service)
                    .with_description(format!("TotalConnect {}", service)),
                move |call| run_panel_service(panels.clone(), action, call),
            );
        }
        Self { hass, panels }
    }

    /// Fetch the account's locations and add their entities
    #[instrument(skip(self, client))]
    pub async fn setup(
        &self,
        client: Arc<dyn TotalConnectClient>,
    ) -> TotalConnectResult<TotalConnectAccount> {
        let polled = client.clone();
        let coordinator = Arc::new(DataUpdateCoordinator::new(
            "TotalConnect",
            UPDATE_INTERVAL,
            move || {
                let client = polled.clone();
                async move {
                    let locations = client.locations().await.map_err(UpdateFailed::new)?;
                    Ok(locations
                        .into_iter()
                        .map(|l| (l.location_id.clone(), l))
                        .collect::<Locations>())
                }
            },
        ));
        coordinator
            .refresh()
            .await
            .map_err(|e| TotalConnectError::Request(e.to_string()))?;
        let locations = coordinator.data().unwrap_or_default();

        let platform = Arc::new(EntityPlatform::new(self.hass.clone(), DOMAIN));
        let mut panels = Vec::new();
        let mut entities: Vec<EntityHandle> = Vec::new();
        for location in locations.values() {
            let panel = entity_handle(TotalConnectAlarm::new(
                client.clone(),
                coordinator.clone(),
                location,
            ));
            panels.push(panel.clone());
            entities.push(panel);
            for zone in location.zones.values() {
                entities.push(entity_handle(TotalConnectZoneSensor::new(
                    coordinator.clone(),
                    location.location_id.clone(),
                    zone,
                )));
            }
        }
        platform.add_entities(entities, false).await;

        for panel in panels {
            let unique_id = panel.lock().await.location_id().to_string();
            if let Some(entity_id) = platform.entity_id_for(PLATFORM_ALARM_CONTROL_PANEL, &unique_id) {
                self.panels.insert(
                    entity_id.to_string(),
                    Panel {
                        entity: panel,
                        platform: platform.clone(),
                    },
                );
            }
        }

        let tasks = vec![
            platform.track_coordinator(&coordinator),
            coordinator.spawn_polling(),
        ];
        info!(locations = locations.len(), "TotalConnect set up");
        Ok(TotalConnectAccount {
            coordinator,
            platform,
            tasks,
        })
    }
}

async fn run_panel_service(
    panels: Arc<DashMap<String, Panel>>,
    action: PanelAction,
    call: ServiceCall,
) -> Result<Option<serde_json::Value>, ServiceError> {
    let targets: Vec<(String, Arc<Mutex<TotalConnectAlarm>>, Arc<EntityPlatform>)> =
        match call.string_list("entity_id") {
            Some(ids) => ids
                .into_iter()
                .filter_map(|id| {
                    let panel = panels.get(&id)?;
                    Some((id, panel.entity.clone(), panel.platform.clone()))
                })
                .collect(),
            None => panels
                .iter()
                .map(|p| (p.key().clone(), p.entity.clone(), p.platform.clone()))
                .collect(),
        };

    for (entity_id, entity, platform) in targets {
        debug!(entity_id = %entity_id, action = ?action, "TotalConnect panel command");
        entity
            .lock()
            .await
            .run(action)
            .await
            .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
        if let Ok(id) = entity_id.parse() {
            platform.write_state(&id).await;
        }
    }
    Ok(None)
}
