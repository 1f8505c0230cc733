//! Alarm panel per location

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::constants::{
    ATTR_ATTRIBUTION, PLATFORM_ALARM_CONTROL_PANEL, STATE_ALARM_ARMED_AWAY,
    STATE_ALARM_ARMED_CUSTOM_BYPASS, STATE_ALARM_ARMED_HOME, STATE_ALARM_ARMED_NIGHT,
    STATE_ALARM_ARMING, STATE_ALARM_DISARMED, STATE_ALARM_DISARMING, STATE_ALARM_TRIGGERED,
};
use ha_core::util::title_case;
use ha_helpers::{DataUpdateCoordinator, DeviceInfo, Entity, EntityError};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::{Location, TotalConnectClient};
use crate::{Locations, ATTRIBUTION, DOMAIN, MANUFACTURER, PANEL_MODEL};

pub const SUPPORT_ALARM_ARM_HOME: u32 = 1;
pub const SUPPORT_ALARM_ARM_AWAY: u32 = 2;
pub const SUPPORT_ALARM_ARM_NIGHT: u32 = 4;

/// Panel state and the source of a triggered alarm
pub fn panel_state(location: &Location) -> (Option<&'static str>, Option<&'static str>) {
    if location.is_disarmed() {
        (Some(STATE_ALARM_DISARMED), None)
    } else if location.is_armed_home() {
        (Some(STATE_ALARM_ARMED_HOME), None)
    } else if location.is_armed_night() {
        (Some(STATE_ALARM_ARMED_NIGHT), None)
    } else if location.is_armed_away() {
        (Some(STATE_ALARM_ARMED_AWAY), None)
    } else if location.is_armed_custom_bypass() {
        (Some(STATE_ALARM_ARMED_CUSTOM_BYPASS), None)
    } else if location.is_arming() {
        (Some(STATE_ALARM_ARMING), None)
    } else if location.is_disarming() {
        (Some(STATE_ALARM_DISARMING), None)
    } else if location.is_triggered_police() {
        (Some(STATE_ALARM_TRIGGERED), Some("Police/Medical"))
    } else if location.is_triggered_fire() {
        (Some(STATE_ALARM_TRIGGERED), Some("Fire/Smoke"))
    } else if location.is_triggered_gas() {
        (Some(STATE_ALARM_TRIGGERED), Some("Carbon Monoxide"))
    } else {
        (None, None)
    }
}

/// Arm or disarm action of a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Disarm,
    ArmHome,
    ArmAway,
    ArmNight,
}

impl PanelAction {
    fn describe(self) -> &'static str {
        match self {
            Self::Disarm => "disarm",
            Self::ArmHome => "arm home",
            Self::ArmAway => "arm away",
            Self::ArmNight => "arm night",
        }
    }
}

/// The security panel of one location
pub struct TotalConnectAlarm {
    client: Arc<dyn TotalConnectClient>,
    coordinator: Arc<DataUpdateCoordinator<Locations>>,
    location_id: String,
    name: String,
}

impl TotalConnectAlarm {
    pub fn new(
        client: Arc<dyn TotalConnectClient>,
        coordinator: Arc<DataUpdateCoordinator<Locations>>,
        location: &Location,
    ) -> Self {
        Self {
            client,
            coordinator,
            location_id: location.location_id.clone(),
            name: location.location_name.clone(),
        }
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    fn with_location<R>(&self, f: impl FnOnce(&Location) -> R) -> Option<R> {
        let data = self.coordinator.data()?;
        data.get(&self.location_id).map(f)
    }

    /// Send an arm or disarm command and refresh the panel
    pub async fn run(&self, action: PanelAction) -> Result<(), EntityError> {
        let id = self.location_id.as_str();
        let accepted = match action {
            PanelAction::Disarm => self.client.disarm(id).await,
            PanelAction::ArmHome => self.client.arm_stay(id).await,
            PanelAction::ArmAway => self.client.arm_away(id).await,
            PanelAction::ArmNight => self.client.arm_stay_night(id).await,
        };
        match accepted {
            Ok(true) => {
                info!(location = %self.name, "TotalConnect accepted {}", action.describe());
                if let Err(err) = self.coordinator.refresh().await {
                    warn!("Refresh after {} failed: {}", action.describe(), err);
                }
                Ok(())
            }
            Ok(false) | Err(_) => Err(EntityError::Failed(format!(
                "TotalConnect failed to {} {}.",
                action.describe(),
                self.name
            ))),
        }
    }
}

fn zone_names(location: &Location, pick: impl Fn(&crate::client::Zone) -> bool) -> Value {
    let names: Vec<String> = location
        .zones
        .values()
        .filter(|z| pick(z))
        .map(|z| title_case(&z.description))
        .collect();
    if names.is_empty() {
        Value::Null
    } else {
        json!(names)
    }
}

#[async_trait]
impl Entity for TotalConnectAlarm {
    fn domain(&self) -> &'static str {
        PLATFORM_ALARM_CONTROL_PANEL
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.location_id.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        self.with_location(|l| panel_state(l).0.map(String::from))
            .flatten()
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = HashMap::from([
            (ATTR_ATTRIBUTION.to_string(), json!(ATTRIBUTION)),
            ("location_name".to_string(), json!(self.name)),
            ("location_id".to_string(), json!(self.location_id)),
        ]);
        self.with_location(|location| {
            attrs.insert("ac_loss".to_string(), json!(location.ac_loss));
            attrs.insert("low_battery".to_string(), json!(location.low_battery));
            attrs.insert("cover_tampered".to_string(), json!(location.cover_tampered));
            attrs.insert(
                "triggered_source".to_string(),
                json!(panel_state(location).1),
            );
            attrs.insert(
                "faulted_zones".to_string(),
                zone_names(location, |z| z.is_faulted()),
            );
            attrs.insert(
                "tampered_zones".to_string(),
                zone_names(location, |z| z.is_tampered()),
            );
            attrs.insert(
                "triggered_zones".to_string(),
                zone_names(location, |z| z.is_triggered()),
            );
        });
        attrs
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn supported_features(&self) -> u32 {
        SUPPORT_ALARM_ARM_HOME | SUPPORT_ALARM_ARM_AWAY | SUPPORT_ALARM_ARM_NIGHT
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(
            DeviceInfo::new(DOMAIN, self.location_id.clone())
                .with_name("Security Panel")
                .with_manufacturer(MANUFACTURER)
                .with_model(PANEL_MODEL),
        )
    }

    fn should_poll(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::arming;

    fn location(state: i64) -> Location {
        Location {
            location_id: "1".to_string(),
            location_name: "Home".to_string(),
            arming_state: state,
            ac_loss: false,
            low_battery: false,
            cover_tampered: false,
            zones: Default::default(),
        }
    }

    #[test]
    fn test_panel_state_precedence() {
        assert_eq!(panel_state(&location(arming::DISARMED)), (Some("disarmed"), None));
        assert_eq!(panel_state(&location(arming::ARMED_STAY)), (Some("armed_home"), None));
        assert_eq!(
            panel_state(&location(arming::ARMED_STAY_NIGHT)),
            (Some("armed_night"), None)
        );
        assert_eq!(
            panel_state(&location(arming::ARMED_CUSTOM_BYPASS)),
            (Some("armed_custom_bypass"), None)
        );
        assert_eq!(panel_state(&location(arming::DISARMING)), (Some("disarming"), None));
        assert_eq!(
            panel_state(&location(arming::ALARMING)),
            (Some("triggered"), Some("Police/Medical"))
        );
        assert_eq!(
            panel_state(&location(arming::ALARMING_CARBON_MONOXIDE)),
            (Some("triggered"), Some("Carbon Monoxide"))
        );
        assert_eq!(panel_state(&location(99999)), (None, None));
    }
}
