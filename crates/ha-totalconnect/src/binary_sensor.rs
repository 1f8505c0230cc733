//! Zone binary sensors

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::constants::{
    ATTR_ATTRIBUTION, DEVICE_CLASS_DOOR, DEVICE_CLASS_GAS, DEVICE_CLASS_PROBLEM,
    DEVICE_CLASS_SMOKE, DEVICE_CLASS_SOUND, DEVICE_CLASS_WINDOW, PLATFORM_BINARY_SENSOR,
    STATE_OFF, STATE_ON,
};
use ha_core::util::title_case;
use ha_helpers::{attributes, DataUpdateCoordinator, DeviceInfo, Entity};
use serde_json::Value;

use crate::client::Zone;
use crate::{Locations, ATTRIBUTION, DOMAIN, MANUFACTURER};

/// Installed hardware per zone: (alias, model)
pub fn zone_info(zone_id: u32) -> Option<(Option<&'static str>, &'static str)> {
    match zone_id {
        1 => Some((Some("Smoke Detector"), "2W-B")),
        2 => Some((Some("Glass Break Sensor"), "FG1625F")),
        3..=5 | 9..=13 => Some((None, "944TSP")),
        17..=20 => Some((None, "5820L")),
        _ => None,
    }
}

/// Display name of a zone description
pub fn zone_name(description: &str) -> String {
    title_case(description).replace("'S", "\u{2019}s")
}

/// Device class of a zone
pub fn zone_device_class(zone: &Zone) -> &'static str {
    if zone.is_type_fire() {
        return DEVICE_CLASS_SMOKE;
    }
    if zone.is_type_carbon_monoxide() {
        return DEVICE_CLASS_GAS;
    }
    let name = zone_name(&zone.description).to_lowercase();
    if name.contains("window") {
        DEVICE_CLASS_WINDOW
    } else if name.contains("door") {
        DEVICE_CLASS_DOOR
    } else if name.contains("glass break") {
        DEVICE_CLASS_SOUND
    } else {
        DEVICE_CLASS_PROBLEM
    }
}

/// One zone of a location
pub struct TotalConnectZoneSensor {
    coordinator: Arc<DataUpdateCoordinator<Locations>>,
    location_id: String,
    zone_id: u32,
    description: String,
}

impl TotalConnectZoneSensor {
    pub fn new(
        coordinator: Arc<DataUpdateCoordinator<Locations>>,
        location_id: impl Into<String>,
        zone: &Zone,
    ) -> Self {
        Self {
            coordinator,
            location_id: location_id.into(),
            zone_id: zone.zone_id,
            description: zone.description.clone(),
        }
    }

    fn zone(&self) -> Option<Zone> {
        let data = self.coordinator.data()?;
        data.get(&self.location_id)?.zones.get(&self.zone_id).cloned()
    }
}

#[async_trait]
impl Entity for TotalConnectZoneSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_BINARY_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-{}", self.location_id, self.zone_id))
    }

    fn name(&self) -> String {
        zone_name(&self.description)
    }

    fn state(&self) -> Option<String> {
        let zone = self.zone()?;
        let on = zone.is_faulted() || zone.is_triggered();
        Some(if on { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = attributes! {
            ATTR_ATTRIBUTION => ATTRIBUTION,
            "location_id" => self.location_id,
            "zone_id" => self.zone_id,
        };
        if let Some(zone) = self.zone() {
            attrs.extend(attributes! {
                "bypassed" => zone.is_bypassed(),
                "faulted" => zone.is_faulted(),
                "low_battery" => zone.is_low_battery(),
                "tampered" => zone.is_tampered(),
                "triggered" => zone.is_triggered(),
                "zone_type" => zone.zone_type_id,
            });
        }
        attrs
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn device_class(&self) -> Option<String> {
        self.zone().map(|z| zone_device_class(&z).to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        let (alias, model) = zone_info(self.zone_id).unzip();
        let name = alias
            .flatten()
            .map(String::from)
            .unwrap_or_else(|| format!("{} Contact Sensor", self.name()));
        let mut info = DeviceInfo::new(DOMAIN, format!("{}-{}", self.location_id, self.zone_id))
            .with_name(name)
            .with_manufacturer(MANUFACTURER)
            .with_via_device(DOMAIN, self.location_id.clone());
        if let Some(model) = model {
            info = info.with_model(model);
        }
        Some(info)
    }

    fn should_poll(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{zone_status, ZONE_TYPE_CARBON_MONOXIDE, ZONE_TYPE_FIRE_SMOKE};

    fn zone(id: u32, description: &str, zone_type_id: i64) -> Zone {
        Zone {
            zone_id: id,
            description: description.to_string(),
            zone_type_id,
            status: zone_status::FAULT,
        }
    }

    #[test]
    fn test_zone_names() {
        assert_eq!(zone_name("KID'S BEDROOM WINDOW"), "Kid\u{2019}s Bedroom Window");
        assert_eq!(zone_name("front door"), "Front Door");
    }

    #[test]
    fn test_device_classes() {
        assert_eq!(zone_device_class(&zone(1, "HALLWAY", ZONE_TYPE_FIRE_SMOKE)), "smoke");
        assert_eq!(
            zone_device_class(&zone(2, "BASEMENT", ZONE_TYPE_CARBON_MONOXIDE)),
            "gas"
        );
        assert_eq!(zone_device_class(&zone(3, "OFFICE WINDOW", 3)), "window");
        assert_eq!(zone_device_class(&zone(4, "BACK DOOR", 1)), "door");
        assert_eq!(zone_device_class(&zone(5, "GLASS BREAK", 3)), "sound");
        assert_eq!(zone_device_class(&zone(6, "MOTION", 4)), "problem");
    }

    #[test]
    fn test_zone_info() {
        assert_eq!(zone_info(1), Some((Some("Smoke Detector"), "2W-B")));
        assert_eq!(zone_info(12), Some((None, "944TSP")));
        assert_eq!(zone_info(18), Some((None, "5820L")));
        assert_eq!(zone_info(7), None);
    }
}
