//! Behaviour shared by every SmartThings entity

use std::collections::HashMap;
use std::sync::Arc;

use ha_core::constants::{ATTR_ATTRIBUTION, ATTR_BATTERY_LEVEL};
use ha_helpers::DeviceInfo;
use serde_json::{json, Value};

use crate::broker::DeviceBroker;
use crate::models::Device;
use crate::{ATTRIBUTION, DOMAIN};

/// Device name → (manufacturer, model)
pub const DEVICE_INFO_MAP: &[(&str, &str, &str)] = &[
    ("Leviton Switch", "Leviton", "DZS15-1LZ"),
    ("Leviton 15A Switch", "Leviton", "DZS15-1LZ"),
    ("Leviton 3-Speed Fan Controller", "Leviton", "VRF01-1LZ"),
    ("Leviton Magnetic Low Voltage Dimmer", "Leviton", "DZMX1-1LZ"),
    ("Leviton Universal Dimmer", "Leviton", "DZMX1-1LZ"),
    ("Leviton Outlet", "Leviton", "DZR15-1LZ"),
    ("Dome Leak Sensor", "Dome", "DMWS1"),
    ("SmartThings Motion Sensor", "SmartThings", "GP-U999SJVLBAA"),
    ("Smart Plug", "SmartThings", "GP-WOU019BBAWU"),
    ("Schlage Touchscreen Deadbolt Door Lock", "Schlage", "BE469NX"),
];

const BUTTON_MANUFACTURER: &str = "SmartThings";
const BUTTON_MODEL: &str = "GP-U999SJVLEAA";
const UNKNOWN: &str = "Unknown";

/// Manufacturer and model of a device
pub fn device_model(device: &Device) -> (&'static str, &'static str) {
    if device.label().contains("Button") {
        return (BUTTON_MANUFACTURER, BUTTON_MODEL);
    }
    DEVICE_INFO_MAP
        .iter()
        .find(|(name, _, _)| *name == device.name)
        .map(|(_, manufacturer, model)| (*manufacturer, *model))
        .unwrap_or((UNKNOWN, UNKNOWN))
}

/// An entity reading one device of the broker
pub(crate) struct SmartThingsEntity {
    pub broker: Arc<DeviceBroker>,
    pub device_id: String,
}

impl SmartThingsEntity {
    pub fn new(broker: Arc<DeviceBroker>, device_id: &str) -> Self {
        Self {
            broker,
            device_id: device_id.to_string(),
        }
    }

    pub fn with_device<R>(&self, f: impl FnOnce(&Device) -> R) -> Option<R> {
        self.broker.with_device(&self.device_id, f)
    }

    pub fn label(&self) -> String {
        self.with_device(|d| d.label().to_string())
            .unwrap_or_else(|| self.device_id.clone())
    }

    /// Main component attribute value
    pub fn value(&self, attribute: &str) -> Option<Value> {
        self.with_device(|d| d.status.value(attribute).cloned())
            .flatten()
    }

    pub fn base_attributes(&self) -> HashMap<String, Value> {
        let mut attrs = HashMap::from([(ATTR_ATTRIBUTION.to_string(), json!(ATTRIBUTION))]);
        if let Some(battery) = self.value("battery") {
            attrs.insert(ATTR_BATTERY_LEVEL.to_string(), battery);
        }
        attrs
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.with_device(|device| {
            let (manufacturer, model) = device_model(device);
            DeviceInfo::new(DOMAIN, device.device_id.clone())
                .with_name(device.label())
                .with_manufacturer(manufacturer)
                .with_model(model)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;

    fn device(name: &str, label: &str) -> Device {
        Device {
            device_id: "d1".to_string(),
            name: name.to_string(),
            label: label.to_string(),
            location_id: "loc".to_string(),
            components: Vec::new(),
            status: DeviceStatus::default(),
        }
    }

    #[test]
    fn test_device_model() {
        assert_eq!(device_model(&device("Dome Leak Sensor", "Basement")), ("Dome", "DMWS1"));
        assert_eq!(
            device_model(&device("Dome Leak Sensor", "Hall Button")),
            ("SmartThings", "GP-U999SJVLEAA")
        );
        assert_eq!(device_model(&device("Acme Thing", "Thing")), ("Unknown", "Unknown"));
    }
}
