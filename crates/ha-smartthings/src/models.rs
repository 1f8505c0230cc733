//! Devices and their attribute status

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAIN_COMPONENT: &str = "main";

/// Attribute values that read as "on"
const ATTRIBUTE_ON_VALUES: &[(&str, &str)] = &[
    ("acceleration", "active"),
    ("contact", "open"),
    ("filterStatus", "replace"),
    ("motion", "active"),
    ("mute", "muted"),
    ("presence", "present"),
    ("sound", "detected"),
    ("switch", "on"),
    ("tamper", "detected"),
    ("valve", "open"),
    ("water", "wet"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRef>,
}

/// A device as listed by `/devices`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub location_id: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(skip)]
    pub status: DeviceStatus,
}

impl Device {
    /// Capabilities of the main component
    pub fn capabilities(&self) -> Vec<String> {
        self.components
            .iter()
            .find(|c| c.id == MAIN_COMPONENT)
            .map(|c| c.capabilities.iter().map(|cap| cap.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Label, or the device name when no label is set
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Value of one attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeState {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Body of `/devices/{id}/status`: component → capability → attribute
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub components: HashMap<String, HashMap<String, HashMap<String, AttributeState>>>,
}

/// Attribute values of a device by component and attribute name
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    components: HashMap<String, HashMap<String, AttributeState>>,
}

impl From<StatusResponse> for DeviceStatus {
    fn from(response: StatusResponse) -> Self {
        let components = response
            .components
            .into_iter()
            .map(|(component, capabilities)| {
                let attributes = capabilities.into_values().flatten().collect();
                (component, attributes)
            })
            .collect();
        Self { components }
    }
}

impl DeviceStatus {
    /// Attribute of the main component
    pub fn attribute(&self, attribute: &str) -> Option<&AttributeState> {
        self.components.get(MAIN_COMPONENT)?.get(attribute)
    }

    /// Non-null value of a main component attribute
    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.attribute(attribute).map(|a| &a.value).filter(|v| !v.is_null())
    }

    pub fn str_value(&self, attribute: &str) -> Option<&str> {
        self.value(attribute).and_then(Value::as_str)
    }

    /// Whether a main component attribute holds its "on" value
    pub fn is_on(&self, attribute: &str) -> bool {
        let Some(on_value) = ATTRIBUTE_ON_VALUES
            .iter()
            .find(|(name, _)| *name == attribute)
            .map(|(_, on)| *on)
        else {
            return false;
        };
        self.str_value(attribute) == Some(on_value)
    }

    /// Store a value pushed by a device event
    pub fn apply_attribute_update(
        &mut self,
        component_id: &str,
        attribute: &str,
        value: Value,
        data: Option<Value>,
    ) {
        let state = self
            .components
            .entry(component_id.to_string())
            .or_default()
            .entry(attribute.to_string())
            .or_default();
        state.value = value;
        state.data = data;
    }
}
