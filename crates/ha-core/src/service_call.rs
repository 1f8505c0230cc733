//! Service call type passed to integration service handlers

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a registered service
///
/// `service_data` is the raw JSON object the caller supplied; handlers read
/// typed values out of it with [`ServiceCall::get`] and
/// [`ServiceCall::string_list`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "eero", "nest")
    pub domain: String,

    /// The service name (e.g., "restart_eero", "set_eta")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a list of strings from service_data
    ///
    /// Accepts both a single string and an array of strings. Returns `None`
    /// when the key is absent, so callers can tell "no target" from "empty".
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.service_data.get(key)? {
            serde_json::Value::String(s) => Some(vec![s.clone()]),
            serde_json::Value::Array(arr) => Some(
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Get entity_id(s) from service data
    pub fn entity_ids(&self) -> Vec<String> {
        self.string_list("entity_id").unwrap_or_default()
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    /// Service never returns a response
    #[default]
    None,
    /// Service may optionally return a response
    Optional,
    /// Service always returns a response
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_call_creation() {
        let ctx = Context::new();
        let call = ServiceCall::new(
            "eero",
            "restart_eero",
            json!({"target_eero": "Living Room"}),
            ctx.clone(),
        );

        assert_eq!(call.service_id(), "eero.restart_eero");
        assert_eq!(call.context.id, ctx.id);
    }

    #[test]
    fn test_get_service_data() {
        let call = ServiceCall::new(
            "nest",
            "set_fan_timer",
            json!({"duration": 15, "enabled": true}),
            Context::new(),
        );

        assert_eq!(call.get::<u32>("duration"), Some(15));
        assert_eq!(call.get::<bool>("enabled"), Some(true));
        assert_eq!(call.get::<String>("missing"), None);
    }

    #[test]
    fn test_string_list_single_and_multiple() {
        let call = ServiceCall::new(
            "nest",
            "set_away_mode",
            json!({"structure": "Home", "entity_id": ["climate.a", "climate.b"]}),
            Context::new(),
        );

        assert_eq!(call.string_list("structure"), Some(vec!["Home".to_string()]));
        assert_eq!(call.entity_ids(), vec!["climate.a", "climate.b"]);
        assert_eq!(call.string_list("missing"), None);
    }
}
