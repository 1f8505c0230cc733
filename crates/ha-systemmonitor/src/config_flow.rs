//! System monitor config flow

use async_trait::async_trait;
use ha_config_entries::{
    parse_input, ConfigFlow, FieldType, FlowData, FlowError, FlowField, FlowResult,
};
use ha_core::util::slugify;

use crate::sensor::{sensor_type_for, SENSOR_TYPES};
use crate::{ResourceConfig, CONF_ARG, CONF_TYPE};

fn schema() -> Vec<FlowField> {
    vec![
        FlowField::required(
            CONF_TYPE,
            FieldType::Select(SENSOR_TYPES.iter().map(|t| t.key.to_string()).collect()),
        ),
        FlowField::optional(CONF_ARG, FieldType::String),
    ]
}

/// Creates one entry per monitored resource
#[derive(Default)]
pub struct SystemMonitorConfigFlow {
    unique_id: Option<String>,
}

impl SystemMonitorConfigFlow {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigFlow for SystemMonitorConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "user" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let Some(input) = input else {
            return Ok(FlowResult::form("user", schema()));
        };

        let resource: ResourceConfig = parse_input(input.clone())?;
        let Some(sensor_type) = sensor_type_for(&resource.resource_type) else {
            return Ok(FlowResult::form_error("user", schema(), "invalid_type"));
        };
        let arg = resource.arg.filter(|a| !a.is_empty());
        if sensor_type.requires_arg && arg.is_none() {
            return Ok(FlowResult::form_error("user", schema(), "no_arg"));
        }

        let (unique_id, title) = match &arg {
            Some(arg) => (
                slugify(&format!("{}_{}", sensor_type.key, arg)),
                format!("{} ({})", sensor_type.key, arg),
            ),
            None => (slugify(sensor_type.key), sensor_type.key.to_string()),
        };
        self.unique_id = Some(unique_id);
        Ok(FlowResult::create_entry(title, input))
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(pairs: &[(&str, &str)]) -> FlowData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_form_then_entry() {
        let mut flow = SystemMonitorConfigFlow::new();
        let form = flow.step("user", None).await.unwrap();
        assert!(matches!(form, FlowResult::Form { ref step_id, .. } if step_id == "user"));

        let result = flow
            .step("user", Some(input(&[("type", "disk_use_percent"), ("arg", "/home")])))
            .await
            .unwrap();
        match result {
            FlowResult::CreateEntry { title, .. } => assert_eq!(title, "disk_use_percent (/home)"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(flow.unique_id().as_deref(), Some("disk_use_percent_home"));
    }

    #[tokio::test]
    async fn test_missing_arg() {
        let mut flow = SystemMonitorConfigFlow::new();
        let result = flow
            .step("user", Some(input(&[("type", "process")])))
            .await
            .unwrap();
        assert_eq!(result.errors().unwrap()["base"], "no_arg");
        assert!(flow.unique_id().is_none());
    }

    #[tokio::test]
    async fn test_no_arg_needed() {
        let mut flow = SystemMonitorConfigFlow::new();
        let result = flow
            .step("user", Some(input(&[("type", "load_15m")])))
            .await
            .unwrap();
        assert!(matches!(result, FlowResult::CreateEntry { ref title, .. } if title == "load_15m"));
        assert_eq!(flow.unique_id().as_deref(), Some("load_15m"));
    }
}
