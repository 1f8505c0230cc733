//! Integration sensor config and options flows

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{
    ConfigEntry, ConfigFlow, FieldType, FlowData, FlowError, FlowField, FlowResult, OptionsFlow,
};
use ha_core::constants::PLATFORM_SENSOR;
use ha_host::StateMachine;
use serde_json::Value;

use crate::{
    IntegrationConfig, Method, UnitPrefix, UnitTime, CONF_METHOD, CONF_NAME, CONF_ROUND,
    CONF_SOURCE, CONF_UNIT, CONF_UNIT_PREFIX, CONF_UNIT_TIME, MAX_ROUND,
};

fn schema(sensors: Vec<String>, current: Option<&IntegrationConfig>) -> Vec<FlowField> {
    let defaults = current.cloned().unwrap_or_else(|| IntegrationConfig::new(""));

    let mut source = FlowField::required(CONF_SOURCE, FieldType::Select(sensors));
    if current.is_some() {
        source = source.with_default(defaults.source.clone());
    }
    let mut unit = FlowField::optional(CONF_UNIT, FieldType::String);
    if let Some(value) = &defaults.unit {
        unit = unit.with_default(value.clone());
    }

    vec![
        source,
        FlowField::required(CONF_NAME, FieldType::String).with_default(defaults.name.clone()),
        FlowField::optional(
            CONF_ROUND,
            FieldType::Select((0..=MAX_ROUND).map(|r| r.to_string()).collect()),
        )
        .with_default(defaults.round),
        FlowField::optional(
            CONF_UNIT_PREFIX,
            FieldType::Select(UnitPrefix::ALL.iter().map(|p| p.key().to_string()).collect()),
        )
        .with_default(defaults.unit_prefix.key()),
        FlowField::optional(
            CONF_UNIT_TIME,
            FieldType::Select(UnitTime::ALL.iter().map(|t| t.symbol().to_string()).collect()),
        )
        .with_default(defaults.unit_time.symbol()),
        unit,
        FlowField::optional(
            CONF_METHOD,
            FieldType::Select(Method::ALL.iter().map(|m| m.key().to_string()).collect()),
        )
        .with_default(defaults.method.key()),
    ]
}

/// Validate step input; `Err` carries the form error key
fn parse(input: FlowData) -> Result<(IntegrationConfig, FlowData), &'static str> {
    let value = serde_json::to_value(&input).map_err(|_| "invalid_input")?;
    let config = IntegrationConfig::from_value(value).map_err(|_| "invalid_input")?;
    Ok((config, input))
}

/// Creates one integration sensor entry
pub struct IntegrationConfigFlow {
    states: Arc<StateMachine>,
}

impl IntegrationConfigFlow {
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self { states }
    }
}

#[async_trait]
impl ConfigFlow for IntegrationConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "user" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let sensors = self.states.entity_ids(PLATFORM_SENSOR);
        let Some(input) = input else {
            return Ok(FlowResult::form("user", schema(sensors, None)));
        };

        match parse(input) {
            Ok((config, data)) => Ok(FlowResult::create_entry(config.name, data)),
            Err(error) => Ok(FlowResult::form_error("user", schema(sensors, None), error)),
        }
    }
}

/// Edits an existing integration sensor entry
pub struct IntegrationOptionsFlow {
    states: Arc<StateMachine>,
}

impl IntegrationOptionsFlow {
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self { states }
    }
}

#[async_trait]
impl OptionsFlow for IntegrationOptionsFlow {
    async fn step(
        &mut self,
        entry: &ConfigEntry,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "init" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let current = IntegrationConfig::from_entry(entry)
            .map_err(|e| FlowError::InvalidInput(e.to_string()))?;
        let sensors = self.states.entity_ids(PLATFORM_SENSOR);
        let Some(input) = input else {
            return Ok(FlowResult::form("init", schema(sensors, Some(&current))));
        };

        let (config, data) = match parse(input) {
            Ok(parsed) => parsed,
            Err(error) => {
                return Ok(FlowResult::form_error(
                    "init",
                    schema(sensors, Some(&current)),
                    error,
                ))
            }
        };

        // A user-given title survives; a title that still mirrors the
        // original name follows the new name
        let original_name = entry
            .data
            .get(CONF_NAME)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let title = if entry.title != original_name {
            entry.title.clone()
        } else {
            config.name
        };
        Ok(FlowResult::create_entry(title, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config_entries::{ConfigEntries, FlowManager};
    use ha_core::Context;
    use ha_host::Hass;
    use serde_json::json;
    use std::collections::HashMap;

    fn hass_with_sensors() -> Hass {
        let hass = Hass::default();
        for id in ["sensor.solar", "sensor.power", "light.kitchen"] {
            hass.states
                .set(id.parse().unwrap(), "1", HashMap::new(), Context::new());
        }
        hass
    }

    fn input(pairs: &[(&str, Value)]) -> FlowData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_user_step_lists_sensors_and_creates_entry() {
        let hass = hass_with_sensors();
        let manager = FlowManager::new(Arc::new(ConfigEntries::new()));

        let step = manager
            .init(
                crate::DOMAIN,
                Box::new(IntegrationConfigFlow::new(hass.states.clone())),
            )
            .await
            .unwrap();
        let FlowResult::Form { schema, .. } = &step.result else {
            panic!("expected form");
        };
        assert_eq!(
            schema[0].field_type,
            FieldType::Select(vec!["sensor.power".to_string(), "sensor.solar".to_string()])
        );
        assert_eq!(schema[1].default, Some(json!("integration")));

        let step = manager
            .configure(
                &step.flow_id,
                input(&[
                    (CONF_SOURCE, json!("sensor.power")),
                    (CONF_NAME, json!("Energy")),
                    (CONF_UNIT_PREFIX, json!("k")),
                ]),
            )
            .await
            .unwrap();
        let entry = step.entry.unwrap();
        assert_eq!(entry.title, "Energy");
        let config = IntegrationConfig::from_entry(&entry).unwrap();
        assert_eq!(config.unit_prefix, UnitPrefix::Kilo);
        assert_eq!(config.unit_time, UnitTime::Hours);
    }

    #[tokio::test]
    async fn test_user_step_rejects_bad_round() {
        let hass = hass_with_sensors();
        let manager = FlowManager::new(Arc::new(ConfigEntries::new()));
        let step = manager
            .init(
                crate::DOMAIN,
                Box::new(IntegrationConfigFlow::new(hass.states.clone())),
            )
            .await
            .unwrap();

        let step = manager
            .configure(
                &step.flow_id,
                input(&[(CONF_SOURCE, json!("sensor.power")), (CONF_ROUND, json!(9))]),
            )
            .await
            .unwrap();
        assert_eq!(step.result.errors().unwrap()["base"], "invalid_input");
    }

    async fn retitle(entry_title: &str, new_name: &str) -> String {
        let hass = hass_with_sensors();
        let entries = Arc::new(ConfigEntries::new());
        let entry = entries
            .add(
                ConfigEntry::new(crate::DOMAIN, entry_title).with_data(input(&[
                    (CONF_SOURCE, json!("sensor.power")),
                    (CONF_NAME, json!("Energy")),
                ])),
            )
            .unwrap();
        let manager = FlowManager::new(entries);

        let step = manager
            .init_options(
                &entry.entry_id,
                Box::new(IntegrationOptionsFlow::new(hass.states.clone())),
            )
            .await
            .unwrap();
        let step = manager
            .configure(
                &step.flow_id,
                input(&[(CONF_SOURCE, json!("sensor.solar")), (CONF_NAME, json!(new_name))]),
            )
            .await
            .unwrap();
        let entry = step.entry.unwrap();
        assert_eq!(
            IntegrationConfig::from_entry(&entry).unwrap().source,
            "sensor.solar"
        );
        entry.title
    }

    #[tokio::test]
    async fn test_options_flow_title() {
        assert_eq!(retitle("Energy", "Solar Energy").await, "Solar Energy");
        assert_eq!(retitle("My Meter", "Solar Energy").await, "My Meter");
    }
}
