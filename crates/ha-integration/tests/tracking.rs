//! Integration sensor following a live source

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ha_core::{Context, State};
use ha_helpers::{EntityPlatform, RestoreStateStore};
use ha_host::Hass;
use ha_integration::{setup_sensor, IntegrationConfig, UnitPrefix};
use serde_json::json;

fn power(hass: &Hass, watts: &str) {
    hass.states.set(
        "sensor.power".parse().unwrap(),
        watts,
        HashMap::from([("unit_of_measurement".to_string(), json!("W"))]),
        Context::new(),
    );
}

async fn wait_for_unit(hass: &Hass, entity_id: &str) -> State {
    for _ in 0..100 {
        if let Some(state) = hass.states.get(entity_id) {
            if state.attributes.contains_key("unit_of_measurement") {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never learned its unit", entity_id);
}

#[tokio::test]
async fn test_follows_source_and_learns_unit() {
    let hass = Hass::default();
    let platform = Arc::new(EntityPlatform::new(hass.clone(), "integration"));
    let mut config = IntegrationConfig::new("sensor.power");
    config.name = "Energy".to_string();
    config.unit_prefix = UnitPrefix::Kilo;

    let handle = setup_sensor(&hass, &platform, config, None, &RestoreStateStore::new())
        .await
        .unwrap();
    assert_eq!(handle.entity_id.to_string(), "sensor.energy");
    assert_eq!(hass.states.get("sensor.energy").unwrap().state, "0.000");

    power(&hass, "1000");
    power(&hass, "1200");

    let state = wait_for_unit(&hass, "sensor.energy").await;
    assert_eq!(state.attributes["unit_of_measurement"], "kWh");
    assert_eq!(state.attributes["source"], "sensor.power");
    assert_eq!(state.attributes["icon"], "mdi:chart-histogram");
    handle.unload();
}

#[tokio::test]
async fn test_restores_previous_total() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restore_state.json");
    let store = RestoreStateStore::new();
    store.remember(State::new(
        "sensor.integration".parse().unwrap(),
        "42.125",
        HashMap::from([("unit_of_measurement".to_string(), json!("kWh"))]),
        Context::new(),
    ));
    store.save(&path).await.unwrap();

    let hass = Hass::default();
    let platform = Arc::new(EntityPlatform::new(hass.clone(), "integration"));
    let restored = RestoreStateStore::load(&path).await.unwrap();
    setup_sensor(
        &hass,
        &platform,
        IntegrationConfig::new("sensor.power"),
        Some("energy-1".to_string()),
        &restored,
    )
    .await
    .unwrap();

    let state = hass.states.get("sensor.integration").unwrap();
    assert_eq!(state.state, "42.125");
    assert_eq!(state.attributes["unit_of_measurement"], "kWh");
}
