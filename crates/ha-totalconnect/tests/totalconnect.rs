use async_trait::async_trait;
use ha_core::Context;
use ha_host::{Hass, ServiceError};
use ha_totalconnect::client::arming;
use ha_totalconnect::{Location, TotalConnect, TotalConnectClient, TotalConnectError, TotalConnectResult};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// An account backed by the fixture; arming commands change the stored state
struct FakeAccount {
    locations: Mutex<Vec<Location>>,
    accept: bool,
}

impl FakeAccount {
    fn new(accept: bool) -> Arc<Self> {
        let text = std::fs::read_to_string(format!(
            "{}/tests/fixtures/locations.json",
            env!("CARGO_MANIFEST_DIR")
        ))
        .unwrap();
        Arc::new(Self {
            locations: Mutex::new(serde_json::from_str(&text).unwrap()),
            accept,
        })
    }

    fn set_state(&self, location_id: &str, state: i64) -> TotalConnectResult<bool> {
        if !self.accept {
            return Ok(false);
        }
        let mut locations = self.locations.lock().unwrap();
        let location = locations
            .iter_mut()
            .find(|l| l.location_id == location_id)
            .ok_or_else(|| TotalConnectError::UnknownLocation(location_id.to_string()))?;
        location.arming_state = state;
        Ok(true)
    }
}

#[async_trait]
impl TotalConnectClient for FakeAccount {
    async fn locations(&self) -> TotalConnectResult<Vec<Location>> {
        Ok(self.locations.lock().unwrap().clone())
    }

    async fn location(&self, location_id: &str) -> TotalConnectResult<Location> {
        self.locations
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.location_id == location_id)
            .cloned()
            .ok_or_else(|| TotalConnectError::UnknownLocation(location_id.to_string()))
    }

    async fn arm_away(&self, location_id: &str) -> TotalConnectResult<bool> {
        self.set_state(location_id, arming::ARMED_AWAY)
    }

    async fn arm_stay(&self, location_id: &str) -> TotalConnectResult<bool> {
        self.set_state(location_id, arming::ARMED_STAY)
    }

    async fn arm_stay_night(&self, location_id: &str) -> TotalConnectResult<bool> {
        self.set_state(location_id, arming::ARMED_STAY_NIGHT)
    }

    async fn disarm(&self, location_id: &str) -> TotalConnectResult<bool> {
        self.set_state(location_id, arming::DISARMED)
    }
}

#[tokio::test]
async fn test_setup_writes_panel_and_zones() {
    let hass = Hass::default();
    let integration = TotalConnect::new(hass.clone());
    let account = integration.setup(FakeAccount::new(true)).await.unwrap();

    let panel = hass.states.get("alarm_control_panel.home").unwrap();
    assert_eq!(panel.state, "disarmed");
    assert_eq!(panel.attributes["low_battery"], true);
    assert_eq!(panel.attributes["faulted_zones"], json!(["Front Door"]));
    assert_eq!(panel.attributes["tampered_zones"], json!(["Kid'S Window"]));
    assert_eq!(panel.attributes["triggered_zones"], json!(null));
    assert_eq!(panel.attributes["supported_features"], 7);

    let door = hass.states.get("binary_sensor.front_door").unwrap();
    assert_eq!(door.state, "on");
    assert_eq!(door.attributes["device_class"], "door");
    assert_eq!(door.attributes["zone_id"], 3);

    let smoke = hass.states.get("binary_sensor.smoke_detector").unwrap();
    assert_eq!(smoke.state, "off");
    assert_eq!(smoke.attributes["device_class"], "smoke");

    let window = hass.states.get("binary_sensor.kid_s_window").unwrap();
    assert_eq!(window.attributes["friendly_name"], "Kid\u{2019}s Window");
    assert_eq!(window.attributes["tampered"], true);

    let motion = hass.states.get("binary_sensor.basement_motion").unwrap();
    assert_eq!(motion.attributes["device_class"], "problem");
    assert_eq!(motion.attributes["bypassed"], true);

    assert_eq!(account.platform.entity_ids().await.len(), 5);
    account.unload();
}

#[tokio::test]
async fn test_arm_away_service_updates_panel() {
    let hass = Hass::default();
    let integration = TotalConnect::new(hass.clone());
    let account = integration.setup(FakeAccount::new(true)).await.unwrap();

    hass.services
        .call(
            "alarm_control_panel",
            "alarm_arm_away",
            json!({"entity_id": "alarm_control_panel.home"}),
            Context::new(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        hass.states.get("alarm_control_panel.home").unwrap().state,
        "armed_away"
    );
    account.unload();
}

#[tokio::test]
async fn test_rejected_command_fails_the_call() {
    let hass = Hass::default();
    let integration = TotalConnect::new(hass.clone());
    let account = integration.setup(FakeAccount::new(false)).await.unwrap();

    let err = hass
        .services
        .call("alarm_control_panel", "alarm_arm_night", json!({}), Context::new(), false)
        .await
        .unwrap_err();
    match err {
        ServiceError::CallFailed(message) => {
            assert_eq!(message, "TotalConnect failed to arm night Home.")
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(hass.states.get("alarm_control_panel.home").unwrap().state, "disarmed");
    account.unload();
}

/// A session whose every request fails
struct Offline;

#[async_trait]
impl TotalConnectClient for Offline {
    async fn locations(&self) -> TotalConnectResult<Vec<Location>> {
        Err(TotalConnectError::Request("connection refused".to_string()))
    }

    async fn location(&self, _location_id: &str) -> TotalConnectResult<Location> {
        Err(TotalConnectError::Request("connection refused".to_string()))
    }

    async fn arm_away(&self, _location_id: &str) -> TotalConnectResult<bool> {
        Ok(false)
    }

    async fn arm_stay(&self, _location_id: &str) -> TotalConnectResult<bool> {
        Ok(false)
    }

    async fn arm_stay_night(&self, _location_id: &str) -> TotalConnectResult<bool> {
        Ok(false)
    }

    async fn disarm(&self, _location_id: &str) -> TotalConnectResult<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_setup_fails_when_transport_is_down() {
    let hass = Hass::default();
    let integration = TotalConnect::new(hass.clone());
    let result = integration.setup(Arc::new(Offline)).await;

    assert!(matches!(result, Err(TotalConnectError::Request(_))));
    assert!(hass.states.get("alarm_control_panel.home").is_none());
}
