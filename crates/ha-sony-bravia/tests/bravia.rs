use ha_config_entries::ConfigEntry;
use ha_core::Context;
use ha_host::Hass;
use ha_sony_bravia::SonyBravia;
use serde_json::{json, Value};
use std::collections::HashMap;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fixture(name: &str) -> Value {
    let text = std::fs::read_to_string(format!(
        "{}/tests/fixtures/{}",
        env!("CARGO_MANIFEST_DIR"),
        name
    ))
    .unwrap();
    serde_json::from_str(&text).unwrap()
}

async fn rpc(server: &MockServer, service: &str, rpc_method: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/sony/{}", service)))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A TV that is on and showing a DVB-T channel
async fn tv() -> MockServer {
    let server = MockServer::start().await;
    rpc(&server, "system", "getPowerStatus", json!({"result": [{"status": "active"}]})).await;
    rpc(
        &server,
        "system",
        "getSystemInformation",
        json!({"result": [{
            "model": "KD-55XF9005", "name": "BRAVIA", "serial": "1234567",
            "macAddr": "AC:9B:0A:12:34:56", "generation": "5.0.1", "cid": "cid-1"
        }]}),
    )
    .await;
    rpc(&server, "system", "getRemoteControllerInfo", fixture("remote_controller_info.json")).await;
    rpc(
        &server,
        "appControl",
        "getApplicationList",
        json!({"result": [[{"title": "Netflix", "uri": "com.sony.dtv.netflix", "icon": "http://icons/n.png"}]]}),
    )
    .await;
    rpc(&server, "avContent", "getSourceList", json!({"error": [3, "Illegal Argument"]})).await;
    rpc(&server, "avContent", "getCurrentExternalInputsStatus", json!({"result": [[]]})).await;
    rpc(
        &server,
        "audio",
        "getVolumeInformation",
        json!({"result": [[
            {"target": "headphone", "volume": 5, "mute": false},
            {"target": "speaker", "volume": 18, "mute": false}
        ]]}),
    )
    .await;
    rpc(
        &server,
        "avContent",
        "getPlayingContentInfo",
        json!({"result": [{
            "title": "BBC One", "dispNum": "001", "programTitle": "News",
            "source": "tv:dvbt", "startDateTime": "2026-10-18T18:00:00+0100", "durationSec": 1800
        }]}),
    )
    .await;
    server
}

fn entry(server: &MockServer) -> ConfigEntry {
    ConfigEntry::new("sony_bravia", "BRAVIA").with_data(HashMap::from([
        ("host".to_string(), json!(server.address().to_string())),
        ("psk".to_string(), json!("0000")),
        ("time_format".to_string(), json!("12H")),
    ]))
}

#[tokio::test]
async fn test_setup_writes_player_and_remote() {
    let server = tv().await;
    let hass = Hass::default();
    let bravia = SonyBravia::new(hass.clone());

    let entry = entry(&server);
    let loaded = bravia.setup_entry(&entry).await.unwrap();
    assert_eq!(
        loaded.media_player.as_ref().unwrap().to_string(),
        "media_player.sony_bravia_kd_55xf9005"
    );

    let player = hass.states.get("media_player.sony_bravia_kd_55xf9005").unwrap();
    assert_eq!(player.state, "on");
    assert_eq!(player.attributes["media_title"], "001: BBC One");
    assert_eq!(player.attributes["media_series_title"], "News | 6:00 PM - 6:30 PM");
    assert_eq!(player.attributes["media_content_type"], "tvshow");
    assert_eq!(player.attributes["volume_level"], json!(0.18));
    assert_eq!(player.attributes["app_list"], json!(["Netflix"]));

    let remote = hass.states.get("remote.sony_bravia_kd_55xf9005").unwrap();
    assert_eq!(remote.state, "on");
    assert!(remote.attributes["command_list"]
        .as_array()
        .unwrap()
        .contains(&json!("VolumeUp")));

    assert!(bravia.unload_entry(&entry.entry_id));
    assert!(!bravia.unload_entry(&entry.entry_id));
}

#[tokio::test]
async fn test_pause_on_tv_source_sends_tv_pause() {
    let server = tv().await;
    Mock::given(method("POST"))
        .and(path("/sony/IRCC"))
        .and(body_string_contains("AAAAAgAAABoAAABnAw=="))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let bravia = SonyBravia::new(hass.clone());
    bravia.setup_entry(&entry(&server)).await.unwrap();

    hass.services
        .call(
            "media_player",
            "media_pause",
            json!({"entity_id": "media_player.sony_bravia_kd_55xf9005"}),
            Context::new(),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_open_app_and_remote_repeats() {
    let server = tv().await;
    Mock::given(method("POST"))
        .and(path("/sony/appControl"))
        .and(body_partial_json(json!({
            "method": "setActiveApp",
            "params": [{"uri": "com.sony.dtv.netflix"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sony/IRCC"))
        .and(body_string_contains("AAAAAQAAAAEAAAASAw=="))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let bravia = SonyBravia::new(hass.clone());
    bravia.setup_entry(&entry(&server)).await.unwrap();

    hass.services
        .call(
            "sony_bravia",
            "open_app",
            json!({"entity_id": "media_player.sony_bravia_kd_55xf9005", "app": "Netflix"}),
            Context::new(),
            false,
        )
        .await
        .unwrap();

    hass.services
        .call(
            "remote",
            "send_command",
            json!({"command": ["VolumeUp", "NoSuchKey"], "num_repeats": 3}),
            Context::new(),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_import_yaml() {
    use ha_config_entries::{ConfigEntries, FlowManager};
    use ha_sony_bravia::BraviaConfig;
    use std::sync::Arc;

    let server = tv().await;
    let entries = Arc::new(ConfigEntries::new());
    let existing = entries
        .add(ConfigEntry::new("sony_bravia", "Bedroom").with_unique_id("192.168.1.30"))
        .unwrap();
    let flows = FlowManager::new(entries.clone());
    let bravia = SonyBravia::new(Hass::default());

    let configs: Vec<BraviaConfig> = serde_json::from_value(json!([
        {"host": "192.168.1.30", "psk": "1111", "ext_speaker": true},
        {"host": server.address().to_string(), "psk": "0000"}
    ]))
    .unwrap();
    let imported = bravia.import(&flows, configs).await;

    assert_eq!(imported.len(), 2);
    let updated = entries.get(&existing.entry_id).unwrap();
    assert_eq!(updated.data_value::<bool>("ext_speaker"), Some(true));
    assert_eq!(
        imported[1].title,
        format!("BRAVIA KD-55XF9005 ({})", server.address())
    );
    assert_eq!(entries.entries("sony_bravia").len(), 2);
}
