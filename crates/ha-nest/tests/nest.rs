use ha_core::Context;
use ha_host::{Hass, ServiceError};
use ha_nest::{Nest, NestApi, NestConfig, NestWebClient};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
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

/// Developer API serving the fixture tree
async fn developer_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Bearer c.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("tree.json")))
        .mount(&server)
        .await;
    server
}

fn config() -> NestConfig {
    serde_json::from_value(json!({
        "access_token": "c.token",
        "stream_source": [{"camera": "Front Door", "url": "rtsp://10.0.0.5/live"}]
    }))
    .unwrap()
}

fn api(server: &MockServer) -> NestApi {
    NestApi::with_client(reqwest::Client::new(), server.uri(), "c.token")
}

async fn call(hass: &Hass, domain: &str, service: &str, data: Value) -> Result<(), ServiceError> {
    hass.services
        .call(domain, service, data, Context::new(), false)
        .await
        .map(|_| ())
}

#[tokio::test]
async fn test_setup_creates_entities() {
    let server = developer_api().await;
    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    nest.setup("entry-1", config(), api(&server), None)
        .await
        .unwrap();

    let climate = hass.states.get("climate.hallway_thermostat").unwrap();
    assert_eq!(climate.state, "heat");
    assert_eq!(climate.attributes["hvac_action"], "heat");
    assert_eq!(climate.attributes["preset_mode"], "none");

    let temperature = hass
        .states
        .get("sensor.hallway_thermostat_current_temperature")
        .unwrap();
    assert_eq!(temperature.state, "19.5");

    let away = hass.states.get("switch.home_nest_away").unwrap();
    assert_eq!(away.state, "off");

    let smoke = hass
        .states
        .get("binary_sensor.kitchen_protect_smoke_detected")
        .unwrap();
    assert_eq!(smoke.state, "on");

    let camera = hass.states.get("camera.front_door").unwrap();
    assert_eq!(camera.state, "streaming");
    assert_eq!(camera.attributes["streaming"], true);

    // doorbell sensors only exist for doorbell cameras
    assert!(hass
        .states
        .get("binary_sensor.front_door_camera_doorbell")
        .is_none());
    assert!(hass
        .states
        .get("binary_sensor.front_door_camera_driveway_activity")
        .is_some());

    assert!(nest.unload_entry("entry-1").await);
    assert!(!nest.unload_entry("entry-1").await);
}

#[tokio::test]
async fn test_structure_filter() {
    let server = developer_api().await;
    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    let mut config = config();
    config.structure = vec!["Cabin".to_string()];
    nest.setup("entry-1", config, api(&server), None)
        .await
        .unwrap();

    assert!(hass.states.get("switch.cabin_nest_away").is_some());
    assert!(hass.states.get("switch.home_nest_away").is_none());
    assert!(hass.states.get("climate.hallway_thermostat").is_none());
}

#[tokio::test]
async fn test_away_switch_alongside_away_sensor() {
    let server = developer_api().await;
    Mock::given(method("PUT"))
        .and(path("/structures/s1"))
        .and(body_json(json!({"away": "away"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"away": "away"})))
        .expect(1)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    nest.setup("entry-1", config(), api(&server), None)
        .await
        .unwrap();

    // Both entities are keyed on the structure's away field
    assert_eq!(hass.states.get("binary_sensor.home_nest_away").unwrap().state, "off");
    assert_eq!(hass.states.get("switch.home_nest_away").unwrap().state, "off");

    call(&hass, "switch", "turn_on", json!({"entity_id": "switch.home_nest_away"}))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_away_mode() {
    let server = developer_api().await;
    Mock::given(method("PUT"))
        .and(path("/structures/s1"))
        .and(body_json(json!({"away": "away"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"away": "away"})))
        .expect(1)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    nest.setup("entry-1", config(), api(&server), None)
        .await
        .unwrap();

    call(&hass, "nest", "set_away_mode", json!({"away_mode": "away", "structure": "Home"}))
        .await
        .unwrap();
    assert!(matches!(
        call(&hass, "nest", "set_away_mode", json!({"away_mode": "vacation"})).await,
        Err(ServiceError::InvalidData(_))
    ));
}

#[tokio::test]
async fn test_set_eta_skips_structures_without_thermostats() {
    let server = developer_api().await;
    Mock::given(method("PUT"))
        .and(path("/structures/s1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/structures/s1/eta"))
        .and(body_partial_json(json!({"trip_id": "groceries"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/structures/s2/eta"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    nest.setup("entry-1", config(), api(&server), None)
        .await
        .unwrap();

    call(
        &hass,
        "nest",
        "set_eta",
        json!({"eta": "00:20:00", "trip_id": "groceries", "structure": ["Home", "Cabin"]}),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_thermostat_services() {
    let server = developer_api().await;
    Mock::given(method("PUT"))
        .and(path("/devices/thermostats/t1"))
        .and(body_json(json!({"fan_timer_duration": 30})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/devices/thermostats/t1"))
        .and(body_json(json!({"target_temperature_c": 22.5})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    nest.setup("entry-1", config(), api(&server), None)
        .await
        .unwrap();

    call(&hass, "nest", "set_fan_timer", json!({"duration": 30}))
        .await
        .unwrap();
    assert!(matches!(
        call(&hass, "nest", "set_fan_timer", json!({"duration": 10})).await,
        Err(ServiceError::InvalidData(_))
    ));
    call(
        &hass,
        "climate",
        "set_temperature",
        json!({"entity_id": "climate.hallway_thermostat", "temperature": 22.5}),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unauthorized_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthorized"})))
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    assert!(nest
        .setup("entry-1", config(), api(&server), None)
        .await
        .is_err());
    assert!(nest.account("entry-1").is_none());
}

/// Web client with a Hallway thermostat that has a humidifier
async fn web_client(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/dropcam/api/login"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/0.1/user/u1/app_launch"))
        .and(body_partial_json(json!({"known_bucket_types": ["buckets", "structure", "where"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "service_urls": {"urls": {"czfe_url": format!("{}/czfe", server.uri())}},
            "updated_buckets": [
                {"object_key": "buckets.u1", "value": {"buckets": ["structure.s1", "device.d1"]}},
                {"object_key": "where.s1", "value": {"wheres": [{"where_id": "w1", "name": "Hallway"}]}}
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/0.1/user/u1/app_launch"))
        .and(body_partial_json(json!({"known_bucket_types": ["structure", "device", "kryptonite"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updated_buckets": [
                {"object_key": "structure.s1", "value": {"name": "Home"}},
                {"object_key": "device.d1", "value": {
                    "where_id": "w1",
                    "has_humidifier": true,
                    "target_humidity": 35,
                    "target_humidity_enabled": true,
                    "humidifier_state": false,
                    "backplate_temperature": 20.4
                }}
            ],
            "weather_for_structures": {"structure.s1": {"current": {"temp_c": "3.5"}}}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_web_client_humidifier() {
    let server = developer_api().await;
    web_client(&server).await;
    Mock::given(method("POST"))
        .and(path("/czfe/v5/put"))
        .and(body_partial_json(json!({"objects": [{
            "object_key": "device.d1",
            "op": "MERGE",
            "value": {"target_humidity": 45}
        }]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let hass = Hass::default();
    let nest = Nest::new(hass.clone());
    let web = NestWebClient::with_client(reqwest::Client::new(), server.uri(), "u1", "w.token");
    nest.setup("entry-1", config(), api(&server), Some(web))
        .await
        .unwrap();

    let humidifier = hass.states.get("humidifier.home").unwrap();
    assert_eq!(humidifier.state, "on");
    assert_eq!(hass.states.get("sensor.home_outdoor_temperature").unwrap().state, "3.5");

    call(
        &hass,
        "humidifier",
        "set_humidity",
        json!({"entity_id": "humidifier.home", "humidity": 46}),
    )
    .await
    .unwrap();
}
