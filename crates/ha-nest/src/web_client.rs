//! Client for the private home.nest.com API
//!
//! The web API exposes what the developer API does not: humidifier
//! control, remote temperature sensors and outdoor weather. Data comes in
//! "buckets" keyed `"<type>.<id>"`; this client flattens them into one
//! property map per id.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, REFERER, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::api::{NestError, NestResult};

pub const WEB_URL: &str = "https://home.nest.com";

const BUCKET_TYPES: &[&str] = &["structure", "device", "kryptonite"];
const LAUNCH_BUCKET_TYPES: &[&str] = &["buckets", "structure", "where"];
const WEATHER_FLOATS: &[&str] = &["sunrise", "sunset", "temp_c", "zip"];

const RETRY_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const TIMEOUT: Duration = Duration::from_secs(15);
const BROWSER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/83.0.4103.106 Safari/537.36";

/// Properties per device or structure id
pub type WebData = BTreeMap<String, Map<String, Value>>;

#[derive(Default)]
struct WebState {
    czfe_url: Option<String>,
    structures: Vec<String>,
    thermostats: Vec<String>,
    temperature_sensors: Vec<String>,
    wheres: BTreeMap<String, String>,
    data: WebData,
}

pub struct NestWebClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    access_token: String,
    state: RwLock<WebState>,
}

impl NestWebClient {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> NestResult<Self> {
        let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self::with_client(http, WEB_URL, user_id, access_token))
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            access_token: access_token.into(),
            state: RwLock::new(WebState::default()),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, WebState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut WebState) -> R) -> R {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Send with retries on connection failures
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> NestResult<Response> {
        let mut attempt = 1;
        loop {
            let request = build()
                .header(REFERER, format!("{}/", WEB_URL))
                .header(USER_AGENT, BROWSER_AGENT);
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < RETRY_ATTEMPTS && (err.is_connect() || err.is_timeout()) => {
                    let delay = RETRY_BACKOFF * 2u32.pow(attempt - 1);
                    debug!(attempt, "Nest web request failed, retrying in {:?}: {}", delay, err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn app_launch(&self, bucket_types: &[&str]) -> NestResult<Response> {
        let url = format!("{}/api/0.1/user/{}/app_launch", self.base_url, self.user_id);
        let body = json!({
            "known_bucket_types": bucket_types,
            "known_bucket_versions": [],
        });
        self.send(|| {
            self.http
                .post(&url)
                .header(AUTHORIZATION, format!("Basic {}", self.access_token))
                .json(&body)
        })
        .await
    }

    /// Log in and learn the account's devices
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn connect(&self) -> NestResult<()> {
        let login = format!("{}/dropcam/api/login", self.base_url);
        let token = [("access_token", self.access_token.as_str())];
        self.send(|| self.http.post(&login).form(&token)).await?;

        let response = self.app_launch(LAUNCH_BUCKET_TYPES).await?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| NestError::WebClient(format!("app_launch returned {}: {}", status, e)))?;
        if !status.is_success() {
            return Err(NestError::Authorization(format!(
                "app_launch returned {}",
                status
            )));
        }

        let czfe_url = body
            .pointer("/service_urls/urls/czfe_url")
            .and_then(Value::as_str)
            .ok_or_else(|| NestError::WebClient("app_launch without czfe_url".into()))?
            .to_string();

        self.with_state(|state| {
            state.czfe_url = Some(czfe_url);
            for bucket in buckets(&body) {
                let key = bucket_key(bucket);
                if key.starts_with("buckets.") {
                    for name in bucket
                        .pointer("/value/buckets")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(Value::as_str)
                    {
                        let Some((kind, id)) = name.split_once('.') else {
                            continue;
                        };
                        let list = match kind {
                            "structure" => &mut state.structures,
                            "device" => &mut state.thermostats,
                            "kryptonite" => &mut state.temperature_sensors,
                            _ => continue,
                        };
                        if !list.iter().any(|known| known == id) {
                            list.push(id.to_string());
                        }
                        state.data.entry(id.to_string()).or_default();
                    }
                } else if key.starts_with("where.") {
                    for place in bucket
                        .pointer("/value/wheres")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                    {
                        if let (Some(id), Some(name)) = (
                            place.get("where_id").and_then(Value::as_str),
                            place.get("name").and_then(Value::as_str),
                        ) {
                            state.wheres.insert(id.to_string(), name.to_string());
                        }
                    }
                }
            }
        });
        info!("Nest web client connected");
        Ok(())
    }

    /// Fetch every bucket and merge it into the property maps
    ///
    /// A non-200 answer keeps the previous data.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn update(&self) -> NestResult<WebData> {
        let response = self.app_launch(BUCKET_TYPES).await?;
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "Nest web update rejected");
            return Ok(self.data());
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| NestError::WebClient(e.to_string()))?;

        Ok(self.with_state(|state| {
            for bucket in buckets(&body) {
                let key = bucket_key(bucket);
                let Some((kind, id)) = key.split_once('.') else {
                    continue;
                };
                let Some(value) = bucket.get("value").and_then(Value::as_object) else {
                    continue;
                };
                let place = value
                    .get("where_id")
                    .and_then(Value::as_str)
                    .and_then(|w| state.wheres.get(w))
                    .cloned()
                    .unwrap_or_default();
                let entry = state.data.entry(id.to_string()).or_default();
                match kind {
                    "structure" => {
                        if let Some(name) = value.get("name") {
                            entry.insert("name".to_string(), name.clone());
                        }
                        continue;
                    }
                    "device" => {
                        entry.insert("name".to_string(), json!(format!("{} Thermostat", place)));
                    }
                    "kryptonite" => {
                        entry.insert(
                            "name".to_string(),
                            json!(format!("{} Temperature Sensor", place)),
                        );
                    }
                    _ => {}
                }
                entry.insert("location".to_string(), json!(place));
                for (k, v) in value {
                    entry.insert(k.clone(), v.clone());
                }
            }

            if let Some(weather) = body.get("weather_for_structures").and_then(Value::as_object) {
                for (key, groups) in weather {
                    let Some((_, id)) = key.split_once('.') else {
                        continue;
                    };
                    let entry = state.data.entry(id.to_string()).or_default();
                    for measurements in groups.as_object().into_iter().flat_map(|g| g.values()) {
                        for (variable, value) in measurements.as_object().into_iter().flatten() {
                            let value = if WEATHER_FLOATS.contains(&variable.as_str()) {
                                as_float(value)
                            } else {
                                value.clone()
                            };
                            entry.insert(variable.clone(), value);
                        }
                    }
                }
            }
            state.data.clone()
        }))
    }

    /// Write one thermostat property
    ///
    /// Ids that are not thermostats are ignored.
    #[instrument(skip(self, value))]
    pub async fn set(&self, device_id: &str, property: &str, value: Value) -> NestResult<()> {
        let czfe_url = {
            let state = self.state();
            if !state.thermostats.iter().any(|id| id == device_id) {
                debug!("Ignoring write to non-thermostat {}", device_id);
                return Ok(());
            }
            state
                .czfe_url
                .clone()
                .ok_or_else(|| NestError::WebClient("not connected".into()))?
        };
        let url = format!("{}/v5/put", czfe_url.trim_end_matches('/'));
        let mut merged = Map::new();
        merged.insert(property.to_string(), value);
        let body = json!({
            "objects": [{
                "object_key": format!("device.{}", device_id),
                "op": "MERGE",
                "value": merged,
            }]
        });
        let response = self
            .send(|| {
                self.http
                    .post(&url)
                    .header(AUTHORIZATION, format!("Basic {}", self.access_token))
                    .json(&body)
            })
            .await?;
        if !response.status().is_success() {
            return Err(NestError::Api {
                status: response.status().as_u16(),
                message: format!("failed to set {}", property),
            });
        }
        Ok(())
    }

    pub async fn set_target_humidity(&self, device_id: &str, humidity: u32) -> NestResult<()> {
        self.set(device_id, "target_humidity", json!(humidity)).await
    }

    pub async fn enable_target_humidity(&self, device_id: &str, enabled: bool) -> NestResult<()> {
        self.set(device_id, "target_humidity_enabled", json!(enabled))
            .await
    }

    /// The merged property maps of the last update
    pub fn data(&self) -> WebData {
        self.state().data.clone()
    }

    pub fn temperature_sensors(&self) -> Vec<String> {
        self.state().temperature_sensors.clone()
    }

    /// Id of the structure, thermostat or sensor with this display name
    pub fn device_id(&self, name: &str) -> Option<String> {
        let state = self.state();
        state
            .structures
            .iter()
            .chain(&state.temperature_sensors)
            .chain(&state.thermostats)
            .find(|id| {
                state
                    .data
                    .get(*id)
                    .and_then(|d| d.get("name"))
                    .and_then(Value::as_str)
                    == Some(name)
            })
            .cloned()
    }

    pub fn valid_device(&self, name: &str) -> bool {
        self.device_id(name).is_some()
    }
}

fn buckets(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("updated_buckets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn bucket_key(bucket: &Value) -> &str {
    bucket
        .get("object_key")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn as_float(value: &Value) -> Value {
    match value {
        Value::String(s) => s.parse::<f64>().map(|f| json!(f)).unwrap_or(Value::Null),
        Value::Number(n) => n.as_f64().map(|f| json!(f)).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dropcam/api/login"))
            .and(body_string_contains("access_token=secret"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/user/u1/app_launch"))
            .and(body_partial_json(json!({"known_bucket_types": ["buckets", "structure", "where"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "service_urls": {"urls": {"czfe_url": format!("{}/czfe", server.uri())}},
                "updated_buckets": [
                    {"object_key": "buckets.u1", "value": {"buckets": [
                        "structure.s1", "device.t1", "kryptonite.k1", "topaz.p1"
                    ]}},
                    {"object_key": "where.s1", "value": {"wheres": [
                        {"where_id": "w1", "name": "Hallway"},
                        {"where_id": "w2", "name": "Bedroom"}
                    ]}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/user/u1/app_launch"))
            .and(header("authorization", "Basic secret"))
            .and(body_partial_json(json!({"known_bucket_types": ["structure", "device", "kryptonite"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "updated_buckets": [
                    {"object_key": "structure.s1", "value": {"name": "Home"}},
                    {"object_key": "device.t1", "value": {
                        "where_id": "w1", "target_humidity": 35, "has_humidifier": true
                    }},
                    {"object_key": "kryptonite.k1", "value": {
                        "where_id": "w2", "current_temperature": 20.5, "battery_level": 80
                    }}
                ],
                "weather_for_structures": {
                    "structure.s1": {"current": {"temp_c": "12.5", "condition": "Clear"}}
                }
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_connect_and_update() {
        let server = server().await;
        let client = NestWebClient::with_client(reqwest::Client::new(), server.uri(), "u1", "secret");
        client.connect().await.unwrap();
        let data = client.update().await.unwrap();

        assert_eq!(data["s1"]["name"], "Home");
        assert_eq!(data["s1"]["temp_c"], 12.5);
        assert_eq!(data["s1"]["condition"], "Clear");
        assert_eq!(data["t1"]["name"], "Hallway Thermostat");
        assert_eq!(data["t1"]["location"], "Hallway");
        assert_eq!(data["k1"]["name"], "Bedroom Temperature Sensor");
        assert!(!data.contains_key("p1"));

        assert_eq!(client.device_id("Hallway Thermostat").as_deref(), Some("t1"));
        assert!(client.valid_device("Home"));
        assert_eq!(client.temperature_sensors(), vec!["k1".to_string()]);
    }

    #[tokio::test]
    async fn test_set_merges_thermostat_property() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path("/czfe/v5/put"))
            .and(body_partial_json(json!({"objects": [{
                "object_key": "device.t1", "op": "MERGE", "value": {"target_humidity": 40}
            }]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = NestWebClient::with_client(reqwest::Client::new(), server.uri(), "u1", "secret");
        client.connect().await.unwrap();
        client.set_target_humidity("t1", 40).await.unwrap();
        // not a thermostat: nothing is sent
        client.set_target_humidity("k1", 40).await.unwrap();
    }
}
