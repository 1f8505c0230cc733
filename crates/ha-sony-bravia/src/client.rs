//! BRAVIA REST client
//!
//! JSON-RPC calls go to `http://{host}/sony/{service}` and remote key
//! presses to the IRCC SOAP endpoint, all authenticated with a pre-shared
//! key in the `X-Auth-PSK` header.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

pub const EXT_INPUTS: &[&str] = &[
    "extInput:cec",
    "extInput:component",
    "extInput:composite",
    "extInput:hdmi",
    "extInput:widi",
];

pub const TV_FORMATS: &[&str] = &[
    "tv:analog",
    "tv:atsct",
    "tv:dvbc",
    "tv:dvbs",
    "tv:dvbt",
    "tv:isdbbs",
    "tv:isdbcs",
    "tv:isdbgt",
    "tv:isdbt",
];

/// Power status reported while the screen is on
pub const POWER_ACTIVE: &str = "active";

const TIMEOUT: Duration = Duration::from_secs(8);
const PSK_HEADER: &str = "X-Auth-PSK";
const IRCC_ACTION: &str = "\"urn:schemas-sony-com:service:IRCC:1#X_SendIRCC\"";
const WOL_TARGET: &str = "255.255.255.255:9";

#[derive(Debug, Error)]
pub enum BraviaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The TV answered a JSON-RPC call with an `error` member
    #[error("{method} failed: {error}")]
    Rpc { method: String, error: String },

    #[error("unexpected response to {0}")]
    InvalidResponse(String),

    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),

    #[error("wake-on-LAN failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config entry: {0}")]
    InvalidEntry(String),
}

pub type BraviaResult<T> = Result<T, BraviaError>;

/// `getSystemInformation` result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub mac_addr: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
}

impl SystemInfo {
    fn is_complete(&self) -> bool {
        [
            &self.model,
            &self.name,
            &self.serial,
            &self.mac_addr,
            &self.generation,
            &self.cid,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// An installed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub uri: String,
    pub icon: Option<String>,
}

/// Snapshot of the TV after one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BraviaData {
    pub available: bool,
    pub system: SystemInfo,
    /// `active`, `standby` or `None` when the TV did not answer
    pub power_status: Option<String>,
    /// Title → app
    pub apps: IndexMap<String, App>,
    /// Remote key name → IRCC code
    pub commands: IndexMap<String, String>,
    /// Source label → content uri
    pub sources: IndexMap<String, String>,
    /// Speaker volume, 0..100
    pub volume: Option<u32>,
    pub mute: Option<bool>,
    pub title: Option<String>,
    pub display_number: Option<String>,
    pub program_title: Option<String>,
    pub source: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl BraviaData {
    pub fn is_active(&self) -> bool {
        self.power_status.as_deref() == Some(POWER_ACTIVE)
    }
}

fn first(result: &Value) -> Option<&Value> {
    result.get(0)
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Start and end (`HH:MM`) of the programme in `playing_info`
///
/// `startDateTime` looks like `2017-03-24T00:00:00+0100`; the offset is
/// ignored and the end wraps past midnight.
pub fn playing_time(playing_info: &Value) -> Option<(String, String)> {
    let start = playing_info.get("startDateTime")?.as_str()?.get(..19)?;
    let duration = playing_info.get("durationSec")?.as_i64().filter(|d| *d > 0)?;
    let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M:%S")
        .ok()?
        .time();
    let (end, _) = start.overflowing_add_signed(ChronoDuration::seconds(duration));
    Some((
        start.format("%H:%M").to_string(),
        end.format("%H:%M").to_string(),
    ))
}

/// Wake-on-LAN magic packet: six `0xFF` then the MAC sixteen times
pub fn magic_packet(mac: &str) -> BraviaResult<Vec<u8>> {
    let bytes = mac
        .split([':', '-'])
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| BraviaError::InvalidMac(mac.to_string()))?;
    if bytes.len() != 6 {
        return Err(BraviaError::InvalidMac(mac.to_string()));
    }

    let mut packet = vec![0xFF; 6];
    for _ in 0..16 {
        packet.extend_from_slice(&bytes);
    }
    Ok(packet)
}

/// Client for one TV
pub struct BraviaClient {
    http: reqwest::Client,
    base_url: String,
    psk: String,
    data: Mutex<BraviaData>,
}

impl BraviaClient {
    /// `host` may carry a port (`192.168.1.20:8080`)
    pub fn new(host: &str, psk: impl Into<String>) -> BraviaResult<Self> {
        let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(Self::with_client(http, format!("http://{}", host), psk))
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        psk: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            psk: psk.into(),
            data: Mutex::new(BraviaData::default()),
        }
    }

    /// The last snapshot built by [`Self::update`]
    pub async fn data(&self) -> BraviaData {
        self.data.lock().await.clone()
    }

    #[instrument(skip(self, params))]
    async fn rpc(&self, service: &str, method: &str, params: Option<Value>) -> BraviaResult<Value> {
        let body = json!({
            "method": method,
            "params": params.map_or_else(Vec::new, |p| vec![p]),
            "id": 1,
            "version": "1.0",
        });
        let response: Value = self
            .http
            .post(format!("{}/sony/{}", self.base_url, service))
            .header(PSK_HEADER, &self.psk)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(BraviaError::Rpc {
                method: method.to_string(),
                error: error.to_string(),
            });
        }
        debug!(method, "BRAVIA call succeeded");
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Press a remote key by IRCC code
    #[instrument(skip(self))]
    pub async fn send_ircc(&self, code: &str) -> BraviaResult<()> {
        let envelope = format!(
            "<?xml version=\"1.0\"?><s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
             s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\"><s:Body>\
             <u:X_SendIRCC xmlns:u=\"urn:schemas-sony-com:service:IRCC:1\"><IRCCCode>{}</IRCCCode>\
             </u:X_SendIRCC></s:Body></s:Envelope>",
            code
        );
        self.http
            .post(format!("{}/sony/IRCC", self.base_url))
            .header(PSK_HEADER, &self.psk)
            .header("SOAPACTION", IRCC_ACTION)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .body(envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    // ===== Reads =====

    pub async fn system_info(&self) -> BraviaResult<SystemInfo> {
        let result = self.rpc("system", "getSystemInformation", None).await?;
        let info = first(&result)
            .ok_or_else(|| BraviaError::InvalidResponse("getSystemInformation".to_string()))?;
        serde_json::from_value(info.clone())
            .map_err(|_| BraviaError::InvalidResponse("getSystemInformation".to_string()))
    }

    pub async fn power_status(&self) -> BraviaResult<String> {
        let result = self.rpc("system", "getPowerStatus", None).await?;
        first(&result)
            .and_then(|r| text(r, "status"))
            .ok_or_else(|| BraviaError::InvalidResponse("getPowerStatus".to_string()))
    }

    pub async fn apps(&self) -> BraviaResult<IndexMap<String, App>> {
        let result = self.rpc("appControl", "getApplicationList", None).await?;
        let mut apps = IndexMap::new();
        for app in first(&result).and_then(Value::as_array).into_iter().flatten() {
            let (Some(title), Some(uri)) = (text(app, "title"), text(app, "uri")) else {
                continue;
            };
            apps.insert(
                title.replace("&amp;", "&"),
                App {
                    uri,
                    icon: text(app, "icon"),
                },
            );
        }
        Ok(apps)
    }

    pub async fn commands(&self) -> BraviaResult<IndexMap<String, String>> {
        let result = self.rpc("system", "getRemoteControllerInfo", None).await?;
        Ok(result
            .get(1)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| Some((text(c, "name")?, text(c, "value")?)))
            .collect())
    }

    /// Contents of every source of `scheme` whose id is in `wanted`
    async fn scheme_contents(&self, scheme: &str, wanted: &[&str]) -> Vec<Value> {
        let sources = match self
            .rpc("avContent", "getSourceList", Some(json!({ "scheme": scheme })))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                debug!(scheme, "No source list: {}", err);
                return Vec::new();
            }
        };

        let mut contents = Vec::new();
        for source in first(&sources).and_then(Value::as_array).into_iter().flatten() {
            let Some(id) = source.get("source").and_then(Value::as_str) else {
                continue;
            };
            if !wanted.contains(&id) {
                continue;
            }
            match self
                .rpc("avContent", "getContentList", Some(source.clone()))
                .await
            {
                Ok(result) => {
                    if let Some(items) = first(&result).and_then(Value::as_array) {
                        contents.extend(items.iter().cloned());
                    }
                }
                Err(err) => debug!(source = id, "No content list: {}", err),
            }
        }
        contents
    }

    /// Selectable sources, TV channels first, keyed by their input label
    pub async fn sources(&self) -> BraviaResult<IndexMap<String, String>> {
        let mut contents = self.scheme_contents("tv", TV_FORMATS).await;
        contents.extend(self.scheme_contents("extInput", EXT_INPUTS).await);

        let labels: IndexMap<String, String> = match self
            .rpc("avContent", "getCurrentExternalInputsStatus", None)
            .await
        {
            Ok(result) => first(&result)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|i| Some((text(i, "title")?, text(i, "label")?)))
                .collect(),
            Err(err) => {
                debug!("No input labels: {}", err);
                IndexMap::new()
            }
        };

        let mut sources = IndexMap::new();
        for content in &contents {
            let (Some(title), Some(uri)) = (text(content, "title"), text(content, "uri")) else {
                continue;
            };
            let label = labels.get(&title).cloned().unwrap_or(title);
            sources.insert(label, uri);
        }
        Ok(sources)
    }

    /// Volume and mute of the `speaker` target
    pub async fn volume_info(&self) -> BraviaResult<Option<(Option<u32>, Option<bool>)>> {
        let result = self.rpc("audio", "getVolumeInformation", None).await?;
        Ok(first(&result)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|t| t.get("target").and_then(Value::as_str) == Some("speaker"))
            .last()
            .map(|speaker| {
                let volume = text(speaker, "volume").and_then(|v| v.parse().ok());
                (volume, speaker.get("mute").and_then(Value::as_bool))
            }))
    }

    pub async fn playing_info(&self) -> BraviaResult<Value> {
        let result = self.rpc("avContent", "getPlayingContentInfo", None).await?;
        Ok(first(&result).cloned().unwrap_or(Value::Null))
    }

    /// Fetch the system information once and return it
    pub async fn connect(&self) -> BraviaResult<BraviaData> {
        let system = self.system_info().await?;
        let mut data = self.data.lock().await;
        data.system = system;
        data.available = true;
        Ok(data.clone())
    }

    /// Poll the TV
    ///
    /// A TV that does not answer the power query is reported unavailable
    /// rather than failing. Everything past the power status is only read
    /// while the screen is on.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn update(&self) -> BraviaData {
        let mut data = self.data.lock().await;

        match self.power_status().await {
            Ok(status) => {
                data.power_status = Some(status);
                data.available = true;
            }
            Err(err) => {
                debug!("Power status unavailable: {}", err);
                data.power_status = None;
                data.available = false;
            }
        }

        if data.available && !data.system.is_complete() {
            match self.system_info().await {
                Ok(system) => data.system = system,
                Err(err) => warn!("Cannot read system information: {}", err),
            }
        }

        if !data.is_active() {
            return data.clone();
        }

        data.apps = self.apps().await.unwrap_or_else(|err| {
            warn!("Cannot read application list: {}", err);
            IndexMap::new()
        });
        data.commands = self.commands().await.unwrap_or_else(|err| {
            warn!("Cannot read remote controller info: {}", err);
            IndexMap::new()
        });
        data.sources = self.sources().await.unwrap_or_default();

        let (volume, mute) = self.volume_info().await.ok().flatten().unwrap_or_default();
        data.volume = volume;
        data.mute = mute;

        // Errors mean nothing is playing, e.g. an app is in front
        let playing = self.playing_info().await.unwrap_or(Value::Null);
        data.title = text(&playing, "title");
        data.display_number = text(&playing, "dispNum");
        data.program_title = text(&playing, "programTitle");
        data.source = text(&playing, "source");
        let times = playing_time(&playing);
        data.start_time = times.as_ref().map(|(start, _)| start.clone());
        data.end_time = times.map(|(_, end)| end);

        data.clone()
    }

    // ===== Commands =====

    pub async fn set_active_app(&self, uri: &str) -> BraviaResult<()> {
        self.rpc("appControl", "setActiveApp", Some(json!({ "uri": uri })))
            .await
            .map(|_| ())
    }

    /// Set the speaker volume, `volume` in 0..1
    pub async fn set_audio_volume(&self, volume: f64) -> BraviaResult<()> {
        let level = ((volume * 100.0).round() as i64).to_string();
        self.rpc(
            "audio",
            "setAudioVolume",
            Some(json!({ "target": "speaker", "volume": level })),
        )
        .await
        .map(|_| ())
    }

    pub async fn set_audio_mute(&self, mute: bool) -> BraviaResult<()> {
        self.rpc("audio", "setAudioMute", Some(json!({ "status": mute })))
            .await
            .map(|_| ())
    }

    pub async fn set_power_status(&self, on: bool) -> BraviaResult<()> {
        self.rpc("system", "setPowerStatus", Some(json!({ "status": on })))
            .await
            .map(|_| ())
    }

    pub async fn set_play_content(&self, uri: &str) -> BraviaResult<()> {
        self.rpc("avContent", "setPlayContent", Some(json!({ "uri": uri })))
            .await
            .map(|_| ())
    }

    /// Broadcast a magic packet for `mac` on UDP port 9
    pub async fn wake_on_lan(mac: &str) -> BraviaResult<()> {
        let packet = magic_packet(mac)?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        socket.send_to(&packet, WOL_TARGET).await?;
        debug!(mac, "Sent wake-on-LAN packet");
        Ok(())
    }

    /// Power on; a TV whose network stack sleeps is woken over LAN instead
    pub async fn turn_on(&self) -> BraviaResult<()> {
        let Err(err) = self.set_power_status(true).await else {
            return Ok(());
        };
        let mac = self.data.lock().await.system.mac_addr.clone();
        match mac {
            Some(mac) => {
                debug!("setPowerStatus failed ({}), trying wake-on-LAN", err);
                Self::wake_on_lan(&mac).await
            }
            None => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BraviaClient {
        BraviaClient::with_client(reqwest::Client::new(), server.uri(), "0000")
    }

    async fn mount(server: &MockServer, service: &str, rpc: &str, result: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/sony/{}", service)))
            .and(body_partial_json(json!({ "method": rpc })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": result,
                "id": 1
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_playing_time() {
        let info = json!({
            "startDateTime": "2017-03-24T23:30:00+0100",
            "durationSec": 3600
        });
        assert_eq!(
            playing_time(&info),
            Some(("23:30".to_string(), "00:30".to_string()))
        );
        assert_eq!(playing_time(&json!({"startDateTime": "2017-03-24T23:30:00"})), None);
        assert_eq!(
            playing_time(&json!({"startDateTime": "2017-03-24T23:30:00", "durationSec": 0})),
            None
        );
    }

    #[test]
    fn test_magic_packet() {
        let packet = magic_packet("AC:9B:0A:12:34:56").unwrap();
        assert_eq!(packet.len(), 102);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        assert_eq!(&packet[6..12], &[0xAC, 0x9B, 0x0A, 0x12, 0x34, 0x56]);
        assert_eq!(&packet[96..], &[0xAC, 0x9B, 0x0A, 0x12, 0x34, 0x56]);

        assert!(matches!(
            magic_packet("AC:9B:0A"),
            Err(BraviaError::InvalidMac(_))
        ));
        assert!(magic_packet("zz:9B:0A:12:34:56").is_err());
    }

    #[tokio::test]
    async fn test_rpc_envelope_and_psk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sony/system"))
            .and(header("X-Auth-PSK", "0000"))
            .and(body_partial_json(json!({
                "method": "getPowerStatus",
                "params": [],
                "id": 1,
                "version": "1.0"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": [{"status": "standby"}], "id": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server).power_status().await.unwrap(), "standby");
    }

    #[tokio::test]
    async fn test_rpc_error_member() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sony/system"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": [403, "Forbidden"], "id": 1})),
            )
            .mount(&server)
            .await;

        let err = client(&server).system_info().await.unwrap_err();
        assert!(matches!(err, BraviaError::Rpc { ref method, .. } if method == "getSystemInformation"));
    }

    #[tokio::test]
    async fn test_apps_and_commands() {
        let server = MockServer::start().await;
        mount(
            &server,
            "appControl",
            "getApplicationList",
            json!([[
                {"title": "Netflix", "uri": "com.sony.dtv.netflix", "icon": "http://icons/netflix.png"},
                {"title": "Arts &amp; Culture", "uri": "com.sony.dtv.arts", "icon": ""}
            ]]),
        )
        .await;
        mount(
            &server,
            "system",
            "getRemoteControllerInfo",
            json!([{"bundled": true, "type": "IR_REMOTE_BUNDLE_TYPE_AEP_N"}, [
                {"name": "VolumeUp", "value": "AAAAAQAAAAEAAAASAw=="},
                {"name": "Pause", "value": "AAAAAgAAAJcAAAAZAw=="}
            ]]),
        )
        .await;

        let client = client(&server);
        let apps = client.apps().await.unwrap();
        assert_eq!(apps["Netflix"].icon.as_deref(), Some("http://icons/netflix.png"));
        assert_eq!(apps["Arts & Culture"].icon, None);

        let commands = client.commands().await.unwrap();
        assert_eq!(commands["VolumeUp"], "AAAAAQAAAAEAAAASAw==");
    }

    #[tokio::test]
    async fn test_sources_use_input_labels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sony/avContent"))
            .and(body_partial_json(json!({"method": "getSourceList", "params": [{"scheme": "tv"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [[{"source": "tv:dvbt"}, {"source": "tv:unknown"}]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sony/avContent"))
            .and(body_partial_json(
                json!({"method": "getSourceList", "params": [{"scheme": "extInput"}]}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [[{"source": "extInput:hdmi"}]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sony/avContent"))
            .and(body_partial_json(
                json!({"method": "getContentList", "params": [{"source": "tv:dvbt"}]}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [[{"title": "BBC One", "uri": "tv:dvbt?trip=1&srvName=BBC One"}]]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sony/avContent"))
            .and(body_partial_json(
                json!({"method": "getContentList", "params": [{"source": "extInput:hdmi"}]}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [[
                    {"title": "HDMI 1", "uri": "extInput:hdmi?port=1"},
                    {"title": "HDMI 2", "uri": "extInput:hdmi?port=2"}
                ]]
            })))
            .mount(&server)
            .await;
        mount(
            &server,
            "avContent",
            "getCurrentExternalInputsStatus",
            json!([[
                {"title": "HDMI 1", "label": "Apple TV", "uri": "extInput:hdmi?port=1"},
                {"title": "HDMI 2", "label": "", "uri": "extInput:hdmi?port=2"}
            ]]),
        )
        .await;

        let sources = client(&server).sources().await.unwrap();
        let labels: Vec<&str> = sources.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["BBC One", "Apple TV", "HDMI 2"]);
        assert_eq!(sources["Apple TV"], "extInput:hdmi?port=1");
    }

    #[tokio::test]
    async fn test_update_standby_skips_details() {
        let server = MockServer::start().await;
        mount(&server, "system", "getPowerStatus", json!([{"status": "standby"}])).await;
        mount(
            &server,
            "system",
            "getSystemInformation",
            json!([{"model": "KD-55XF9005", "name": "BRAVIA", "serial": "123",
                    "macAddr": "AC:9B:0A:12:34:56", "generation": "5.0.1", "cid": "cid-1"}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/sony/appControl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": [[]]})))
            .expect(0)
            .mount(&server)
            .await;

        let data = client(&server).update().await;
        assert!(data.available);
        assert!(!data.is_active());
        assert_eq!(data.system.model.as_deref(), Some("KD-55XF9005"));
        assert_eq!(data.system.mac_addr.as_deref(), Some("AC:9B:0A:12:34:56"));
    }

    #[tokio::test]
    async fn test_update_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let data = client(&server).update().await;
        assert!(!data.available);
        assert_eq!(data.power_status, None);
    }

    #[tokio::test]
    async fn test_commands_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sony/audio"))
            .and(body_partial_json(json!({
                "method": "setAudioVolume",
                "params": [{"target": "speaker", "volume": "35"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": [0]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sony/IRCC"))
            .and(header("SOAPACTION", IRCC_ACTION))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.set_audio_volume(0.349).await.unwrap();
        client.send_ircc("AAAAAQAAAAEAAAASAw==").await.unwrap();
    }
}
