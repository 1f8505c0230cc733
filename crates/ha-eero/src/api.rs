//! eero cloud API client
//!
//! Every response is wrapped as `{"meta": {"code", "error"}, "data"}`; the
//! client strips the envelope and returns `data`.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Production API endpoint
pub const API_ENDPOINT: &str = "https://api-user.e2ro.com";

/// Error sent with a 401 when the session token needs a refresh
pub const SESSION_REFRESH_ERROR: &str = "error.session.refresh";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum EeroError {
    /// The API answered with a non-success `meta.code`
    #[error("eero API error {code}: {error}")]
    Api { code: u16, error: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("invalid config entry: {0}")]
    InvalidEntry(String),

    /// The first fetch failed; setup should be retried
    #[error("eero not ready: {0}")]
    NotReady(String),
}

pub type EeroResult<T> = Result<T, EeroError>;

#[derive(Deserialize)]
struct Meta {
    code: u16,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    meta: Meta,
    #[serde(default)]
    data: Value,
}

/// Nightlight behaviour of an eero Beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightlightMode {
    Disabled,
    Ambient,
    Schedule,
}

impl std::str::FromStr for NightlightMode {
    type Err = EeroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "ambient" => Ok(Self::Ambient),
            "schedule" => Ok(Self::Schedule),
            other => Err(EeroError::InvalidResponse(format!(
                "unknown nightlight mode '{}'",
                other
            ))),
        }
    }
}

/// Client for one eero account
pub struct EeroApi {
    http: reqwest::Client,
    base_url: String,
    user_token: RwLock<Option<String>>,
    network_url: Option<String>,
    save_location: Option<PathBuf>,
    snapshot: RwLock<Option<Arc<Value>>>,
}

impl EeroApi {
    pub fn new(user_token: Option<String>) -> EeroResult<Self> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(http, API_ENDPOINT, user_token))
    }

    /// Build a client against an explicit endpoint
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        user_token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_token: RwLock::new(user_token),
            network_url: None,
            save_location: None,
            snapshot: RwLock::new(None),
        }
    }

    /// Only fetch the network with this url
    pub fn with_network_url(mut self, network_url: impl Into<String>) -> Self {
        self.network_url = Some(network_url.into());
        self
    }

    /// Dump every response as JSON into `dir`
    pub fn with_save_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_location = Some(dir.into());
        self
    }

    pub fn user_token(&self) -> Option<String> {
        self.user_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_user_token(&self, token: String) {
        *self
            .user_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
    }

    /// The last account snapshot fetched by [`Self::update`]
    pub fn snapshot(&self) -> Option<Arc<Value>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // ===== Transport =====

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> EeroResult<Value> {
        debug!("{} {}", method, url);
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, url));
        if let Some(token) = self.user_token() {
            request = request.header(COOKIE, format!("s={}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            EeroError::InvalidResponse(format!("HTTP {} from {}: {}", status, url, e))
        })?;

        if !matches!(envelope.meta.code, 200 | 201) {
            return Err(EeroError::Api {
                code: envelope.meta.code,
                error: envelope.meta.error.unwrap_or_default(),
            });
        }

        self.save_response(url, &envelope.data).await;
        Ok(envelope.data)
    }

    /// Send a request; an expired session is refreshed once and retried
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> EeroResult<Value> {
        match self.send(method.clone(), url, body).await {
            Err(EeroError::Api { code: 401, error }) if error == SESSION_REFRESH_ERROR => {
                debug!("Session expired, refreshing token");
                self.login_refresh().await?;
                self.send(method, url, body).await
            }
            other => other,
        }
    }

    async fn save_response(&self, url: &str, data: &Value) {
        let Some(dir) = &self.save_location else {
            return;
        };
        if data.is_null() {
            return;
        }
        let name = url.replace(['/', '.'], "_");
        let path = dir.join(format!("{}.json", name));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            let content = serde_json::to_string_pretty(data)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            tokio::fs::write(&path, content).await
        }
        .await;
        if let Err(err) = result {
            warn!("Could not save response to {:?}: {}", path, err);
        }
    }

    pub async fn get(&self, url: &str) -> EeroResult<Value> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: Option<Value>) -> EeroResult<Value> {
        self.request(Method::POST, url, body.as_ref()).await
    }

    pub async fn put(&self, url: &str, body: Value) -> EeroResult<Value> {
        self.request(Method::PUT, url, Some(&body)).await
    }

    // ===== Authentication =====

    /// Start a login; eero sends a verification code to `login`
    #[instrument(skip(self))]
    pub async fn login(&self, login: &str) -> EeroResult<Value> {
        let data = self
            .send(Method::POST, "/2.2/login", Some(&json!({ "login": login })))
            .await?;
        let token = token_of(&data)?;
        self.set_user_token(token);
        Ok(data)
    }

    /// Exchange the session token for a fresh one
    pub async fn login_refresh(&self) -> EeroResult<Value> {
        let data = self.send(Method::POST, "/2.2/login/refresh", None).await?;
        let token = token_of(&data)?;
        self.set_user_token(token);
        Ok(data)
    }

    /// Verify the login with the code eero sent; returns the account
    #[instrument(skip(self, code))]
    pub async fn login_verify(&self, code: &str) -> EeroResult<Value> {
        self.post("/2.2/login/verify", Some(json!({ "code": code })))
            .await
    }

    // ===== Snapshot =====

    /// Fetch the account with its networks, profiles and devices
    ///
    /// API errors return the previous snapshot when there is one.
    #[instrument(skip(self))]
    pub async fn update(&self) -> EeroResult<Arc<Value>> {
        match self.fetch_account().await {
            Ok(account) => {
                let account = Arc::new(account);
                *self
                    .snapshot
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(account.clone());
                Ok(account)
            }
            Err(err @ EeroError::Api { .. }) => match self.snapshot() {
                Some(previous) => {
                    warn!("Keeping previous eero data: {}", err);
                    Ok(previous)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn fetch_account(&self) -> EeroResult<Value> {
        let mut account = self.get("/2.2/account").await?;
        let listed = account
            .pointer("/networks/data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut networks = Vec::new();
        for network in listed {
            let Some(url) = network.get("url").and_then(Value::as_str) else {
                continue;
            };
            if self.network_url.as_deref().is_some_and(|wanted| wanted != url) {
                continue;
            }

            let mut network_data = self.get(url).await?;
            for resource in ["profiles", "devices"] {
                let Some(resource_url) = network_data
                    .pointer(&format!("/resources/{}", resource))
                    .and_then(Value::as_str)
                    .map(String::from)
                else {
                    continue;
                };
                let items = self.get(&resource_url).await?;
                let count = items.as_array().map(Vec::len).unwrap_or_default();
                if let Some(fields) = network_data.as_object_mut() {
                    fields.insert(resource.to_string(), json!({ "count": count, "data": items }));
                }
            }
            networks.push(network_data);
        }

        let fields = account
            .as_object_mut()
            .ok_or_else(|| EeroError::InvalidResponse("account is not an object".to_string()))?;
        fields.insert(
            "networks".to_string(),
            json!({ "count": networks.len(), "data": networks }),
        );
        Ok(account)
    }

    // ===== Actions =====

    pub async fn set_led(&self, eero_id: &str, on: bool) -> EeroResult<Value> {
        self.put(&format!("/2.2/eeros/{}/led", eero_id), json!({ "led_on": on }))
            .await
    }

    pub async fn reboot_eero(&self, eero_id: &str) -> EeroResult<Value> {
        self.post(&format!("/2.2/eeros/{}/reboot", eero_id), None)
            .await
    }

    pub async fn reboot_network(&self, network_id: &str) -> EeroResult<Value> {
        self.post(&format!("/2.2/networks/{}/reboot", network_id), None)
            .await
    }

    /// Set the nightlight mode; `on`/`off` (`HH:MM`) only apply to a schedule
    pub async fn set_nightlight(
        &self,
        eero_id: &str,
        mode: NightlightMode,
        on: Option<&str>,
        off: Option<&str>,
    ) -> EeroResult<Value> {
        let body = match mode {
            NightlightMode::Disabled => json!({ "enabled": false }),
            NightlightMode::Ambient => json!({
                "enabled": true,
                "ambient_light_enabled": true,
                "schedule": { "enabled": false },
            }),
            NightlightMode::Schedule => {
                let mut schedule = json!({ "enabled": true });
                if let Some(on) = on {
                    schedule["on"] = json!(on);
                }
                if let Some(off) = off {
                    schedule["off"] = json!(off);
                }
                json!({ "schedule": schedule })
            }
        };
        self.put(&format!("/2.2/eeros/{}/nightlight/settings", eero_id), body)
            .await
    }

    pub async fn set_guest_network(&self, network_id: &str, enabled: bool) -> EeroResult<Value> {
        self.put(
            &format!("/2.2/networks/{}/guestnetwork", network_id),
            json!({ "enabled": enabled }),
        )
        .await
    }

    /// Toggle a network-wide premium DNS policy (`ad_block`, `block_malware`)
    pub async fn set_network_dns_policy(
        &self,
        network_id: &str,
        policy: &str,
        enabled: bool,
    ) -> EeroResult<Value> {
        self.post(
            &format!("/2.2/networks/{}/dns_policies/network", network_id),
            Some(json!({ policy: enabled })),
        )
        .await
    }

    /// Toggle a network setting (`dns_caching`, `ipv6_upstream`, `thread`)
    pub async fn set_network_setting(
        &self,
        network_id: &str,
        setting: &str,
        enabled: bool,
    ) -> EeroResult<Value> {
        self.put(
            &format!("/2.2/networks/{}/settings", network_id),
            json!({ setting: enabled }),
        )
        .await
    }

    pub async fn set_profile_paused(
        &self,
        network_id: &str,
        profile_id: &str,
        paused: bool,
    ) -> EeroResult<Value> {
        self.put(
            &format!("/2.2/networks/{}/profiles/{}", network_id, profile_id),
            json!({ "paused": paused }),
        )
        .await
    }

    /// Toggle a per-profile content filter
    pub async fn set_profile_dns_policy(
        &self,
        network_id: &str,
        profile_id: &str,
        policy: &str,
        enabled: bool,
    ) -> EeroResult<Value> {
        self.post(
            &format!(
                "/2.2/networks/{}/dns_policies/profiles/{}",
                network_id, profile_id
            ),
            Some(json!({ policy: enabled })),
        )
        .await
    }

    pub async fn set_client_paused(
        &self,
        network_id: &str,
        client_id: &str,
        paused: bool,
    ) -> EeroResult<Value> {
        self.put(
            &format!("/2.2/networks/{}/devices/{}", network_id, client_id),
            json!({ "paused": paused }),
        )
        .await
    }
}

fn token_of(data: &Value) -> EeroResult<String> {
    data.get("user_token")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| EeroError::InvalidResponse("missing user_token".to_string()))
}

/// Network id from its url (`/2.2/networks/123` → `123`)
pub fn parse_network_id(url: &str) -> &str {
    url.trim_start_matches("/2.2/networks/")
}
