//! Google Domains dynamic DNS
//!
//! Pushes the current public address of the host to Google Domains at
//! setup and then on a fixed interval.

use std::time::Duration;

use ha_config_entries::ConfigEntry;
use ha_core::Context;
use ha_host::Hass;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub const DOMAIN: &str = "google_domains";

/// Fired after every accepted update
pub const EVENT_ENTRY_UPDATED: &str = "google_domains_entry_updated";

pub const UPDATE_ENDPOINT: &str = "https://domains.google.com/nic/update";

pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Error)]
pub enum GoogleDomainsError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The first update after setup did not succeed
    #[error("initial update of {0} failed")]
    SetupFailed(String),
}

pub type GoogleDomainsResult<T> = Result<T, GoogleDomainsError>;

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// `google_domains:` block of `configuration.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDomainsConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    /// Minutes between updates
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Seconds before a request is abandoned
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
struct EntryData {
    domain: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct EntryOptions {
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

impl GoogleDomainsConfig {
    /// Build from a config entry: credentials in `data`, timing in `options`
    pub fn from_entry(entry: &ConfigEntry) -> GoogleDomainsResult<Self> {
        let data: EntryData = entry
            .typed_data()
            .map_err(|e| GoogleDomainsError::InvalidConfig(e.to_string()))?;
        let options: EntryOptions = entry
            .typed_options()
            .map_err(|e| GoogleDomainsError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            domain: data.domain,
            username: data.username,
            password: data.password,
            interval: options.interval,
            timeout: options.timeout,
        })
    }
}

/// Dynamic DNS client
pub struct GoogleDomainsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GoogleDomainsClient {
    pub fn new(timeout: Duration) -> GoogleDomainsResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, UPDATE_ENDPOINT))
    }

    /// Client against an explicit update endpoint
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Push one update
    ///
    /// Returns the address Google Domains now holds, or `None` when the
    /// update was refused or could not be sent. Failures are logged here.
    #[instrument(skip(self, config), fields(domain = %config.domain))]
    pub async fn update(&self, config: &GoogleDomainsConfig) -> Option<String> {
        let response = self
            .http
            .get(&self.endpoint)
            .basic_auth(&config.username, Some(&config.password))
            .query(&[("hostname", config.domain.as_str())])
            .send()
            .await;

        let body = match response {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!("Can't read Google Domains response: {}", err);
                    return None;
                }
            },
            Err(err) if err.is_timeout() => {
                warn!("Timeout from Google Domains API for domain: {}", config.domain);
                return None;
            }
            Err(err) => {
                warn!("Can't connect to Google Domains API: {}", err);
                return None;
            }
        };

        if body.starts_with("good") || body.starts_with("nochg") {
            let ip_address = body.split_whitespace().nth(1).unwrap_or_default();
            debug!(ip_address = %ip_address, "Google Domains accepted update");
            return Some(ip_address.to_string());
        }

        warn!(
            "Updating Google Domains failed: {} => {}",
            config.domain,
            body.trim()
        );
        None
    }
}

/// Update once and fire [`EVENT_ENTRY_UPDATED`] on success
pub async fn update_domain(
    hass: &Hass,
    client: &GoogleDomainsClient,
    config: &GoogleDomainsConfig,
) -> bool {
    match client.update(config).await {
        Some(ip_address) => {
            hass.bus.fire_json(
                EVENT_ENTRY_UPDATED,
                json!({ "domain": config.domain, "ip_address": ip_address }),
                Context::new(),
            );
            true
        }
        None => false,
    }
}

/// Update now and keep updating every `interval` minutes
///
/// Nothing is scheduled when the first update fails.
pub async fn setup(hass: &Hass, config: GoogleDomainsConfig) -> GoogleDomainsResult<JoinHandle<()>> {
    let client = GoogleDomainsClient::new(Duration::from_secs(config.timeout))?;
    setup_with_client(hass, client, config).await
}

/// [`setup`] with a prepared client
pub async fn setup_with_client(
    hass: &Hass,
    client: GoogleDomainsClient,
    config: GoogleDomainsConfig,
) -> GoogleDomainsResult<JoinHandle<()>> {
    if !update_domain(hass, &client, &config).await {
        return Err(GoogleDomainsError::SetupFailed(config.domain));
    }
    info!(domain = %config.domain, interval = config.interval, "Google Domains updates scheduled");

    let hass = hass.clone();
    let period = Duration::from_secs(config.interval.max(1) * 60);
    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            update_domain(&hass, &client, &config).await;
        }
    }))
}

/// Set up from a config entry
pub async fn setup_entry(hass: &Hass, entry: &ConfigEntry) -> GoogleDomainsResult<JoinHandle<()>> {
    setup(hass, GoogleDomainsConfig::from_entry(entry)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> GoogleDomainsConfig {
        serde_json::from_value(json!({
            "domain": "home.example.com",
            "username": "user",
            "password": "pass"
        }))
        .unwrap()
    }

    async fn server_answering(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nic/update"))
            .and(query_param("hostname", "home.example.com"))
            // user:pass
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer) -> GoogleDomainsClient {
        GoogleDomainsClient::with_client(
            reqwest::Client::new(),
            format!("{}/nic/update", server.uri()),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        assert_eq!(config.interval, 5);
        assert_eq!(config.timeout, 10);
    }

    #[tokio::test]
    async fn test_good_update_fires_event() {
        let server = server_answering("good 203.0.113.7").await;
        let hass = Hass::default();
        let mut rx = hass.bus.subscribe(EVENT_ENTRY_UPDATED);

        assert!(update_domain(&hass, &client(&server), &config()).await);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data["domain"], "home.example.com");
        assert_eq!(event.data["ip_address"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_nochg_is_success() {
        let server = server_answering("nochg 203.0.113.7\n").await;
        let ip = client(&server).update(&config()).await;
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_refused_update() {
        let server = server_answering("badauth").await;
        let hass = Hass::default();

        assert!(!update_domain(&hass, &client(&server), &config()).await);
        let err = setup_with_client(&hass, client(&server), config())
            .await
            .unwrap_err();
        assert!(matches!(err, GoogleDomainsError::SetupFailed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("good 1.2.3.4")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let client = GoogleDomainsClient::with_client(http, server.uri());

        assert!(client.update(&config()).await.is_none());
    }

    #[test]
    fn test_config_from_entry() {
        let entry = ConfigEntry::new(DOMAIN, "home.example.com")
            .with_data(HashMap::from([
                ("domain".to_string(), json!("home.example.com")),
                ("username".to_string(), json!("user")),
                ("password".to_string(), json!("pass")),
            ]))
            .with_options(HashMap::from([("interval".to_string(), json!(15))]));

        let config = GoogleDomainsConfig::from_entry(&entry).unwrap();
        assert_eq!(config.interval, 15);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECONDS);
    }
}
