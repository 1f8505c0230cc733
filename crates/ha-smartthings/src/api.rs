//! SmartThings cloud API client
//!
//! Device listing and status use the personal access token of the config
//! entry. Token generation authenticates with the SmartApp's OAuth client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{Device, DeviceStatus, StatusResponse};

/// Production API endpoint
pub const API_BASE: &str = "https://api.smartthings.com/v1";

/// OAuth token endpoint
pub const AUTH_URL: &str = "https://auth-global.api.smartthings.com/oauth/token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SmartThingsError {
    /// The API answered with an error status
    #[error("SmartThings API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("invalid config entry: {0}")]
    InvalidEntry(String),

    /// The token was rejected; the entry has to be reconfigured
    #[error("SmartThings rejected the credentials of '{0}'")]
    Unauthorized(String),

    /// Setup failed for a transient reason and should be retried
    #[error("SmartThings not ready: {0}")]
    NotReady(String),
}

impl SmartThingsError {
    /// Whether this is a 401/403 answer
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

pub type SmartThingsResult<T> = Result<T, SmartThingsError>;

/// Tokens issued by the OAuth endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Client for one SmartThings account
pub struct SmartThingsApi {
    http: reqwest::Client,
    base_url: String,
    auth_url: String,
    token: String,
}

impl SmartThingsApi {
    pub fn new(token: impl Into<String>) -> SmartThingsResult<Self> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(http, API_BASE, token))
    }

    /// Build a client against an explicit endpoint
    ///
    /// The token endpoint defaults to `{base_url}/oauth/token`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let auth_url = if base_url == API_BASE {
            AUTH_URL.to_string()
        } else {
            format!("{}/oauth/token", base_url)
        };
        Self {
            http,
            base_url,
            auth_url,
            token: token.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> SmartThingsResult<T> {
        debug!("GET {}", path);
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        parse(path, response).await
    }

    /// Devices installed at a location
    #[instrument(skip(self))]
    pub async fn devices(&self, location_id: &str) -> SmartThingsResult<Vec<Device>> {
        let page: Page<Device> = self.get("/devices", &[("locationId", location_id)]).await?;
        Ok(page.items)
    }

    /// Current attribute values of a device
    pub async fn device_status(&self, device_id: &str) -> SmartThingsResult<DeviceStatus> {
        let response: StatusResponse = self
            .get(&format!("/devices/{}/status", device_id), &[])
            .await?;
        Ok(DeviceStatus::from(response))
    }

    /// Exchange a refresh token for a new token pair
    #[instrument(skip_all)]
    pub async fn generate_tokens(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> SmartThingsResult<OAuthToken> {
        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        parse("/oauth/token", response).await
    }
}

async fn parse<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> SmartThingsResult<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(SmartThingsError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .map(String::from)
                .unwrap_or_else(|| text.clone()),
        });
    }
    serde_json::from_str(&text).map_err(|e| {
        SmartThingsError::InvalidResponse(format!("HTTP {} from {}: {}", status, path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> SmartThingsApi {
        SmartThingsApi::with_client(reqwest::Client::new(), server.uri(), "pat")
    }

    #[tokio::test]
    async fn test_devices_by_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(query_param("locationId", "loc-1"))
            .and(header("authorization", "Bearer pat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "deviceId": "d1",
                    "name": "Dome Leak Sensor",
                    "label": "Basement Leak",
                    "locationId": "loc-1",
                    "components": [{"id": "main", "capabilities": [{"id": "waterSensor"}, {"id": "battery"}]}]
                }]
            })))
            .mount(&server)
            .await;

        let devices = api(&server).devices("loc-1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].label, "Basement Leak");
        assert_eq!(devices[0].capabilities(), vec!["waterSensor", "battery"]);
    }

    #[tokio::test]
    async fn test_generate_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "new",
                "expires_in": 86399
            })))
            .mount(&server)
            .await;

        let token = api(&server).generate_tokens("client", "secret", "old").await.unwrap();
        assert_eq!(token.refresh_token, "new");
        assert_eq!(token.expires_in, Some(86399));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/d1/status"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = api(&server).device_status("d1").await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(matches!(err, SmartThingsError::Api { status: 403, .. }));
    }
}
