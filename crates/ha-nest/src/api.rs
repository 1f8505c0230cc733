//! Nest developer API client
//!
//! The whole data tree is read with one `GET /`; writes are `PUT`s of
//! partial objects. The API answers a request with a `307` pointing at the
//! shard serving the account, which must receive the bearer token as well.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::NestData;

pub const API_URL: &str = "https://developer-api.nest.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Error)]
pub enum NestError {
    /// The access token was rejected
    #[error("Nest authorization failed: {0}")]
    Authorization(String),

    #[error("Nest API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("invalid config entry: {0}")]
    InvalidEntry(String),

    #[error("Nest web client error: {0}")]
    WebClient(String),

    #[error("{0}")]
    Unsupported(String),
}

pub type NestResult<T> = Result<T, NestError>;

/// Client for the developer API of one account
pub struct NestApi {
    http: reqwest::Client,
    base_url: RwLock<String>,
    access_token: String,
}

impl NestApi {
    pub fn new(access_token: impl Into<String>) -> NestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(http, API_URL, access_token))
    }

    /// Build a client against an explicit endpoint
    ///
    /// `http` should not follow redirects on its own.
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: RwLock::new(base_url.into().trim_end_matches('/').to_string()),
            access_token: access_token.into(),
        }
    }

    fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn remember_shard(&self, location: &str, path: &str) {
        let shard = location
            .strip_suffix(path)
            .unwrap_or(location)
            .trim_end_matches('/')
            .to_string();
        debug!(shard = %shard, "Following Nest redirect");
        *self
            .base_url
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = shard;
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> NestResult<Value> {
        for _ in 0..=MAX_REDIRECTS {
            let url = format!("{}{}", self.base_url(), path);
            debug!("{} {}", method, url);
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bearer {}", self.access_token));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| NestError::InvalidResponse("redirect without location".into()))?
                    .to_string();
                self.remember_shard(&location, path);
                continue;
            }

            let text = response.text().await?;
            if status == StatusCode::UNAUTHORIZED {
                return Err(NestError::Authorization(error_message(&text)));
            }
            if !status.is_success() {
                return Err(NestError::Api {
                    status: status.as_u16(),
                    message: error_message(&text),
                });
            }
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| NestError::InvalidResponse(e.to_string()));
        }
        Err(NestError::InvalidResponse("too many redirects".into()))
    }

    /// Fetch the whole data tree
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> NestResult<NestData> {
        let value = self.request(Method::GET, "/", None).await?;
        serde_json::from_value(value).map_err(|e| NestError::InvalidResponse(e.to_string()))
    }

    async fn put(&self, path: &str, body: Value) -> NestResult<()> {
        self.request(Method::PUT, path, Some(&body)).await.map(|_| ())
    }

    /// Set a structure `home` or `away`
    pub async fn set_away(&self, structure_id: &str, away: &str) -> NestResult<()> {
        self.put(&format!("/structures/{}", structure_id), json!({ "away": away }))
            .await
    }

    /// Announce an arrival window for a trip
    pub async fn set_eta(
        &self,
        structure_id: &str,
        trip_id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> NestResult<()> {
        self.put(
            &format!("/structures/{}/eta", structure_id),
            json!({
                "trip_id": trip_id,
                "estimated_arrival_window_begin": begin.to_rfc3339_opts(SecondsFormat::Secs, true),
                "estimated_arrival_window_end": end.to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
        )
        .await
    }

    /// Cancel a trip; the API takes a zero window
    pub async fn cancel_eta(&self, structure_id: &str, trip_id: &str) -> NestResult<()> {
        self.put(
            &format!("/structures/{}/eta", structure_id),
            json!({
                "trip_id": trip_id,
                "estimated_arrival_window_begin": 0,
                "estimated_arrival_window_end": 0,
            }),
        )
        .await
    }

    /// Write thermostat fields
    pub async fn set_thermostat(&self, device_id: &str, fields: Value) -> NestResult<()> {
        self.put(&format!("/devices/thermostats/{}", device_id), fields)
            .await
    }

    pub async fn set_camera_streaming(&self, device_id: &str, streaming: bool) -> NestResult<()> {
        self.put(
            &format!("/devices/cameras/{}", device_id),
            json!({ "is_streaming": streaming }),
        )
        .await
    }

    /// Download a camera snapshot
    pub async fn snapshot(&self, url: &str) -> NestResult<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> NestApi {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        NestApi::with_client(http, server.uri(), "token")
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "structures": {"s1": {"structure_id": "s1", "name": "Home", "away": "away"}},
                "devices": {}
            })))
            .mount(&server)
            .await;

        let data = api(&server).fetch().await.unwrap();
        assert!(data.structure("s1").unwrap().is_away());
    }

    #[tokio::test]
    async fn test_unauthorized_is_authorization_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "unauthorized"})),
            )
            .mount(&server)
            .await;

        let err = api(&server).fetch().await.unwrap_err();
        assert!(matches!(err, NestError::Authorization(message) if message == "unauthorized"));
    }

    #[tokio::test]
    async fn test_redirect_keeps_token_and_shard() {
        let server = MockServer::start().await;
        let shard = format!("{}/shard", server.uri());
        Mock::given(method("PUT"))
            .and(path("/structures/s1"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("location", format!("{}/structures/s1", shard).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/shard/structures/s1"))
            .and(header("authorization", "Bearer token"))
            .and(body_json(json!({"away": "home"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"away": "home"})))
            .expect(2)
            .mount(&server)
            .await;

        let api = api(&server);
        api.set_away("s1", "home").await.unwrap();
        // later calls go straight to the shard
        api.set_away("s1", "home").await.unwrap();
    }
}
