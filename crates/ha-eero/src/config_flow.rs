//! eero config and options flows
//!
//! Onboarding is `user` (login) → `verify` (code) → `network`. The network
//! step is skipped when the account has a single network.

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{
    parse_input, ConfigEntry, ConfigFlow, FieldType, FlowData, FlowError, FlowField, FlowResult,
    OptionsFlow,
};
use ha_helpers::DataUpdateCoordinator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::api::{parse_network_id, EeroApi, EeroError};
use crate::models::{Account, Network};
use crate::{
    EeroEntryData, EeroOptions, CONF_CODE, CONF_LOGIN, CONF_NETWORK_NAME, DEFAULT_SCAN_INTERVAL,
    SCAN_INTERVALS,
};

pub const CONF_SAVE_RESPONSES: &str = "save_responses";
pub const CONF_SCAN_INTERVAL: &str = "scan_interval";
pub const CONF_EEROS: &str = "eeros";
pub const CONF_PROFILES: &str = "profiles";
pub const CONF_WIRED_CLIENTS: &str = "wired_clients";
pub const CONF_WIRELESS_CLIENTS: &str = "wireless_clients";

#[derive(Deserialize)]
struct LoginInput {
    login: String,
}

#[derive(Deserialize)]
struct VerifyInput {
    code: String,
}

#[derive(Deserialize)]
struct NetworkInput {
    network_name: String,
}

fn to_flow_data<T: Serialize>(value: &T) -> Result<FlowData, FlowError> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| FlowError::InvalidInput(e.to_string()))
}

/// Onboarding flow for one eero network
pub struct EeroConfigFlow {
    api: EeroApi,
    account: Option<Value>,
    unique_id: Option<String>,
}

impl EeroConfigFlow {
    pub fn new(api: EeroApi) -> Self {
        Self {
            api,
            account: None,
            unique_id: None,
        }
    }

    fn login_form() -> Vec<FlowField> {
        vec![FlowField::required(CONF_LOGIN, FieldType::String).with_default("")]
    }

    fn verify_form() -> Vec<FlowField> {
        vec![FlowField::required(CONF_CODE, FieldType::String).with_default("")]
    }

    fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .account
            .as_ref()
            .map(|account| {
                Account::new(account)
                    .networks()
                    .iter()
                    .map(|n| n.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn network_form(&self) -> Vec<FlowField> {
        let names = self.network_names();
        let default = names.first().cloned().unwrap_or_default();
        vec![FlowField::required(CONF_NETWORK_NAME, FieldType::Select(names)).with_default(default)]
    }

    async fn step_user(&mut self, input: Option<FlowData>) -> Result<FlowResult, FlowError> {
        let Some(input) = input else {
            return Ok(FlowResult::form("user", Self::login_form()));
        };
        let input: LoginInput = parse_input(input)?;

        match self.api.login(&input.login).await {
            Ok(_) => Ok(FlowResult::form("verify", Self::verify_form())),
            Err(EeroError::Api { code, error: message }) => {
                error!(status = code, "Login failed: {}", message);
                Ok(FlowResult::form_error("user", Self::login_form(), "invalid_login"))
            }
            Err(err) => {
                error!("Cannot reach eero: {}", err);
                Ok(FlowResult::form_error("user", Self::login_form(), "cannot_connect"))
            }
        }
    }

    async fn step_verify(&mut self, input: Option<FlowData>) -> Result<FlowResult, FlowError> {
        let Some(input) = input else {
            return Ok(FlowResult::form("verify", Self::verify_form()));
        };
        let input: VerifyInput = parse_input(input)?;

        match self.api.login_verify(&input.code).await {
            Ok(account) => {
                self.account = Some(account);
                match self.network_names().as_slice() {
                    [] => Ok(FlowResult::abort("no_networks")),
                    [only] => {
                        let only = only.clone();
                        self.create_entry(&only)
                    }
                    _ => Ok(FlowResult::form("network", self.network_form())),
                }
            }
            Err(err) => {
                error!("Verification failed: {}", err);
                Ok(FlowResult::form_error("verify", Self::verify_form(), "invalid_code"))
            }
        }
    }

    fn step_network(&mut self, input: Option<FlowData>) -> Result<FlowResult, FlowError> {
        let Some(input) = input else {
            return Ok(FlowResult::form("network", self.network_form()));
        };
        let input: NetworkInput = parse_input(input)?;
        self.create_entry(&input.network_name)
    }

    fn create_entry(&mut self, network_name: &str) -> Result<FlowResult, FlowError> {
        let Some(account) = self.account.as_ref() else {
            return Err(FlowError::UnknownStep("network".to_string()));
        };
        let account = Account::new(account);
        let Some(network) = account.networks().into_iter().find(|n| n.name() == network_name)
        else {
            return Ok(FlowResult::form_error(
                "network",
                self.network_form(),
                "invalid_network",
            ));
        };

        let log_id = account.log_id().unwrap_or_default().to_lowercase();
        self.unique_id = Some(format!("{}-{}", log_id, parse_network_id(network.url())));

        let data = EeroEntryData {
            user_token: self.api.user_token().unwrap_or_default(),
            network_url: network.url().to_string(),
            network_name: network_name.to_string(),
        };
        Ok(FlowResult::create_entry(network_name, to_flow_data(&data)?))
    }
}

#[async_trait]
impl ConfigFlow for EeroConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        match step_id {
            "user" => self.step_user(input).await,
            "verify" => self.step_verify(input).await,
            "network" => self.step_network(input),
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }
}

/// Options flow: polling interval, response dumps and which resources get
/// entities
pub struct EeroOptionsFlow {
    coordinator: Arc<DataUpdateCoordinator<Value>>,
    network_id: String,
}

impl EeroOptionsFlow {
    pub fn new(coordinator: Arc<DataUpdateCoordinator<Value>>, network_id: impl Into<String>) -> Self {
        Self {
            coordinator,
            network_id: network_id.into(),
        }
    }

    fn schema(network: Network<'_>, current: &EeroOptions) -> Vec<FlowField> {
        let mut eeros: Vec<String> = network.eeros().iter().map(|e| e.id().to_string()).collect();
        let mut profiles: Vec<String> =
            network.profiles().iter().map(|p| p.id().to_string()).collect();
        let (wireless, wired): (Vec<_>, Vec<_>) =
            network.clients().into_iter().partition(|c| c.wireless());
        let mut wired: Vec<String> = wired.iter().map(|c| c.id().to_string()).collect();
        let mut wireless: Vec<String> = wireless.iter().map(|c| c.id().to_string()).collect();

        // Stale ids of removed resources are dropped from the defaults
        let keep = |selected: &[String], all: &[String]| -> Vec<String> {
            selected.iter().filter(|id| all.contains(id)).cloned().collect()
        };
        let default_eeros = keep(current.eeros.as_deref().unwrap_or(&eeros), &eeros);
        let default_profiles = keep(current.profiles.as_deref().unwrap_or(&profiles), &profiles);
        let default_wired = keep(&current.wired_clients, &wired);
        let default_wireless = keep(&current.wireless_clients, &wireless);

        eeros.sort();
        profiles.sort();
        wired.sort();
        wireless.sort();

        vec![
            FlowField::optional(CONF_SAVE_RESPONSES, FieldType::Boolean)
                .with_default(current.save_responses),
            FlowField::optional(
                CONF_SCAN_INTERVAL,
                FieldType::Select(SCAN_INTERVALS.iter().map(u64::to_string).collect()),
            )
            .with_default(current.scan_interval),
            FlowField::optional(CONF_EEROS, FieldType::MultiSelect(eeros)).with_default(default_eeros),
            FlowField::optional(CONF_PROFILES, FieldType::MultiSelect(profiles))
                .with_default(default_profiles),
            FlowField::optional(CONF_WIRED_CLIENTS, FieldType::MultiSelect(wired))
                .with_default(default_wired),
            FlowField::optional(CONF_WIRELESS_CLIENTS, FieldType::MultiSelect(wireless))
                .with_default(default_wireless),
        ]
    }
}

#[async_trait]
impl OptionsFlow for EeroOptionsFlow {
    async fn step(
        &mut self,
        entry: &ConfigEntry,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "init" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let Some(data) = self.coordinator.data() else {
            return Ok(FlowResult::abort("cannot_connect"));
        };
        let Some(network) = Account::new(&data).network(&self.network_id) else {
            return Ok(FlowResult::abort("cannot_connect"));
        };
        let current: EeroOptions = entry.typed_options().unwrap_or_else(|err| {
            warn!("Ignoring malformed eero options: {}", err);
            EeroOptions {
                scan_interval: DEFAULT_SCAN_INTERVAL,
                ..Default::default()
            }
        });

        let Some(input) = input else {
            return Ok(FlowResult::form("init", Self::schema(network, &current)));
        };

        let mut options: EeroOptions = parse_input(input)?;
        if !SCAN_INTERVALS.contains(&options.scan_interval) {
            return Ok(FlowResult::form_error(
                "init",
                Self::schema(network, &current),
                "invalid_scan_interval",
            ));
        }
        // Unselected lists are stored empty rather than as "select all"
        options.eeros.get_or_insert_with(Vec::new);
        options.profiles.get_or_insert_with(Vec::new);
        Ok(FlowResult::create_entry("", to_flow_data(&options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config_entries::{ConfigEntries, FlowManager};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"meta": {"code": 200}, "data": data}))
    }

    fn account(networks: &[(&str, &str)]) -> Value {
        let data: Vec<Value> = networks
            .iter()
            .map(|(name, url)| json!({"name": name, "url": url}))
            .collect();
        json!({"log_id": "ABC", "networks": {"count": data.len(), "data": data}})
    }

    async fn mock_login(server: &MockServer, networks: &[(&str, &str)]) {
        Mock::given(method("POST"))
            .and(path("/2.2/login"))
            .respond_with(ok(json!({"user_token": "tok"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2.2/login/verify"))
            .respond_with(ok(account(networks)))
            .mount(server)
            .await;
    }

    fn flow(server: &MockServer) -> Box<EeroConfigFlow> {
        Box::new(EeroConfigFlow::new(EeroApi::with_client(
            reqwest::Client::new(),
            server.uri(),
            None,
        )))
    }

    fn input(key: &str, value: &str) -> FlowData {
        FlowData::from([(key.to_string(), json!(value))])
    }

    #[tokio::test]
    async fn test_flow_with_network_choice() {
        let server = MockServer::start().await;
        mock_login(&server, &[("Home", "/2.2/networks/1"), ("Cabin", "/2.2/networks/2")]).await;
        let manager = FlowManager::new(Arc::new(ConfigEntries::new()));

        let step = manager.init("eero", flow(&server)).await.unwrap();
        let step = manager
            .configure(&step.flow_id, input(CONF_LOGIN, "me@example.com"))
            .await
            .unwrap();
        assert!(matches!(step.result, FlowResult::Form { ref step_id, .. } if step_id == "verify"));

        let step = manager
            .configure(&step.flow_id, input(CONF_CODE, "123456"))
            .await
            .unwrap();
        match &step.result {
            FlowResult::Form { step_id, schema, .. } => {
                assert_eq!(step_id, "network");
                assert_eq!(
                    schema[0].field_type,
                    FieldType::Select(vec!["Cabin".to_string(), "Home".to_string()])
                );
            }
            other => panic!("unexpected {:?}", other),
        }

        let step = manager
            .configure(&step.flow_id, input(CONF_NETWORK_NAME, "Cabin"))
            .await
            .unwrap();
        let entry = step.entry.unwrap();
        assert_eq!(entry.title, "Cabin");
        assert_eq!(entry.unique_id.as_deref(), Some("abc-2"));
        let data: EeroEntryData = entry.typed_data().unwrap();
        assert_eq!(data.user_token, "tok");
        assert_eq!(data.network_url, "/2.2/networks/2");
    }

    #[tokio::test]
    async fn test_single_network_skips_choice() {
        let server = MockServer::start().await;
        mock_login(&server, &[("Home", "/2.2/networks/1")]).await;
        let manager = FlowManager::new(Arc::new(ConfigEntries::new()));

        let step = manager.init("eero", flow(&server)).await.unwrap();
        let step = manager
            .configure(&step.flow_id, input(CONF_LOGIN, "me@example.com"))
            .await
            .unwrap();
        let step = manager
            .configure(&step.flow_id, input(CONF_CODE, "123456"))
            .await
            .unwrap();
        assert_eq!(step.entry.unwrap().title, "Home");
    }

    #[tokio::test]
    async fn test_invalid_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2.2/login"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"meta": {"code": 400, "error": "error.login.invalid"}}),
            ))
            .mount(&server)
            .await;
        let manager = FlowManager::new(Arc::new(ConfigEntries::new()));

        let step = manager.init("eero", flow(&server)).await.unwrap();
        let step = manager
            .configure(&step.flow_id, input(CONF_LOGIN, "nobody"))
            .await
            .unwrap();
        assert_eq!(step.result.errors().unwrap()["base"], "invalid_login");
    }

    fn coordinator() -> Arc<DataUpdateCoordinator<Value>> {
        let coordinator = DataUpdateCoordinator::new("test", Duration::from_secs(60), || async {
            Ok(json!(null))
        });
        coordinator.set_updated_data(json!({"networks": {"data": [{
            "url": "/2.2/networks/1",
            "name": "Home",
            "eeros": {"data": [{"url": "/2.2/eeros/10", "location": "Kitchen"}]},
            "profiles": {"data": [{"url": "/2.2/networks/1/profiles/5", "name": "Kids"}]},
            "devices": {"data": [
                {"url": "/2.2/networks/1/devices/aa", "wireless": true},
                {"url": "/2.2/networks/1/devices/bb", "wireless": false}
            ]}
        }]}}));
        Arc::new(coordinator)
    }

    #[tokio::test]
    async fn test_options_flow_defaults_and_validation() {
        let entries = Arc::new(ConfigEntries::new());
        let entry = entries
            .add(ConfigEntry::new("eero", "Home").with_options(HashMap::from([(
                CONF_WIRED_CLIENTS.to_string(),
                json!(["bb", "gone"]),
            )])))
            .unwrap();
        let manager = FlowManager::new(entries.clone());

        let step = manager
            .init_options(&entry.entry_id, Box::new(EeroOptionsFlow::new(coordinator(), "1")))
            .await
            .unwrap();
        let FlowResult::Form { schema, .. } = &step.result else {
            panic!("expected form");
        };
        let default = |key: &str| schema.iter().find(|f| f.key == key).unwrap().default.clone();
        assert_eq!(default(CONF_EEROS), Some(json!(["10"])));
        assert_eq!(default(CONF_WIRED_CLIENTS), Some(json!(["bb"])));
        assert_eq!(default(CONF_WIRELESS_CLIENTS), Some(json!([])));

        let step = manager
            .configure(&step.flow_id, FlowData::from([(CONF_SCAN_INTERVAL.to_string(), json!(45))]))
            .await
            .unwrap();
        assert_eq!(step.result.errors().unwrap()["base"], "invalid_scan_interval");

        let step = manager
            .configure(
                &step.flow_id,
                FlowData::from([
                    (CONF_SCAN_INTERVAL.to_string(), json!(120)),
                    (CONF_EEROS.to_string(), json!(["10"])),
                ]),
            )
            .await
            .unwrap();
        let updated = step.entry.unwrap();
        assert_eq!(updated.title, "Home");
        let options: EeroOptions = updated.typed_options().unwrap();
        assert_eq!(options.scan_interval, 120);
        assert_eq!(options.profiles, Some(vec![]));
    }
}
