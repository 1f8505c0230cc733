//! BRAVIA config flow

use async_trait::async_trait;
use ha_config_entries::{
    parse_input, ConfigFlow, FieldType, FlowData, FlowError, FlowField, FlowResult,
};
use tracing::{info, warn};

use crate::client::BraviaClient;
use crate::{BraviaConfig, CONF_EXT_SPEAKER, CONF_HOST, CONF_PSK, CONF_TIME_FORMAT};

fn schema() -> Vec<FlowField> {
    vec![
        FlowField::required(CONF_HOST, FieldType::String),
        FlowField::required(CONF_PSK, FieldType::Password),
        FlowField::optional(CONF_EXT_SPEAKER, FieldType::Boolean).with_default(false),
        FlowField::optional(
            CONF_TIME_FORMAT,
            FieldType::Select(vec!["12H".to_string(), "24H".to_string()]),
        )
        .with_default("24H"),
    ]
}

/// Adds a TV by host and pre-shared key
///
/// The `import` step takes the same input as `user` and is used for YAML
/// configured TVs.
#[derive(Default)]
pub struct BraviaConfigFlow {
    unique_id: Option<String>,
}

impl BraviaConfigFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title for a reachable TV, `None` when it cannot be reached
    async fn connect(config: &BraviaConfig) -> Option<String> {
        let client = BraviaClient::new(&config.host, config.psk.clone()).ok()?;
        match client.connect().await {
            Ok(data) if data.available => Some(format!(
                "{} {} ({})",
                data.system.name.unwrap_or_default(),
                data.system.model.unwrap_or_default(),
                config.host
            )),
            Ok(_) => None,
            Err(err) => {
                warn!(host = %config.host, "Cannot connect to TV: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl ConfigFlow for BraviaConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "user" && step_id != "import" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let Some(input) = input else {
            return Ok(FlowResult::form("user", schema()));
        };

        let config: BraviaConfig = parse_input(input.clone())?;
        self.unique_id = Some(config.host.clone());

        match Self::connect(&config).await {
            Some(title) => {
                info!(host = %config.host, "TV added");
                Ok(FlowResult::create_entry(title, input))
            }
            None => Ok(FlowResult::form_error("user", schema(), "connect")),
        }
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input(host: &str) -> FlowData {
        FlowData::from([
            (CONF_HOST.to_string(), json!(host)),
            (CONF_PSK.to_string(), json!("0000")),
        ])
    }

    #[tokio::test]
    async fn test_user_step_creates_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sony/system"))
            .and(body_partial_json(json!({"method": "getSystemInformation"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"name": "BRAVIA", "model": "KD-55XF9005", "cid": "cid-1"}]
            })))
            .mount(&server)
            .await;

        let host = server.address().to_string();
        let mut flow = BraviaConfigFlow::new();
        let result = flow.step("user", Some(input(&host))).await.unwrap();

        match result {
            FlowResult::CreateEntry { title, data, .. } => {
                assert_eq!(title, format!("BRAVIA KD-55XF9005 ({})", host));
                assert_eq!(data[CONF_PSK], json!("0000"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(flow.unique_id(), Some(host));
    }

    #[tokio::test]
    async fn test_connect_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": [403, "Forbidden"]})),
            )
            .mount(&server)
            .await;

        let mut flow = BraviaConfigFlow::new();
        let result = flow
            .step("import", Some(input(&server.address().to_string())))
            .await
            .unwrap();
        assert_eq!(result.errors().unwrap()["base"], "connect");
    }

    #[tokio::test]
    async fn test_form_fields() {
        let mut flow = BraviaConfigFlow::new();
        let FlowResult::Form { schema, .. } = flow.step("user", None).await.unwrap() else {
            panic!("expected a form");
        };
        let keys: Vec<&str> = schema.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["host", "psk", "ext_speaker", "time_format"]);
    }
}
