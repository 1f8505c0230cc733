//! Lookup of component and platform blocks in a loaded configuration

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

/// Convert a loaded YAML value to JSON; non-string keys are stringified
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => serde_json::to_value(n).unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Sequence(seq) => JsonValue::Array(seq.iter().map(to_json).collect()),
        Value::Mapping(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::String(s) => s.clone(),
                        other => serde_yaml::to_string(other)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    };
                    (key, to_json(v))
                })
                .collect(),
        ),
        Value::Tagged(tagged) => to_json(&tagged.value),
    }
}

/// Top-level keys that belong to `component` (`sensor`, `sensor 2`, …)
fn component_keys<'a>(config: &'a Value, component: &'a str) -> impl Iterator<Item = &'a Value> {
    config
        .as_mapping()
        .into_iter()
        .flat_map(|map| map.iter())
        .filter(move |(key, _)| {
            key.as_str().is_some_and(|k| {
                k == component
                    || k.strip_prefix(component)
                        .is_some_and(|rest| rest.starts_with(' '))
            })
        })
        .map(|(_, value)| value)
}

/// The `domain:` block, as JSON
pub fn domain_config(config: &Value, domain: &str) -> Option<JsonValue> {
    config.get(domain).map(to_json)
}

/// Every `- platform: <platform>` entry under `component`
pub fn platform_configs(config: &Value, component: &str, platform: &str) -> Vec<JsonValue> {
    let mut found = Vec::new();
    for block in component_keys(config, component) {
        let entries: Vec<&Value> = match block {
            Value::Sequence(seq) => seq.iter().collect(),
            Value::Mapping(_) => vec![block],
            Value::Null => vec![],
            other => {
                warn!("Ignoring malformed {} block: {:?}", component, other);
                vec![]
            }
        };
        found.extend(
            entries
                .into_iter()
                .filter(|entry| entry.get("platform").and_then(Value::as_str) == Some(platform))
                .map(to_json),
        );
    }
    found
}

/// Deserialize a platform entry into its typed config
pub fn parse_platform<T: DeserializeOwned>(
    component: &str,
    platform: &str,
    value: JsonValue,
) -> ConfigResult<T> {
    serde_json::from_value(value).map_err(|source| ConfigError::InvalidPlatform {
        component: component.to_string(),
        platform: platform.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    const CONFIG: &str = r#"
google_domains:
  domain: home.example.com
  username: someone
  password: secret
sensor:
  - platform: integration
    source: sensor.power
    unit_prefix: k
  - platform: systemmonitor
    resources:
      - type: load_1m
sensor 2:
  platform: integration
  source: sensor.solar
sensors_extra:
  - platform: integration
    source: sensor.ignored
"#;

    fn config() -> Value {
        serde_yaml::from_str(CONFIG).unwrap()
    }

    #[test]
    fn test_platform_configs_collects_numbered_blocks() {
        let found = platform_configs(&config(), "sensor", "integration");
        let sources: Vec<&str> = found
            .iter()
            .map(|v| v["source"].as_str().unwrap())
            .collect();
        assert_eq!(sources, vec!["sensor.power", "sensor.solar"]);
    }

    #[test]
    fn test_domain_config() {
        let gd = domain_config(&config(), "google_domains").unwrap();
        assert_eq!(gd["domain"], json!("home.example.com"));
        assert!(domain_config(&config(), "nest").is_none());
    }

    #[test]
    fn test_parse_platform_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            source: String,
            round: u8,
        }

        let entry = platform_configs(&config(), "sensor", "integration").remove(0);
        let err = parse_platform::<Needs>("sensor", "integration", entry).unwrap_err();
        assert!(err.to_string().contains("[sensor.integration]"));
    }
}
