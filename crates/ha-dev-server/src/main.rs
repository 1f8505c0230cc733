//! Development runner
//!
//! Loads `configuration.yaml` from the config directory (first argument,
//! `HA_CONFIG_DIR`, or `./config`), sets up the integrations configured in
//! YAML and runs their update loops until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ha_config::{domain_config, load_yaml, parse_platform, platform_configs, Value};
use ha_core::events::HOMEASSISTANT_STOP;
use ha_core::Context;
use ha_google_domains::GoogleDomainsConfig;
use ha_helpers::restore_state::STORAGE_KEY;
use ha_helpers::{EntityPlatform, RestoreStateStore};
use ha_host::Hass;
use ha_integration::{IntegrationConfig, IntegrationHandle};
use ha_systemmonitor::{SysinfoSource, SystemMonitorPlatformConfig, SystemSource};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SENSOR: &str = "sensor";

/// Everything started from the configuration
#[derive(Default)]
struct Running {
    integrations: Vec<IntegrationHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    fn stop(&self) {
        for handle in &self.integrations {
            handle.unload();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HA_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

fn restore_path(config_dir: &Path) -> PathBuf {
    config_dir.join(".storage").join(STORAGE_KEY)
}

async fn setup_google_domains(hass: &Hass, config: &Value, running: &mut Running) {
    let Some(block) = domain_config(config, ha_google_domains::DOMAIN) else {
        return;
    };
    let parsed = match serde_json::from_value::<GoogleDomainsConfig>(block) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Invalid {} config: {}", ha_google_domains::DOMAIN, err);
            return;
        }
    };
    match ha_google_domains::setup(hass, parsed).await {
        Ok(task) => running.tasks.push(task),
        Err(err) => warn!("Setup of {} failed: {}", ha_google_domains::DOMAIN, err),
    }
}

async fn setup_integration_sensors(
    hass: &Hass,
    config: &Value,
    restore: &RestoreStateStore,
    running: &mut Running,
) {
    let platform = Arc::new(EntityPlatform::new(hass.clone(), ha_integration::DOMAIN));
    for block in platform_configs(config, SENSOR, ha_integration::DOMAIN) {
        let sensor = match IntegrationConfig::from_value(block) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("{}", err);
                continue;
            }
        };
        match ha_integration::setup_sensor(hass, &platform, sensor, None, restore).await {
            Ok(handle) => running.integrations.push(handle),
            Err(err) => warn!("Setup of integration sensor failed: {}", err),
        }
    }
}

async fn setup_system_monitor(
    hass: &Hass,
    config: &Value,
    source: Arc<dyn SystemSource>,
    running: &mut Running,
) {
    for block in platform_configs(config, SENSOR, ha_systemmonitor::DOMAIN) {
        let platform_config: SystemMonitorPlatformConfig =
            match parse_platform(SENSOR, ha_systemmonitor::DOMAIN, block) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!("{}", err);
                    continue;
                }
            };
        match ha_systemmonitor::setup_platform(hass, &platform_config, source.clone()).await {
            Ok((_, task)) => running.tasks.push(task),
            Err(err) => warn!("Setup of {} failed: {}", ha_systemmonitor::DOMAIN, err),
        }
    }
}

/// Set up every YAML-configured integration; failures are logged and skipped
async fn setup_integrations(
    hass: &Hass,
    config: &Value,
    restore: &RestoreStateStore,
    source: Arc<dyn SystemSource>,
) -> Running {
    let mut running = Running::default();
    setup_google_domains(hass, config, &mut running).await;
    setup_integration_sensors(hass, config, restore, &mut running).await;
    setup_system_monitor(hass, config, source, &mut running).await;
    running
}

/// Remember the integration sensors' states for the next start
fn remember_states(hass: &Hass, running: &Running, restore: &RestoreStateStore) {
    for handle in &running.integrations {
        if let Some(state) = hass.states.get(&handle.entity_id.to_string()) {
            restore.remember(state);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!(config_dir = %config_dir.display(), "Starting development runner");

    let config = load_yaml(&config_dir, "configuration.yaml")
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    let hass = Hass::new(&config_dir);
    let restore_path = restore_path(&config_dir);
    let restore = RestoreStateStore::load(&restore_path)
        .await
        .with_context(|| format!("loading {}", restore_path.display()))?;

    let running = setup_integrations(&hass, &config, &restore, Arc::new(SysinfoSource::new())).await;
    info!(
        integration_sensors = running.integrations.len(),
        tasks = running.tasks.len(),
        "Running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    hass.bus.fire_json(HOMEASSISTANT_STOP, serde_json::json!({}), Context::new());
    running.stop();
    remember_states(&hass, &running, &restore);
    restore
        .save(&restore_path)
        .await
        .with_context(|| format!("saving {}", restore_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_config::load_yaml_string;

    const CONFIGURATION: &str = r#"
sensor:
  - platform: integration
    source: sensor.power
    name: energy
    unit_prefix: k
  - platform: integration
    source: not an entity
  - platform: systemmonitor
    resources:
      - type: no_such_resource
"#;

    #[tokio::test]
    async fn test_setup_skips_invalid_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_yaml_string(dir.path(), CONFIGURATION, "configuration.yaml").unwrap();
        let hass = Hass::new(dir.path());
        hass.states.set(
            "sensor.power".parse().unwrap(),
            "1000",
            Default::default(),
            Context::new(),
        );

        let restore = RestoreStateStore::new();
        let running = setup_integrations(&hass, &config, &restore, Arc::new(SysinfoSource::new())).await;
        assert_eq!(running.integrations.len(), 1);
        assert!(running.tasks.is_empty());
        assert_eq!(running.integrations[0].entity_id.to_string(), "sensor.energy");

        running.stop();
        remember_states(&hass, &running, &restore);
        let path = restore_path(dir.path());
        restore.save(&path).await.unwrap();
        let reloaded = RestoreStateStore::load(&path).await.unwrap();
        assert!(reloaded.last_state("sensor.energy").is_some());
    }
}
