//! Integration sensor entity

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::constants::{ATTR_UNIT_OF_MEASUREMENT, PLATFORM_SENSOR};
use ha_core::events::StateChangedData;
use ha_core::{EntityId, State};
use ha_helpers::{Entity, EntityPlatform};
use ha_host::Hass;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{IntegrationConfig, Method, ATTR_SOURCE_ID, ICON};

pub struct IntegrationSensor {
    config: IntegrationConfig,
    unique_id: Option<String>,
    total: f64,
    unit: Option<String>,
}

impl IntegrationSensor {
    pub fn new(config: IntegrationConfig, unique_id: Option<String>) -> Self {
        let unit = config.unit.clone();
        Self {
            config,
            unique_id,
            total: 0.0,
            unit,
        }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Unrounded running integral
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Continue from a previously recorded state
    pub fn restore(&mut self, last: Option<&State>) {
        let Some(last) = last else {
            return;
        };
        match last.state.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => self.total = value,
            _ => {
                warn!("Could not restore last state '{}'", last.state);
                self.total = 0.0;
            }
        }
        if self.unit.is_none() {
            self.unit = last.attribute(ATTR_UNIT_OF_MEASUREMENT);
        }
    }

    /// Fold one source transition into the integral
    ///
    /// Returns whether the total changed. Transitions from or to
    /// `unknown`/`unavailable` are skipped; non-numeric states leave the
    /// total untouched.
    pub fn integrate(&mut self, old: Option<&State>, new: &State) -> bool {
        let Some(old) = old else {
            return false;
        };
        if old.is_unknown_or_unavailable() || new.is_unknown_or_unavailable() {
            return false;
        }

        if self.unit.is_none() {
            let source_unit: String = new
                .attribute(ATTR_UNIT_OF_MEASUREMENT)
                .unwrap_or_default();
            self.unit = Some(format!(
                "{}{}{}",
                self.config.unit_prefix.symbol(),
                source_unit,
                self.config.unit_time.symbol()
            ));
        }

        let (Some(old_value), Some(new_value)) = (old.as_f64(), new.as_f64()) else {
            warn!("Invalid state ({} > {})", old.state, new.state);
            return false;
        };

        let elapsed = (new.last_updated - old.last_updated).num_milliseconds() as f64 / 1000.0;
        let area = match self.config.method {
            Method::Trapezoidal => (new_value + old_value) * elapsed / 2.0,
            Method::Left => old_value * elapsed,
            Method::Right => new_value * elapsed,
        };
        let integral =
            area / (self.config.unit_prefix.factor() * self.config.unit_time.seconds());
        if !integral.is_finite() {
            warn!("Could not calculate integral of {} over {}s", area, elapsed);
            return false;
        }

        self.total += integral;
        debug!(total = self.total, "Integrated {}", self.config.source);
        true
    }
}

#[async_trait]
impl Entity for IntegrationSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        self.unique_id.clone()
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    fn state(&self) -> Option<String> {
        Some(format!("{:.*}", self.config.round as usize, self.total))
    }

    fn attributes(&self) -> HashMap<String, Value> {
        HashMap::from([(ATTR_SOURCE_ID.to_string(), json!(self.config.source))])
    }

    fn icon(&self) -> Option<String> {
        Some(ICON.to_string())
    }

    fn unit_of_measurement(&self) -> Option<String> {
        self.unit.clone()
    }

    fn should_poll(&self) -> bool {
        false
    }
}

/// Follow `state_changed` events of the sensor's source
pub fn track_source(
    hass: &Hass,
    platform: Arc<EntityPlatform>,
    entity_id: EntityId,
    sensor: Arc<Mutex<IntegrationSensor>>,
) -> JoinHandle<()> {
    let mut events = hass.bus.subscribe_typed::<StateChangedData>();
    tokio::spawn(async move {
        let source = sensor.lock().await.config().source.clone();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(entity_id = %entity_id, "Missed {} state changes", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if event.data.entity_id.to_string() != source {
                continue;
            }
            let Some(new_state) = &event.data.new_state else {
                continue;
            };

            let changed = sensor
                .lock()
                .await
                .integrate(event.data.old_state.as_ref(), new_state);
            if changed {
                platform.write_state(&entity_id).await;
            }
        }
    })
}
