//! BRAVIA remote entity

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_REMOTE, STATE_OFF, STATE_ON};
use ha_helpers::{DataUpdateCoordinator, DeviceInfo, Entity, EntityError};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{BraviaClient, BraviaData};
use crate::{device_info, entity_name, ATTR_COMMAND_LIST};

pub struct BraviaRemote {
    client: Arc<BraviaClient>,
    coordinator: Arc<DataUpdateCoordinator<BraviaData>>,
}

impl BraviaRemote {
    pub fn new(client: Arc<BraviaClient>, coordinator: Arc<DataUpdateCoordinator<BraviaData>>) -> Self {
        Self {
            client,
            coordinator,
        }
    }

    fn data(&self) -> Arc<BraviaData> {
        self.coordinator.data().unwrap_or_default()
    }

    /// Press each named key in order, `repeats` times over
    ///
    /// Names the TV does not know are skipped.
    pub async fn send_command(&self, commands: &[String], repeats: u32) -> Result<(), EntityError> {
        let data = self.data();
        for _ in 0..repeats.max(1) {
            for command in commands {
                match data.commands.get(command) {
                    Some(code) => self
                        .client
                        .send_ircc(code)
                        .await
                        .map_err(|e| EntityError::Failed(e.to_string()))?,
                    None => debug!(command = %command, "Unknown remote key"),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Entity for BraviaRemote {
    fn domain(&self) -> &'static str {
        PLATFORM_REMOTE
    }

    fn unique_id(&self) -> Option<String> {
        let cid = self.data().system.cid.clone()?;
        Some(format!("{}-{}", cid, PLATFORM_REMOTE))
    }

    fn name(&self) -> String {
        entity_name(&self.data())
    }

    fn state(&self) -> Option<String> {
        Some(if self.data().is_active() { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let data = self.data();
        let mut attrs = HashMap::new();
        if data.is_active() && !data.commands.is_empty() {
            let mut commands: Vec<&String> = data.commands.keys().collect();
            commands.sort();
            attrs.insert(ATTR_COMMAND_LIST.to_string(), json!(commands));
        }
        attrs
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        device_info(&self.data())
    }

    fn should_poll(&self) -> bool {
        false
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.client
            .turn_on()
            .await
            .map_err(|e| EntityError::Failed(e.to_string()))
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.client
            .set_power_status(false)
            .await
            .map_err(|e| EntityError::Failed(e.to_string()))
    }
}
