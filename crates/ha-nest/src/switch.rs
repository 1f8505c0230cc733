//! Structure away and camera streaming switches

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_SWITCH, STATE_HOME, STATE_OFF, STATE_ON};
use ha_helpers::{DeviceInfo, Entity, EntityError};
use serde_json::Value;
use tracing::debug;

use crate::entity::NestDevice;
use crate::models::{DeviceRef, STATE_AWAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    Away,
    Streaming,
}

impl SwitchKind {
    fn key(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Streaming => "is_streaming",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Away => "Away",
            Self::Streaming => "Streaming",
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Away => "mdi:home",
            Self::Streaming => "mdi:video",
        }
    }
}

pub struct NestSwitch {
    base: NestDevice,
    kind: SwitchKind,
    name: String,
}

impl NestSwitch {
    pub(crate) fn new(base: NestDevice, kind: SwitchKind, device_name: &str) -> Self {
        let name = match base.device {
            DeviceRef::Structure(_) => format!("{} Nest {}", device_name, kind.label()),
            _ => format!("{} {}", device_name, kind.label()),
        };
        Self { base, kind, name }
    }

    fn is_on(&self) -> Option<bool> {
        self.base.read(|data| match self.kind {
            SwitchKind::Away => data.structure(self.base.serial()).map(|s| s.is_away()),
            SwitchKind::Streaming => data.camera(self.base.serial()).map(|c| c.is_streaming),
        })
    }

    async fn set(&mut self, on: bool) -> Result<(), EntityError> {
        let result = match self.kind {
            SwitchKind::Away => {
                let away = if on { STATE_AWAY } else { STATE_HOME };
                self.base.api.set_away(self.base.serial(), away).await
            }
            SwitchKind::Streaming => {
                let online = self
                    .base
                    .read(|data| data.camera(self.base.serial()).map(|c| c.is_online))
                    .unwrap_or(false);
                if !online {
                    return Err(EntityError::Failed(format!("{} is offline", self.name)));
                }
                self.base
                    .api
                    .set_camera_streaming(self.base.serial(), on)
                    .await
            }
        };
        debug!(switch = %self.name, on, "Nest switch written");
        self.base.after_write(result, "set switch").await
    }
}

#[async_trait]
impl Entity for NestSwitch {
    fn domain(&self) -> &'static str {
        PLATFORM_SWITCH
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-{}", self.base.serial(), self.kind.key()))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        self.is_on()
            .map(|on| if on { STATE_ON } else { STATE_OFF }.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        self.base.base_attributes()
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn icon(&self) -> Option<String> {
        Some(self.kind.icon().to_string())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.set(true).await
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.set(false).await
    }
}
