//! Nest cameras

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ha_core::constants::{PLATFORM_CAMERA, STATE_IDLE};
use ha_helpers::{DeviceInfo, Entity, EntityError};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::binary_sensor::camera_attributes;
use crate::entity::NestDevice;
use crate::models::Camera;
use crate::{ATTR_STREAMING, MANUFACTURER};

pub const SUPPORT_ON_OFF: u32 = 1;
pub const SUPPORT_STREAM: u32 = 2;

pub const STATE_RECORDING: &str = "recording";
pub const STATE_STREAMING: &str = "streaming";

/// Minimum time between two snapshots; Nest Aware allows 10 a minute
pub fn snapshot_interval(video_history_enabled: bool) -> Duration {
    if video_history_enabled {
        Duration::seconds(6)
    } else {
        Duration::seconds(30)
    }
}

pub struct NestCamera {
    base: NestDevice,
    name: String,
    stream_source: Option<String>,
    last_image: Option<Vec<u8>>,
    next_snapshot_at: Option<DateTime<Utc>>,
}

impl NestCamera {
    pub(crate) fn new(base: NestDevice, name: impl Into<String>, stream_source: Option<String>) -> Self {
        Self {
            base,
            name: name.into(),
            stream_source,
            last_image: None,
            next_snapshot_at: None,
        }
    }

    fn camera(&self) -> Option<Camera> {
        self.base.read(|data| data.camera(self.base.serial()).cloned())
    }

    pub fn stream_source(&self) -> Option<&str> {
        self.stream_source.as_deref()
    }

    fn ready_for_snapshot(&self, now: DateTime<Utc>) -> bool {
        self.next_snapshot_at.map_or(true, |at| now > at)
    }

    /// Latest still image
    ///
    /// Snapshots are only fetched while streaming and at most once per
    /// [`snapshot_interval`]; otherwise the previous image is returned.
    pub async fn camera_image(&mut self) -> Result<Option<Vec<u8>>, EntityError> {
        let Some(camera) = self.camera() else {
            return Ok(self.last_image.clone());
        };
        if !camera.is_streaming {
            debug!("{} is not streaming, keeping the last image", self.name);
            return Ok(self.last_image.clone());
        }
        let now = Utc::now();
        if !self.ready_for_snapshot(now) {
            return Ok(self.last_image.clone());
        }
        let Some(url) = camera.snapshot_url.as_deref() else {
            return Ok(self.last_image.clone());
        };

        match self.base.api.snapshot(url).await {
            Ok(image) => {
                self.next_snapshot_at =
                    Some(now + snapshot_interval(camera.is_video_history_enabled));
                self.last_image = Some(image);
            }
            Err(err) => error!("Error getting camera image: {}", err),
        }
        Ok(self.last_image.clone())
    }

    async fn set_streaming(&mut self, streaming: bool) -> Result<(), EntityError> {
        let online = self.camera().map_or(false, |c| c.is_online);
        if !online {
            return Err(EntityError::Failed(format!("Camera {} is offline", self.name)));
        }
        debug!(camera = %self.name, streaming, "Setting Nest camera streaming");
        let result = self
            .base
            .api
            .set_camera_streaming(self.base.serial(), streaming)
            .await;
        self.base.after_write(result, "set streaming").await
    }
}

#[async_trait]
impl Entity for NestCamera {
    fn domain(&self) -> &'static str {
        PLATFORM_CAMERA
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.base.serial().to_string())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        let camera = self.camera()?;
        let state = if camera.activity_detected(Utc::now()) {
            STATE_RECORDING
        } else if camera.is_streaming {
            STATE_STREAMING
        } else {
            STATE_IDLE
        };
        Some(state.to_string())
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.base.base_attributes();
        attrs.insert("brand".into(), json!(MANUFACTURER));
        if let Some(camera) = self.camera() {
            attrs.extend(camera_attributes(&camera, Utc::now()));
            attrs.insert(ATTR_STREAMING.into(), json!(camera.is_streaming));
            attrs.insert("web_url".into(), json!(camera.web_url));
            attrs.insert("app_url".into(), json!(camera.app_url));
        }
        attrs
    }

    fn available(&self) -> bool {
        self.base.available()
    }

    fn supported_features(&self) -> u32 {
        if self.stream_source.is_some() {
            SUPPORT_ON_OFF | SUPPORT_STREAM
        } else {
            SUPPORT_ON_OFF
        }
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.base.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.set_streaming(true).await
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.set_streaming(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_interval() {
        assert_eq!(snapshot_interval(true), Duration::seconds(6));
        assert_eq!(snapshot_interval(false), Duration::seconds(30));
    }
}
