//! SmartThings binary sensors
//!
//! One sensor per capability the broker assigned to `binary_sensor`. The
//! `button` capability gets a sensor that turns on for a press and back off
//! after [`BUTTON_OFF_DELAY`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ha_core::constants::{
    ATTR_TEMPERATURE, DEVICE_CLASS_MOISTURE, DEVICE_CLASS_MOTION, DEVICE_CLASS_MOVING,
    DEVICE_CLASS_OPENING, DEVICE_CLASS_PRESENCE, DEVICE_CLASS_PROBLEM, DEVICE_CLASS_SOUND,
    PLATFORM_BINARY_SENSOR, STATE_OFF, STATE_ON,
};
use ha_core::util::title_case;
use ha_helpers::{DeviceInfo, Entity, EntityHandle, EntityPlatform};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broker::{DeviceBroker, Signal};
use crate::capability::{binary_sensor_attribute, Platform, BUTTON};
use crate::entity::SmartThingsEntity;

pub const ATTR_LAST_ACTION: &str = "last_action";

/// Button values that count as a press
pub const BUTTON_ACTIONS: &[&str] = &["pushed", "double", "held"];

pub const BUTTON_OFF_DELAY: Duration = Duration::from_secs(3);

fn device_class(attribute: &str) -> Option<&'static str> {
    match attribute {
        "acceleration" => Some(DEVICE_CLASS_MOVING),
        "contact" | "valve" => Some(DEVICE_CLASS_OPENING),
        "filterStatus" | "tamper" => Some(DEVICE_CLASS_PROBLEM),
        "motion" => Some(DEVICE_CLASS_MOTION),
        "presence" => Some(DEVICE_CLASS_PRESENCE),
        "sound" => Some(DEVICE_CLASS_SOUND),
        "water" => Some(DEVICE_CLASS_MOISTURE),
        _ => None,
    }
}

fn on_off(on: bool) -> String {
    let state = if on { STATE_ON } else { STATE_OFF };
    state.to_string()
}

pub struct SmartThingsBinarySensor {
    inner: SmartThingsEntity,
    attribute: &'static str,
}

impl SmartThingsBinarySensor {
    pub(crate) fn new(inner: SmartThingsEntity, attribute: &'static str) -> Self {
        Self { inner, attribute }
    }

    fn sensor_attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.inner.base_attributes();
        if let Some(temperature) = self.inner.value("temperature") {
            attrs.insert(ATTR_TEMPERATURE.to_string(), temperature);
        }
        attrs
    }
}

#[async_trait]
impl Entity for SmartThingsBinarySensor {
    fn domain(&self) -> &'static str {
        PLATFORM_BINARY_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}.{}", self.inner.device_id, self.attribute))
    }

    fn name(&self) -> String {
        format!("{} {}", self.inner.label(), title_case(self.attribute))
    }

    fn state(&self) -> Option<String> {
        let attribute = self.attribute;
        self.inner
            .with_device(|d| d.status.is_on(attribute))
            .map(on_off)
    }

    fn attributes(&self) -> HashMap<String, Value> {
        self.sensor_attributes()
    }

    fn device_class(&self) -> Option<String> {
        device_class(self.attribute).map(String::from)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }
}

/// Momentary sensor for the `button` attribute
pub struct SmartThingsButtonBinarySensor {
    sensor: SmartThingsBinarySensor,
    pressed: bool,
}

impl SmartThingsButtonBinarySensor {
    pub(crate) fn new(inner: SmartThingsEntity) -> Self {
        Self {
            sensor: SmartThingsBinarySensor::new(inner, BUTTON),
            pressed: false,
        }
    }

    fn last_action(&self) -> Option<String> {
        self.sensor
            .inner
            .value(BUTTON)
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Read the latest button value; returns whether it was a press
    pub fn press(&mut self) -> bool {
        self.pressed = self
            .last_action()
            .map_or(false, |action| BUTTON_ACTIONS.contains(&action.as_str()));
        self.pressed
    }

    pub fn release(&mut self) {
        self.pressed = false;
    }
}

#[async_trait]
impl Entity for SmartThingsButtonBinarySensor {
    fn domain(&self) -> &'static str {
        PLATFORM_BINARY_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        self.sensor.unique_id()
    }

    fn name(&self) -> String {
        format!("{} Pressed", self.sensor.inner.label())
    }

    fn state(&self) -> Option<String> {
        Some(on_off(self.pressed))
    }

    fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = self.sensor.sensor_attributes();
        if let Some(action) = self.last_action() {
            attrs.insert(ATTR_LAST_ACTION.to_string(), json!(action));
        }
        attrs
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        self.sensor.device_info()
    }

    fn should_poll(&self) -> bool {
        false
    }
}

struct Tracked {
    device_id: String,
    unique_id: String,
    button: Option<Arc<Mutex<SmartThingsButtonBinarySensor>>>,
}

/// Rewrites binary sensor states when the broker signals device changes
pub struct SignalDispatch {
    tracked: Vec<Tracked>,
    off_delay: Duration,
}

impl SignalDispatch {
    pub fn with_off_delay(mut self, off_delay: Duration) -> Self {
        self.off_delay = off_delay;
        self
    }

    /// Follow `signals` until the broker goes away
    pub fn spawn(
        self,
        platform: Arc<EntityPlatform>,
        mut signals: broadcast::Receiver<Signal>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut off_timers: HashMap<String, JoinHandle<()>> = HashMap::new();
            loop {
                let signal = match signals.recv().await {
                    Ok(signal) => signal,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} device signals", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match signal {
                    Signal::Update(devices) => {
                        for tracked in self.touched(&devices) {
                            write(&platform, &tracked.unique_id).await;
                        }
                    }
                    Signal::Button(devices) => {
                        for tracked in self.touched(&devices) {
                            let Some(button) = &tracked.button else {
                                continue;
                            };
                            if button.lock().await.press() {
                                if let Some(timer) = off_timers.remove(&tracked.unique_id) {
                                    timer.abort();
                                }
                                let timer = release_later(
                                    platform.clone(),
                                    button.clone(),
                                    tracked.unique_id.clone(),
                                    self.off_delay,
                                );
                                off_timers.insert(tracked.unique_id.clone(), timer);
                            }
                            write(&platform, &tracked.unique_id).await;
                        }
                    }
                }
            }
            for timer in off_timers.into_values() {
                timer.abort();
            }
        })
    }

    fn touched<'a>(&'a self, devices: &'a HashSet<String>) -> impl Iterator<Item = &'a Tracked> {
        self.tracked
            .iter()
            .filter(move |t| devices.contains(&t.device_id))
    }
}

async fn write(platform: &EntityPlatform, unique_id: &str) {
    if let Some(entity_id) = platform.entity_id_for(PLATFORM_BINARY_SENSOR, unique_id) {
        platform.write_state(&entity_id).await;
    }
}

fn release_later(
    platform: Arc<EntityPlatform>,
    button: Arc<Mutex<SmartThingsButtonBinarySensor>>,
    unique_id: String,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        button.lock().await.release();
        debug!(unique_id = %unique_id, "Button released");
        write(&platform, &unique_id).await;
    })
}

/// Build the binary sensors of every device and their signal dispatch
pub fn build_binary_sensors(broker: &Arc<DeviceBroker>) -> (Vec<EntityHandle>, SignalDispatch) {
    let mut entities: Vec<EntityHandle> = Vec::new();
    let mut tracked = Vec::new();

    for device_id in broker.device_ids() {
        for capability in broker.get_assigned(device_id, Platform::BinarySensor) {
            let Some(attribute) = binary_sensor_attribute(&capability) else {
                continue;
            };
            let inner = SmartThingsEntity::new(broker.clone(), device_id);
            let unique_id = format!("{}.{}", device_id, attribute);
            if attribute == BUTTON {
                let button = Arc::new(Mutex::new(SmartThingsButtonBinarySensor::new(inner)));
                entities.push(button.clone());
                tracked.push(Tracked {
                    device_id: device_id.clone(),
                    unique_id,
                    button: Some(button),
                });
            } else {
                entities.push(Arc::new(Mutex::new(SmartThingsBinarySensor::new(inner, attribute))));
                tracked.push(Tracked {
                    device_id: device_id.clone(),
                    unique_id,
                    button: None,
                });
            }
        }
    }

    let dispatch = SignalDispatch {
        tracked,
        off_delay: BUTTON_OFF_DELAY,
    };
    (entities, dispatch)
}
