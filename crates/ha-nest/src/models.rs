//! Typed view of the Nest developer API data tree
//!
//! `GET /` returns `{"structures": {...}, "devices": {"thermostats",
//! "smoke_co_alarms", "cameras"}}`, every collection keyed by id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ha_core::constants::{TEMP_CELSIUS, TEMP_FAHRENHEIT};
use serde::{Deserialize, Serialize};

pub const STATE_AWAY: &str = "away";
pub const STATE_OK: &str = "ok";
pub const STATE_GREEN: &str = "green";

pub const MODE_HEAT: &str = "heat";
pub const MODE_COOL: &str = "cool";
pub const MODE_HEAT_COOL: &str = "heat-cool";
pub const MODE_ECO: &str = "eco";
pub const MODE_OFF: &str = "off";

/// Unit a thermostat shows temperatures in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureScale {
    #[default]
    C,
    F,
}

impl TemperatureScale {
    pub fn unit(self) -> &'static str {
        match self {
            Self::C => TEMP_CELSIUS,
            Self::F => TEMP_FAHRENHEIT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "C" => Some(Self::C),
            "F" => Some(Self::F),
            _ => None,
        }
    }

    /// Convert a Celsius reading into this scale
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::C => celsius,
            Self::F => celsius * 1.8 + 32.0,
        }
    }
}

fn default_home() -> String {
    "home".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestData {
    #[serde(default)]
    pub structures: BTreeMap<String, Structure>,
    #[serde(default)]
    pub devices: Devices,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub thermostats: BTreeMap<String, Thermostat>,
    #[serde(default)]
    pub smoke_co_alarms: BTreeMap<String, SmokeCoAlarm>,
    #[serde(default)]
    pub cameras: BTreeMap<String, Camera>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub structure_id: String,
    pub name: String,
    /// `home` or `away`
    #[serde(default = "default_home")]
    pub away: String,
    #[serde(default)]
    pub thermostats: Vec<String>,
    #[serde(default)]
    pub smoke_co_alarms: Vec<String>,
    #[serde(default)]
    pub cameras: Vec<String>,
    #[serde(default)]
    pub eta_begin: Option<String>,
    #[serde(default)]
    pub wwn_security_state: Option<String>,
}

impl Structure {
    pub fn is_away(&self) -> bool {
        self.away == STATE_AWAY
    }
}

/// Target temperature of a thermostat
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Single(f64),
    Range(f64, f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thermostat {
    pub device_id: String,
    pub name: String,
    pub name_long: String,
    pub where_name: Option<String>,
    pub structure_id: String,
    pub software_version: Option<String>,
    pub is_online: bool,
    pub temperature_scale: TemperatureScale,
    pub can_heat: bool,
    pub can_cool: bool,
    pub has_fan: bool,
    pub has_leaf: bool,
    pub is_locked: bool,
    pub is_using_emergency_heat: bool,
    pub fan_timer_active: bool,
    pub fan_timer_duration: Option<u32>,
    pub fan_timer_timeout: Option<String>,
    pub hvac_mode: String,
    pub previous_hvac_mode: String,
    pub hvac_state: String,
    pub humidity: Option<f64>,
    pub time_to_target: Option<String>,
    pub ambient_temperature_c: Option<f64>,
    pub ambient_temperature_f: Option<f64>,
    pub target_temperature_c: Option<f64>,
    pub target_temperature_f: Option<f64>,
    pub target_temperature_low_c: Option<f64>,
    pub target_temperature_low_f: Option<f64>,
    pub target_temperature_high_c: Option<f64>,
    pub target_temperature_high_f: Option<f64>,
    pub eco_temperature_low_c: Option<f64>,
    pub eco_temperature_low_f: Option<f64>,
    pub eco_temperature_high_c: Option<f64>,
    pub eco_temperature_high_f: Option<f64>,
    pub locked_temp_min_c: Option<f64>,
    pub locked_temp_min_f: Option<f64>,
    pub locked_temp_max_c: Option<f64>,
    pub locked_temp_max_f: Option<f64>,
}

impl Thermostat {
    fn scaled(&self, c: Option<f64>, f: Option<f64>) -> Option<f64> {
        match self.temperature_scale {
            TemperatureScale::C => c,
            TemperatureScale::F => f,
        }
    }

    /// Ambient temperature in the thermostat's scale
    pub fn temperature(&self) -> Option<f64> {
        self.scaled(self.ambient_temperature_c, self.ambient_temperature_f)
    }

    /// Target temperature; a range while in `heat-cool`
    pub fn target(&self) -> Option<Target> {
        if self.hvac_mode == MODE_HEAT_COOL {
            let low = self.scaled(self.target_temperature_low_c, self.target_temperature_low_f)?;
            let high =
                self.scaled(self.target_temperature_high_c, self.target_temperature_high_f)?;
            Some(Target::Range(low, high))
        } else {
            self.scaled(self.target_temperature_c, self.target_temperature_f)
                .map(Target::Single)
        }
    }

    pub fn eco_temperature(&self) -> Option<(f64, f64)> {
        Some((
            self.scaled(self.eco_temperature_low_c, self.eco_temperature_low_f)?,
            self.scaled(self.eco_temperature_high_c, self.eco_temperature_high_f)?,
        ))
    }

    /// Lowest settable temperature: the lock range while locked
    pub fn min_temperature(&self) -> f64 {
        if self.is_locked {
            if let Some(min) = self.scaled(self.locked_temp_min_c, self.locked_temp_min_f) {
                return min;
            }
        }
        match self.temperature_scale {
            TemperatureScale::C => 9.0,
            TemperatureScale::F => 48.0,
        }
    }

    pub fn max_temperature(&self) -> f64 {
        if self.is_locked {
            if let Some(max) = self.scaled(self.locked_temp_max_c, self.locked_temp_max_f) {
                return max;
            }
        }
        match self.temperature_scale {
            TemperatureScale::C => 32.0,
            TemperatureScale::F => 90.0,
        }
    }

    /// Field name of a target temperature write in this scale
    pub fn target_field(&self, base: &str) -> String {
        format!(
            "{}_{}",
            base,
            self.temperature_scale.as_str().to_lowercase()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeCoAlarm {
    pub device_id: String,
    pub name: String,
    pub name_long: String,
    pub structure_id: String,
    pub software_version: Option<String>,
    pub is_online: bool,
    pub battery_health: String,
    pub co_alarm_state: String,
    pub smoke_alarm_state: String,
    pub ui_color_state: String,
}

impl SmokeCoAlarm {
    /// Any alarm that is not `ok`
    pub fn has_problem(&self) -> bool {
        [&self.battery_health, &self.co_alarm_state, &self.smoke_alarm_state]
            .iter()
            .any(|s| s.as_str() != STATE_OK)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityZone {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraEvent {
    pub has_motion: bool,
    pub has_sound: bool,
    pub has_person: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub activity_zone_ids: Vec<String>,
    pub image_url: Option<String>,
}

impl CameraEvent {
    /// An event without an end, or one restarted after its end, is ongoing
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        match (self.start_time, self.end_time) {
            (_, None) => true,
            (Some(start), Some(end)) if start > end => true,
            (_, Some(end)) => end > now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub device_id: String,
    pub name: String,
    pub name_long: String,
    pub structure_id: String,
    pub software_version: Option<String>,
    pub is_online: bool,
    pub is_streaming: bool,
    pub is_video_history_enabled: bool,
    pub is_doorbell: bool,
    pub snapshot_url: Option<String>,
    pub web_url: Option<String>,
    pub app_url: Option<String>,
    pub public_share_url: Option<String>,
    pub activity_zones: Vec<ActivityZone>,
    pub last_event: Option<CameraEvent>,
}

impl Camera {
    fn ongoing(&self, now: DateTime<Utc>) -> Option<&CameraEvent> {
        self.last_event.as_ref().filter(|e| e.is_ongoing(now))
    }

    pub fn motion_detected(&self, now: DateTime<Utc>) -> bool {
        self.ongoing(now).map_or(false, |e| e.has_motion)
    }

    pub fn sound_detected(&self, now: DateTime<Utc>) -> bool {
        self.ongoing(now).map_or(false, |e| e.has_sound)
    }

    pub fn person_detected(&self, now: DateTime<Utc>) -> bool {
        self.ongoing(now).map_or(false, |e| e.has_person)
    }

    pub fn has_ongoing_motion_in_zone(&self, zone_id: u64, now: DateTime<Utc>) -> bool {
        let id = zone_id.to_string();
        self.ongoing(now)
            .map_or(false, |e| e.activity_zone_ids.contains(&id))
    }

    /// Motion, sound, person or zone activity right now
    pub fn activity_detected(&self, now: DateTime<Utc>) -> bool {
        self.motion_detected(now)
            || self.person_detected(now)
            || self.sound_detected(now)
            || self
                .activity_zones
                .iter()
                .any(|z| self.has_ongoing_motion_in_zone(z.id, now))
    }
}

/// What an entity reads from the tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceRef {
    Structure(String),
    Thermostat(String),
    SmokeCoAlarm(String),
    Camera(String),
}

impl DeviceRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Structure(id) | Self::Thermostat(id) | Self::SmokeCoAlarm(id) | Self::Camera(id) => id,
        }
    }
}

impl NestData {
    pub fn structure(&self, id: &str) -> Option<&Structure> {
        self.structures.get(id)
    }

    pub fn thermostat(&self, id: &str) -> Option<&Thermostat> {
        self.devices.thermostats.get(id)
    }

    pub fn smoke_co_alarm(&self, id: &str) -> Option<&SmokeCoAlarm> {
        self.devices.smoke_co_alarms.get(id)
    }

    pub fn camera(&self, id: &str) -> Option<&Camera> {
        self.devices.cameras.get(id)
    }

    /// Structures whose name is in `names`; every structure when empty
    pub fn selected_structures<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a Structure> {
        self.structures
            .values()
            .filter(move |s| names.is_empty() || names.contains(&s.name))
    }

    /// Thermostats of the selected structures
    pub fn thermostats<'a>(&'a self, names: &'a [String]) -> Vec<(&'a Structure, &'a Thermostat)> {
        self.selected_structures(names)
            .flat_map(|s| {
                s.thermostats
                    .iter()
                    .filter_map(move |id| Some((s, self.thermostat(id)?)))
            })
            .collect()
    }

    pub fn smoke_co_alarms<'a>(&'a self, names: &'a [String]) -> Vec<(&'a Structure, &'a SmokeCoAlarm)> {
        self.selected_structures(names)
            .flat_map(|s| {
                s.smoke_co_alarms
                    .iter()
                    .filter_map(move |id| Some((s, self.smoke_co_alarm(id)?)))
            })
            .collect()
    }

    pub fn cameras<'a>(&'a self, names: &'a [String]) -> Vec<(&'a Structure, &'a Camera)> {
        self.selected_structures(names)
            .flat_map(|s| {
                s.cameras
                    .iter()
                    .filter_map(move |id| Some((s, self.camera(id)?)))
            })
            .collect()
    }

    /// Scale of the structure's first thermostat
    pub fn structure_scale(&self, structure_id: &str) -> TemperatureScale {
        self.structure(structure_id)
            .and_then(|s| s.thermostats.iter().find_map(|id| self.thermostat(id)))
            .map(|t| t.temperature_scale)
            .unwrap_or_default()
    }
}
