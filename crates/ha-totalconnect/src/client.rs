//! TotalConnect client seam
//!
//! The vendor service is reached through [`TotalConnectClient`]; this
//! module only holds the location and zone model the entities read. No
//! implementation ships here: the embedding application wraps its own
//! TotalConnect session in the trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TotalConnectError {
    #[error("unknown location {0}")]
    UnknownLocation(String),

    #[error("TotalConnect request failed: {0}")]
    Request(String),

    #[error("{0}")]
    CommandFailed(String),
}

pub type TotalConnectResult<T> = Result<T, TotalConnectError>;

/// Arming state codes reported by the panel
pub mod arming {
    pub const DISARMED: i64 = 10200;
    pub const ARMED_AWAY: i64 = 10201;
    pub const ARMED_AWAY_BYPASS: i64 = 10202;
    pub const ARMED_STAY: i64 = 10203;
    pub const ARMED_STAY_BYPASS: i64 = 10204;
    pub const ARMED_AWAY_INSTANT: i64 = 10205;
    pub const ARMED_AWAY_INSTANT_BYPASS: i64 = 10206;
    pub const ALARMING: i64 = 10207;
    pub const ARMED_STAY_INSTANT: i64 = 10209;
    pub const ARMED_STAY_INSTANT_BYPASS: i64 = 10210;
    pub const DISARMED_BYPASS: i64 = 10211;
    pub const ALARMING_FIRE_SMOKE: i64 = 10212;
    pub const ALARMING_CARBON_MONOXIDE: i64 = 10213;
    pub const ARMED_STAY_NIGHT: i64 = 10218;
    pub const ARMED_CUSTOM_BYPASS: i64 = 10223;
    pub const ARMING: i64 = 10307;
    pub const DISARMING: i64 = 10308;
}

/// Zone status bits
pub mod zone_status {
    pub const BYPASSED: u32 = 1;
    pub const FAULT: u32 = 2;
    pub const TROUBLE: u32 = 8;
    pub const TAMPER: u32 = 16;
    pub const LOW_BATTERY: u32 = 64;
    pub const TRIGGERED: u32 = 256;
}

pub const ZONE_TYPE_FIRE_SMOKE: i64 = 9;
pub const ZONE_TYPE_CARBON_MONOXIDE: i64 = 14;

/// One sensor zone of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: u32,
    pub description: String,
    #[serde(default)]
    pub zone_type_id: i64,
    /// Bitmask of [`zone_status`] flags
    #[serde(default)]
    pub status: u32,
}

impl Zone {
    fn has(&self, flag: u32) -> bool {
        self.status & flag != 0
    }

    pub fn is_bypassed(&self) -> bool {
        self.has(zone_status::BYPASSED)
    }

    pub fn is_faulted(&self) -> bool {
        self.has(zone_status::FAULT)
    }

    pub fn is_tampered(&self) -> bool {
        self.has(zone_status::TROUBLE) || self.has(zone_status::TAMPER)
    }

    pub fn is_low_battery(&self) -> bool {
        self.has(zone_status::LOW_BATTERY)
    }

    pub fn is_triggered(&self) -> bool {
        self.has(zone_status::TRIGGERED)
    }

    pub fn is_type_fire(&self) -> bool {
        self.zone_type_id == ZONE_TYPE_FIRE_SMOKE
    }

    pub fn is_type_carbon_monoxide(&self) -> bool {
        self.zone_type_id == ZONE_TYPE_CARBON_MONOXIDE
    }
}

/// A monitored location with its panel and zones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,
    pub location_name: String,
    pub arming_state: i64,
    #[serde(default)]
    pub ac_loss: bool,
    #[serde(default)]
    pub low_battery: bool,
    #[serde(default)]
    pub cover_tampered: bool,
    #[serde(default)]
    pub zones: BTreeMap<u32, Zone>,
}

impl Location {
    fn state_in(&self, codes: &[i64]) -> bool {
        codes.contains(&self.arming_state)
    }

    pub fn is_disarmed(&self) -> bool {
        self.state_in(&[arming::DISARMED, arming::DISARMED_BYPASS])
    }

    pub fn is_armed_home(&self) -> bool {
        self.state_in(&[
            arming::ARMED_STAY,
            arming::ARMED_STAY_BYPASS,
            arming::ARMED_STAY_INSTANT,
            arming::ARMED_STAY_INSTANT_BYPASS,
        ])
    }

    pub fn is_armed_night(&self) -> bool {
        self.state_in(&[arming::ARMED_STAY_NIGHT])
    }

    pub fn is_armed_away(&self) -> bool {
        self.state_in(&[
            arming::ARMED_AWAY,
            arming::ARMED_AWAY_BYPASS,
            arming::ARMED_AWAY_INSTANT,
            arming::ARMED_AWAY_INSTANT_BYPASS,
        ])
    }

    pub fn is_armed_custom_bypass(&self) -> bool {
        self.state_in(&[arming::ARMED_CUSTOM_BYPASS])
    }

    pub fn is_arming(&self) -> bool {
        self.state_in(&[arming::ARMING])
    }

    pub fn is_disarming(&self) -> bool {
        self.state_in(&[arming::DISARMING])
    }

    pub fn is_triggered_police(&self) -> bool {
        self.state_in(&[arming::ALARMING])
    }

    pub fn is_triggered_fire(&self) -> bool {
        self.state_in(&[arming::ALARMING_FIRE_SMOKE])
    }

    pub fn is_triggered_gas(&self) -> bool {
        self.state_in(&[arming::ALARMING_CARBON_MONOXIDE])
    }
}

/// Access to a TotalConnect account, implemented by the caller
///
/// Arm and disarm calls return whether the panel accepted the command.
/// Transport failures map to [`TotalConnectError::Request`].
#[async_trait]
pub trait TotalConnectClient: Send + Sync {
    /// Every location of the account, with zones
    async fn locations(&self) -> TotalConnectResult<Vec<Location>>;

    /// Current arming state and zones of one location
    async fn location(&self, location_id: &str) -> TotalConnectResult<Location>;

    async fn arm_away(&self, location_id: &str) -> TotalConnectResult<bool>;

    async fn arm_stay(&self, location_id: &str) -> TotalConnectResult<bool>;

    async fn arm_stay_night(&self, location_id: &str) -> TotalConnectResult<bool>;

    async fn disarm(&self, location_id: &str) -> TotalConnectResult<bool>;
}
