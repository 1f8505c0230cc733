//! Services of the Nest integration
//!
//! Structure services (`nest.set_away_mode`, `nest.set_eta`,
//! `nest.cancel_eta`) act on structures by name. The thermostat services
//! and the climate, humidifier, switch and camera services target entities
//! by `entity_id`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use ha_core::constants::{
    PLATFORM_CAMERA, PLATFORM_CLIMATE, PLATFORM_HUMIDIFIER, PLATFORM_SWITCH, STATE_HOME,
};
use ha_core::ServiceCall;
use ha_helpers::{EntityError, EntityPlatform};
use ha_host::{ServiceDescription, ServiceError};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::climate::NestThermostat;
use crate::humidifier::NestHumidifier;
use crate::models::{Structure, TemperatureScale, STATE_AWAY};
use crate::{Nest, NestAccount, Target, ATTR_STRUCTURE, ATTR_TEMPERATURE_SCALE, DOMAIN};

pub const SERVICE_SET_AWAY_MODE: &str = "set_away_mode";
pub const SERVICE_SET_ETA: &str = "set_eta";
pub const SERVICE_CANCEL_ETA: &str = "cancel_eta";
pub const SERVICE_SET_ECO_MODE: &str = "set_eco_mode";
pub const SERVICE_SET_FAN_TIMER: &str = "set_fan_timer";
pub const SERVICE_SET_TEMPERATURE_SCALE: &str = "set_temperature_scale";

pub const ATTR_AWAY_MODE: &str = "away_mode";
pub const ATTR_ETA: &str = "eta";
pub const ATTR_ETA_WINDOW: &str = "eta_window";
pub const ATTR_TRIP_ID: &str = "trip_id";
pub const ATTR_ECO_MODE: &str = "eco_mode";
pub const ATTR_DURATION: &str = "duration";

/// Fan timer durations the thermostat accepts, in minutes
pub const FAN_TIMER_DURATIONS: &[u32] = &[15, 30, 45, 60, 120, 240, 480, 720];

const CLIMATE_SERVICES: &[&str] = &[
    "set_hvac_mode",
    "set_temperature",
    "set_preset_mode",
    "set_fan_mode",
    "set_humidity",
];

const HUMIDIFIER_SERVICES: &[&str] = &["turn_on", "turn_off", "set_humidity", "set_mode"];

fn required<T: serde::de::DeserializeOwned>(call: &ServiceCall, key: &str) -> Result<T, ServiceError> {
    call.get(key)
        .ok_or_else(|| ServiceError::InvalidData(format!("'{}' is required", key)))
}

fn failed(err: EntityError) -> ServiceError {
    ServiceError::CallFailed(err.to_string())
}

/// Parse a time period: seconds, `"HH:MM[:SS]"` or `{hours, minutes, seconds}`
pub fn parse_time_period(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => Some(Duration::milliseconds((n.as_f64()? * 1000.0) as i64)),
        Value::String(s) => {
            let (negative, s) = match s.trim().strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.trim()),
            };
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() < 2 || parts.len() > 3 {
                return s.parse::<f64>().ok().map(|secs| {
                    let d = Duration::milliseconds((secs * 1000.0) as i64);
                    if negative { -d } else { d }
                });
            }
            let hours: i64 = parts[0].parse().ok()?;
            let minutes: i64 = parts[1].parse().ok()?;
            let seconds: f64 = match parts.get(2) {
                Some(p) => p.parse().ok()?,
                None => 0.0,
            };
            let d = Duration::hours(hours)
                + Duration::minutes(minutes)
                + Duration::milliseconds((seconds * 1000.0) as i64);
            Some(if negative { -d } else { d })
        }
        Value::Object(map) => {
            let field = |key: &str| map.get(key).and_then(Value::as_f64).unwrap_or(0.0);
            if !["days", "hours", "minutes", "seconds", "milliseconds"]
                .iter()
                .any(|k| map.contains_key(*k))
            {
                return None;
            }
            let millis = field("days") * 86_400_000.0
                + field("hours") * 3_600_000.0
                + field("minutes") * 60_000.0
                + field("seconds") * 1000.0
                + field("milliseconds");
            Some(Duration::milliseconds(millis as i64))
        }
        _ => None,
    }
}

fn time_period(call: &ServiceCall, key: &str) -> Result<Option<Duration>, ServiceError> {
    match call.service_data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_time_period(value)
            .map(Some)
            .ok_or_else(|| ServiceError::InvalidData(format!("invalid time period for '{}'", key))),
    }
}

/// Validate a fan timer duration in minutes
pub fn fan_timer_duration(call: &ServiceCall) -> Result<u32, ServiceError> {
    let minutes: u32 = required(call, ATTR_DURATION)?;
    if !FAN_TIMER_DURATIONS.contains(&minutes) {
        return Err(ServiceError::InvalidData(format!(
            "duration {} must be one of {:?}",
            minutes, FAN_TIMER_DURATIONS
        )));
    }
    Ok(minutes)
}

/// Structures of an account named by the call, or its default set
///
/// Unknown names are logged and skipped.
fn target_structures(account: &NestAccount, call: &ServiceCall) -> Vec<Structure> {
    let Some(data) = account.coordinator.data() else {
        return Vec::new();
    };
    let names = call
        .string_list(ATTR_STRUCTURE)
        .unwrap_or_else(|| account.default_structures());
    names
        .iter()
        .filter_map(|name| {
            let found = data.structures.values().find(|s| &s.name == name).cloned();
            if found.is_none() {
                error!("Invalid structure {}", name);
            }
            found
        })
        .collect()
}

async fn refresh(account: &NestAccount) {
    if let Err(err) = account.coordinator.refresh().await {
        error!("Refresh after Nest service call failed: {}", err);
    }
}

async fn run_structure_service(
    accounts: Arc<DashMap<String, Arc<NestAccount>>>,
    call: ServiceCall,
) -> Result<Option<Value>, ServiceError> {
    let accounts: Vec<Arc<NestAccount>> = accounts.iter().map(|a| a.value().clone()).collect();
    match call.service.as_str() {
        SERVICE_SET_AWAY_MODE => {
            let away: String = required(&call, ATTR_AWAY_MODE)?;
            if away != STATE_AWAY && away != STATE_HOME {
                return Err(ServiceError::InvalidData(format!(
                    "away_mode must be {} or {}",
                    STATE_AWAY, STATE_HOME
                )));
            }
            for account in accounts {
                for structure in target_structures(&account, &call) {
                    info!("Setting away mode for: {} to: {}", structure.name, away);
                    account
                        .api
                        .set_away(&structure.structure_id, &away)
                        .await
                        .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
                }
                refresh(&account).await;
            }
        }
        SERVICE_SET_ETA => {
            let eta = time_period(&call, ATTR_ETA)?
                .ok_or_else(|| ServiceError::InvalidData(format!("'{}' is required", ATTR_ETA)))?;
            let window = time_period(&call, ATTR_ETA_WINDOW)?.unwrap_or_else(|| Duration::minutes(1));
            for account in accounts {
                for structure in target_structures(&account, &call) {
                    if structure.thermostats.is_empty() {
                        info!(
                            "No thermostats found in structure: {}, unable to set ETA",
                            structure.name
                        );
                        continue;
                    }
                    info!("Setting away mode for: {} to: {}", structure.name, STATE_AWAY);
                    account
                        .api
                        .set_away(&structure.structure_id, STATE_AWAY)
                        .await
                        .map_err(|e| ServiceError::CallFailed(e.to_string()))?;

                    let now = Utc::now();
                    let trip_id = call
                        .get::<String>(ATTR_TRIP_ID)
                        .unwrap_or_else(|| format!("trip_{}", now.timestamp()));
                    let begin = now + eta;
                    let end = begin + window;
                    info!(
                        "Setting ETA for trip: {}, ETA window starts at: {} and ends at: {}",
                        trip_id, begin, end
                    );
                    account
                        .api
                        .set_eta(&structure.structure_id, &trip_id, begin, end)
                        .await
                        .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
                }
                refresh(&account).await;
            }
        }
        SERVICE_CANCEL_ETA => {
            let trip_id: String = required(&call, ATTR_TRIP_ID)?;
            for account in accounts {
                for structure in target_structures(&account, &call) {
                    if structure.thermostats.is_empty() {
                        info!(
                            "No thermostats found in structure: {}, unable to cancel ETA",
                            structure.name
                        );
                        continue;
                    }
                    info!("Cancelling ETA for trip: {}", trip_id);
                    account
                        .api
                        .cancel_eta(&structure.structure_id, &trip_id)
                        .await
                        .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
                }
                refresh(&account).await;
            }
        }
        service => {
            return Err(ServiceError::NotFound {
                domain: DOMAIN.to_string(),
                service: service.to_string(),
            })
        }
    }
    Ok(None)
}

/// Targets named by `entity_id`; every target when it is absent
fn targets<E>(map: &DashMap<String, Target<E>>, call: &ServiceCall) -> Vec<(String, Target<E>)> {
    match call.string_list("entity_id") {
        Some(ids) => ids
            .into_iter()
            .filter_map(|id| {
                let target = map.get(&id)?.clone();
                Some((id, target))
            })
            .collect(),
        None => map
            .iter()
            .map(|t| (t.key().clone(), t.value().clone()))
            .collect(),
    }
}

/// A thermostat action decoded from a service call
#[derive(Debug, Clone, PartialEq)]
enum ThermostatCommand {
    HvacMode(String),
    Temperature {
        temperature: Option<f64>,
        low: Option<f64>,
        high: Option<f64>,
    },
    Preset(String),
    FanMode(String),
    Humidity(f64),
    EcoMode(bool),
    FanTimer(u32),
    Scale(TemperatureScale),
}

impl ThermostatCommand {
    fn from_call(call: &ServiceCall) -> Result<Self, ServiceError> {
        Ok(match (call.domain.as_str(), call.service.as_str()) {
            (DOMAIN, SERVICE_SET_ECO_MODE) => Self::EcoMode(required(call, ATTR_ECO_MODE)?),
            (DOMAIN, SERVICE_SET_FAN_TIMER) => Self::FanTimer(fan_timer_duration(call)?),
            (DOMAIN, SERVICE_SET_TEMPERATURE_SCALE) => {
                let scale: String = required(call, ATTR_TEMPERATURE_SCALE)?;
                Self::Scale(TemperatureScale::parse(&scale).ok_or_else(|| {
                    ServiceError::InvalidData(format!("temperature_scale {} must be C or F", scale))
                })?)
            }
            (_, "set_hvac_mode") => Self::HvacMode(required(call, "hvac_mode")?),
            (_, "set_temperature") => {
                let command = Self::Temperature {
                    temperature: call.get("temperature"),
                    low: call.get("target_temp_low"),
                    high: call.get("target_temp_high"),
                };
                if command
                    == (Self::Temperature {
                        temperature: None,
                        low: None,
                        high: None,
                    })
                {
                    return Err(ServiceError::InvalidData(
                        "temperature or target_temp_low/target_temp_high is required".into(),
                    ));
                }
                command
            }
            (_, "set_preset_mode") => Self::Preset(required(call, "preset_mode")?),
            (_, "set_fan_mode") => Self::FanMode(required(call, "fan_mode")?),
            (_, "set_humidity") => Self::Humidity(required(call, "humidity")?),
            (domain, service) => {
                return Err(ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                })
            }
        })
    }

    async fn apply(&self, thermostat: &mut NestThermostat) -> Result<(), EntityError> {
        match self {
            Self::HvacMode(mode) => thermostat.set_hvac_mode(mode).await,
            Self::Temperature {
                temperature,
                low,
                high,
            } => thermostat.set_temperature(*temperature, *low, *high).await,
            Self::Preset(preset) => thermostat.set_preset_mode(preset).await,
            Self::FanMode(mode) => thermostat.set_fan_mode(mode).await,
            Self::Humidity(humidity) => thermostat.set_humidity(*humidity).await,
            Self::EcoMode(eco) => thermostat.set_eco_mode(*eco).await,
            Self::FanTimer(minutes) => thermostat.set_fan_timer(*minutes).await,
            Self::Scale(scale) => thermostat.set_temperature_scale(*scale).await,
        }
    }
}

async fn run_thermostat_service(
    thermostats: Arc<DashMap<String, Target<NestThermostat>>>,
    call: ServiceCall,
) -> Result<Option<Value>, ServiceError> {
    let command = ThermostatCommand::from_call(&call)?;
    for (entity_id, target) in targets(&thermostats, &call) {
        debug!(entity_id = %entity_id, command = ?command, "Nest thermostat command");
        command
            .apply(&mut *target.entity.lock().await)
            .await
            .map_err(failed)?;
        if let Ok(id) = entity_id.parse() {
            target.platform.write_state(&id).await;
        }
    }
    Ok(None)
}

async fn run_humidifier_service(
    humidifiers: Arc<DashMap<String, Target<NestHumidifier>>>,
    call: ServiceCall,
) -> Result<Option<Value>, ServiceError> {
    for (entity_id, target) in targets(&humidifiers, &call) {
        let mut humidifier = target.entity.lock().await;
        match call.service.as_str() {
            "turn_on" => ha_helpers::Entity::turn_on(&mut *humidifier).await,
            "turn_off" => ha_helpers::Entity::turn_off(&mut *humidifier).await,
            "set_humidity" => {
                let humidity: f64 = required(&call, "humidity")?;
                humidifier.set_humidity(humidity).await
            }
            _ => {
                let mode: String = required(&call, "mode")?;
                humidifier.set_mode(&mode).await
            }
        }
        .map_err(failed)?;
        drop(humidifier);
        if let Ok(id) = entity_id.parse() {
            target.platform.write_state(&id).await;
        }
    }
    Ok(None)
}

/// `turn_on`/`turn_off` for Nest switches and cameras of one domain
async fn run_toggle_service(
    toggles: Arc<DashMap<String, Arc<EntityPlatform>>>,
    domain: &'static str,
    call: ServiceCall,
) -> Result<Option<Value>, ServiceError> {
    let on = call.service == "turn_on";
    let entity_ids: Vec<String> = match call.string_list("entity_id") {
        Some(ids) => ids,
        None => toggles.iter().map(|t| t.key().clone()).collect(),
    };
    for entity_id in entity_ids {
        if !entity_id.starts_with(&format!("{}.", domain)) {
            continue;
        }
        let Some(platform) = toggles.get(&entity_id).map(|p| p.clone()) else {
            continue;
        };
        platform.set_on(&entity_id, on).await.map_err(failed)?;
    }
    Ok(None)
}

/// Register every service of the integration
pub(crate) fn register_services(integration: &Nest) {
    let services = &integration.hass().services;

    for (service, schema) in [
        (
            SERVICE_SET_AWAY_MODE,
            json!({"required": [ATTR_AWAY_MODE], "optional": [ATTR_STRUCTURE]}),
        ),
        (
            SERVICE_SET_ETA,
            json!({"required": [ATTR_ETA], "optional": [ATTR_TRIP_ID, ATTR_ETA_WINDOW, ATTR_STRUCTURE]}),
        ),
        (
            SERVICE_CANCEL_ETA,
            json!({"required": [ATTR_TRIP_ID], "optional": [ATTR_STRUCTURE]}),
        ),
    ] {
        let accounts = integration.accounts.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service).with_schema(schema),
            move |call| run_structure_service(accounts.clone(), call),
        );
    }

    for (service, field) in [
        (SERVICE_SET_ECO_MODE, ATTR_ECO_MODE),
        (SERVICE_SET_FAN_TIMER, ATTR_DURATION),
        (SERVICE_SET_TEMPERATURE_SCALE, ATTR_TEMPERATURE_SCALE),
    ] {
        let thermostats = integration.thermostats.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service).with_schema(json!({
                "required": [field],
                "optional": ["entity_id"],
            })),
            move |call| run_thermostat_service(thermostats.clone(), call),
        );
    }

    for service in CLIMATE_SERVICES {
        let thermostats = integration.thermostats.clone();
        services.register_with_description(
            ServiceDescription::new(PLATFORM_CLIMATE, *service),
            move |call| run_thermostat_service(thermostats.clone(), call),
        );
    }

    for service in HUMIDIFIER_SERVICES {
        let humidifiers = integration.humidifiers.clone();
        services.register_with_description(
            ServiceDescription::new(PLATFORM_HUMIDIFIER, *service),
            move |call| run_humidifier_service(humidifiers.clone(), call),
        );
    }

    for domain in [PLATFORM_SWITCH, PLATFORM_CAMERA] {
        for service in ["turn_on", "turn_off"] {
            let toggles = integration.toggles.clone();
            services.register_with_description(
                ServiceDescription::new(domain, service),
                move |call| run_toggle_service(toggles.clone(), domain, call),
            );
        }
    }
}
