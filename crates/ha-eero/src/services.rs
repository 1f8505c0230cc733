//! `eero.*` services

use std::sync::Arc;

use ha_core::ServiceCall;
use ha_host::{Hass, ServiceDescription, ServiceError, ServiceResult};
use serde_json::json;
use tracing::{info, warn};

use crate::api::NightlightMode;
use crate::models::{Account, Eero, Network};
use crate::{EeroEntry, DOMAIN};

pub const SERVICE_RESTART_EERO: &str = "restart_eero";
pub const SERVICE_RESTART_NETWORK: &str = "restart_network";
pub const SERVICE_ENABLE_DNS_CACHING: &str = "enable_dns_caching";
pub const SERVICE_ENABLE_IPV6: &str = "enable_ipv6";
pub const SERVICE_ENABLE_THREAD: &str = "enable_thread";
pub const SERVICE_SET_NIGHTLIGHT_MODE: &str = "set_nightlight_mode";

pub const ATTR_TARGET_EERO: &str = "target_eero";
pub const ATTR_TARGET_NETWORK: &str = "target_network";
pub const ATTR_ENABLED: &str = "enabled";
pub const ATTR_MODE: &str = "mode";
pub const ATTR_TIME_ON: &str = "on";
pub const ATTR_TIME_OFF: &str = "off";

/// Lower-cased target names; `None` targets everything
fn targets(call: &ServiceCall, key: &str) -> Option<Vec<String>> {
    call.string_list(key)
        .map(|names| names.iter().map(|n| n.to_lowercase()).collect::<Vec<_>>())
        .filter(|names| !names.is_empty())
}

fn matches(targets: &Option<Vec<String>>, name: &str) -> bool {
    targets
        .as_ref()
        .map_or(true, |names| names.contains(&name.to_lowercase()))
}

/// Network ids whose name is targeted
fn target_networks(account: Account<'_>, call: &ServiceCall) -> Vec<String> {
    let wanted = targets(call, ATTR_TARGET_NETWORK);
    account
        .networks()
        .into_iter()
        .filter(|n| matches(&wanted, n.name()))
        .map(|n| n.id().to_string())
        .collect()
}

/// Eeros of the targeted networks whose name is targeted
fn target_eeros<'a>(account: Account<'a>, call: &ServiceCall) -> Vec<(Network<'a>, Eero<'a>)> {
    let networks = targets(call, ATTR_TARGET_NETWORK);
    let eeros = targets(call, ATTR_TARGET_EERO);
    account
        .networks()
        .into_iter()
        .filter(|n| matches(&networks, n.name()))
        .flat_map(|n| n.eeros().into_iter().map(move |e| (n, e)))
        .filter(|(_, e)| matches(&eeros, e.name()))
        .collect()
}

fn valid_time(value: &str) -> bool {
    chrono::NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

fn failed(err: impl std::fmt::Display) -> ServiceError {
    ServiceError::CallFailed(err.to_string())
}

/// Register the eero services for a loaded entry
pub fn register_services(hass: &Hass, entry: Arc<EeroEntry>) {
    let loaded = entry.clone();
    hass.services.register_with_description(
        ServiceDescription::new(DOMAIN, SERVICE_RESTART_EERO)
            .with_description("Reboot eeros, optionally filtered by eero and network name"),
        move |call: ServiceCall| {
            let entry = loaded.clone();
            async move {
                let data = entry.coordinator.data().ok_or_else(|| failed("no data"))?;
                let ids: Vec<String> = target_eeros(Account::new(&data), &call)
                    .iter()
                    .map(|(_, e)| e.id().to_string())
                    .collect();
                for id in ids {
                    info!(eero = %id, "Restarting eero");
                    entry.api.reboot_eero(&id).await.map_err(failed)?;
                }
                Ok(None)
            }
        },
    );

    let loaded = entry.clone();
    hass.services.register_with_description(
        ServiceDescription::new(DOMAIN, SERVICE_RESTART_NETWORK)
            .with_description("Reboot whole networks"),
        move |call: ServiceCall| {
            let entry = loaded.clone();
            async move {
                let data = entry.coordinator.data().ok_or_else(|| failed("no data"))?;
                for id in target_networks(Account::new(&data), &call) {
                    info!(network = %id, "Restarting network");
                    entry.api.reboot_network(&id).await.map_err(failed)?;
                }
                Ok(None)
            }
        },
    );

    for (service, setting) in [
        (SERVICE_ENABLE_DNS_CACHING, "dns_caching"),
        (SERVICE_ENABLE_IPV6, "ipv6_upstream"),
        (SERVICE_ENABLE_THREAD, "thread"),
    ] {
        let loaded = entry.clone();
        hass.services.register_with_description(
            ServiceDescription::new(DOMAIN, service).with_schema(json!({
                "required": [ATTR_ENABLED],
                "optional": [ATTR_TARGET_NETWORK],
            })),
            move |call: ServiceCall| {
                let entry = loaded.clone();
                async move {
                    let enabled: bool = call.get(ATTR_ENABLED).ok_or_else(|| {
                        ServiceError::InvalidData(format!("'{}' is required", ATTR_ENABLED))
                    })?;
                    let data = entry.coordinator.data().ok_or_else(|| failed("no data"))?;
                    for id in target_networks(Account::new(&data), &call) {
                        entry
                            .api
                            .set_network_setting(&id, setting, enabled)
                            .await
                            .map_err(failed)?;
                    }
                    let _ = entry.coordinator.refresh().await;
                    Ok(None)
                }
            },
        );
    }

    let loaded = entry;
    hass.services.register_with_description(
        ServiceDescription::new(DOMAIN, SERVICE_SET_NIGHTLIGHT_MODE)
            .with_description("Set the nightlight mode of eero Beacons"),
        move |call: ServiceCall| {
            let entry = loaded.clone();
            async move { set_nightlight_mode(&entry, &call).await }
        },
    );
}

async fn set_nightlight_mode(entry: &EeroEntry, call: &ServiceCall) -> ServiceResult {
    let mode: NightlightMode = call
        .get::<String>(ATTR_MODE)
        .ok_or_else(|| ServiceError::InvalidData(format!("'{}' is required", ATTR_MODE)))?
        .parse()
        .map_err(|e: crate::EeroError| ServiceError::InvalidData(e.to_string()))?;
    let time_on: Option<String> = call.get(ATTR_TIME_ON);
    let time_off: Option<String> = call.get(ATTR_TIME_OFF);
    for time in time_on.iter().chain(&time_off) {
        if !valid_time(time) {
            return Err(ServiceError::InvalidData(format!(
                "Invalid time format '{}', expected HH:MM",
                time
            )));
        }
    }

    let data = entry.coordinator.data().ok_or_else(|| failed("no data"))?;
    let beacons: Vec<(String, Option<String>, Option<String>)> =
        target_eeros(Account::new(&data), call)
            .into_iter()
            .filter(|(_, e)| e.is_beacon())
            .map(|(_, e)| {
                let (on, off) = e.nightlight_schedule();
                (
                    e.id().to_string(),
                    time_on.clone().or(on.map(String::from)),
                    time_off.clone().or(off.map(String::from)),
                )
            })
            .collect();

    for (id, on, off) in beacons {
        if mode == NightlightMode::Schedule && on.is_some() && on == off {
            warn!(eero = %id, "Nightlight schedule on and off times are equal, skipping");
            continue;
        }
        entry
            .api
            .set_nightlight(&id, mode, on.as_deref(), off.as_deref())
            .await
            .map_err(failed)?;
    }
    let _ = entry.coordinator.refresh().await;
    Ok(None)
}
