//! Entity services of the BRAVIA integration
//!
//! `sony_bravia.open_app` and `sony_bravia.send_command`, the media player
//! services and the remote services. Each targets entities by `entity_id`.

use std::sync::Arc;

use dashmap::DashMap;
use ha_core::constants::{PLATFORM_MEDIA_PLAYER, PLATFORM_REMOTE};
use ha_core::ServiceCall;
use ha_helpers::{Entity, EntityError};
use ha_host::{ServiceDescription, ServiceError};
use serde_json::json;
use tracing::debug;

use crate::media_player::BraviaMediaPlayer;
use crate::remote::BraviaRemote;
use crate::{SonyBravia, Target, ATTR_APP, ATTR_COMMAND, DOMAIN};

pub const SERVICE_OPEN_APP: &str = "open_app";
pub const SERVICE_SEND_COMMAND: &str = "send_command";

pub const ATTR_MEDIA_VOLUME_LEVEL: &str = "volume_level";
pub const ATTR_MEDIA_VOLUME_MUTED: &str = "is_volume_muted";
pub const ATTR_INPUT_SOURCE: &str = "source";
pub const ATTR_NUM_REPEATS: &str = "num_repeats";

const PLAYER_SERVICES: &[&str] = &[
    "turn_on",
    "turn_off",
    "volume_up",
    "volume_down",
    "volume_mute",
    "volume_set",
    "select_source",
    "media_play",
    "media_pause",
    "media_stop",
    "media_next_track",
    "media_previous_track",
];

const REMOTE_SERVICES: &[&str] = &["turn_on", "turn_off", "send_command"];

/// A media player action decoded from a service call
#[derive(Debug, Clone, PartialEq)]
enum PlayerCommand {
    TurnOn,
    TurnOff,
    VolumeUp,
    VolumeDown,
    Mute(bool),
    SetVolume(f64),
    SelectSource(String),
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    OpenApp(String),
    SendCommand(String),
}

fn required<T: serde::de::DeserializeOwned>(call: &ServiceCall, key: &str) -> Result<T, ServiceError> {
    call.get(key)
        .ok_or_else(|| ServiceError::InvalidData(format!("'{}' is required", key)))
}

impl PlayerCommand {
    fn from_call(call: &ServiceCall) -> Result<Self, ServiceError> {
        Ok(match (call.domain.as_str(), call.service.as_str()) {
            (DOMAIN, SERVICE_OPEN_APP) => Self::OpenApp(required(call, ATTR_APP)?),
            (DOMAIN, SERVICE_SEND_COMMAND) => Self::SendCommand(required(call, ATTR_COMMAND)?),
            (_, "turn_on") => Self::TurnOn,
            (_, "turn_off") => Self::TurnOff,
            (_, "volume_up") => Self::VolumeUp,
            (_, "volume_down") => Self::VolumeDown,
            (_, "volume_mute") => Self::Mute(required(call, ATTR_MEDIA_VOLUME_MUTED)?),
            (_, "volume_set") => {
                let level: f64 = required(call, ATTR_MEDIA_VOLUME_LEVEL)?;
                if !(0.0..=1.0).contains(&level) {
                    return Err(ServiceError::InvalidData(format!(
                        "volume_level {} is outside 0..1",
                        level
                    )));
                }
                Self::SetVolume(level)
            }
            (_, "select_source") => Self::SelectSource(required(call, ATTR_INPUT_SOURCE)?),
            (_, "media_play") => Self::Play,
            (_, "media_pause") => Self::Pause,
            (_, "media_stop") => Self::Stop,
            (_, "media_next_track") => Self::Next,
            (_, "media_previous_track") => Self::Previous,
            (domain, service) => {
                return Err(ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                })
            }
        })
    }

    async fn apply(&self, player: &mut BraviaMediaPlayer) -> Result<(), EntityError> {
        match self {
            Self::TurnOn => player.turn_on().await,
            Self::TurnOff => player.turn_off().await,
            Self::VolumeUp => player.volume_up().await,
            Self::VolumeDown => player.volume_down().await,
            Self::Mute(mute) => player.mute_volume(*mute).await,
            Self::SetVolume(level) => player.set_volume_level(*level).await,
            Self::SelectSource(source) => player.select_source(source).await,
            Self::Play => player.media_play().await,
            Self::Pause => player.media_pause().await,
            Self::Stop => player.media_stop().await,
            Self::Next => player.media_next_track().await,
            Self::Previous => player.media_previous_track().await,
            Self::OpenApp(app) => player.open_app(app).await,
            Self::SendCommand(command) => player.send_command(command).await,
        }
    }
}

fn failed(err: EntityError) -> ServiceError {
    ServiceError::CallFailed(err.to_string())
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

async fn run_player_service(
    players: Arc<DashMap<String, Target<BraviaMediaPlayer>>>,
    call: ServiceCall,
) -> Result<Option<serde_json::Value>, ServiceError> {
    let command = PlayerCommand::from_call(&call)?;
    for (entity_id, target) in targets(&players, &call) {
        debug!(entity_id = %entity_id, command = ?command, "BRAVIA media player command");
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

async fn run_remote_service(
    remotes: Arc<DashMap<String, Target<BraviaRemote>>>,
    call: ServiceCall,
) -> Result<Option<serde_json::Value>, ServiceError> {
    for (entity_id, target) in targets(&remotes, &call) {
        let mut remote = target.entity.lock().await;
        match call.service.as_str() {
            "turn_on" => remote.turn_on().await.map_err(failed)?,
            "turn_off" => remote.turn_off().await.map_err(failed)?,
            _ => {
                let commands: Vec<String> = call.string_list(ATTR_COMMAND).ok_or_else(|| {
                    ServiceError::InvalidData(format!("'{}' is required", ATTR_COMMAND))
                })?;
                let repeats: u32 = call.get(ATTR_NUM_REPEATS).unwrap_or(1);
                remote.send_command(&commands, repeats).await.map_err(failed)?;
            }
        }
        drop(remote);
        if let Ok(id) = entity_id.parse() {
            target.platform.write_state(&id).await;
        }
    }
    Ok(None)
}

/// Register every service of the integration
pub(crate) fn register_services(integration: &SonyBravia) {
    let services = &integration.hass().services;

    for (service, field) in [(SERVICE_OPEN_APP, ATTR_APP), (SERVICE_SEND_COMMAND, ATTR_COMMAND)] {
        let players = integration.players.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service).with_schema(json!({
                "required": [field],
                "optional": ["entity_id"],
            })),
            move |call| run_player_service(players.clone(), call),
        );
    }

    for service in PLAYER_SERVICES {
        let players = integration.players.clone();
        services.register_with_description(
            ServiceDescription::new(PLATFORM_MEDIA_PLAYER, *service),
            move |call| run_player_service(players.clone(), call),
        );
    }

    for service in REMOTE_SERVICES {
        let remotes = integration.remotes.clone();
        services.register_with_description(
            ServiceDescription::new(PLATFORM_REMOTE, *service),
            move |call| run_remote_service(remotes.clone(), call),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::Context;

    fn call(domain: &str, service: &str, data: serde_json::Value) -> ServiceCall {
        ServiceCall::new(domain, service, data, Context::new())
    }

    #[test]
    fn test_decode_player_commands() {
        assert_eq!(
            PlayerCommand::from_call(&call(DOMAIN, "open_app", json!({"app": "Netflix"}))).unwrap(),
            PlayerCommand::OpenApp("Netflix".to_string())
        );
        assert_eq!(
            PlayerCommand::from_call(&call("media_player", "volume_set", json!({"volume_level": 0.4})))
                .unwrap(),
            PlayerCommand::SetVolume(0.4)
        );
        assert!(matches!(
            PlayerCommand::from_call(&call("media_player", "volume_set", json!({"volume_level": 4}))),
            Err(ServiceError::InvalidData(_))
        ));
        assert!(matches!(
            PlayerCommand::from_call(&call(DOMAIN, "send_command", json!({}))),
            Err(ServiceError::InvalidData(_))
        ));
    }
}
