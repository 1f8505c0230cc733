//! BRAVIA media player entity

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_core::constants::{PLATFORM_MEDIA_PLAYER, STATE_OFF, STATE_ON};
use ha_helpers::{DataUpdateCoordinator, DeviceInfo, Entity, EntityError};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{BraviaClient, BraviaData, TV_FORMATS};
use crate::{
    device_info, entity_name, SourceConfig, TimeFormat, ATTR_APP_LIST, ATTR_COMMAND_LIST,
    SOURCE_APP,
};

pub const SUPPORT_PAUSE: u32 = 1;
pub const SUPPORT_VOLUME_SET: u32 = 4;
pub const SUPPORT_VOLUME_MUTE: u32 = 8;
pub const SUPPORT_PREVIOUS_TRACK: u32 = 16;
pub const SUPPORT_NEXT_TRACK: u32 = 32;
pub const SUPPORT_TURN_ON: u32 = 128;
pub const SUPPORT_TURN_OFF: u32 = 256;
pub const SUPPORT_VOLUME_STEP: u32 = 1024;
pub const SUPPORT_SELECT_SOURCE: u32 = 2048;
pub const SUPPORT_STOP: u32 = 4096;
pub const SUPPORT_PLAY: u32 = 16384;

pub const SUPPORTED_FEATURES: u32 = SUPPORT_PAUSE
    | SUPPORT_VOLUME_STEP
    | SUPPORT_VOLUME_MUTE
    | SUPPORT_VOLUME_SET
    | SUPPORT_PREVIOUS_TRACK
    | SUPPORT_NEXT_TRACK
    | SUPPORT_TURN_ON
    | SUPPORT_TURN_OFF
    | SUPPORT_SELECT_SOURCE
    | SUPPORT_PLAY
    | SUPPORT_STOP;

pub const DEVICE_CLASS_TV: &str = "tv";
pub const MEDIA_TYPE_APP: &str = "app";
pub const MEDIA_TYPE_TVSHOW: &str = "tvshow";
pub const MEDIA_TYPE_VIDEO: &str = "video";

/// Render an `HH:MM` time in the configured format
pub fn format_time(raw: &str, format: TimeFormat) -> String {
    if format != TimeFormat::TwelveHour {
        return raw.to_string();
    }
    let Some((hours, minutes)) = raw
        .split_once(':')
        .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
    else {
        return raw.to_string();
    };
    let (hours, suffix) = match hours {
        0 => (12, "AM"),
        1..=11 => (hours, "AM"),
        12 => (12, "PM"),
        _ => (hours - 12, "PM"),
    };
    format!("{}:{:02} {}", hours, minutes, suffix)
}

/// The TV as a media player
pub struct BraviaMediaPlayer {
    client: Arc<BraviaClient>,
    coordinator: Arc<DataUpdateCoordinator<BraviaData>>,
    ext_speaker: bool,
    source_config: Vec<SourceConfig>,
    time_format: TimeFormat,
    app_icon: Option<String>,
    app_title: Option<String>,
    playing: bool,
}

impl BraviaMediaPlayer {
    pub fn new(
        client: Arc<BraviaClient>,
        coordinator: Arc<DataUpdateCoordinator<BraviaData>>,
        ext_speaker: bool,
        source_config: Vec<SourceConfig>,
        time_format: TimeFormat,
    ) -> Self {
        Self {
            client,
            coordinator,
            ext_speaker,
            source_config,
            time_format,
            app_icon: None,
            app_title: None,
            playing: false,
        }
    }

    fn data(&self) -> Arc<BraviaData> {
        self.coordinator.data().unwrap_or_default()
    }

    fn source_entry(&self, source: &str) -> Option<&SourceConfig> {
        self.source_config.iter().find(|c| c.source == source)
    }

    fn display_name(&self, source: &str) -> String {
        self.source_entry(source)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| source.to_string())
    }

    /// Sources after hiding and renaming, label → uri
    pub fn sources(&self) -> IndexMap<String, String> {
        self.data()
            .sources
            .iter()
            .filter(|(label, _)| !self.source_entry(label).is_some_and(|c| c.hidden))
            .map(|(label, uri)| (self.display_name(label), uri.clone()))
            .collect()
    }

    fn title(&self, data: &BraviaData) -> Option<String> {
        data.title.as_deref().map(|t| self.display_name(t))
    }

    fn on_tv_source(&self, data: &BraviaData) -> bool {
        data.source
            .as_deref()
            .is_some_and(|s| TV_FORMATS.contains(&s))
    }

    /// Forget the launched app once something with a title plays
    pub fn observe_snapshot(&mut self) {
        if self.data().title.is_some() {
            self.reset_app_info();
        }
    }

    fn reset_app_info(&mut self) {
        self.app_icon = None;
        self.app_title = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn media_title(&self) -> Option<String> {
        let data = self.data();
        let title = self.title(&data)?;
        Some(match &data.display_number {
            Some(number) => format!("{}: {}", number, title),
            None => title,
        })
    }

    pub fn media_series_title(&self) -> Option<String> {
        let data = self.data();
        let program = data.program_title.clone()?;
        Some(match (&data.start_time, &data.end_time) {
            (Some(start), Some(end)) => format!(
                "{} | {} - {}",
                program,
                format_time(start, self.time_format),
                format_time(end, self.time_format)
            ),
            _ => program,
        })
    }

    pub fn media_content_type(&self) -> &'static str {
        let data = self.data();
        if self.title(&data).is_none() {
            MEDIA_TYPE_APP
        } else if self.on_tv_source(&data) {
            MEDIA_TYPE_TVSHOW
        } else {
            MEDIA_TYPE_VIDEO
        }
    }

    /// Current source: the launched app, the playing title, else `App`
    pub fn source(&self) -> String {
        if let Some(app) = &self.app_title {
            return app.clone();
        }
        self.title(&self.data())
            .unwrap_or_else(|| SOURCE_APP.to_string())
    }

    /// The running app, `None` while a titled programme plays
    pub fn app_name(&self) -> Option<String> {
        if let Some(app) = &self.app_title {
            return Some(app.clone());
        }
        match self.title(&self.data()) {
            Some(_) => None,
            None => Some(SOURCE_APP.to_string()),
        }
    }

    pub fn volume_level(&self) -> Option<f64> {
        self.data().volume.map(|v| f64::from(v) / 100.0)
    }

    // ===== Commands =====

    async fn press(&self, key: &str) -> Result<(), EntityError> {
        let code = self
            .data()
            .commands
            .get(key)
            .cloned()
            .ok_or_else(|| EntityError::Failed(format!("Remote key {} not available", key)))?;
        self.client.send_ircc(&code).await.map_err(failed)
    }

    pub async fn set_volume_level(&mut self, volume: f64) -> Result<(), EntityError> {
        if self.ext_speaker {
            return Err(EntityError::NotSupported("volume_set"));
        }
        self.client.set_audio_volume(volume).await.map_err(failed)
    }

    pub async fn volume_up(&mut self) -> Result<(), EntityError> {
        self.press("VolumeUp").await
    }

    pub async fn volume_down(&mut self) -> Result<(), EntityError> {
        self.press("VolumeDown").await
    }

    pub async fn mute_volume(&mut self, mute: bool) -> Result<(), EntityError> {
        self.client.set_audio_mute(mute).await.map_err(failed)
    }

    /// Play a source by its (renamed) label; unknown labels are ignored
    pub async fn select_source(&mut self, source: &str) -> Result<(), EntityError> {
        let Some(uri) = self.sources().get(source).cloned() else {
            debug!(source, "Unknown source");
            return Ok(());
        };
        self.client.set_play_content(&uri).await.map_err(failed)?;
        self.reset_app_info();
        Ok(())
    }

    pub async fn media_play(&mut self) -> Result<(), EntityError> {
        self.press("Play").await?;
        self.playing = true;
        Ok(())
    }

    pub async fn media_pause(&mut self) -> Result<(), EntityError> {
        let key = if self.on_tv_source(&self.data()) {
            "TvPause"
        } else {
            "Pause"
        };
        self.press(key).await?;
        self.playing = false;
        Ok(())
    }

    pub async fn media_stop(&mut self) -> Result<(), EntityError> {
        self.press("Stop").await?;
        self.playing = false;
        Ok(())
    }

    pub async fn media_next_track(&mut self) -> Result<(), EntityError> {
        let key = if self.on_tv_source(&self.data()) {
            "ChannelUp"
        } else {
            "Next"
        };
        self.press(key).await
    }

    pub async fn media_previous_track(&mut self) -> Result<(), EntityError> {
        let key = if self.on_tv_source(&self.data()) {
            "ChannelDown"
        } else {
            "Prev"
        };
        self.press(key).await
    }

    /// Launch an installed app by title while the TV is on
    pub async fn open_app(&mut self, app: &str) -> Result<(), EntityError> {
        let data = self.data();
        let Some(found) = data.apps.get(app).filter(|_| data.is_active()) else {
            debug!(app, "App not available");
            return Ok(());
        };
        self.client.set_active_app(&found.uri).await.map_err(failed)?;
        self.app_icon = found.icon.clone();
        self.app_title = Some(app.to_string());
        Ok(())
    }

    /// Press a remote key by name; unknown names are ignored
    pub async fn send_command(&mut self, command: &str) -> Result<(), EntityError> {
        if !self.data().commands.contains_key(command) {
            debug!(command, "Unknown remote key");
            return Ok(());
        }
        self.press(command).await
    }
}

fn failed(err: impl std::fmt::Display) -> EntityError {
    EntityError::Failed(err.to_string())
}

#[async_trait]
impl Entity for BraviaMediaPlayer {
    fn domain(&self) -> &'static str {
        PLATFORM_MEDIA_PLAYER
    }

    fn unique_id(&self) -> Option<String> {
        let cid = self.data().system.cid.clone()?;
        Some(format!("{}-{}", cid, PLATFORM_MEDIA_PLAYER))
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
        if !data.is_active() {
            return attrs;
        }

        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                attrs.insert(key.to_string(), value);
            }
        };
        put("volume_level", self.volume_level().map(|v| json!(v)));
        put("is_volume_muted", data.mute.map(|m| json!(m)));
        put(
            "media_content_id",
            Some(json!(self.title(&data).unwrap_or_else(|| SOURCE_APP.to_string()))),
        );
        put("media_content_type", Some(json!(self.media_content_type())));
        put("media_title", self.media_title().map(|t| json!(t)));
        put("media_series_title", self.media_series_title().map(|t| json!(t)));
        put("media_image_url", self.app_icon.clone().map(|i| json!(i)));
        put("app_id", self.app_name().map(|a| json!(a)));
        put("app_name", self.app_name().map(|a| json!(a)));
        put("source", Some(json!(self.source())));
        put(
            "source_list",
            Some(json!(self.sources().keys().collect::<Vec<_>>())),
        );

        if !data.apps.is_empty() {
            let mut apps: Vec<&String> = data.apps.keys().collect();
            apps.sort();
            put(ATTR_APP_LIST, Some(json!(apps)));
        }
        if !data.commands.is_empty() {
            let mut commands: Vec<&String> = data.commands.keys().collect();
            commands.sort();
            put(ATTR_COMMAND_LIST, Some(json!(commands)));
        }
        attrs
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn device_class(&self) -> Option<String> {
        Some(DEVICE_CLASS_TV.to_string())
    }

    fn supported_features(&self) -> u32 {
        if self.ext_speaker {
            SUPPORTED_FEATURES & !SUPPORT_VOLUME_SET
        } else {
            SUPPORTED_FEATURES
        }
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        device_info(&self.data())
    }

    fn should_poll(&self) -> bool {
        false
    }

    async fn turn_on(&mut self) -> Result<(), EntityError> {
        self.client.turn_on().await.map_err(failed)?;
        self.reset_app_info();
        Ok(())
    }

    async fn turn_off(&mut self) -> Result<(), EntityError> {
        self.client.set_power_status(false).await.map_err(failed)?;
        self.reset_app_info();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::App;
    use std::time::Duration;

    fn player(data: BraviaData, source_config: Vec<SourceConfig>) -> BraviaMediaPlayer {
        let client = Arc::new(BraviaClient::with_client(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "0000",
        ));
        let coordinator = Arc::new(DataUpdateCoordinator::new(
            "test",
            Duration::from_secs(30),
            || async { Ok(BraviaData::default()) },
        ));
        coordinator.set_updated_data(data);
        BraviaMediaPlayer::new(client, coordinator, false, source_config, TimeFormat::TwelveHour)
    }

    fn active() -> BraviaData {
        let mut data = BraviaData {
            available: true,
            power_status: Some("active".to_string()),
            volume: Some(25),
            mute: Some(false),
            ..Default::default()
        };
        data.system.name = Some("BRAVIA".to_string());
        data.system.model = Some("KD-55XF9005".to_string());
        data.system.cid = Some("cid-1".to_string());
        data.sources.insert("HDMI 1".to_string(), "extInput:hdmi?port=1".to_string());
        data.sources.insert("HDMI 2".to_string(), "extInput:hdmi?port=2".to_string());
        data.apps.insert(
            "YouTube".to_string(),
            App {
                uri: "com.sony.dtv.youtube".to_string(),
                icon: None,
            },
        );
        data.apps.insert(
            "Netflix".to_string(),
            App {
                uri: "com.sony.dtv.netflix".to_string(),
                icon: Some("http://icons/netflix.png".to_string()),
            },
        );
        data
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time("00:05", TimeFormat::TwelveHour), "12:05 AM");
        assert_eq!(format_time("09:30", TimeFormat::TwelveHour), "9:30 AM");
        assert_eq!(format_time("12:00", TimeFormat::TwelveHour), "12:00 PM");
        assert_eq!(format_time("23:45", TimeFormat::TwelveHour), "11:45 PM");
        assert_eq!(format_time("23:45", TimeFormat::TwentyFourHour), "23:45");
    }

    #[test]
    fn test_tv_programme() {
        let mut data = active();
        data.title = Some("BBC One".to_string());
        data.display_number = Some("001".to_string());
        data.program_title = Some("News".to_string());
        data.source = Some("tv:dvbt".to_string());
        data.start_time = Some("18:00".to_string());
        data.end_time = Some("18:30".to_string());
        let player = player(data, Vec::new());

        assert_eq!(player.state().as_deref(), Some("on"));
        assert_eq!(player.media_title().as_deref(), Some("001: BBC One"));
        assert_eq!(
            player.media_series_title().as_deref(),
            Some("News | 6:00 PM - 6:30 PM")
        );
        assert_eq!(player.media_content_type(), MEDIA_TYPE_TVSHOW);
        assert_eq!(player.source(), "BBC One");
        assert_eq!(player.app_name(), None);
    }

    #[test]
    fn test_app_in_front() {
        let player = player(active(), Vec::new());
        assert_eq!(player.media_content_type(), MEDIA_TYPE_APP);
        assert_eq!(player.source(), "App");
        assert_eq!(player.app_name().as_deref(), Some("App"));

        let attrs = player.attributes();
        assert_eq!(attrs["app_list"], json!(["Netflix", "YouTube"]));
        assert_eq!(attrs["volume_level"], json!(0.25));
        assert_eq!(attrs["media_content_id"], json!("App"));
        assert!(!attrs.contains_key("command_list"));
    }

    #[test]
    fn test_source_config_hides_and_renames() {
        let config = vec![
            SourceConfig {
                source: "HDMI 1".to_string(),
                hidden: false,
                name: Some("Apple TV".to_string()),
            },
            SourceConfig {
                source: "HDMI 2".to_string(),
                hidden: true,
                name: None,
            },
        ];
        let player = player(active(), config);
        let sources: Vec<String> = player.sources().keys().cloned().collect();
        assert_eq!(sources, vec!["Apple TV"]);
    }

    #[test]
    fn test_off_and_features() {
        let mut data = active();
        data.power_status = Some("standby".to_string());
        let mut player = player(data, Vec::new());
        assert_eq!(player.state().as_deref(), Some("off"));
        assert!(player.attributes().is_empty());
        assert_eq!(player.name(), "Sony BRAVIA KD-55XF9005");
        assert_eq!(player.unique_id().as_deref(), Some("cid-1-media_player"));
        assert_eq!(player.supported_features(), SUPPORTED_FEATURES);

        player.ext_speaker = true;
        assert_eq!(player.supported_features() & SUPPORT_VOLUME_SET, 0);
    }
}
