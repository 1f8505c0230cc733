//! Nest camera with an ffmpeg SRTP stream
//!
//! The controller negotiates a [`StreamConfig`] per session; the accessory
//! turns it into an ffmpeg command line reading from the configured stream
//! source and writing SRTP video (and optionally audio) back to the
//! controller.

use std::process::Stdio;
use std::time::Duration;

use ha_core::constants::PLATFORM_CAMERA;
use ha_core::State;
use ha_nest::ATTR_STREAMING;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::accessory::{Accessory, AccessoryConfig, Category, ServiceRequest};
use crate::characteristic::*;
use crate::sensors::MotionServices;
use crate::HomeKitError;

pub const FFMPEG_WATCH_INTERVAL: Duration = Duration::from_secs(5);

const SLOW_RESOLUTIONS: [(u32, u32, u32); 2] = [(320, 180, 15), (320, 240, 15)];

const RESOLUTIONS: [(u32, u32); 12] = [
    (320, 180),
    (320, 240),
    (480, 270),
    (480, 360),
    (640, 360),
    (640, 480),
    (1024, 576),
    (1024, 768),
    (1280, 720),
    (1280, 960),
    (1600, 1200),
    (1920, 1080),
];

pub const VIDEO_PROFILE_NAMES: [&str; 3] = ["baseline", "main", "high"];

const STREAMING: usize = 0;

/// Streaming options of a camera accessory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Input handed to ffmpeg; `-i ` is prepended when missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_source: Option<String>,
    /// Address advertised to controllers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_address: Option<String>,
    pub support_audio: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: u32,
    pub audio_codec: String,
    pub audio_map: String,
    pub video_map: String,
    pub video_codec: String,
    pub audio_packet_size: u32,
    pub video_packet_size: u32,
    pub ffmpeg_bin: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            stream_source: None,
            stream_address: None,
            support_audio: false,
            max_width: 1920,
            max_height: 1080,
            max_fps: 30,
            audio_codec: "libopus".to_string(),
            audio_map: "0:a:0".to_string(),
            video_map: "0:v:0".to_string(),
            video_codec: "libx264".to_string(),
            audio_packet_size: 188,
            video_packet_size: 1316,
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}

impl CameraConfig {
    /// Resolutions offered to controllers as `(width, height, fps)`
    ///
    /// The slow variants are only offered when they are below `max_fps`.
    pub fn resolutions(&self) -> Vec<(u32, u32, u32)> {
        let fits = |w: u32, h: u32| w <= self.max_width && h <= self.max_height;
        SLOW_RESOLUTIONS
            .iter()
            .filter(|(w, h, fps)| fits(*w, *h) && *fps < self.max_fps)
            .copied()
            .chain(
                RESOLUTIONS
                    .iter()
                    .filter(|(w, h)| fits(*w, *h))
                    .map(|(w, h)| (*w, *h, self.max_fps)),
            )
            .collect()
    }
}

/// Parameters a controller negotiated for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub address: String,
    pub v_port: u16,
    pub a_port: u16,
    pub v_srtp_key: String,
    pub a_srtp_key: String,
    pub v_ssrc: u32,
    pub a_ssrc: u32,
    pub fps: u32,
    pub v_max_bitrate: u32,
    pub a_max_bitrate: u32,
    pub a_sample_rate: u32,
    /// Index into [`VIDEO_PROFILE_NAMES`]
    pub v_profile_id: u8,
}

fn video_output(config: &CameraConfig, stream: &StreamConfig) -> String {
    let profile = if config.video_codec == "copy" {
        String::new()
    } else {
        let name = VIDEO_PROFILE_NAMES
            .get(stream.v_profile_id as usize)
            .copied()
            .unwrap_or(VIDEO_PROFILE_NAMES[0]);
        format!("-profile:v {name} ")
    };
    format!(
        "-map {map} -an -c:v {codec} {profile}-tune zerolatency -pix_fmt yuv420p -r {fps} \
         -b:v {bitrate}k -bufsize {bufsize}k -maxrate {bitrate}k -payload_type 99 \
         -ssrc {ssrc} -f rtp -srtp_out_suite AES_CM_128_HMAC_SHA1_80 -srtp_out_params {key} \
         srtp://{address}:{port}?rtcpport={port}&localrtcpport={port}&pkt_size={pkt_size}",
        map = config.video_map,
        codec = config.video_codec,
        fps = stream.fps,
        bitrate = stream.v_max_bitrate,
        bufsize = stream.v_max_bitrate * 4,
        ssrc = stream.v_ssrc,
        key = stream.v_srtp_key,
        address = stream.address,
        port = stream.v_port,
        pkt_size = config.video_packet_size,
    )
}

fn audio_output(config: &CameraConfig, stream: &StreamConfig) -> String {
    let application = if config.audio_codec == "libopus" {
        "-application lowdelay "
    } else {
        ""
    };
    format!(
        "-map {map} -vn -c:a {codec} {application}-ac 1 -ar {rate}k \
         -b:a {bitrate}k -bufsize {bufsize}k -payload_type 110 \
         -ssrc {ssrc} -f rtp -srtp_out_suite AES_CM_128_HMAC_SHA1_80 -srtp_out_params {key} \
         srtp://{address}:{port}?rtcpport={port}&localrtcpport={port}&pkt_size={pkt_size}",
        map = config.audio_map,
        codec = config.audio_codec,
        rate = stream.a_sample_rate,
        bitrate = stream.a_max_bitrate,
        bufsize = stream.a_max_bitrate * 4,
        ssrc = stream.a_ssrc,
        key = stream.a_srtp_key,
        address = stream.address,
        port = stream.a_port,
        pkt_size = config.audio_packet_size,
    )
}

/// ffmpeg arguments for a session reading from `source`
pub fn ffmpeg_args(config: &CameraConfig, source: &str, stream: &StreamConfig) -> Vec<String> {
    let input = if source.contains("-i ") {
        source.to_string()
    } else {
        format!("-i {source}")
    };
    let mut output = video_output(config, stream);
    if config.support_audio {
        output.push(' ');
        output.push_str(&audio_output(config, stream));
    }
    debug!(%output, "FFmpeg output settings");
    input
        .split_whitespace()
        .chain(output.split_whitespace())
        .map(String::from)
        .collect()
}

struct StreamSession {
    id: String,
    process: Child,
}

pub struct NestCamera {
    entity_id: String,
    services: Vec<HkService>,
    motion: MotionServices,
    config: CameraConfig,
    session: Option<StreamSession>,
}

impl NestCamera {
    pub fn new(state: &State, config: &AccessoryConfig) -> Self {
        let prefix = config.prefix(state);
        let mut services = vec![
            HkService::new(SERV_SWITCH, format!("{prefix} Camera Streaming")).with(CHAR_ON, json!(false)),
        ];
        let motion = MotionServices::add(&mut services, &prefix, state);
        let mut camera = Self {
            entity_id: state.entity_id.to_string(),
            services,
            motion,
            config: config.camera.clone(),
            session: None,
        };
        camera.update_state(state);
        camera
    }

    /// Stream options advertised to controllers
    pub fn options(&self) -> Value {
        let resolutions: Vec<_> = self
            .config
            .resolutions()
            .into_iter()
            .map(|(w, h, fps)| json!([w, h, fps]))
            .collect();
        json!({
            "video": {
                "codec": {"profiles": [0, 1, 2], "levels": [0, 1, 2]},
                "resolutions": resolutions,
            },
            "audio": {
                "codecs": [
                    {"type": "OPUS", "samplerate": 24},
                    {"type": "OPUS", "samplerate": 16},
                ]
            },
            "address": self.config.stream_address,
            "srtp": true,
        })
    }

    /// Start ffmpeg for a session
    ///
    /// Returns whether the process is running once spawned.
    pub async fn start_stream(&mut self, session_id: &str, stream: &StreamConfig) -> Result<bool, HomeKitError> {
        debug!(session_id, ?stream, "Starting stream");
        let Some(source) = self.config.stream_source.clone() else {
            error!(entity_id = %self.entity_id, "Camera has no stream source");
            return Err(HomeKitError::NoStreamSource(self.entity_id.clone()));
        };
        let args = ffmpeg_args(&self.config, &source, stream);
        let process = Command::new(&self.config.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(session_id, pid = ?process.id(), "Started stream process");
        self.session = Some(StreamSession {
            id: session_id.to_string(),
            process,
        });
        Ok(self.watch_stream())
    }

    /// Check the stream process, dropping the session when it has exited
    pub fn watch_stream(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.process.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(session_id = %session.id, %status, "Streaming process ended unexpectedly");
                self.session = None;
                false
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Failed to check streaming process");
                self.session = None;
                false
            }
        }
    }

    /// Stop the session's ffmpeg process
    pub async fn stop_stream(&mut self, session_id: &str) {
        let Some(mut session) = self.session.take() else {
            debug!(session_id, "No stream for session");
            return;
        };
        if session.id != session_id {
            debug!(session_id, active = %session.id, "Not the active session");
            self.session = Some(session);
            return;
        }
        if let Ok(Some(_)) = session.process.try_wait() {
            info!(session_id, "Stream already stopped");
            return;
        }
        info!(session_id, "Stopping stream");
        if let Err(e) = session.process.kill().await {
            error!(session_id, error = %e, "Failed to stop stream");
        }
    }
}

impl Accessory for NestCamera {
    fn category(&self) -> Category {
        Category::Camera
    }

    fn services(&self) -> &[HkService] {
        &self.services
    }

    fn update_state(&mut self, state: &State) {
        let streaming = state
            .attributes
            .get(ATTR_STREAMING)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.services[STREAMING].set_value(CHAR_ON, json!(streaming));
        self.motion.update(&mut self.services, state);
    }

    fn set_chars(&mut self, service: usize, values: &CharValues, _state: &State) -> Vec<ServiceRequest> {
        if service != STREAMING {
            return Vec::new();
        }
        let Some(on) = values.get(CHAR_ON).and_then(Value::as_bool) else {
            return Vec::new();
        };
        debug!(entity_id = %self.entity_id, on, "Set streaming state");
        let service = if on { "turn_on" } else { "turn_off" };
        vec![ServiceRequest::new(PLATFORM_CAMERA, service, &self.entity_id)
            .with_event(format!("Streaming: {CHAR_ON} to {on}"))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, EntityId};
    use std::collections::HashMap;

    fn stream() -> StreamConfig {
        StreamConfig {
            address: "192.168.1.20".to_string(),
            v_port: 51246,
            a_port: 51248,
            v_srtp_key: "vkey".to_string(),
            a_srtp_key: "akey".to_string(),
            v_ssrc: 1001,
            a_ssrc: 1002,
            fps: 30,
            v_max_bitrate: 299,
            a_max_bitrate: 24,
            a_sample_rate: 24,
            v_profile_id: 1,
        }
    }

    fn camera_state() -> State {
        let attributes: HashMap<String, Value> = serde_json::from_value(json!({
            "friendly_name": "Front Door",
            "streaming": true,
            "online": true,
            "driveway_activity_detected": false
        }))
        .unwrap();
        State::new(
            EntityId::new("camera", "front_door").unwrap(),
            "streaming",
            attributes,
            Context::new(),
        )
    }

    #[test]
    fn test_resolutions() {
        let config = CameraConfig::default();
        let resolutions = config.resolutions();
        assert_eq!(resolutions[0], (320, 180, 15));
        assert_eq!(resolutions[2], (320, 180, 30));
        assert_eq!(resolutions.last(), Some(&(1920, 1080, 30)));
        assert_eq!(resolutions.len(), 13);

        let config = CameraConfig {
            max_width: 640,
            max_height: 480,
            max_fps: 15,
            ..CameraConfig::default()
        };
        let resolutions = config.resolutions();
        assert_eq!(resolutions.len(), 6);
        assert!(resolutions.iter().all(|(_, _, fps)| *fps == 15));
    }

    #[test]
    fn test_ffmpeg_args_video_only() {
        let args = ffmpeg_args(&CameraConfig::default(), "rtsp://10.0.0.5/live", &stream());
        let line = args.join(" ");
        assert!(line.starts_with("-i rtsp://10.0.0.5/live -map 0:v:0 -an -c:v libx264 -profile:v main "));
        assert!(line.contains("-b:v 299k -bufsize 1196k -maxrate 299k"));
        assert!(line.contains(
            "srtp://192.168.1.20:51246?rtcpport=51246&localrtcpport=51246&pkt_size=1316"
        ));
        assert!(!line.contains("-c:a"));
    }

    #[test]
    fn test_ffmpeg_args_copy_with_audio() {
        let config = CameraConfig {
            video_codec: "copy".to_string(),
            support_audio: true,
            ..CameraConfig::default()
        };
        let args = ffmpeg_args(&config, "-rtsp_transport tcp -i rtsp://cam", &stream());
        let line = args.join(" ");
        assert!(line.starts_with("-rtsp_transport tcp -i rtsp://cam -map"));
        assert!(!line.contains("-profile:v"));
        assert!(line.contains("-c:a libopus -application lowdelay -ac 1 -ar 24k"));
        assert!(line.contains("-b:a 24k -bufsize 96k"));
        assert!(line.ends_with("pkt_size=188"));
    }

    #[test]
    fn test_camera_services() {
        let mut camera = NestCamera::new(&camera_state(), &AccessoryConfig::default());
        let services = camera.services();
        assert_eq!(services[0].name(), "Front Door Camera Streaming");
        assert_eq!(services[0].value(CHAR_ON), Some(&json!(true)));
        assert_eq!(services[3].name(), "Front Door Driveway Motion");

        let values: CharValues = [(CHAR_ON.to_string(), json!(false))].into_iter().collect();
        let requests = camera.set_chars(0, &values, &camera_state());
        assert_eq!(requests[0].domain, "camera");
        assert_eq!(requests[0].service, "turn_off");
        assert!(camera.set_chars(1, &values, &camera_state()).is_empty());
    }

    #[tokio::test]
    async fn test_start_stream_without_source() {
        let mut camera = NestCamera::new(&camera_state(), &AccessoryConfig::default());
        assert!(matches!(
            camera.start_stream("s1", &stream()).await,
            Err(HomeKitError::NoStreamSource(_))
        ));
        assert!(!camera.watch_stream());
        camera.stop_stream("s1").await;
    }

    #[test]
    fn test_options() {
        let camera = NestCamera::new(&camera_state(), &AccessoryConfig::default());
        let options = camera.options();
        assert_eq!(options["srtp"], true);
        assert_eq!(options["video"]["resolutions"][0], json!([320, 180, 15]));
    }
}
