//! Constants shared across integrations

// ===== States =====

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_HOME: &str = "home";
pub const STATE_NOT_HOME: &str = "not_home";
pub const STATE_IDLE: &str = "idle";
pub const STATE_PLAYING: &str = "playing";
pub const STATE_PAUSED: &str = "paused";

pub const STATE_ALARM_DISARMED: &str = "disarmed";
pub const STATE_ALARM_ARMED_HOME: &str = "armed_home";
pub const STATE_ALARM_ARMED_AWAY: &str = "armed_away";
pub const STATE_ALARM_ARMED_NIGHT: &str = "armed_night";
pub const STATE_ALARM_ARMED_CUSTOM_BYPASS: &str = "armed_custom_bypass";
pub const STATE_ALARM_ARMING: &str = "arming";
pub const STATE_ALARM_DISARMING: &str = "disarming";
pub const STATE_ALARM_TRIGGERED: &str = "triggered";

// ===== Attributes =====

pub const ATTR_ATTRIBUTION: &str = "attribution";
pub const ATTR_BATTERY_LEVEL: &str = "battery_level";
pub const ATTR_DEVICE_CLASS: &str = "device_class";
pub const ATTR_ENTITY_ID: &str = "entity_id";
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
pub const ATTR_ICON: &str = "icon";
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";
pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";

// ===== Units =====

pub const PERCENTAGE: &str = "%";
pub const TEMP_CELSIUS: &str = "°C";
pub const TEMP_FAHRENHEIT: &str = "°F";
pub const DATA_GIBIBYTES: &str = "GiB";
pub const DATA_MEBIBYTES: &str = "MiB";
pub const DATA_RATE_MEGABYTES_PER_SECOND: &str = "MB/s";

// ===== Device classes =====

pub const DEVICE_CLASS_BATTERY: &str = "battery";
pub const DEVICE_CLASS_HUMIDITY: &str = "humidity";
pub const DEVICE_CLASS_TEMPERATURE: &str = "temperature";
pub const DEVICE_CLASS_TIMESTAMP: &str = "timestamp";
pub const DEVICE_CLASS_CONNECTIVITY: &str = "connectivity";
pub const DEVICE_CLASS_DOOR: &str = "door";
pub const DEVICE_CLASS_GAS: &str = "gas";
pub const DEVICE_CLASS_HEAT: &str = "heat";
pub const DEVICE_CLASS_LIGHT: &str = "light";
pub const DEVICE_CLASS_MOISTURE: &str = "moisture";
pub const DEVICE_CLASS_MOTION: &str = "motion";
pub const DEVICE_CLASS_MOVING: &str = "moving";
pub const DEVICE_CLASS_OCCUPANCY: &str = "occupancy";
pub const DEVICE_CLASS_OPENING: &str = "opening";
pub const DEVICE_CLASS_POWER: &str = "power";
pub const DEVICE_CLASS_PRESENCE: &str = "presence";
pub const DEVICE_CLASS_PROBLEM: &str = "problem";
pub const DEVICE_CLASS_SAFETY: &str = "safety";
pub const DEVICE_CLASS_SMOKE: &str = "smoke";
pub const DEVICE_CLASS_SOUND: &str = "sound";
pub const DEVICE_CLASS_VIBRATION: &str = "vibration";
pub const DEVICE_CLASS_WINDOW: &str = "window";

// ===== Entity platforms =====

pub const PLATFORM_ALARM_CONTROL_PANEL: &str = "alarm_control_panel";
pub const PLATFORM_BINARY_SENSOR: &str = "binary_sensor";
pub const PLATFORM_CAMERA: &str = "camera";
pub const PLATFORM_CLIMATE: &str = "climate";
pub const PLATFORM_COVER: &str = "cover";
pub const PLATFORM_FAN: &str = "fan";
pub const PLATFORM_HUMIDIFIER: &str = "humidifier";
pub const PLATFORM_LIGHT: &str = "light";
pub const PLATFORM_LOCK: &str = "lock";
pub const PLATFORM_MEDIA_PLAYER: &str = "media_player";
pub const PLATFORM_REMOTE: &str = "remote";
pub const PLATFORM_SCENE: &str = "scene";
pub const PLATFORM_SENSOR: &str = "sensor";
pub const PLATFORM_SWITCH: &str = "switch";
