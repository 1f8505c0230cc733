//! Capability names and the capabilities each platform claims

use ha_core::constants::{
    PLATFORM_BINARY_SENSOR, PLATFORM_CLIMATE, PLATFORM_COVER, PLATFORM_FAN, PLATFORM_LIGHT,
    PLATFORM_LOCK, PLATFORM_SCENE, PLATFORM_SENSOR, PLATFORM_SWITCH,
};

pub const ACCELERATION_SENSOR: &str = "accelerationSensor";
pub const AIR_CONDITIONER_FAN_MODE: &str = "airConditionerFanMode";
pub const AIR_CONDITIONER_MODE: &str = "airConditionerMode";
pub const BATTERY: &str = "battery";
pub const BUTTON: &str = "button";
pub const COLOR_CONTROL: &str = "colorControl";
pub const COLOR_TEMPERATURE: &str = "colorTemperature";
pub const CONTACT_SENSOR: &str = "contactSensor";
pub const DEMAND_RESPONSE_LOAD_CONTROL: &str = "demandResponseLoadControl";
pub const DOOR_CONTROL: &str = "doorControl";
pub const ENERGY_METER: &str = "energyMeter";
pub const FAN_SPEED: &str = "fanSpeed";
pub const FILTER_STATUS: &str = "filterStatus";
pub const GARAGE_DOOR_CONTROL: &str = "garageDoorControl";
pub const LOCK: &str = "lock";
pub const MOTION_SENSOR: &str = "motionSensor";
pub const POWER_CONSUMPTION_REPORT: &str = "powerConsumptionReport";
pub const POWER_METER: &str = "powerMeter";
pub const PRESENCE_SENSOR: &str = "presenceSensor";
pub const RELATIVE_HUMIDITY_MEASUREMENT: &str = "relativeHumidityMeasurement";
pub const SOUND_SENSOR: &str = "soundSensor";
pub const SWITCH: &str = "switch";
pub const SWITCH_LEVEL: &str = "switchLevel";
pub const TAMPER_ALERT: &str = "tamperAlert";
pub const TEMPERATURE_MEASUREMENT: &str = "temperatureMeasurement";
pub const THERMOSTAT: &str = "thermostat";
pub const THERMOSTAT_COOLING_SETPOINT: &str = "thermostatCoolingSetpoint";
pub const THERMOSTAT_FAN_MODE: &str = "thermostatFanMode";
pub const THERMOSTAT_HEATING_SETPOINT: &str = "thermostatHeatingSetpoint";
pub const THERMOSTAT_MODE: &str = "thermostatMode";
pub const THERMOSTAT_OPERATING_STATE: &str = "thermostatOperatingState";
pub const VALVE: &str = "valve";
pub const WATER_SENSOR: &str = "waterSensor";
pub const WINDOW_SHADE: &str = "windowShade";

/// Capabilities no platform handles
pub const IGNORED_CAPABILITIES: &[&str] = &["execute", "healthCheck", "ocf"];

/// Binary sensor capability → attribute it reads
pub const CAPABILITY_TO_ATTRIB: &[(&str, &str)] = &[
    (ACCELERATION_SENSOR, "acceleration"),
    (BUTTON, "button"),
    (CONTACT_SENSOR, "contact"),
    (FILTER_STATUS, "filterStatus"),
    (MOTION_SENSOR, "motion"),
    (PRESENCE_SENSOR, "presence"),
    (SOUND_SENSOR, "sound"),
    (TAMPER_ALERT, "tamper"),
    (VALVE, "valve"),
    (WATER_SENSOR, "water"),
];

const CLIMATE_CAPABILITIES: &[&str] = &[
    AIR_CONDITIONER_MODE,
    DEMAND_RESPONSE_LOAD_CONTROL,
    AIR_CONDITIONER_FAN_MODE,
    POWER_CONSUMPTION_REPORT,
    RELATIVE_HUMIDITY_MEASUREMENT,
    SWITCH,
    TEMPERATURE_MEASUREMENT,
    THERMOSTAT,
    THERMOSTAT_COOLING_SETPOINT,
    THERMOSTAT_FAN_MODE,
    THERMOSTAT_HEATING_SETPOINT,
    THERMOSTAT_MODE,
    THERMOSTAT_OPERATING_STATE,
];

const SENSOR_CAPABILITIES: &[&str] = &[
    "activityLightingMode",
    AIR_CONDITIONER_MODE,
    "airQualitySensor",
    "alarm",
    "audioVolume",
    BATTERY,
    "bodyMassIndexMeasurement",
    "bodyWeightMeasurement",
    "carbonDioxideMeasurement",
    "carbonMonoxideDetector",
    "carbonMonoxideMeasurement",
    "dishwasherOperatingState",
    "dryerMode",
    "dryerOperatingState",
    "dustSensor",
    ENERGY_METER,
    "equivalentCarbonDioxideMeasurement",
    "formaldehydeMeasurement",
    "illuminanceMeasurement",
    "infraredLevel",
    "mediaInputSource",
    "mediaPlaybackRepeat",
    "mediaPlaybackShuffle",
    "mediaPlayback",
    "odorSensor",
    "ovenMode",
    "ovenOperatingState",
    "ovenSetpoint",
    POWER_METER,
    "powerSource",
    "refrigerationSetpoint",
    RELATIVE_HUMIDITY_MEASUREMENT,
    "robotCleanerCleaningMode",
    "robotCleanerMovement",
    "robotCleanerTurboMode",
    "signalStrength",
    "smokeDetector",
    TEMPERATURE_MEASUREMENT,
    THERMOSTAT_COOLING_SETPOINT,
    THERMOSTAT_FAN_MODE,
    THERMOSTAT_HEATING_SETPOINT,
    THERMOSTAT_MODE,
    THERMOSTAT_OPERATING_STATE,
    "thermostatSetpoint",
    "threeAxis",
    "tvChannel",
    "tvocMeasurement",
    "ultravioletIndex",
    "voltageMeasurement",
    "washerMode",
    "washerOperatingState",
];

/// Entity platforms in the order they claim capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Climate,
    Fan,
    Light,
    Lock,
    Cover,
    Switch,
    BinarySensor,
    Sensor,
    Scene,
}

pub const SUPPORTED_PLATFORMS: [Platform; 9] = [
    Platform::Climate,
    Platform::Fan,
    Platform::Light,
    Platform::Lock,
    Platform::Cover,
    Platform::Switch,
    Platform::BinarySensor,
    Platform::Sensor,
    Platform::Scene,
];

fn has(capabilities: &[String], capability: &str) -> bool {
    capabilities.iter().any(|c| c == capability)
}

fn present(capabilities: &[String], candidates: &[&'static str]) -> Vec<&'static str> {
    candidates
        .iter()
        .copied()
        .filter(|c| has(capabilities, c))
        .collect()
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Climate => PLATFORM_CLIMATE,
            Self::Fan => PLATFORM_FAN,
            Self::Light => PLATFORM_LIGHT,
            Self::Lock => PLATFORM_LOCK,
            Self::Cover => PLATFORM_COVER,
            Self::Switch => PLATFORM_SWITCH,
            Self::BinarySensor => PLATFORM_BINARY_SENSOR,
            Self::Sensor => PLATFORM_SENSOR,
            Self::Scene => PLATFORM_SCENE,
        }
    }

    /// Capabilities this platform would claim from `capabilities`
    ///
    /// `None` means the device does not qualify for the platform. Scenes
    /// are not device capabilities and never claim any.
    pub fn get_capabilities(&self, capabilities: &[String]) -> Option<Vec<&'static str>> {
        match self {
            Self::Climate => {
                let thermostat = has(capabilities, THERMOSTAT)
                    || [TEMPERATURE_MEASUREMENT, THERMOSTAT_HEATING_SETPOINT, THERMOSTAT_MODE]
                        .iter()
                        .all(|c| has(capabilities, c));
                let air_conditioner = [
                    AIR_CONDITIONER_MODE,
                    AIR_CONDITIONER_FAN_MODE,
                    SWITCH,
                    TEMPERATURE_MEASUREMENT,
                    THERMOSTAT_COOLING_SETPOINT,
                ]
                .iter()
                .all(|c| has(capabilities, c));
                (thermostat || air_conditioner).then(|| CLIMATE_CAPABILITIES.to_vec())
            }
            Self::Fan => [SWITCH, FAN_SPEED]
                .iter()
                .all(|c| has(capabilities, c))
                .then(|| vec![SWITCH, FAN_SPEED]),
            Self::Light => {
                let dimmable = [SWITCH_LEVEL, COLOR_CONTROL, COLOR_TEMPERATURE]
                    .iter()
                    .any(|c| has(capabilities, c));
                (has(capabilities, SWITCH) && dimmable)
                    .then(|| vec![SWITCH, SWITCH_LEVEL, COLOR_CONTROL, COLOR_TEMPERATURE])
            }
            Self::Lock => has(capabilities, LOCK).then(|| vec![LOCK]),
            Self::Cover => {
                let controls = [DOOR_CONTROL, GARAGE_DOOR_CONTROL, WINDOW_SHADE];
                controls.iter().any(|c| has(capabilities, c)).then(|| {
                    let mut claimed = controls.to_vec();
                    claimed.extend([BATTERY, SWITCH_LEVEL]);
                    claimed
                })
            }
            Self::Switch => {
                has(capabilities, SWITCH).then(|| vec![SWITCH, ENERGY_METER, POWER_METER])
            }
            Self::BinarySensor => {
                let binary: Vec<&'static str> =
                    CAPABILITY_TO_ATTRIB.iter().map(|(cap, _)| *cap).collect();
                Some(present(capabilities, &binary))
            }
            Self::Sensor => Some(present(capabilities, SENSOR_CAPABILITIES)),
            Self::Scene => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute a binary sensor capability reads
pub fn binary_sensor_attribute(capability: &str) -> Option<&'static str> {
    CAPABILITY_TO_ATTRIB
        .iter()
        .find(|(cap, _)| *cap == capability)
        .map(|(_, attribute)| *attribute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_climate_rules() {
        assert!(Platform::Climate.get_capabilities(&caps(&[THERMOSTAT])).is_some());
        assert!(Platform::Climate
            .get_capabilities(&caps(&[
                TEMPERATURE_MEASUREMENT,
                THERMOSTAT_HEATING_SETPOINT,
                THERMOSTAT_MODE
            ]))
            .is_some());
        assert!(Platform::Climate
            .get_capabilities(&caps(&[TEMPERATURE_MEASUREMENT, THERMOSTAT_MODE]))
            .is_none());
    }

    #[test]
    fn test_light_needs_dimming_or_color() {
        assert!(Platform::Light.get_capabilities(&caps(&[SWITCH])).is_none());
        assert_eq!(
            Platform::Light
                .get_capabilities(&caps(&[SWITCH, SWITCH_LEVEL]))
                .map(|c| c.len()),
            Some(4)
        );
    }

    #[test]
    fn test_binary_sensor_claims_present_only() {
        let claimed = Platform::BinarySensor
            .get_capabilities(&caps(&[BATTERY, WATER_SENSOR, CONTACT_SENSOR]))
            .unwrap();
        assert_eq!(claimed, vec![CONTACT_SENSOR, WATER_SENSOR]);
        assert_eq!(binary_sensor_attribute(WATER_SENSOR), Some("water"));
        assert_eq!(Platform::Scene.get_capabilities(&caps(&[SWITCH])), None);
    }
}
