//! System monitor sensor entity

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use ha_core::constants::{
    DATA_GIBIBYTES, DATA_MEBIBYTES, DATA_RATE_MEGABYTES_PER_SECOND, DEVICE_CLASS_TIMESTAMP,
    PERCENTAGE, PLATFORM_SENSOR, STATE_OFF, STATE_ON, TEMP_CELSIUS,
};
use ha_core::util::{round_to, slugify};
use ha_helpers::{Entity, EntityError};
use tracing::warn;

use crate::source::{NetIo, SystemSource, TemperatureReading};

const CPU_ICON: &str = if cfg!(target_pointer_width = "64") {
    "mdi:cpu-64-bit"
} else {
    "mdi:cpu-32-bit"
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Sensor labels recognised as the CPU temperature
pub const CPU_SENSOR_PREFIXES: &[&str] = &[
    "amdgpu 1",
    "aml_thermal",
    "Core 0",
    "Core 1",
    "CPU Temperature",
    "CPU",
    "cpu-thermal 1",
    "cpu_thermal 1",
    "exynos-therm 1",
    "Package id 0",
    "Physical id 0",
    "radeon 1",
    "soc-thermal 1",
    "soc_thermal 1",
];

/// Static description of a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorType {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    /// The resource needs an argument (interface, process name)
    pub requires_arg: bool,
}

const fn sensor_type(
    key: &'static str,
    name: &'static str,
    unit: Option<&'static str>,
    icon: &'static str,
    device_class: Option<&'static str>,
    requires_arg: bool,
) -> SensorType {
    SensorType {
        key,
        name,
        unit,
        icon,
        device_class,
        requires_arg,
    }
}

pub const SENSOR_TYPES: &[SensorType] = &[
    sensor_type("disk_free", "Disk free", Some(DATA_GIBIBYTES), "mdi:harddisk", None, false),
    sensor_type("disk_use", "Disk use", Some(DATA_GIBIBYTES), "mdi:harddisk", None, false),
    sensor_type("disk_use_percent", "Disk use (percent)", Some(PERCENTAGE), "mdi:harddisk", None, false),
    sensor_type("ipv4_address", "IPv4 address", None, "mdi:server-network", None, true),
    sensor_type("ipv6_address", "IPv6 address", None, "mdi:server-network", None, true),
    sensor_type("last_boot", "Last boot", None, "mdi:clock", Some(DEVICE_CLASS_TIMESTAMP), false),
    sensor_type("load_15m", "Load (15m)", None, CPU_ICON, None, false),
    sensor_type("load_1m", "Load (1m)", None, CPU_ICON, None, false),
    sensor_type("load_5m", "Load (5m)", None, CPU_ICON, None, false),
    sensor_type("memory_free", "Memory free", Some(DATA_MEBIBYTES), "mdi:memory", None, false),
    sensor_type("memory_use", "Memory use", Some(DATA_MEBIBYTES), "mdi:memory", None, false),
    sensor_type("memory_use_percent", "Memory use (percent)", Some(PERCENTAGE), "mdi:memory", None, false),
    sensor_type("network_in", "Network in", Some(DATA_MEBIBYTES), "mdi:server-network", None, true),
    sensor_type("network_out", "Network out", Some(DATA_MEBIBYTES), "mdi:server-network", None, true),
    sensor_type("packets_in", "Packets in", None, "mdi:server-network", None, true),
    sensor_type("packets_out", "Packets out", None, "mdi:server-network", None, true),
    sensor_type(
        "throughput_network_in",
        "Network throughput in",
        Some(DATA_RATE_MEGABYTES_PER_SECOND),
        "mdi:server-network",
        None,
        true,
    ),
    sensor_type(
        "throughput_network_out",
        "Network throughput out",
        Some(DATA_RATE_MEGABYTES_PER_SECOND),
        "mdi:server-network",
        None,
        true,
    ),
    sensor_type("process", "Process", None, CPU_ICON, None, true),
    sensor_type("processor_use", "Processor use (percent)", Some(PERCENTAGE), CPU_ICON, None, false),
    sensor_type("processor_temperature", "Processor temperature", Some(TEMP_CELSIUS), CPU_ICON, None, false),
    sensor_type("swap_free", "Swap free", Some(DATA_MEBIBYTES), "mdi:harddisk", None, false),
    sensor_type("swap_use", "Swap use", Some(DATA_MEBIBYTES), "mdi:harddisk", None, false),
    sensor_type("swap_use_percent", "Swap use (percent)", Some(PERCENTAGE), "mdi:harddisk", None, false),
];

/// Look up a resource type by key
pub fn sensor_type_for(key: &str) -> Option<&'static SensorType> {
    SENSOR_TYPES.iter().find(|t| t.key == key)
}

/// Format a rounded value the way the frontend expects (`12.0`, not `12`)
fn decimal(value: f64, digits: u32) -> String {
    let rounded = round_to(value, digits);
    if rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        rounded.to_string()
    }
}

/// The CPU temperature, if any sensor carries a recognised label
///
/// Unlabelled sensors are named `"{chip} {n}"` with `n` counting from 1
/// within the chip.
pub fn cpu_temperature(readings: &[TemperatureReading]) -> Option<f64> {
    let mut position: std::collections::HashMap<&str, usize> = Default::default();
    for reading in readings {
        let n = position.entry(reading.name.as_str()).or_insert(0);
        *n += 1;
        let label = if reading.label.is_empty() {
            format!("{} {}", reading.name, n)
        } else {
            reading.label.clone()
        };
        if CPU_SENSOR_PREFIXES.contains(&label.as_str()) {
            return Some(round_to(reading.current, 1));
        }
    }
    None
}

/// One system resource reported as a sensor
pub struct SystemMonitorSensor {
    source: Arc<dyn SystemSource>,
    sensor_type: &'static SensorType,
    argument: Option<String>,
    state: Option<String>,
    last_counter: Option<(u64, Instant)>,
}

impl SystemMonitorSensor {
    pub fn new(
        source: Arc<dyn SystemSource>,
        sensor_type: &'static SensorType,
        argument: Option<String>,
    ) -> Self {
        Self {
            source,
            sensor_type,
            argument,
            state: None,
            last_counter: None,
        }
    }

    pub fn sensor_type(&self) -> &'static SensorType {
        self.sensor_type
    }

    fn arg(&self) -> &str {
        self.argument.as_deref().unwrap_or_default()
    }

    fn counter(io: NetIo, key: &str) -> u64 {
        match key {
            "network_out" | "throughput_network_out" => io.bytes_sent,
            "network_in" | "throughput_network_in" => io.bytes_recv,
            "packets_out" => io.packets_sent,
            _ => io.packets_recv,
        }
    }

    /// Rate in MB/s since the previous sample; only when the counter grew
    fn throughput(&mut self, counter: u64, now: Instant) -> Option<String> {
        let rate = match self.last_counter {
            Some((last, at)) if last > 0 && last < counter => {
                let elapsed = now.duration_since(at).as_secs();
                (elapsed > 0).then(|| {
                    decimal(
                        (counter - last) as f64 / 1_000_000.0 / elapsed as f64,
                        3,
                    )
                })
            }
            _ => None,
        };
        self.last_counter = Some((counter, now));
        rate
    }

    /// Take one reading at `now`
    pub fn sample(&mut self, now: Instant) -> Option<String> {
        let source = self.source.clone();
        let arg = self.arg().to_string();
        match self.sensor_type.key {
            "disk_use_percent" => source.disk_usage(&arg).map(|d| decimal(d.percent(), 1)),
            "disk_use" => source.disk_usage(&arg).map(|d| decimal(d.used as f64 / GIB, 1)),
            "disk_free" => source.disk_usage(&arg).map(|d| decimal(d.free as f64 / GIB, 1)),
            "memory_use_percent" => Some(decimal(source.memory().percent(), 1)),
            "memory_use" => Some(decimal(source.memory().used() as f64 / MIB, 1)),
            "memory_free" => Some(decimal(source.memory().available as f64 / MIB, 1)),
            "swap_use_percent" => Some(decimal(source.swap().percent(), 1)),
            "swap_use" => Some(decimal(source.swap().used as f64 / MIB, 1)),
            "swap_free" => Some(decimal(source.swap().free as f64 / MIB, 1)),
            "processor_use" => Some(format!("{}", source.cpu_percent().round() as i64)),
            "processor_temperature" => {
                cpu_temperature(&source.temperatures()).map(|t| decimal(t, 1))
            }
            "process" => Some(
                if source.process_running(&arg) {
                    STATE_ON
                } else {
                    STATE_OFF
                }
                .to_string(),
            ),
            key @ ("network_in" | "network_out") => source
                .net_io(&arg)
                .map(|io| decimal(Self::counter(io, key) as f64 / MIB, 1)),
            key @ ("packets_in" | "packets_out") => source
                .net_io(&arg)
                .map(|io| Self::counter(io, key).to_string()),
            key @ ("throughput_network_in" | "throughput_network_out") => {
                let counter = source.net_io(&arg).map(|io| Self::counter(io, key))?;
                self.throughput(counter, now)
            }
            key @ ("ipv4_address" | "ipv6_address") => {
                let want_v4 = key == "ipv4_address";
                source
                    .interface_addresses(&arg)?
                    .into_iter()
                    .filter(|addr| matches!(addr, IpAddr::V4(_)) == want_v4)
                    .last()
                    .map(|addr| addr.to_string())
            }
            "last_boot" => DateTime::from_timestamp(source.boot_time() as i64, 0)
                .map(|boot| boot.with_timezone(&Local).to_rfc3339()),
            "load_1m" => Some(decimal(source.load_average().one, 2)),
            "load_5m" => Some(decimal(source.load_average().five, 2)),
            "load_15m" => Some(decimal(source.load_average().fifteen, 2)),
            other => {
                warn!("Unknown system monitor resource '{}'", other);
                None
            }
        }
    }
}

#[async_trait]
impl Entity for SystemMonitorSensor {
    fn domain(&self) -> &'static str {
        PLATFORM_SENSOR
    }

    fn unique_id(&self) -> Option<String> {
        Some(match &self.argument {
            Some(arg) => slugify(&format!("{}_{}", self.sensor_type.key, arg)),
            None => slugify(self.sensor_type.key),
        })
    }

    fn name(&self) -> String {
        match &self.argument {
            Some(arg) => format!("{} {}", self.sensor_type.name, arg),
            None => self.sensor_type.name.to_string(),
        }
        .trim_end()
        .to_string()
    }

    fn state(&self) -> Option<String> {
        self.state.clone()
    }

    fn icon(&self) -> Option<String> {
        Some(self.sensor_type.icon.to_string())
    }

    fn device_class(&self) -> Option<String> {
        self.sensor_type.device_class.map(String::from)
    }

    fn unit_of_measurement(&self) -> Option<String> {
        self.sensor_type.unit.map(String::from)
    }

    async fn update(&mut self) -> Result<(), EntityError> {
        self.state = self.sample(Instant::now());
        Ok(())
    }
}
