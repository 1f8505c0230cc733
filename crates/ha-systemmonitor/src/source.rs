//! Where system readings come from
//!
//! [`SysinfoSource`] reads the running machine; tests substitute their own
//! [`SystemSource`].

use std::ffi::OsStr;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use sysinfo::{Components, Disks, Networks, ProcessesToUpdate, System};

/// Space on one mounted filesystem, in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used, self.total)
    }
}

/// Physical memory, in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
}

impl MemoryUsage {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn percent(&self) -> f64 {
        percent(self.used(), self.total)
    }
}

/// Swap space, in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl SwapUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used, self.total)
    }
}

/// Cumulative counters of one network interface
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetIo {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// One temperature sensor; `label` may be empty
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub name: String,
    pub label: String,
    pub current: f64,
}

/// Load averages over 1, 5 and 15 minutes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Readings a system monitor sensor can take
pub trait SystemSource: Send + Sync {
    /// Usage of the filesystem mounted at `mount_point`
    fn disk_usage(&self, mount_point: &str) -> Option<DiskUsage>;

    fn memory(&self) -> MemoryUsage;

    fn swap(&self) -> SwapUsage;

    /// CPU use since the previous call, in percent
    fn cpu_percent(&self) -> f64;

    fn temperatures(&self) -> Vec<TemperatureReading>;

    /// Whether a process with exactly this name is running
    fn process_running(&self, name: &str) -> bool;

    fn net_io(&self, interface: &str) -> Option<NetIo>;

    /// Addresses of an interface; `None` when the interface does not exist
    fn interface_addresses(&self, interface: &str) -> Option<Vec<IpAddr>>;

    /// Boot time as seconds since the epoch
    fn boot_time(&self) -> u64;

    fn load_average(&self) -> LoadAverage;
}

/// Readings of the running machine
pub struct SysinfoSource {
    system: Mutex<System>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters; the first usage figure is relative to this
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }

    fn with_system<R>(&self, f: impl FnOnce(&mut System) -> R) -> R {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut system)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource for SysinfoSource {
    fn disk_usage(&self, mount_point: &str) -> Option<DiskUsage> {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(mount_point))?;
        let total = disk.total_space();
        let free = disk.available_space();
        Some(DiskUsage {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }

    fn memory(&self) -> MemoryUsage {
        self.with_system(|system| {
            system.refresh_memory();
            MemoryUsage {
                total: system.total_memory(),
                available: system.available_memory(),
            }
        })
    }

    fn swap(&self) -> SwapUsage {
        self.with_system(|system| {
            system.refresh_memory();
            SwapUsage {
                total: system.total_swap(),
                used: system.used_swap(),
                free: system.free_swap(),
            }
        })
    }

    fn cpu_percent(&self) -> f64 {
        self.with_system(|system| {
            system.refresh_cpu_usage();
            system.global_cpu_usage() as f64
        })
    }

    fn temperatures(&self) -> Vec<TemperatureReading> {
        let components = Components::new_with_refreshed_list();
        components
            .list()
            .iter()
            .map(|component| {
                // "coretemp Package id 0" → chip "coretemp", label "Package id 0"
                let full = component.label();
                let (name, label) = full.split_once(' ').unwrap_or((full, ""));
                TemperatureReading {
                    name: name.to_string(),
                    label: label.to_string(),
                    current: component.temperature() as f64,
                }
            })
            .collect()
    }

    fn process_running(&self, name: &str) -> bool {
        self.with_system(|system| {
            system.refresh_processes(ProcessesToUpdate::All, true);
            system
                .processes()
                .values()
                .any(|process| process.name() == OsStr::new(name))
        })
    }

    fn net_io(&self, interface: &str) -> Option<NetIo> {
        let networks = Networks::new_with_refreshed_list();
        let data = networks.list().get(interface)?;
        Some(NetIo {
            bytes_sent: data.total_transmitted(),
            bytes_recv: data.total_received(),
            packets_sent: data.total_packets_transmitted(),
            packets_recv: data.total_packets_received(),
        })
    }

    fn interface_addresses(&self, interface: &str) -> Option<Vec<IpAddr>> {
        let networks = Networks::new_with_refreshed_list();
        let data = networks.list().get(interface)?;
        Some(data.ip_networks().iter().map(|network| network.addr).collect())
    }

    fn boot_time(&self) -> u64 {
        System::boot_time()
    }

    fn load_average(&self) -> LoadAverage {
        let load = System::load_average();
        LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        }
    }
}
