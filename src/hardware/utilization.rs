//! CPU / RAM / disk utilisation
//!
//! Direct OS counters through sysinfo. These are assumed always obtainable,
//! so there is no fallback chain here.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::probe::round1;

/// One utilisation sample, all values in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_percent: f64,
}

/// Source of utilisation samples.
pub trait UtilizationSource {
    /// Take a sample; may block for the CPU sampling window.
    fn sample(&mut self) -> Utilization;
}

/// Total and free bytes of one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeUsage {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// sysinfo-backed utilisation sampler.
pub struct SystemUtilization {
    system: System,
    volume: PathBuf,
    cpu_window: Duration,
}

impl SystemUtilization {
    pub fn new(volume: impl Into<PathBuf>, cpu_window: Duration) -> Self {
        let mut system = System::new();
        // Prime the counters so the first delta is meaningful
        system.refresh_cpu_usage();

        Self {
            system,
            volume: volume.into(),
            cpu_window: cpu_window.max(MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn cpu_percent(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        thread::sleep(self.cpu_window);
        self.system.refresh_cpu_usage();
        f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0)
    }

    fn ram_percent(&mut self) -> f64 {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (self.system.used_memory() as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }
}

impl UtilizationSource for SystemUtilization {
    fn sample(&mut self) -> Utilization {
        let cpu_percent = self.cpu_percent();
        let ram_percent = self.ram_percent();
        let disk_percent = volume_usage(&self.volume)
            .map(|usage| usage.used_percent())
            .unwrap_or(0.0);

        Utilization {
            cpu_percent: round1(cpu_percent),
            ram_percent: round1(ram_percent),
            disk_percent: round1(disk_percent.clamp(0.0, 100.0)),
        }
    }
}

/// Usage of the disk mounted at `volume`, falling back to the largest disk.
pub fn volume_usage(volume: &Path) -> Option<VolumeUsage> {
    let disks = Disks::new_with_refreshed_list();
    let wanted = normalize_mount(volume);

    disks
        .list()
        .iter()
        .find(|disk| normalize_mount(disk.mount_point()) == wanted)
        .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()))
        .map(|disk| VolumeUsage {
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
}

fn normalize_mount(path: &Path) -> String {
    let text = path.to_string_lossy().to_ascii_lowercase();
    let trimmed = text.trim_end_matches(&['\\', '/'][..]);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_percent() {
        let usage = VolumeUsage {
            total_bytes: 200,
            available_bytes: 50,
        };
        assert_eq!(usage.used_percent(), 75.0);

        let empty = VolumeUsage {
            total_bytes: 0,
            available_bytes: 0,
        };
        assert_eq!(empty.used_percent(), 0.0);
    }

    #[test]
    fn test_normalize_mount() {
        assert_eq!(normalize_mount(Path::new("C:\\")), "c:");
        assert_eq!(normalize_mount(Path::new("c:")), "c:");
        assert_eq!(normalize_mount(Path::new("/")), "/");
        assert_eq!(normalize_mount(Path::new("/home/")), "/home");
    }

    #[test]
    fn test_sample_is_in_range() {
        let mut source = SystemUtilization::new("/", Duration::from_millis(10));
        let sample = source.sample();
        for value in [sample.cpu_percent, sample.ram_percent, sample.disk_percent] {
            assert!((0.0..=100.0).contains(&value), "{value} out of range");
        }
    }
}
