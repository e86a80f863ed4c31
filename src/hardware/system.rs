//! System information summary
//!
//! Static facts computed once per run for the report header; not part of
//! the per-tick reading.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sysinfo::System;

use super::cpu::CpuInfo;
use super::gpu::GpuInfo;
use super::script::ScriptRunner;
use super::utilization::volume_usage;
use crate::config::SensorConfig;

#[cfg(target_os = "windows")]
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(target_os = "windows")]
use windows_sys::Win32::Security::{
    GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
};
#[cfg(target_os = "windows")]
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Complete system information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name
    pub os: String,
    /// OS version
    pub os_version: Option<String>,
    /// CPU info
    pub cpu: CpuInfo,
    /// GPU info
    pub gpu: GpuInfo,
    /// Total RAM in GiB
    pub ram_total_gb: f64,
    /// Volume the disk % refers to
    pub disk_volume: String,
    /// Volume size in GiB
    pub disk_total_gb: Option<f64>,
    /// Free space in GiB
    pub disk_free_gb: Option<f64>,
    /// Selected CPU temperature method name (or "none")
    pub temp_cpu_method: String,
    /// Selected SSD temperature method name (or "none")
    pub temp_ssd_method: String,
    /// Running elevated (Windows only)
    pub elevated: Option<bool>,
}

impl SystemInfo {
    /// Detect all system information. Method names come from the live reader.
    pub fn detect(config: &SensorConfig, cpu_method: &str, ssd_method: &str) -> Result<Self> {
        let shell = ScriptRunner::new(Duration::from_secs(config.script_timeout_secs.max(1)));
        let cpu = CpuInfo::detect(&shell)?;
        let gpu = GpuInfo::detect(&shell);

        let mut sys = System::new();
        sys.refresh_memory();

        let disk = volume_usage(Path::new(&config.disk_volume));

        Ok(SystemInfo {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::long_os_version().or_else(System::os_version),
            cpu,
            gpu,
            ram_total_gb: round2(sys.total_memory() as f64 / GIB),
            disk_volume: config.disk_volume.clone(),
            disk_total_gb: disk.map(|d| round2(d.total_bytes as f64 / GIB)),
            disk_free_gb: disk.map(|d| round2(d.available_bytes as f64 / GIB)),
            temp_cpu_method: cpu_method.to_string(),
            temp_ssd_method: ssd_method.to_string(),
            elevated: is_elevated(),
        })
    }

    /// Label/value rows shared by the terminal box and the text report.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let na = || "N/A".to_string();
        let os = match &self.os_version {
            Some(ver) if !ver.contains(&self.os) => format!("{} {}", self.os, ver),
            Some(ver) => ver.clone(),
            None => self.os.clone(),
        };
        let cores = match self.cpu.cores {
            Some(cores) => format!("{} cores / {} threads", cores, self.cpu.threads),
            None => format!("{} threads", self.cpu.threads),
        };

        vec![
            ("OS", os),
            ("CPU", self.cpu.name.clone()),
            ("Cores", cores),
            (
                "CPU clock",
                match (self.cpu.frequency_mhz, self.cpu.max_frequency_mhz) {
                    (Some(cur), Some(max)) if max != cur => format!("{cur} MHz (max {max} MHz)"),
                    (Some(cur), _) => format!("{cur} MHz"),
                    (None, Some(max)) => format!("max {max} MHz"),
                    (None, None) => na(),
                },
            ),
            ("RAM", format!("{:.2} GB", self.ram_total_gb)),
            (
                "Disk",
                match (self.disk_total_gb, self.disk_free_gb) {
                    (Some(total), Some(free)) => {
                        format!("{} {:.2} GB ({:.2} GB free)", self.disk_volume, total, free)
                    }
                    _ => na(),
                },
            ),
            ("GPU", self.gpu.name.clone()),
            ("CPU temp method", self.temp_cpu_method.clone()),
            ("SSD temp method", self.temp_ssd_method.clone()),
            (
                "Admin",
                match self.elevated {
                    Some(true) => "yes".to_string(),
                    Some(false) => "no".to_string(),
                    None => na(),
                },
            ),
        ]
    }

    /// Display system info as formatted string
    pub fn display(&self) -> String {
        const WIDTH: usize = 62;
        const LABEL: usize = 17;
        let mut output = String::new();

        output.push_str(&format!("╔{}╗\n", "═".repeat(WIDTH)));
        output.push_str(&format!("║{:^WIDTH$}║\n", "SYSTEM INFORMATION"));
        output.push_str(&format!("╠{}╣\n", "═".repeat(WIDTH)));

        let content_width = WIDTH - LABEL - 3;
        for (label, value) in self.rows() {
            let value: String = value.chars().take(content_width).collect();
            output.push_str(&format!(
                "║ {:<LABEL$} {:<content_width$} ║\n",
                format!("{label}:"),
                value
            ));
        }

        output.push_str(&format!("╚{}╝", "═".repeat(WIDTH)));
        output
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether the current process token is elevated. `None` off Windows.
#[cfg(target_os = "windows")]
pub fn is_elevated() -> Option<bool> {
    unsafe {
        let mut token: HANDLE = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return Some(false);
        }

        let mut elevation: TOKEN_ELEVATION = std::mem::zeroed();
        let mut returned: u32 = 0;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        ) != 0;
        let _ = CloseHandle(token);

        Some(ok && elevation.TokenIsElevated != 0)
    }
}

#[cfg(not(target_os = "windows"))]
pub fn is_elevated() -> Option<bool> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SystemInfo {
        SystemInfo {
            os: "Windows".to_string(),
            os_version: Some("Windows 10 Pro 19045".to_string()),
            cpu: CpuInfo {
                name: "Intel(R) Core(TM) i5-8400 CPU @ 2.80GHz".to_string(),
                vendor: "GenuineIntel".to_string(),
                cores: Some(6),
                threads: 6,
                frequency_mhz: Some(2808),
                max_frequency_mhz: Some(2808),
            },
            gpu: GpuInfo::default(),
            ram_total_gb: 7.87,
            disk_volume: "C:\\".to_string(),
            disk_total_gb: Some(237.85),
            disk_free_gb: Some(120.5),
            temp_cpu_method: "lhm".to_string(),
            temp_ssd_method: "none".to_string(),
            elevated: Some(true),
        }
    }

    #[test]
    fn test_rows() {
        let rows = sample().rows();
        let get = |label: &str| rows.iter().find(|(l, _)| *l == label).unwrap().1.clone();
        assert_eq!(get("OS"), "Windows 10 Pro 19045");
        assert_eq!(get("Cores"), "6 cores / 6 threads");
        assert_eq!(get("CPU clock"), "2808 MHz");
        assert_eq!(get("Disk"), "C:\\ 237.85 GB (120.50 GB free)");
        assert_eq!(get("GPU"), "N/A");
        assert_eq!(get("SSD temp method"), "none");
        assert_eq!(get("Admin"), "yes");
    }

    #[test]
    fn test_display_box_is_aligned() {
        let text = sample().display();
        let widths: Vec<usize> = text.lines().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{widths:?}");
    }
}
