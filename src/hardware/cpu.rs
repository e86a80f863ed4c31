//! CPU detection module
//!
//! Detects CPU information using:
//! - Cross-platform: sysinfo crate
//! - Windows: wmic, registry (max clock)
//! - Linux: cpufreq sysfs

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use super::script::ScriptRunner;

/// CPU information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInfo {
    /// CPU name (e.g., "Intel(R) Core(TM) i5-8400 CPU @ 2.80GHz")
    pub name: String,
    /// CPU vendor
    pub vendor: String,
    /// Number of physical cores (if reported)
    pub cores: Option<usize>,
    /// Number of logical threads
    pub threads: usize,
    /// Current frequency in MHz (if available)
    pub frequency_mhz: Option<u64>,
    /// Max turbo/boost frequency in MHz (if available)
    pub max_frequency_mhz: Option<u64>,
}

impl CpuInfo {
    /// Detect CPU information (platform-specific extras go through `shell`)
    pub fn detect(shell: &ScriptRunner) -> Result<Self> {
        let mut sys = System::new();
        sys.refresh_cpu_all();

        let cpus = sys.cpus();
        if cpus.is_empty() {
            anyhow::bail!("No CPU detected");
        }

        let first_cpu = &cpus[0];
        let name = first_cpu.brand().trim().to_string();
        let vendor = first_cpu.vendor_id().to_string();
        let frequency_mhz = Some(first_cpu.frequency()).filter(|mhz| *mhz > 0);

        Ok(CpuInfo {
            name: if name.is_empty() { "N/A".to_string() } else { name },
            vendor,
            cores: sys.physical_core_count(),
            threads: cpus.len(),
            frequency_mhz,
            max_frequency_mhz: max_frequency_mhz(shell),
        })
    }
}

#[cfg(target_os = "windows")]
fn max_frequency_mhz(shell: &ScriptRunner) -> Option<u64> {
    if let Ok(output) = shell.wmic(&["cpu", "get", "MaxClockSpeed", "/value"]) {
        if let Some(mhz) = parse_wmic_max_clock(&output) {
            return Some(mhz);
        }
    }

    // Registry fallback: "    ~MHz    REG_DWORD    0x1e61"
    let output = shell
        .run(
            "reg",
            &[
                "query",
                "HKEY_LOCAL_MACHINE\\HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0",
                "/v",
                "~MHz",
            ],
        )
        .ok()?;
    parse_reg_mhz(&output)
}

#[cfg(target_os = "linux")]
fn max_frequency_mhz(_shell: &ScriptRunner) -> Option<u64> {
    let freq =
        std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_max_freq").ok()?;
    let khz: u64 = freq.trim().parse().ok()?;
    Some(khz / 1000)
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn max_frequency_mhz(_shell: &ScriptRunner) -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_wmic_max_clock(output: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        if key.eq_ignore_ascii_case("MaxClockSpeed") {
            value.trim().parse().ok().filter(|mhz| *mhz > 0)
        } else {
            None
        }
    })
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_reg_mhz(output: &str) -> Option<u64> {
    output
        .lines()
        .filter(|line| line.contains("~MHz"))
        .find_map(|line| {
            let hex = line.split_whitespace().last()?;
            u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_wmic_max_clock() {
        assert_eq!(parse_wmic_max_clock("\r\n\r\nMaxClockSpeed=2808\r\n"), Some(2808));
        assert_eq!(parse_wmic_max_clock("MaxClockSpeed=\r\n"), None);
    }

    #[test]
    fn test_parse_reg_mhz() {
        let output = "\nHKEY_LOCAL_MACHINE\\HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0\n    ~MHz    REG_DWORD    0xaf8\n";
        assert_eq!(parse_reg_mhz(output), Some(2808));
    }

    #[test]
    fn test_detect_reports_threads() {
        let info = CpuInfo::detect(&ScriptRunner::new(Duration::from_secs(2))).unwrap();
        assert!(info.threads >= 1);
        assert!(!info.name.is_empty());
    }
}
