//! GPU detection module
//!
//! Only the adapter name, VRAM and driver are needed for the report header:
//! - Windows: wmic `Win32_VideoController`
//! - NVIDIA: nvidia-smi (any platform)

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use super::script::ScriptRunner;

/// GPU information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuInfo {
    /// Adapter name (e.g., "Intel(R) UHD Graphics 630")
    pub name: String,
    /// VRAM in MB (if detectable)
    pub vram_mb: Option<u64>,
    /// Driver version (if detectable)
    pub driver_version: Option<String>,
}

impl Default for GpuInfo {
    fn default() -> Self {
        Self {
            name: "N/A".to_string(),
            vram_mb: None,
            driver_version: None,
        }
    }
}

impl GpuInfo {
    /// Detect the primary GPU; never fails, unknown adapters come back as "N/A".
    pub fn detect(shell: &ScriptRunner) -> Self {
        if let Ok(output) = shell.wmic(&[
            "path",
            "win32_VideoController",
            "get",
            "Name,AdapterRAM,DriverVersion",
            "/format:csv",
        ]) {
            if let Some(gpu) = parse_wmic_video_csv(&output) {
                return gpu;
            }
        }

        if let Ok(output) = shell.run(
            "nvidia-smi",
            &[
                "--query-gpu=name,memory.total,driver_version",
                "--format=csv,noheader,nounits",
            ],
        ) {
            if let Some(gpu) = parse_nvidia_smi(&output) {
                return gpu;
            }
        }

        Self::default()
    }
}

/// Parse `wmic ... /format:csv` output. Columns come back sorted by name
/// (`Node,AdapterRAM,DriverVersion,Name`), so locate them from the header.
fn parse_wmic_video_csv(output: &str) -> Option<GpuInfo> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(output.as_bytes());

    let mut name_col = None;
    let mut ram_col = None;
    let mut driver_col = None;

    for record in reader.records().flatten() {
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let Some(name_idx) = name_col else {
            for (i, field) in record.iter().enumerate() {
                match field.to_ascii_lowercase().as_str() {
                    "name" => name_col = Some(i),
                    "adapterram" => ram_col = Some(i),
                    "driverversion" => driver_col = Some(i),
                    _ => {}
                }
            }
            continue;
        };

        let name = record.get(name_idx).unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        let vram_mb = ram_col
            .and_then(|i| record.get(i))
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|bytes| *bytes > 0)
            .map(|bytes| bytes / 1024 / 1024);
        let driver_version = driver_col
            .and_then(|i| record.get(i))
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        return Some(GpuInfo {
            name: name.to_string(),
            vram_mb,
            driver_version,
        });
    }

    None
}

fn parse_nvidia_smi(output: &str) -> Option<GpuInfo> {
    let line = output.lines().next()?;
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 3 || parts[0].is_empty() {
        return None;
    }

    let name = if parts[0].starts_with("NVIDIA") {
        parts[0].to_string()
    } else {
        format!("NVIDIA {}", parts[0])
    };

    Some(GpuInfo {
        name,
        vram_mb: parts[1].parse().ok(),
        driver_version: Some(parts[2].to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wmic_video_csv() {
        let output = "\r\nNode,AdapterRAM,DriverVersion,Name\r\nPOS-01,1073741824,27.20.100.8681,Intel(R) UHD Graphics 630\r\n";
        let gpu = parse_wmic_video_csv(output).unwrap();
        assert_eq!(gpu.name, "Intel(R) UHD Graphics 630");
        assert_eq!(gpu.vram_mb, Some(1024));
        assert_eq!(gpu.driver_version.as_deref(), Some("27.20.100.8681"));
    }

    #[test]
    fn test_parse_wmic_video_csv_skips_blank_adapters() {
        let output = "Node,AdapterRAM,DriverVersion,Name\nPOS-01,,,\nPOS-01,0,1.0,Basic Display\n";
        let gpu = parse_wmic_video_csv(output).unwrap();
        assert_eq!(gpu.name, "Basic Display");
        assert_eq!(gpu.vram_mb, None);
    }

    #[test]
    fn test_parse_nvidia_smi() {
        let gpu = parse_nvidia_smi("GeForce GT 1030, 2048, 537.13\n").unwrap();
        assert_eq!(gpu.name, "NVIDIA GeForce GT 1030");
        assert_eq!(gpu.vram_mb, Some(2048));
        assert!(parse_nvidia_smi("").is_none());
    }
}
