//! WMI / CIM query scripts and parsers for their text output

use super::probe::{decikelvin_to_celsius, validate_celsius};

/// Namespaces published by LibreHardwareMonitor and OpenHardwareMonitor, in preference order.
pub const OHM_NAMESPACES: [&str; 2] = ["root/LibreHardwareMonitor", "root/OpenHardwareMonitor"];

pub const PS_ACPI_SCRIPT: &str = "Get-CimInstance -Namespace root/WMI \
     -ClassName MSAcpi_ThermalZoneTemperature -ErrorAction SilentlyContinue | \
     Select-Object -ExpandProperty CurrentTemperature -First 1";

pub const PS_RELIABILITY_SCRIPT: &str = "Get-PhysicalDisk | Get-StorageReliabilityCounter \
     -ErrorAction SilentlyContinue | Where-Object { $_.Temperature -gt 0 } | \
     Select-Object -ExpandProperty Temperature -First 1";

pub const WMIC_ACPI_ARGS: [&str; 6] = [
    "/namespace:\\\\root\\wmi",
    "path",
    "MSAcpi_ThermalZoneTemperature",
    "get",
    "CurrentTemperature",
    "/value",
];

pub const WMIC_STORAGE_ARGS: [&str; 6] = [
    "/namespace:\\\\root\\Microsoft\\Windows\\Storage",
    "path",
    "MSFT_StorageReliabilityCounter",
    "get",
    "Temperature",
    "/value",
];

const CPU_NAME_KEYS: [&str; 4] = ["cpu package", "cpu total", "core #0", "cpu"];
const STORAGE_NAME_KEYS: [&str; 4] = ["ssd", "nvme", "disk", "drive"];
const STORAGE_PARENT_KEYS: [&str; 4] = ["nvme", "ssd", "storage", "hdd"];

/// Script that succeeds only if `namespace` serves a `Sensor` class.
pub fn ohm_probe_script(namespace: &str) -> String {
    format!(
        "Get-CimInstance -Namespace {namespace} -ClassName Sensor -ErrorAction Stop | \
         Select-Object -First 1 | ForEach-Object {{ 'ok' }}"
    )
}

/// Script dumping temperature sensors as `Type|Name|Value|Parent|Identifier` lines.
pub fn ohm_dump_script(namespace: &str) -> String {
    format!(
        "Get-CimInstance -Namespace {namespace} -ClassName Sensor -ErrorAction Stop | \
         Where-Object {{ $_.SensorType -eq 'Temperature' }} | \
         ForEach-Object {{ \"$($_.SensorType)|$($_.Name)|$($_.Value)|$($_.Parent)|$($_.Identifier)\" }}"
    )
}

/// One row of the OHM/LHM `Sensor` class
#[derive(Debug, Clone, PartialEq)]
pub struct OhmSensor {
    pub sensor_type: String,
    pub name: String,
    pub value: Option<f64>,
    pub parent: String,
    pub identifier: String,
}

impl OhmSensor {
    fn is_temperature(&self) -> bool {
        self.sensor_type.eq_ignore_ascii_case("temperature")
    }
}

pub fn parse_ohm_sensors(text: &str) -> Vec<OhmSensor> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(OhmSensor {
                sensor_type: parts[0].to_string(),
                name: parts[1].to_string(),
                value: parse_number(parts[2]),
                parent: parts.get(3).copied().unwrap_or_default().to_string(),
                identifier: parts.get(4).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub fn ohm_cpu_temperature(sensors: &[OhmSensor]) -> Option<f64> {
    sensors
        .iter()
        .filter(|s| s.is_temperature())
        .filter(|s| {
            let name = s.name.to_lowercase();
            CPU_NAME_KEYS.iter().any(|key| name.contains(key))
        })
        .find_map(|s| s.value.and_then(validate_celsius))
}

pub fn ohm_storage_temperature(sensors: &[OhmSensor]) -> Option<f64> {
    sensors
        .iter()
        .filter(|s| s.is_temperature())
        .filter(|s| {
            let name = s.name.to_lowercase();
            let parent = format!("{} {}", s.parent, s.identifier).to_lowercase();
            STORAGE_NAME_KEYS.iter().any(|key| name.contains(key))
                || STORAGE_PARENT_KEYS.iter().any(|key| parent.contains(key))
        })
        .find_map(|s| s.value.and_then(validate_celsius))
}

/// Values of `key=value` lines from `wmic ... /value` output.
pub fn wmic_values<'a>(text: &'a str, key: &'a str) -> impl Iterator<Item = f64> + 'a {
    text.lines().filter_map(move |line| {
        let (k, v) = line.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            parse_number(v)
        } else {
            None
        }
    })
}

/// First thermal zone (decikelvin) that converts to a plausible Celsius value.
pub fn wmic_acpi_celsius(text: &str) -> Option<f64> {
    wmic_values(text, "CurrentTemperature")
        .find_map(|raw| validate_celsius(decikelvin_to_celsius(raw)))
}

/// First plausible storage reliability temperature.
pub fn wmic_storage_celsius(text: &str) -> Option<f64> {
    wmic_values(text, "Temperature").find_map(validate_celsius)
}

/// First non-empty line of PowerShell output as a number.
pub fn first_number(text: &str) -> Option<f64> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(parse_number)
}

fn parse_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}
