//! Probe vocabulary
//!
//! A probe is one way of getting a single degree-Celsius reading for one
//! metric out of one backend technology. Probes are typed variants
//! ([`CpuProbe`], [`StorageProbe`]); the backend that knows how to run them
//! implements [`ProbeSource`].

use std::fmt;

/// Lower bound (exclusive) of a physically plausible temperature.
pub const MIN_PLAUSIBLE_C: f64 = 0.0;
/// Upper bound (exclusive) of a physically plausible temperature.
pub const MAX_PLAUSIBLE_C: f64 = 150.0;

/// Label shown when no probe is selected for a metric.
pub const UNAVAILABLE_LABEL: &str = "unavailable";
/// Stable name used when no probe is selected for a metric.
pub const NO_METHOD: &str = "none";

/// A typed probe variant with a stable name and a display label.
pub trait ProbeKind: Copy + Eq + fmt::Debug + 'static {
    /// Stable identifier (e.g. `"lhm"`, `"wmi_acpi"`).
    fn name(self) -> &'static str;

    /// Human-readable backend label for diagnostics.
    fn label(self) -> &'static str;

    /// Default priority order, most accurate backend first.
    fn default_chain() -> Vec<Self>;
}

/// Something that can run a probe and hand back a raw value.
///
/// Implementations must absorb every backend failure into `None`.
/// Plausibility is checked by the caller through [`validate_celsius`].
pub trait ProbeSource<K: ProbeKind> {
    fn sample(&mut self, probe: K) -> Option<f64>;
}

/// CPU temperature probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuProbe {
    /// LibreHardwareMonitor web server (Intel Gen 8+ DTS/MSR, AMD SMU)
    Lhm,
    /// OpenHardwareMonitor / LibreHardwareMonitor WMI provider
    OhmWmi,
    /// `MSAcpi_ThermalZoneTemperature` through wmic (needs admin)
    WmiAcpi,
    /// `MSAcpi_ThermalZoneTemperature` through PowerShell CIM
    PsAcpi,
    /// Generic OS sensor API via sysinfo components
    Sysinfo,
}

impl ProbeKind for CpuProbe {
    fn name(self) -> &'static str {
        match self {
            CpuProbe::Lhm => "lhm",
            CpuProbe::OhmWmi => "ohm_wmi",
            CpuProbe::WmiAcpi => "wmi_acpi",
            CpuProbe::PsAcpi => "ps_acpi",
            CpuProbe::Sysinfo => "sysinfo",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CpuProbe::Lhm => "LibreHardwareMonitor",
            CpuProbe::OhmWmi => "OHM/LHM WMI",
            CpuProbe::WmiAcpi => "WMI ThermalZone",
            CpuProbe::PsAcpi => "PowerShell ACPI",
            CpuProbe::Sysinfo => "sysinfo",
        }
    }

    fn default_chain() -> Vec<Self> {
        vec![
            CpuProbe::Lhm,
            CpuProbe::OhmWmi,
            CpuProbe::WmiAcpi,
            CpuProbe::PsAcpi,
            CpuProbe::Sysinfo,
        ]
    }
}

impl fmt::Display for CpuProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// SSD / NVMe temperature probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageProbe {
    /// LibreHardwareMonitor web server
    Lhm,
    /// OpenHardwareMonitor / LibreHardwareMonitor WMI provider
    OhmWmi,
    /// PowerShell `Get-StorageReliabilityCounter` (native Win10/11)
    PsReliability,
    /// `MSFT_StorageReliabilityCounter` through wmic
    WmiStorage,
}

impl ProbeKind for StorageProbe {
    fn name(self) -> &'static str {
        match self {
            StorageProbe::Lhm => "lhm",
            StorageProbe::OhmWmi => "ohm_wmi",
            StorageProbe::PsReliability => "ps_reliability",
            StorageProbe::WmiStorage => "wmi_storage",
        }
    }

    fn label(self) -> &'static str {
        match self {
            StorageProbe::Lhm => "LibreHardwareMonitor",
            StorageProbe::OhmWmi => "OHM/LHM WMI",
            StorageProbe::PsReliability => "StorageReliability",
            StorageProbe::WmiStorage => "WMI Storage",
        }
    }

    fn default_chain() -> Vec<Self> {
        vec![
            StorageProbe::Lhm,
            StorageProbe::OhmWmi,
            StorageProbe::PsReliability,
            StorageProbe::WmiStorage,
        ]
    }
}

impl fmt::Display for StorageProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Round a raw reading to one decimal and accept it only if the rounded
/// value is finite and strictly inside (0, 150) °C.
pub fn validate_celsius(raw: f64) -> Option<f64> {
    let value = round1(raw);
    (value.is_finite() && value > MIN_PLAUSIBLE_C && value < MAX_PLAUSIBLE_C).then_some(value)
}

/// Convert an ACPI thermal zone reading (tenths of a kelvin) to Celsius.
pub fn decikelvin_to_celsius(raw: f64) -> f64 {
    raw / 10.0 - 273.15
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Run one probe against a source and apply the plausibility window.
pub fn attempt<K, S>(source: &mut S, probe: K) -> Option<f64>
where
    K: ProbeKind,
    S: ProbeSource<K> + ?Sized,
{
    source.sample(probe).and_then(validate_celsius)
}
