//! Concrete sensor backends
//!
//! [`Backends`] owns every handle the probes need (LHM HTTP client, the
//! script runner, the resolved OHM namespace, sysinfo components). Handles
//! are created once and reused for the life of the reader.

use anyhow::{anyhow, Context, Result};
use std::cell::OnceCell;
use std::time::Duration;
use sysinfo::Components;
use tracing::{debug, info, warn};

use super::lhm::LhmClient;
use super::probe::{validate_celsius, CpuProbe, ProbeKind, ProbeSource, StorageProbe};
use super::script::ScriptRunner;
use super::wmi;
use crate::config::SensorConfig;

/// Component labels that usually identify the CPU die, most specific first.
const CPU_COMPONENT_KEYS: [&str; 7] = [
    "coretemp",
    "cpu_thermal",
    "k10temp",
    "zenpower",
    "package",
    "tctl",
    "cpu",
];

pub struct Backends {
    lhm: Option<LhmClient>,
    shell: ScriptRunner,
    ohm_namespace: OnceCell<Option<&'static str>>,
    components: Option<Components>,
}

impl Backends {
    pub fn new(config: &SensorConfig) -> Self {
        let timeout = Duration::from_secs(config.script_timeout_secs.max(1));

        let lhm = if config.lhm_enabled {
            match LhmClient::connect(&config.lhm_url, timeout) {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!("LibreHardwareMonitor client unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            lhm,
            shell: ScriptRunner::new(timeout),
            ohm_namespace: OnceCell::new(),
            components: None,
        }
    }

    /// Resolve the OHM/LHM WMI namespace on first use and keep the answer.
    fn ohm_namespace(&self) -> Option<&'static str> {
        *self.ohm_namespace.get_or_init(|| {
            let found = wmi::OHM_NAMESPACES.iter().copied().find(|ns| {
                self.shell
                    .powershell(&wmi::ohm_probe_script(ns))
                    .map_err(|err| debug!(namespace = *ns, "WMI provider check failed: {err}"))
                    .is_ok()
            });
            match found {
                Some(ns) => info!("WMI connected: {ns}"),
                None => debug!("no OHM/LHM WMI provider"),
            }
            found
        })
    }

    fn ohm_sensors(&self) -> Result<Vec<wmi::OhmSensor>> {
        let namespace = self
            .ohm_namespace()
            .ok_or_else(|| anyhow!("no OHM/LHM WMI namespace"))?;
        let text = self.shell.powershell(&wmi::ohm_dump_script(namespace))?;
        Ok(wmi::parse_ohm_sensors(&text))
    }

    fn lhm(&self) -> Result<&LhmClient> {
        self.lhm
            .as_ref()
            .ok_or_else(|| anyhow!("LibreHardwareMonitor disabled"))
    }

    fn cpu_lhm(&mut self) -> Result<f64> {
        Ok(self.lhm()?.cpu_temperature()?)
    }

    fn cpu_ohm(&mut self) -> Result<f64> {
        wmi::ohm_cpu_temperature(&self.ohm_sensors()?).context("no CPU sensor in WMI provider")
    }

    fn cpu_wmi_acpi(&mut self) -> Result<f64> {
        let text = self.shell.wmic(&wmi::WMIC_ACPI_ARGS)?;
        wmi::wmic_acpi_celsius(&text).context("no plausible ACPI thermal zone")
    }

    fn cpu_ps_acpi(&mut self) -> Result<f64> {
        let text = self.shell.powershell(wmi::PS_ACPI_SCRIPT)?;
        let raw = wmi::first_number(&text).context("unparseable thermal zone value")?;
        Ok(super::probe::decikelvin_to_celsius(raw))
    }

    fn cpu_sysinfo(&mut self) -> Result<f64> {
        let components = self
            .components
            .get_or_insert_with(Components::new_with_refreshed_list);
        components.refresh(true);

        let readings: Vec<(String, f32)> = components
            .list()
            .iter()
            .filter_map(|c| c.temperature().map(|t| (c.label().to_lowercase(), t)))
            .collect();
        pick_cpu_component(&readings).context("no CPU component temperature")
    }

    fn ssd_lhm(&mut self) -> Result<f64> {
        Ok(self.lhm()?.storage_temperature()?)
    }

    fn ssd_ohm(&mut self) -> Result<f64> {
        wmi::ohm_storage_temperature(&self.ohm_sensors()?)
            .context("no storage sensor in WMI provider")
    }

    fn ssd_ps_reliability(&mut self) -> Result<f64> {
        let text = self.shell.powershell(wmi::PS_RELIABILITY_SCRIPT)?;
        wmi::first_number(&text).context("unparseable reliability counter")
    }

    fn ssd_wmi_storage(&mut self) -> Result<f64> {
        let text = self.shell.wmic(&wmi::WMIC_STORAGE_ARGS)?;
        wmi::wmic_storage_celsius(&text).context("no plausible storage temperature")
    }
}

impl ProbeSource<CpuProbe> for Backends {
    fn sample(&mut self, probe: CpuProbe) -> Option<f64> {
        let result = match probe {
            CpuProbe::Lhm => self.cpu_lhm(),
            CpuProbe::OhmWmi => self.cpu_ohm(),
            CpuProbe::WmiAcpi => self.cpu_wmi_acpi(),
            CpuProbe::PsAcpi => self.cpu_ps_acpi(),
            CpuProbe::Sysinfo => self.cpu_sysinfo(),
        };
        absorb(probe, result)
    }
}

impl ProbeSource<StorageProbe> for Backends {
    fn sample(&mut self, probe: StorageProbe) -> Option<f64> {
        let result = match probe {
            StorageProbe::Lhm => self.ssd_lhm(),
            StorageProbe::OhmWmi => self.ssd_ohm(),
            StorageProbe::PsReliability => self.ssd_ps_reliability(),
            StorageProbe::WmiStorage => self.ssd_wmi_storage(),
        };
        absorb(probe, result)
    }
}

/// Backend failure is absence, never an error for the caller.
fn absorb<K: ProbeKind>(probe: K, result: Result<f64>) -> Option<f64> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(method = probe.name(), "probe failed: {err:#}");
            None
        }
    }
}

/// Pick the CPU die temperature out of `(lowercase label, °C)` pairs.
fn pick_cpu_component(readings: &[(String, f32)]) -> Option<f64> {
    let plausible = |t: f32| validate_celsius(f64::from(t));

    CPU_COMPONENT_KEYS
        .iter()
        .find_map(|key| {
            readings
                .iter()
                .filter(|(label, _)| label.contains(key))
                .find_map(|(_, t)| plausible(*t))
        })
        .or_else(|| readings.iter().find_map(|(_, t)| plausible(*t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::probe::attempt;

    fn offline_backends() -> Backends {
        let config = SensorConfig {
            script_timeout_secs: 1,
            lhm_url: "http://127.0.0.1:9/data.json".to_string(),
            ..SensorConfig::default()
        };
        Backends::new(&config)
    }

    #[test]
    fn test_pick_cpu_component_prefers_known_driver() {
        let readings = vec![
            ("acpitz temp1".to_string(), 27.8),
            ("nvme composite".to_string(), 35.0),
            ("k10temp tctl".to_string(), 52.3),
        ];
        let picked = pick_cpu_component(&readings).unwrap();
        assert!((picked - 52.3).abs() < 0.05);
    }

    #[test]
    fn test_pick_cpu_component_falls_back_to_first_plausible() {
        let readings = vec![
            ("acpitz temp1".to_string(), -273.0),
            ("acpitz temp2".to_string(), 30.0),
        ];
        assert_eq!(pick_cpu_component(&readings), Some(30.0));
        assert_eq!(pick_cpu_component(&[]), None);
    }

    #[test]
    fn test_unreachable_backends_are_absent_not_errors() {
        let mut backends = offline_backends();
        assert_eq!(attempt(&mut backends, CpuProbe::Lhm), None);
        assert_eq!(attempt(&mut backends, StorageProbe::Lhm), None);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_windows_only_probes_absent_elsewhere() {
        let mut backends = offline_backends();
        for probe in [CpuProbe::OhmWmi, CpuProbe::WmiAcpi, CpuProbe::PsAcpi] {
            assert_eq!(attempt(&mut backends, probe), None);
        }
        for probe in [
            StorageProbe::OhmWmi,
            StorageProbe::PsReliability,
            StorageProbe::WmiStorage,
        ] {
            assert_eq!(attempt(&mut backends, probe), None);
        }
    }

    #[test]
    fn test_sysinfo_probe_never_panics() {
        let mut backends = offline_backends();
        if let Some(value) = attempt(&mut backends, CpuProbe::Sysinfo) {
            assert!(value > 0.0 && value < 150.0);
        }
    }
}
