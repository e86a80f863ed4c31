//! Sensor reader
//!
//! Assembles one [`SensorReading`] per polling tick: utilisation from direct
//! OS counters plus CPU and storage temperatures from their probe chains.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::backends::Backends;
use super::chain::ProbeChain;
use super::probe::{CpuProbe, ProbeKind, ProbeSource, StorageProbe};
use super::utilization::{SystemUtilization, UtilizationSource};
use crate::config::SensorConfig;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One immutable snapshot of the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Capture time, second resolution
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub cpu_percent: f64,
    pub cpu_temp: Option<f64>,
    pub ram_percent: f64,
    pub disk_percent: f64,
    pub ssd_temp: Option<f64>,
}

impl SensorReading {
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Polls utilisation and both temperature chains.
///
/// Construction runs one discovery pass per chain.
pub struct SensorReader<B = Backends, U = SystemUtilization> {
    backends: B,
    utilization: U,
    cpu_chain: ProbeChain<CpuProbe>,
    ssd_chain: ProbeChain<StorageProbe>,
}

impl SensorReader {
    /// Reader over the real backends described by `config`.
    pub fn new(config: &SensorConfig) -> Self {
        let backends = Backends::new(config);
        let utilization = SystemUtilization::new(
            config.disk_volume.as_str(),
            Duration::from_millis(config.cpu_sample_ms),
        );
        Self::with_chains(
            backends,
            utilization,
            CpuProbe::default_chain(),
            StorageProbe::default_chain(),
            config.rediscovery_grace_ticks,
        )
    }
}

impl<B, U> SensorReader<B, U>
where
    B: ProbeSource<CpuProbe> + ProbeSource<StorageProbe>,
    U: UtilizationSource,
{
    pub fn with_chains(
        backends: B,
        utilization: U,
        cpu_order: Vec<CpuProbe>,
        ssd_order: Vec<StorageProbe>,
        grace_ticks: u32,
    ) -> Self {
        let mut reader = Self {
            backends,
            utilization,
            cpu_chain: ProbeChain::new("CPU", cpu_order).with_grace_ticks(grace_ticks),
            ssd_chain: ProbeChain::new("SSD", ssd_order).with_grace_ticks(grace_ticks),
        };
        reader.cpu_chain.discover(&mut reader.backends);
        reader.ssd_chain.discover(&mut reader.backends);
        reader
    }

    /// Take one full reading. Blocks for the CPU sampling window and any slow probes.
    pub fn read(&mut self) -> SensorReading {
        let timestamp = Local::now().naive_local();
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);

        let usage = self.utilization.sample();
        let cpu_temp = self.get_cpu_temperature();
        let ssd_temp = self.get_ssd_temperature();

        SensorReading {
            timestamp,
            cpu_percent: usage.cpu_percent,
            cpu_temp,
            ram_percent: usage.ram_percent,
            disk_percent: usage.disk_percent,
            ssd_temp,
        }
    }

    pub fn get_cpu_temperature(&mut self) -> Option<f64> {
        self.cpu_chain.read(&mut self.backends)
    }

    pub fn get_ssd_temperature(&mut self) -> Option<f64> {
        self.ssd_chain.read(&mut self.backends)
    }

    pub fn cpu_method(&self) -> Option<CpuProbe> {
        self.cpu_chain.selected()
    }

    pub fn ssd_method(&self) -> Option<StorageProbe> {
        self.ssd_chain.selected()
    }

    pub fn cpu_method_name(&self) -> &'static str {
        self.cpu_chain.method_name()
    }

    pub fn ssd_method_name(&self) -> &'static str {
        self.ssd_chain.method_name()
    }

    pub fn cpu_method_label(&self) -> &'static str {
        self.cpu_chain.label()
    }

    pub fn ssd_method_label(&self) -> &'static str {
        self.ssd_chain.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::utilization::Utilization;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBackends {
        cpu: HashMap<CpuProbe, Option<f64>>,
        ssd: HashMap<StorageProbe, Option<f64>>,
        cpu_calls: u32,
    }

    impl ProbeSource<CpuProbe> for FakeBackends {
        fn sample(&mut self, probe: CpuProbe) -> Option<f64> {
            self.cpu_calls += 1;
            self.cpu.get(&probe).copied().flatten()
        }
    }

    impl ProbeSource<StorageProbe> for FakeBackends {
        fn sample(&mut self, probe: StorageProbe) -> Option<f64> {
            self.ssd.get(&probe).copied().flatten()
        }
    }

    struct FixedUsage;

    impl UtilizationSource for FixedUsage {
        fn sample(&mut self) -> Utilization {
            Utilization {
                cpu_percent: 12.5,
                ram_percent: 48.0,
                disk_percent: 63.2,
            }
        }
    }

    const A: CpuProbe = CpuProbe::Lhm;
    const B: CpuProbe = CpuProbe::OhmWmi;
    const C: CpuProbe = CpuProbe::WmiAcpi;

    fn reader(backends: FakeBackends) -> SensorReader<FakeBackends, FixedUsage> {
        SensorReader::with_chains(
            backends,
            FixedUsage,
            vec![A, B, C],
            StorageProbe::default_chain(),
            0,
        )
    }

    #[test]
    fn test_failover_between_ticks() {
        let mut backends = FakeBackends::default();
        backends.cpu.insert(A, None);
        backends.cpu.insert(B, Some(42.3));
        backends.cpu.insert(C, Some(50.0));

        let mut reader = reader(backends);
        assert_eq!(reader.cpu_method(), Some(B));

        let first = reader.read();
        assert_eq!(first.cpu_temp, Some(42.3));
        assert_eq!(reader.cpu_method_label(), "OHM/LHM WMI");

        reader.backends.cpu.insert(B, None);
        let second = reader.read();
        assert_eq!(second.cpu_temp, Some(50.0));
        assert_eq!(reader.cpu_method(), Some(C));
        assert_eq!(reader.cpu_method_label(), "WMI ThermalZone");
    }

    #[test]
    fn test_all_probes_failing() {
        let mut reader = reader(FakeBackends::default());
        let reading = reader.read();

        assert_eq!(reading.cpu_temp, None);
        assert_eq!(reading.ssd_temp, None);
        assert_eq!(reader.cpu_method_name(), "none");
        assert_eq!(reader.cpu_method_label(), "unavailable");
        assert_eq!(reader.ssd_method_label(), "unavailable");

        // Utilisation is always present
        assert_eq!(reading.cpu_percent, 12.5);
        assert_eq!(reading.ram_percent, 48.0);
        assert_eq!(reading.disk_percent, 63.2);
    }

    #[test]
    fn test_steady_state_one_probe_call_per_tick() {
        let mut backends = FakeBackends::default();
        backends.cpu.insert(C, Some(61.0));

        let mut reader = reader(backends);
        // Discovery walked A, B, C
        assert_eq!(reader.backends.cpu_calls, 3);

        for _ in 0..4 {
            reader.read();
        }
        assert_eq!(reader.backends.cpu_calls, 7);
    }

    #[test]
    fn test_storage_chain_independent_of_cpu_chain() {
        let mut backends = FakeBackends::default();
        backends.ssd.insert(StorageProbe::PsReliability, Some(39.0));
        backends.ssd.insert(StorageProbe::WmiStorage, Some(9999.0));

        let mut reader = reader(backends);
        let reading = reader.read();

        assert_eq!(reading.cpu_temp, None);
        assert_eq!(reading.ssd_temp, Some(39.0));
        assert_eq!(reader.ssd_method_name(), "ps_reliability");
        assert_eq!(reader.ssd_method_label(), "StorageReliability");
    }

    #[test]
    fn test_timestamp_second_resolution() {
        let mut reader = reader(FakeBackends::default());
        let reading = reader.read();
        assert_eq!(reading.timestamp.nanosecond(), 0);
        assert_eq!(reading.timestamp_string().len(), 19);
    }

    #[test]
    fn test_reading_json_shape() {
        let mut backends = FakeBackends::default();
        backends.cpu.insert(A, Some(36.6));
        let mut reader = reader(backends);
        let reading = reader.read();

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["cpu_temp"], 36.6);
        assert!(json["ssd_temp"].is_null());
        assert!(json["timestamp"].is_string());

        let back: SensorReading = serde_json::from_value(json).unwrap();
        assert_eq!(back, reading);
    }
}
