//! Hardware monitoring module
//!
//! Sensor acquisition for the diagnostic run: utilisation counters through
//! sysinfo and CPU / SSD temperatures through prioritised probe chains
//! (LibreHardwareMonitor, OHM WMI, ACPI thermal zones, storage reliability
//! counters, sysinfo components), plus a one-off system summary.

mod backends;
pub mod chain;
pub mod cpu;
pub mod gpu;
mod lhm;
pub mod probe;
mod reader;
pub mod script;
mod system;
pub mod utilization;
mod wmi;

pub use reader::{SensorReader, SensorReading};
pub use system::{is_elevated, SystemInfo};
