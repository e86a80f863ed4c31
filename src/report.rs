//! Session reporting
//!
//! CSV log written row by row during the session, plus the statistics,
//! verdict and plain-text summary produced once it ends.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::hardware::{SensorReading, SystemInfo};

pub const CSV_FILE_NAME: &str = "idm-test-log.csv";
pub const REPORT_FILE_NAME: &str = "idm-test-report.txt";

const CSV_HEADER: [&str; 6] = ["Time", "CPU %", "CPU Temp", "RAM %", "Disk %", "SSD Temp"];
const NOT_AVAILABLE: &str = "N/A";

/// Append-only CSV log, flushed after every row so a killed session keeps
/// everything recorded so far.
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLogger {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let path = dir.join(CSV_FILE_NAME);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create CSV log {}", path.display()))?;
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, reading: &SensorReading) -> Result<()> {
        self.writer.write_record([
            reading.timestamp_string(),
            format!("{:.1}", reading.cpu_percent),
            optional_cell(reading.cpu_temp),
            format!("{:.1}", reading.ram_percent),
            format!("{:.1}", reading.disk_percent),
            optional_cell(reading.ssd_temp),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}

fn optional_cell(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{v:.1}"))
}

/// Min/max/average of one metric over the values that were present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl MetricStats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        (count > 0).then(|| Self {
            min,
            max,
            avg: sum / count as f64,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub samples: usize,
    pub cpu_percent: Option<MetricStats>,
    pub cpu_temp: Option<MetricStats>,
    pub ram_percent: Option<MetricStats>,
    pub disk_percent: Option<MetricStats>,
    pub ssd_temp: Option<MetricStats>,
}

impl SessionStats {
    pub fn from_readings(readings: &[SensorReading]) -> Self {
        Self {
            samples: readings.len(),
            cpu_percent: MetricStats::from_values(readings.iter().map(|r| r.cpu_percent)),
            cpu_temp: MetricStats::from_values(readings.iter().filter_map(|r| r.cpu_temp)),
            ram_percent: MetricStats::from_values(readings.iter().map(|r| r.ram_percent)),
            disk_percent: MetricStats::from_values(readings.iter().map(|r| r.disk_percent)),
            ssd_temp: MetricStats::from_values(readings.iter().filter_map(|r| r.ssd_temp)),
        }
    }

    fn rows(&self) -> [(&'static str, Option<MetricStats>, &'static str); 5] {
        [
            ("CPU usage", self.cpu_percent, "%"),
            ("CPU temperature", self.cpu_temp, "°C"),
            ("RAM usage", self.ram_percent, "%"),
            ("Disk usage", self.disk_percent, "%"),
            ("SSD/NVMe temperature", self.ssd_temp, "°C"),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Warn => 1,
            Verdict::Fail => 2,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub description: &'static str,
}

const HEALTHY: &str = "All parameters within normal limits. Hardware is healthy.";

/// Temperature decides when any CPU temperature was seen; otherwise the
/// average CPU usage does.
pub fn evaluate(stats: &SessionStats, thresholds: &ReportConfig) -> Assessment {
    let (verdict, description) = if let Some(temp) = stats.cpu_temp {
        if temp.max > thresholds.fail_temp_c {
            (Verdict::Fail, "Temperature exceeded the critical limit. Needs attention immediately.")
        } else if temp.max >= thresholds.warn_temp_c {
            (Verdict::Warn, "High temperature detected. Check the cooling system.")
        } else {
            (Verdict::Pass, HEALTHY)
        }
    } else {
        match stats.cpu_percent {
            Some(cpu) if cpu.avg > thresholds.fail_cpu_percent => {
                (Verdict::Fail, "CPU usage is very high. Check running processes.")
            }
            Some(cpu) if cpu.avg > thresholds.warn_cpu_percent => {
                (Verdict::Warn, "CPU usage is high. Keep monitoring.")
            }
            _ => (Verdict::Pass, HEALTHY),
        }
    };

    Assessment {
        verdict,
        description,
    }
}

/// Everything the text report needs.
pub struct ReportInput<'a> {
    pub system: &'a SystemInfo,
    pub stats: &'a SessionStats,
    pub assessment: &'a Assessment,
    pub thresholds: &'a ReportConfig,
    pub duration_minutes: u64,
    pub completed: bool,
    /// CPU temperature chart written alongside the report, if any
    pub chart: Option<&'a Path>,
}

pub fn render_text_report(input: &ReportInput<'_>) -> String {
    const RULE_WIDTH: usize = 64;
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!("{:^RULE_WIDTH$}\n", "IDM TEST"));
    out.push_str(&format!("{:^RULE_WIDTH$}\n", "HARDWARE DIAGNOSTIC REPORT"));
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!(
        "Generated:     {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!(
        "Test duration: {} minute(s){}\n",
        input.duration_minutes,
        if input.completed { "" } else { " (stopped early)" }
    ));
    out.push_str(&format!("Samples:       {}\n\n", input.stats.samples));

    out.push_str("System information\n");
    out.push_str(&format!("{thin}\n"));
    for (label, value) in input.system.rows() {
        out.push_str(&format!("{:<18}{}\n", format!("{label}:"), value));
    }
    out.push('\n');

    out.push_str("Statistics\n");
    out.push_str(&format!("{thin}\n"));
    out.push_str(&format!(
        "{:<22}{:>12}{:>12}{:>12}\n",
        "Parameter", "Min", "Max", "Average"
    ));
    for (label, stats, unit) in input.stats.rows() {
        let (min, max, avg) = match stats {
            Some(s) => (
                format!("{:.1}{unit}", s.min),
                format!("{:.1}{unit}", s.max),
                format!("{:.1}{unit}", s.avg),
            ),
            None => (
                NOT_AVAILABLE.to_string(),
                NOT_AVAILABLE.to_string(),
                NOT_AVAILABLE.to_string(),
            ),
        };
        out.push_str(&format!("{label:<22}{min:>12}{max:>12}{avg:>12}\n"));
    }
    out.push('\n');

    out.push_str("Verdict\n");
    out.push_str(&format!("{thin}\n"));
    out.push_str(&format!("{}\n", input.assessment.verdict));
    out.push_str(&format!("{}\n\n", input.assessment.description));

    if let Some(chart) = input.chart {
        let name = chart.file_name().unwrap_or(chart.as_os_str());
        out.push_str(&format!("CPU temperature chart: {}\n\n", name.to_string_lossy()));
    }

    let t = input.thresholds;
    out.push_str("Criteria\n");
    out.push_str(&format!("{thin}\n"));
    out.push_str(&format!("{:<8}CPU temperature < {:.0}°C\n", "PASS", t.warn_temp_c));
    out.push_str(&format!(
        "{:<8}CPU temperature {:.0}°C to {:.0}°C\n",
        "WARN", t.warn_temp_c, t.fail_temp_c
    ));
    out.push_str(&format!("{:<8}CPU temperature > {:.0}°C\n", "FAIL", t.fail_temp_c));
    out.push_str(&format!(
        "Without temperature data: average CPU usage > {:.0}% warns, > {:.0}% fails.\n",
        t.warn_cpu_percent, t.fail_cpu_percent
    ));
    out.push_str(&format!("{rule}\n"));

    out
}

pub fn write_text_report(dir: &Path, input: &ReportInput<'_>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(REPORT_FILE_NAME);
    fs::write(&path, render_text_report(input))
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(path)
}
