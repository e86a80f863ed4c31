//! Configuration management for idm-test
//!
//! Config file location:
//! - Windows: %APPDATA%/idm/idm-test/config/config.toml
//! - Linux: ~/.config/idm-test/config.toml
//! - macOS: ~/Library/Application Support/id.idm.idm-test/config.toml
//!
//! You can override the config location by setting `IDM_TEST_CONFIG_PATH`.

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Monitoring session timing
    #[serde(default)]
    pub session: SessionConfig,

    /// Sensor backends
    #[serde(default)]
    pub sensors: SensorConfig,

    /// Report output and verdict thresholds
    #[serde(default)]
    pub report: ReportConfig,

    /// Synthetic load generator
    #[serde(default)]
    pub stress: StressConfig,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, toml)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("IDM_TEST_CONFIG_PATH") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs = ProjectDirs::from("id", "idm", "idm-test")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Create default config file if it doesn't exist
    pub fn init() -> Result<Self> {
        let config = Self::load()?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            config.save()?;
        }

        Ok(config)
    }
}

/// Monitoring session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between readings
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Length of the idle phase before load starts
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,

    /// Total test length in minutes (5, 10 or 30 in the field)
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u64,

    /// Upper bound for one full sensor read before the tick is skipped
    #[serde(default = "default_tick_timeout")]
    pub tick_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            idle_seconds: default_idle_seconds(),
            duration_minutes: default_duration_minutes(),
            tick_timeout_secs: default_tick_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_idle_seconds() -> u64 {
    30
}

fn default_duration_minutes() -> u64 {
    5
}

fn default_tick_timeout() -> u64 {
    60
}

/// Sensor backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Budget for each PowerShell / wmic / HTTP probe call
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    /// CPU utilisation sampling window
    #[serde(default = "default_cpu_sample_ms")]
    pub cpu_sample_ms: u64,

    /// Volume whose usage is reported as disk %
    #[serde(default = "default_disk_volume")]
    pub disk_volume: String,

    /// LibreHardwareMonitor remote web server endpoint
    #[serde(default = "default_lhm_url")]
    pub lhm_url: String,

    /// Query LibreHardwareMonitor at all
    #[serde(default = "default_true")]
    pub lhm_enabled: bool,

    /// Failed reads tolerated on the selected method before rediscovery
    #[serde(default)]
    pub rediscovery_grace_ticks: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout(),
            cpu_sample_ms: default_cpu_sample_ms(),
            disk_volume: default_disk_volume(),
            lhm_url: default_lhm_url(),
            lhm_enabled: default_true(),
            rediscovery_grace_ticks: 0,
        }
    }
}

fn default_script_timeout() -> u64 {
    8
}

fn default_cpu_sample_ms() -> u64 {
    500
}

fn default_disk_volume() -> String {
    if cfg!(target_os = "windows") {
        "C:\\".to_string()
    } else {
        "/".to_string()
    }
}

fn default_lhm_url() -> String {
    "http://127.0.0.1:8085/data.json".to_string()
}

fn default_true() -> bool {
    true
}

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where the CSV log and report are written (default: Desktop)
    pub output_dir: Option<String>,

    /// CPU temperature at or above which the verdict is WARN
    #[serde(default = "default_warn_temp")]
    pub warn_temp_c: f64,

    /// CPU temperature above which the verdict is FAIL
    #[serde(default = "default_fail_temp")]
    pub fail_temp_c: f64,

    /// Average CPU % above which the verdict is WARN (no temperature data)
    #[serde(default = "default_warn_cpu")]
    pub warn_cpu_percent: f64,

    /// Average CPU % above which the verdict is FAIL (no temperature data)
    #[serde(default = "default_fail_cpu")]
    pub fail_cpu_percent: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            warn_temp_c: default_warn_temp(),
            fail_temp_c: default_fail_temp(),
            warn_cpu_percent: default_warn_cpu(),
            fail_cpu_percent: default_fail_cpu(),
        }
    }
}

impl ReportConfig {
    /// Resolve the output directory: configured, else Desktop, else home, else cwd.
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(dir) = self.output_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(dir.trim());
        }

        UserDirs::new()
            .and_then(|dirs| {
                dirs.desktop_dir()
                    .map(PathBuf::from)
                    .or_else(|| Some(dirs.home_dir().to_path_buf()))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_warn_temp() -> f64 {
    75.0
}

fn default_fail_temp() -> f64 {
    85.0
}

fn default_warn_cpu() -> f64 {
    85.0
}

fn default_fail_cpu() -> f64 {
    95.0
}

/// Stress generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    /// Upper bound on worker threads (also capped by physical cores)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Busy burst length per cycle
    #[serde(default = "default_busy_ms")]
    pub busy_ms: u64,

    /// Rest after each burst, keeps POS hardware from overheating
    #[serde(default = "default_rest_ms")]
    pub rest_ms: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            busy_ms: default_busy_ms(),
            rest_ms: default_rest_ms(),
        }
    }
}

fn default_max_workers() -> usize {
    2
}

fn default_busy_ms() -> u64 {
    300
}

fn default_rest_ms() -> u64 {
    200
}

/// Get configuration file path for display purposes
pub fn get_config_path() -> Result<String> {
    let path = Config::config_path()?;
    Ok(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.poll_interval_secs, 5);
        assert_eq!(config.session.idle_seconds, 30);
        assert_eq!(config.session.duration_minutes, 5);
        assert_eq!(config.sensors.script_timeout_secs, 8);
        assert_eq!(config.sensors.cpu_sample_ms, 500);
        assert_eq!(config.sensors.rediscovery_grace_ticks, 0);
        assert!(config.sensors.lhm_enabled);
        assert_eq!(config.report.warn_temp_c, 75.0);
        assert_eq!(config.report.fail_temp_c, 85.0);
        assert_eq!(config.stress.max_workers, 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();

        assert!(toml.contains("[session]"));
        assert!(toml.contains("poll_interval_secs"));
        assert!(toml.contains("lhm_url"));
        assert!(toml.contains("fail_temp_c"));
        assert!(toml.contains("busy_ms"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sensors]
            lhm_enabled = false
            rediscovery_grace_ticks = 2

            [report]
            output_dir = "D:\\reports"
            "#,
        )
        .unwrap();

        assert!(!config.sensors.lhm_enabled);
        assert_eq!(config.sensors.rediscovery_grace_ticks, 2);
        assert_eq!(config.sensors.script_timeout_secs, 8);
        assert_eq!(config.session.poll_interval_secs, 5);
        assert_eq!(
            config.report.resolve_output_dir(),
            PathBuf::from("D:\\reports")
        );
    }
}
