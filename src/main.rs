//! IDM Test - POS hardware diagnostic
//!
//! Runs a timed two-phase check on a point-of-sale machine:
//! - Phase 1 watches the machine idle
//! - Phase 2 adds a moderate synthetic CPU load
//! - Every reading is logged to CSV; the run ends with a CPU temperature
//!   chart, a text report and a PASS / WARN / FAIL verdict (also the process
//!   exit code)

mod chart;
mod config;
mod hardware;
mod report;
mod session;
mod stress;

use crate::config::Config;
use crate::hardware::{SensorReader, SensorReading, SystemInfo};
use crate::report::{CsvLogger, ReportInput, SessionStats, Verdict};
use crate::session::{Phase, SessionPlan, Tick};
use crate::stress::StressEngine;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(target_os = "windows")]
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
#[cfg(target_os = "windows")]
use windows_sys::Win32::System::Console::{
    GetConsoleMode, GetStdHandle, SetConsoleCP, SetConsoleMode, SetConsoleOutputCP,
    ENABLE_PROCESSED_OUTPUT, ENABLE_VIRTUAL_TERMINAL_PROCESSING, ENABLE_WRAP_AT_EOL_OUTPUT,
    STD_ERROR_HANDLE, STD_OUTPUT_HANDLE,
};

/// Exit code for errors that prevented a verdict.
const EXIT_ERROR: u8 = 3;

/// IDM Test - POS hardware diagnostic
#[derive(Parser)]
#[command(name = "idm-test")]
#[command(author = "IDM")]
#[command(version)]
#[command(about = "Hardware diagnostic for point-of-sale machines")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full idle + load test (default)
    Run {
        /// Test length in minutes
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=1440))]
        duration: Option<u64>,

        /// Seconds between readings
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=3600))]
        poll_interval: Option<u64>,

        /// Length of the idle phase in seconds
        #[arg(long)]
        idle: Option<u64>,

        /// Directory for the CSV log and report (default: Desktop)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Take readings without a test session
    Sensors {
        /// Number of readings
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Print readings as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Detect and display system hardware and temperature sources
    Detect {
        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show configuration file location and current settings
    Config {
        /// Write the default config file if none exists
        #[arg(long, default_value_t = false)]
        init: bool,
    },
}

fn main() -> ExitCode {
    #[cfg(target_os = "windows")]
    init_windows_console();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "idm_test=debug" } else { "idm_test=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_cli(cli: Cli) -> Result<u8> {
    let mut config = Config::load()?;

    match cli.command {
        Some(Commands::Run {
            duration,
            poll_interval,
            idle,
            output_dir,
        }) => {
            if let Some(minutes) = duration {
                config.session.duration_minutes = minutes;
            }
            if let Some(secs) = poll_interval {
                config.session.poll_interval_secs = secs;
            }
            if let Some(secs) = idle {
                config.session.idle_seconds = secs;
            }
            if let Some(dir) = output_dir {
                config.report.output_dir = Some(dir.display().to_string());
            }
            run_test(&config)
        }
        None => run_test(&config),
        Some(Commands::Sensors { count, json }) => {
            show_sensors(&config, count, json)?;
            Ok(0)
        }
        Some(Commands::Detect { json }) => {
            show_detect(&config, json)?;
            Ok(0)
        }
        Some(Commands::Config { init }) => {
            show_config_info(init)?;
            Ok(0)
        }
    }
}

/// Full diagnostic session. Returns the verdict's exit code.
fn run_test(config: &Config) -> Result<u8> {
    print_banner();
    warn_if_not_elevated();

    println!("{}", "Detecting temperature sources...".bright_cyan());
    let reader = SensorReader::new(&config.sensors);
    print_methods(&reader);

    let system = SystemInfo::detect(
        &config.sensors,
        reader.cpu_method_name(),
        reader.ssd_method_name(),
    )?;
    println!("\n{}\n", system.display());

    let output_dir = config.report.resolve_output_dir();
    let mut logger = CsvLogger::create(&output_dir)?;
    info!(path = %logger.path().display(), "CSV log created");

    let plan = SessionPlan::from_config(&config.session);
    println!(
        "{} {} minute(s), reading every {}s. Press Ctrl+C to stop early.\n",
        "Test length:".bright_yellow(),
        config.session.duration_minutes,
        plan.poll_interval.as_secs()
    );

    // The caller keeps its own handle so the reader is never dropped inside the runtime.
    let reader = Arc::new(Mutex::new(reader));
    let mut stress = StressEngine::new(config.stress.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let total = plan.total;
    let mut current_phase = None;
    let outcome = rt.block_on(session::run_session(
        Arc::clone(&reader),
        plan,
        &mut stress,
        async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        },
        |tick| {
            if current_phase != Some(tick.phase) {
                current_phase = Some(tick.phase);
                println!("{}", tick.phase.title().bright_white().bold());
            }
            logger.write(tick.reading)?;
            print_progress(&tick, total);
            Ok(())
        },
    ));
    // A read stuck past its timeout must not hold the process open.
    rt.shutdown_timeout(Duration::from_secs(2));
    let outcome = outcome?;

    if !outcome.completed {
        println!("\n{}", "Test stopped before the planned end.".bright_yellow());
    }

    if outcome.readings.is_empty() {
        println!(
            "{}",
            "No readings were collected; no report written.".bright_yellow()
        );
        return Ok(Verdict::Pass.exit_code());
    }

    let stats = SessionStats::from_readings(&outcome.readings);
    let assessment = report::evaluate(&stats, &config.report);

    // A drawing failure loses only the chart, never the verdict.
    let chart_path = match chart::write_chart(&output_dir, &outcome.readings, &config.report) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "CPU temperature chart not written");
            None
        }
    };

    let report_path = report::write_text_report(
        &output_dir,
        &ReportInput {
            system: &system,
            stats: &stats,
            assessment: &assessment,
            thresholds: &config.report,
            duration_minutes: config.session.duration_minutes,
            completed: outcome.completed,
            chart: chart_path.as_deref(),
        },
    )?;

    println!();
    println!("{}", "Test finished. Files written:".bright_green().bold());
    println!("  {}", logger.path().display());
    if let Some(path) = &chart_path {
        println!("  {}", path.display());
    }
    println!("  {}", report_path.display());
    println!();

    let verdict_text = format!("RESULT: {}", assessment.verdict);
    let verdict_text = match assessment.verdict {
        Verdict::Pass => verdict_text.bright_green().bold(),
        Verdict::Warn => verdict_text.bright_yellow().bold(),
        Verdict::Fail => verdict_text.bright_red().bold(),
    };
    println!("{}", verdict_text);
    println!("{}", assessment.description);

    Ok(assessment.verdict.exit_code())
}

fn show_sensors(config: &Config, count: u32, json: bool) -> Result<()> {
    let mut reader = SensorReader::new(&config.sensors);
    if !json {
        print_methods(&reader);
        println!();
    }

    let interval = Duration::from_secs(config.session.poll_interval_secs.max(1));
    for i in 0..count.max(1) {
        if i > 0 {
            std::thread::sleep(interval);
        }
        let reading = reader.read();
        if json {
            println!("{}", serde_json::to_string(&reading)?);
        } else {
            println!("{}", format_reading(&reading));
        }
    }

    Ok(())
}

fn show_detect(config: &Config, json: bool) -> Result<()> {
    let reader = SensorReader::new(&config.sensors);
    let system = SystemInfo::detect(
        &config.sensors,
        reader.cpu_method_name(),
        reader.ssd_method_name(),
    )?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&system).context("Failed to serialize system info")?
        );
    } else {
        println!("{}", system.display());
        print_methods(&reader);
    }

    Ok(())
}

fn show_config_info(init: bool) -> Result<()> {
    println!("{}", "IDM Test Configuration\n".bright_cyan().bold());

    let path = config::get_config_path()?;
    println!("{} {}", "Config file:".bright_yellow(), path.bright_white());

    let config = if init { Config::init()? } else { Config::load()? };
    if std::path::Path::new(&path).exists() {
        println!("  {} {}", "Status:".bright_cyan(), "Exists".bright_green());
    } else {
        println!(
            "  {} {}",
            "Status:".bright_cyan(),
            "Not created yet (using defaults, run `idm-test config --init`)".bright_yellow()
        );
    }

    println!(
        "{} {}",
        "Output dir: ".bright_yellow(),
        config.report.resolve_output_dir().display()
    );
    println!();
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?
    );

    Ok(())
}

fn print_banner() {
    println!("{}", "╔══════════════════════════════════════╗".bright_cyan());
    println!("{}", "║       IDM TEST - POS DIAGNOSTIC      ║".bright_cyan());
    println!("{}", "╚══════════════════════════════════════╝".bright_cyan());
    println!();
}

fn print_methods(reader: &SensorReader) {
    let paint = |label: &str, found: bool| {
        if found {
            label.bright_green()
        } else {
            label.bright_red()
        }
    };
    println!(
        "{} {}",
        "CPU temperature:".bright_yellow(),
        paint(reader.cpu_method_label(), reader.cpu_method().is_some())
    );
    println!(
        "{} {}",
        "SSD temperature:".bright_yellow(),
        paint(reader.ssd_method_label(), reader.ssd_method().is_some())
    );
}

fn print_progress(tick: &Tick<'_>, total: Duration) {
    let pct = if total.is_zero() {
        100.0
    } else {
        (tick.elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).min(100.0)
    };
    let remaining = tick.remaining.as_secs();
    let phase = match tick.phase {
        Phase::Idle => "idle".bright_blue(),
        Phase::Load => "load".bright_magenta(),
    };

    println!(
        "[{:>5.1}%] {} {}  {}",
        pct,
        phase,
        format_reading(tick.reading),
        format!("remaining {}m {:02}s", remaining / 60, remaining % 60).bright_black()
    );
}

fn format_reading(reading: &SensorReading) -> String {
    let temp = |value: Option<f64>| value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}°C"));
    format!(
        "{}  CPU {:>5.1}%  CPU temp {:>7}  RAM {:>5.1}%  Disk {:>5.1}%  SSD temp {:>7}",
        reading.timestamp.format("%H:%M:%S"),
        reading.cpu_percent,
        temp(reading.cpu_temp),
        reading.ram_percent,
        reading.disk_percent,
        temp(reading.ssd_temp),
    )
}

fn warn_if_not_elevated() {
    if hardware::is_elevated() == Some(false) {
        println!(
            "{}",
            "Not running as Administrator: ACPI and storage temperature sources may be unavailable."
                .bright_yellow()
        );
        println!();
    }
}

#[cfg(target_os = "windows")]
fn init_windows_console() {
    // Enable VT sequences so colored output renders in legacy console hosts.
    // Redirected handles are not consoles and are skipped.
    unsafe {
        let _ = SetConsoleOutputCP(65001);
        let _ = SetConsoleCP(65001);

        for handle_id in [STD_OUTPUT_HANDLE, STD_ERROR_HANDLE] {
            let handle = GetStdHandle(handle_id);
            if handle.is_null() || handle == INVALID_HANDLE_VALUE {
                continue;
            }

            let mut mode: u32 = 0;
            if GetConsoleMode(handle, &mut mode) == 0 {
                continue;
            }

            let desired = mode
                | ENABLE_PROCESSED_OUTPUT
                | ENABLE_WRAP_AT_EOL_OUTPUT
                | ENABLE_VIRTUAL_TERMINAL_PROCESSING;
            let _ = SetConsoleMode(handle, desired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn test_cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "idm-test", "run", "--duration", "10", "--poll-interval", "2", "--idle", "15",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run {
                duration,
                poll_interval,
                idle,
                output_dir,
            }) => {
                assert_eq!(duration, Some(10));
                assert_eq!(poll_interval, Some(2));
                assert_eq!(idle, Some(15));
                assert!(output_dir.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_zero_duration() {
        assert!(Cli::try_parse_from(["idm-test", "run", "--duration", "0"]).is_err());
    }

    #[test]
    fn test_format_reading_marks_missing_temps() {
        let reading = SensorReading {
            timestamp: NaiveDateTime::parse_from_str("2026-03-01 09:15:07", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            cpu_percent: 7.25,
            cpu_temp: None,
            ram_percent: 41.0,
            disk_percent: 63.0,
            ssd_temp: Some(38.0),
        };
        let line = format_reading(&reading);
        assert!(line.starts_with("09:15:07"));
        assert!(line.contains("CPU temp     N/A"));
        assert!(line.contains("38.0°C"));
    }
}
