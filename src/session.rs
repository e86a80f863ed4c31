//! Monitoring session
//!
//! Two phases share one timeline: an idle phase, then a load phase with the
//! stress engine running. Each tick takes one reading on a blocking worker
//! bounded by a timeout so a hung WMI query can never stall the schedule.

use anyhow::Result;
use std::future::Future;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::hardware::probe::{CpuProbe, ProbeSource, StorageProbe};
use crate::hardware::utilization::UtilizationSource;
use crate::hardware::{SensorReader, SensorReading};
use crate::stress::StressEngine;

/// Anything that can produce a full reading on demand.
pub trait Sampler: Send + 'static {
    fn sample(&mut self) -> SensorReading;
}

impl<B, U> Sampler for SensorReader<B, U>
where
    B: ProbeSource<CpuProbe> + ProbeSource<StorageProbe> + Send + 'static,
    U: UtilizationSource + Send + 'static,
{
    fn sample(&mut self) -> SensorReading {
        self.read()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Load,
}

impl Phase {
    pub fn title(self) -> &'static str {
        match self {
            Phase::Idle => "Phase 1/2: idle monitoring",
            Phase::Load => "Phase 2/2: full load",
        }
    }
}

/// Resolved session timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPlan {
    pub total: Duration,
    pub idle: Duration,
    pub poll_interval: Duration,
    pub tick_timeout: Duration,
}

impl SessionPlan {
    pub fn from_config(config: &SessionConfig) -> Self {
        let total = Duration::from_secs(config.duration_minutes.saturating_mul(60));
        Self {
            total,
            idle: Duration::from_secs(config.idle_seconds).min(total),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            tick_timeout: Duration::from_secs(config.tick_timeout_secs.max(1)),
        }
    }

    pub fn load(&self) -> Duration {
        self.total.saturating_sub(self.idle)
    }

    fn phases(&self) -> [(Phase, Duration); 2] {
        [(Phase::Idle, self.idle), (Phase::Load, self.load())]
    }
}

/// Progress handed to the caller after every recorded reading.
#[derive(Debug, Clone, Copy)]
pub struct Tick<'a> {
    pub phase: Phase,
    pub reading: &'a SensorReading,
    pub elapsed: Duration,
    pub remaining: Duration,
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub readings: Vec<SensorReading>,
    /// False when the session was cancelled before both phases ran out.
    pub completed: bool,
}

/// Run both phases, or until `cancel` resolves.
///
/// `on_tick` sees each reading as it lands; an error from it aborts the
/// session. The stress engine is always stopped before returning.
pub async fn run_session<S, C, F>(
    sampler: Arc<Mutex<S>>,
    plan: SessionPlan,
    stress: &mut StressEngine,
    cancel: C,
    mut on_tick: F,
) -> Result<SessionOutcome>
where
    S: Sampler,
    C: Future<Output = ()>,
    F: FnMut(Tick<'_>) -> Result<()>,
{
    let mut cancel = std::pin::pin!(cancel);
    let mut readings = Vec::new();
    let session_start = Instant::now();
    let mut completed = true;

    'phases: for (phase, length) in plan.phases() {
        match phase {
            Phase::Idle => stress.start_idle(),
            Phase::Load => stress.start_load(),
        }
        info!(phase = phase.title(), secs = length.as_secs(), "phase started");

        let phase_start = Instant::now();
        while phase_start.elapsed() < length {
            let reading = tokio::select! {
                _ = &mut cancel => {
                    completed = false;
                    break 'phases;
                }
                reading = read_tick(Arc::clone(&sampler), plan.tick_timeout) => reading,
            };

            if let Some(reading) = reading {
                let elapsed = session_start.elapsed();
                let tick = Tick {
                    phase,
                    reading: &reading,
                    elapsed,
                    remaining: plan.total.saturating_sub(elapsed),
                };
                if let Err(err) = on_tick(tick) {
                    stress.stop();
                    return Err(err);
                }
                readings.push(reading);
            }

            tokio::select! {
                _ = &mut cancel => {
                    completed = false;
                    break 'phases;
                }
                _ = tokio::time::sleep(plan.poll_interval) => {}
            }
        }
    }

    stress.stop();
    if completed {
        info!(samples = readings.len(), "session finished");
    } else {
        warn!(samples = readings.len(), "session stopped early");
    }

    Ok(SessionOutcome {
        readings,
        completed,
    })
}

/// One reading on the blocking pool. `None` when the tick is skipped.
async fn read_tick<S: Sampler>(sampler: Arc<Mutex<S>>, timeout: Duration) -> Option<SensorReading> {
    let task = tokio::task::spawn_blocking(move || {
        let mut guard = match sampler.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Some(guard.sample())
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Some(reading))) => Some(reading),
        Ok(Ok(None)) => {
            debug!("previous sensor read still running, tick skipped");
            None
        }
        Ok(Err(err)) => {
            warn!(error = %err, "sensor read task failed, tick skipped");
            None
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "sensor read timed out, tick skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StressConfig;
    use chrono::NaiveDateTime;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    impl Sampler for Counting {
        fn sample(&mut self) -> SensorReading {
            std::thread::sleep(self.delay);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            SensorReading {
                timestamp: NaiveDateTime::parse_from_str("2026-03-01 09:15:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                cpu_percent: n as f64,
                cpu_temp: Some(40.0),
                ram_percent: 30.0,
                disk_percent: 50.0,
                ssd_temp: None,
            }
        }
    }

    fn sampler(delay: Duration) -> (Arc<Mutex<Counting>>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let sampler = Counting {
            calls: Arc::clone(&calls),
            delay,
        };
        (Arc::new(Mutex::new(sampler)), calls)
    }

    fn quiet_stress() -> StressEngine {
        StressEngine::new(StressConfig {
            max_workers: 1,
            busy_ms: 1,
            rest_ms: 20,
        })
    }

    fn plan(total_ms: u64, idle_ms: u64, poll_ms: u64, timeout_ms: u64) -> SessionPlan {
        SessionPlan {
            total: Duration::from_millis(total_ms),
            idle: Duration::from_millis(idle_ms),
            poll_interval: Duration::from_millis(poll_ms),
            tick_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_plan_from_config() {
        let plan = SessionPlan::from_config(&SessionConfig {
            poll_interval_secs: 5,
            idle_seconds: 30,
            duration_minutes: 10,
            tick_timeout_secs: 60,
        });
        assert_eq!(plan.total, Duration::from_secs(600));
        assert_eq!(plan.idle, Duration::from_secs(30));
        assert_eq!(plan.load(), Duration::from_secs(570));
    }

    #[test]
    fn test_plan_idle_clamped_to_total() {
        let plan = SessionPlan::from_config(&SessionConfig {
            poll_interval_secs: 0,
            idle_seconds: 600,
            duration_minutes: 1,
            tick_timeout_secs: 0,
        });
        assert_eq!(plan.idle, Duration::from_secs(60));
        assert_eq!(plan.load(), Duration::ZERO);
        assert_eq!(plan.poll_interval, Duration::from_secs(1));
        assert_eq!(plan.tick_timeout, Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_runs_both_phases() {
        let (sampler, _calls) = sampler(Duration::ZERO);
        let mut stress = quiet_stress();
        let mut phases = Vec::new();

        let outcome = run_session(
            sampler,
            plan(200, 80, 20, 1000),
            &mut stress,
            std::future::pending(),
            |tick| {
                phases.push(tick.phase);
                assert!(tick.remaining <= Duration::from_millis(200));
                Ok(())
            },
        )
        .await
        .unwrap();

        assert!(outcome.completed);
        assert!(!outcome.readings.is_empty());
        assert_eq!(outcome.readings.len(), phases.len());
        assert_eq!(phases.first(), Some(&Phase::Idle));
        assert_eq!(phases.last(), Some(&Phase::Load));
        assert_eq!(stress.worker_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_keeps_collected_readings() {
        let (sampler, _calls) = sampler(Duration::ZERO);
        let mut stress = quiet_stress();

        let outcome = run_session(
            sampler,
            plan(60_000, 100, 10, 1000),
            &mut stress,
            tokio::time::sleep(Duration::from_millis(250)),
            |_| Ok(()),
        )
        .await
        .unwrap();

        assert!(!outcome.completed);
        assert!(!outcome.readings.is_empty());
        assert_eq!(stress.worker_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_read_is_skipped() {
        let (sampler, calls) = sampler(Duration::from_millis(300));

        let reading = read_tick(Arc::clone(&sampler), Duration::from_millis(50)).await;
        assert!(reading.is_none());

        // The timed-out read still holds the lock
        let overlapping = read_tick(Arc::clone(&sampler), Duration::from_millis(500)).await;
        assert!(overlapping.is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let reading = read_tick(sampler, Duration::from_millis(1000)).await;
        assert!(reading.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tick_error_aborts_session() {
        let (sampler, _calls) = sampler(Duration::ZERO);
        let mut stress = quiet_stress();

        let result = run_session(
            sampler,
            plan(1000, 0, 10, 1000),
            &mut stress,
            std::future::pending(),
            |_| anyhow::bail!("disk full"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stress.worker_count(), 0);
    }
}
