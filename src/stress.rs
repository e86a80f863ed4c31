//! Synthetic CPU load for the second test phase
//!
//! Deliberately moderate: a couple of workers doing short busy bursts with a
//! rest after each one, so a passively cooled POS box heats up without being
//! pushed into thermal shutdown.

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::{debug, info};

use crate::config::StressConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StressMode {
    Idle,
    Load,
}

pub struct StressEngine {
    config: StressConfig,
    mode: StressMode,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl StressEngine {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            mode: StressMode::Idle,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn mode(&self) -> StressMode {
        self.mode
    }

    #[cfg(test)]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn start_idle(&mut self) {
        self.stop();
    }

    /// Spawn the load workers. Calling it again while loaded is a no-op.
    pub fn start_load(&mut self) {
        if self.mode == StressMode::Load {
            return;
        }

        let count = worker_count(self.config.max_workers, System::new().physical_core_count());
        let busy = Duration::from_millis(self.config.busy_ms);
        let rest = Duration::from_millis(self.config.rest_ms);

        self.running.store(true, Ordering::Relaxed);
        for _ in 0..count {
            let running = Arc::clone(&self.running);
            self.workers
                .push(thread::spawn(move || burn(&running, busy, rest)));
        }

        self.mode = StressMode::Load;
        info!(workers = count, "load phase started");
    }

    /// Signal the workers and join them.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if self.mode == StressMode::Load {
            debug!("load workers stopped");
        }
        self.mode = StressMode::Idle;
    }
}

impl Drop for StressEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `min(max_workers, physical cores)`, at least one; two when cores are unknown.
fn worker_count(max_workers: usize, physical_cores: Option<usize>) -> usize {
    max_workers.min(physical_cores.unwrap_or(2)).max(1)
}

fn burn(running: &AtomicBool, busy: Duration, rest: Duration) {
    while running.load(Ordering::Relaxed) {
        let end = Instant::now() + busy;
        while Instant::now() < end {
            let mut acc = 0u64;
            for x in 0..500u64 {
                acc = acc.wrapping_add(black_box(x * x));
            }
            black_box(f64::sqrt(black_box(999_999.9)) + acc as f64);
        }
        thread::sleep(rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(2, Some(8)), 2);
        assert_eq!(worker_count(2, Some(1)), 1);
        assert_eq!(worker_count(0, Some(4)), 1);
        assert_eq!(worker_count(4, None), 2);
    }

    #[test]
    fn test_start_and_stop() {
        let mut engine = StressEngine::new(StressConfig {
            max_workers: 1,
            busy_ms: 5,
            rest_ms: 5,
        });
        assert_eq!(engine.mode(), StressMode::Idle);

        engine.start_load();
        engine.start_load();
        assert_eq!(engine.mode(), StressMode::Load);
        assert_eq!(engine.worker_count(), 1);

        thread::sleep(Duration::from_millis(20));
        engine.stop();
        assert_eq!(engine.mode(), StressMode::Idle);
        assert_eq!(engine.worker_count(), 0);
    }
}
