//! Fixed-interval cycle driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::debug;

use crate::cycle::{CycleReport, IngestionCycle};
use crate::error::Result;
use crate::store::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Longest uninterrupted sleep, so a stop request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Runs an [`IngestionCycle`] every `interval` until stopped.
///
/// Stopping is cooperative: the flag is checked between cycles, never
/// during one.
pub struct Monitor<S: Store> {
    cycle: IngestionCycle<S>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl<S: Store> Monitor<S> {
    pub fn new(cycle: IngestionCycle<S>, interval: Duration) -> Self {
        Self {
            cycle,
            interval,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that keeps the loop alive. Store `false` to stop it.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn cycle(&self) -> &IngestionCycle<S> {
        &self.cycle
    }

    pub fn into_cycle(self) -> IngestionCycle<S> {
        self.cycle
    }

    /// Run until stopped, printing `HH:MM:SS - Sent N` for productive cycles.
    /// Returns the total number of committed records.
    pub fn run(&mut self) -> Result<u64> {
        self.run_with(|report| {
            if report.committed > 0 {
                println!(" {} - Sent {}", Local::now().format("%H:%M:%S"), report.committed);
            }
        })
    }

    /// Run until stopped, handing every cycle's report to `on_report`.
    pub fn run_with<F: FnMut(&CycleReport)>(&mut self, mut on_report: F) -> Result<u64> {
        let mut total = 0u64;

        while self.running.load(Ordering::Relaxed) {
            let started = Instant::now();
            let report = self.cycle.run()?;
            total += report.committed as u64;
            debug!(%report, "cycle finished");
            on_report(&report);

            let deadline = started + self.interval;
            while self.running.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(SLEEP_SLICE));
            }
        }

        Ok(total)
    }
}
