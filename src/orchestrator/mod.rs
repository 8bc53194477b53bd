//! Cycle orchestration
//!
//! A cycle is: discover work items, probe them all concurrently, append the
//! outcomes to the buffer, and on every Nth cycle flush the buffer. Cycles
//! never overlap: a tick that arrives while a cycle is still running is
//! skipped and does not count.
//!
//! Every failure inside a cycle stops at [`CycleOrchestrator::run_cycle`]. It
//! is logged there and the scheduler keeps ticking.

mod state;

pub use state::{CycleState, RunningGuard};

use crate::buffer::BufferStore;
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::fan_out::FanOutRunner;
use crate::flush::FlushCoordinator;
use crate::types::{CycleId, iso_timestamp};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Summary of a completed cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number
    pub cycle: CycleId,
    /// Timestamp stamped on every outcome of the cycle
    pub cycle_timestamp: String,
    /// Work items returned by discovery
    pub work_items: usize,
    /// Outcomes appended to the buffer
    pub outcomes: usize,
    /// `None` if this was not a flush cycle, otherwise whether rows were uploaded
    pub flushed: Option<bool>,
}

/// Result of one timer tick
#[derive(Debug)]
pub enum CycleRun {
    /// Another cycle was running; nothing happened
    Skipped,
    /// The cycle ran to completion
    Completed(CycleReport),
    /// The cycle stopped early; the error has already been logged
    Failed {
        /// Cycle number
        cycle: CycleId,
        /// What stopped it
        error: Error,
    },
}

/// Owns cycle state and drives the per-cycle pipeline
pub struct CycleOrchestrator {
    state: Arc<CycleState>,
    discovery: Arc<dyn Discovery>,
    fan_out: FanOutRunner,
    buffer: BufferStore,
    flush: FlushCoordinator,
    push_interval_cycles: u64,
}

impl CycleOrchestrator {
    /// Wire an orchestrator from its components
    pub fn new(
        discovery: Arc<dyn Discovery>,
        fan_out: FanOutRunner,
        buffer: BufferStore,
        flush: FlushCoordinator,
        push_interval_cycles: u64,
    ) -> Self {
        Self {
            state: Arc::new(CycleState::new()),
            discovery,
            fan_out,
            buffer,
            flush,
            push_interval_cycles,
        }
    }

    /// Handle to the running flag and cycle counter
    pub fn state(&self) -> Arc<CycleState> {
        Arc::clone(&self.state)
    }

    /// Run one cycle unless one is already in progress
    ///
    /// Never propagates an error: failures are logged here and returned as
    /// [`CycleRun::Failed`] for inspection.
    pub async fn run_cycle(&self) -> CycleRun {
        let Some((_running, cycle)) = self.state.try_begin_cycle() else {
            warn!("Previous cycle still running, skipping this interval");
            return CycleRun::Skipped;
        };

        let started = Instant::now();
        let cycle_timestamp = iso_timestamp(Utc::now());
        info!(cycle = cycle.get(), cycle_timestamp = %cycle_timestamp, "Starting cycle");

        let result = self.cycle_body(cycle, cycle_timestamp).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                info!(
                    cycle = cycle.get(),
                    duration_ms,
                    work_items = report.work_items,
                    outcomes = report.outcomes,
                    "Finished cycle"
                );
                CycleRun::Completed(report)
            }
            Err(e) if e.is_critical() => {
                error!(
                    cycle = cycle.get(),
                    duration_ms,
                    critical = true,
                    error = %e,
                    error_code = e.error_code(),
                    "Buffer and remote sink are inconsistent; buffered rows will be uploaded again"
                );
                CycleRun::Failed { cycle, error: e }
            }
            Err(e) => {
                error!(
                    cycle = cycle.get(),
                    duration_ms,
                    error = %e,
                    error_code = e.error_code(),
                    "Cycle failed"
                );
                CycleRun::Failed { cycle, error: e }
            }
        }
    }

    async fn cycle_body(&self, cycle: CycleId, cycle_timestamp: String) -> Result<CycleReport> {
        let items = self.discovery.fetch_work_items().await?;
        let work_items = items.len();
        let mut outcomes = 0;

        if items.is_empty() {
            warn!(cycle = cycle.get(), "No work items found, skipping inference calls");
        } else {
            info!(cycle = cycle.get(), work_items, "Processing work items");
            let results = self.fan_out.run(items, &cycle_timestamp).await;
            outcomes = results.len();

            if results.is_empty() {
                info!(cycle = cycle.get(), "No outcomes to append this cycle");
            } else {
                self.buffer.append(&results).await?;
            }
        }

        let flushed = if cycle.is_flush_cycle(self.push_interval_cycles) {
            info!(cycle = cycle.get(), "Push interval reached, flushing buffer");
            Some(self.flush.flush().await?)
        } else {
            debug!(
                cycle = cycle.get(),
                push_interval_cycles = self.push_interval_cycles,
                "Not a flush cycle"
            );
            None
        };

        Ok(CycleReport {
            cycle,
            cycle_timestamp,
            work_items,
            outcomes,
            flushed,
        })
    }

    /// Drive cycles on a fixed interval until cancelled
    ///
    /// The first cycle starts immediately. Each tick runs its cycle on a
    /// separate task so a slow cycle never delays the timer; the overlap guard
    /// decides whether the tick does any work. Missed ticks are skipped.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Starting scheduler");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let orchestrator = Arc::clone(&self);
                    tokio::spawn(async move {
                        orchestrator.run_cycle().await;
                    });
                }
                _ = cancel.cancelled() => {
                    info!("Scheduler stopped");
                    break;
                }
            }
        }
    }

    /// Wait up to `grace` for an in-flight cycle to release the running flag
    ///
    /// Returns `true` once no cycle is running, `false` if the grace period ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while self.state.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
        true
    }

    /// Final flush on the way out
    ///
    /// Flushes only if no cycle is running; an in-flight cycle is left alone
    /// rather than raced. Errors are logged, never returned.
    pub async fn shutdown(&self) {
        let Some(_running) = self.state.try_claim() else {
            warn!("A cycle is currently running, skipping final upload");
            return;
        };

        info!("Attempting final upload before exit");
        match self.flush.flush().await {
            Ok(true) => info!("Final upload complete"),
            Ok(false) => info!("Nothing uploaded during shutdown"),
            Err(e) => error!(
                critical = e.is_critical(),
                error = %e,
                error_code = e.error_code(),
                "Final upload failed"
            ),
        }
    }
}
