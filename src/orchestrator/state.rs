//! Running flag and cycle counter

use crate::types::CycleId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared cycle bookkeeping
///
/// The running flag is the only mutual exclusion in the system: whoever
/// claims it may touch the buffer until the returned guard is dropped.
#[derive(Debug, Default)]
pub struct CycleState {
    running: AtomicBool,
    cycles_started: AtomicU64,
}

/// Holds the running flag; releases it on drop, including during a panic
#[derive(Debug)]
pub struct RunningGuard<'a> {
    state: &'a CycleState,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}

impl CycleState {
    /// Create idle state with no cycles started
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag for a new cycle and assign its number
    ///
    /// Returns `None` without touching the counter if a cycle is already running.
    pub fn try_begin_cycle(&self) -> Option<(RunningGuard<'_>, CycleId)> {
        let guard = self.try_claim()?;
        // Only the flag holder increments, so the counter never skips or repeats
        let cycle = self.cycles_started.fetch_add(1, Ordering::AcqRel) + 1;
        Some((guard, CycleId(cycle)))
    }

    /// Claim the flag without starting a cycle
    ///
    /// Used by shutdown to run a final flush only while no cycle is in flight.
    pub fn try_claim(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard { state: self })
    }

    /// Whether the flag is currently held
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of cycles accepted so far
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Acquire)
    }
}
