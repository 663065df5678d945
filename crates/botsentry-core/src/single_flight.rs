//! In-process single-flight guard for timer-driven jobs
//!
//! Overlapping runs are skipped rather than queued. The guard is per process
//! only; running several instances needs an external lock.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Held while a run is in flight; releases the flag on drop
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a run is already in flight
    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flag: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
