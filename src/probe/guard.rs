//! Single-flight guard for probe runs

use std::sync::atomic::{AtomicBool, Ordering};

/// At-most-one-in-flight flag
///
/// Losers of [`try_acquire`](RunGuard::try_acquire) get `None` right away;
/// there is no waiting and no queue.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: AtomicBool,
}

/// Proof of holding the guard; releases it when dropped
///
/// Dropping happens on every exit path, including early returns, panics
/// unwinding through the run and cancellation of the future holding it.
#[derive(Debug)]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}
