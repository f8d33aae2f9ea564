//! The driver's soft mutual-exclusion gate.
//!
//! The legacy engine has no reentrancy guarantees and no cancellable
//! blocking call, so the driver serializes engine access through a single
//! boolean gate with a bounded spin-wait instead of a hard lock. A caller
//! that outwaits the ceiling may proceed anyway; `cancel` may force-clear
//! the flag under an in-flight holder. Both are accepted: this gate is
//! best-effort, not a correctness guarantee.

use crate::config::BusyWaitConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Single boolean gate enforcing at-most-one in-flight engine operation.
#[derive(Debug, Default)]
pub struct BusyFlag {
    flag: AtomicBool,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag if it is free.
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }

    /// Poll for the flag until the configured ceiling.
    ///
    /// Returns `None` when the ceiling expires without the flag coming
    /// free; the flag is left untouched.
    pub fn acquire_within(&self, config: &BusyWaitConfig) -> Option<BusyGuard<'_>> {
        let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);
        let poll = Duration::from_millis(config.poll_ms.max(1));
        loop {
            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(poll);
        }
    }

    /// Poll for the flag, then proceed anyway once the ceiling expires.
    pub fn acquire_or_barge(&self, config: &BusyWaitConfig) -> BusyGuard<'_> {
        match self.acquire_within(config) {
            Some(guard) => guard,
            None => {
                warn!(
                    "busy flag still held after {}ms, proceeding anyway",
                    config.timeout_ms
                );
                self.flag.store(true, Ordering::Release);
                BusyGuard { flag: self }
            }
        }
    }

    /// Clear the flag regardless of any holder. Used by `cancel`.
    pub fn force_clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether the flag is currently held.
    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Releases the busy flag when dropped.
#[must_use]
pub struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BusyWaitConfig {
        BusyWaitConfig {
            timeout_ms: 50,
            poll_ms: 1,
        }
    }

    #[test]
    fn acquire_and_release() {
        let busy = BusyFlag::new();
        {
            let _guard = busy.try_acquire().expect("flag free");
            assert!(busy.is_busy());
            assert!(busy.try_acquire().is_none());
        }
        assert!(!busy.is_busy());
    }

    #[test]
    fn acquire_within_times_out_without_claiming() {
        let busy = BusyFlag::new();
        let _holder = busy.try_acquire().expect("flag free");
        assert!(busy.acquire_within(&fast_config()).is_none());
        assert!(busy.is_busy());
    }

    #[test]
    fn barge_proceeds_after_ceiling() {
        let busy = BusyFlag::new();
        let holder = busy.try_acquire().expect("flag free");
        let barged = busy.acquire_or_barge(&fast_config());
        assert!(busy.is_busy());
        drop(holder);
        drop(barged);
        assert!(!busy.is_busy());
    }

    #[test]
    fn force_clear_unsticks_the_flag() {
        let busy = BusyFlag::new();
        let guard = busy.try_acquire().expect("flag free");
        std::mem::forget(guard);
        assert!(busy.is_busy());
        busy.force_clear();
        assert!(busy.try_acquire().is_some());
    }
}
