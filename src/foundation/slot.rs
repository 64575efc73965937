use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Write-once value that any number of threads can block on.
///
/// The first [`SettleOnce::settle`] wins; later calls are ignored.
#[derive(Debug)]
pub(crate) struct SettleOnce<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for SettleOnce<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

impl<T: Clone> SettleOnce<T> {
    /// Store `value` unless already settled. Returns `true` when this call settled the slot.
    pub(crate) fn settle(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let first = slot.is_none();
        if first {
            *slot = Some(value);
        }
        self.ready.notify_all();
        first
    }

    /// Current value without blocking.
    pub(crate) fn get(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until settled.
    pub(crate) fn wait(&self) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(v) = slot.as_ref() {
                return v.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until settled or `timeout` elapses. Timeouts past the clock's range wait forever.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(v) = slot.as_ref() {
                return Some(v.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/slot.rs"]
mod tests;
