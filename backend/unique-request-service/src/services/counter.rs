use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Count of identifiers newly admitted since the last drain
///
/// `drain` is a single atomic swap, so an increment racing with a drain is
/// counted by exactly one of the two windows.
#[derive(Debug, Default, Clone)]
pub struct UniqueCounter {
    value: Arc<AtomicU64>,
}

impl UniqueCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value after the increment.
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Read the current value and reset it to zero.
    pub fn drain(&self) -> u64 {
        self.value.swap(0, Ordering::AcqRel)
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}
