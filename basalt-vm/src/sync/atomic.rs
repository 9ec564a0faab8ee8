//! Atomic reference counting for the shared-ownership values.

use std::sync::atomic::{AtomicUsize, Ordering};

/// An atomic counter starting at one.
///
/// `decrement` reports when the count reaches zero so the caller can release
/// the guarded resource exactly once.
#[derive(Debug)]
pub struct AtomicRefCount {
    count: AtomicUsize,
}

impl AtomicRefCount {
    /// A counter holding one reference.
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    /// Add one reference.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one reference; returns `true` when this was the last.
    pub fn decrement(&self) -> bool {
        // Release on the decrement, acquire on the last observer, so the
        // releasing thread's writes are visible to whoever frees.
        if self.count.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    /// Current count. Racy by nature; only meaningful as a diagnostic or
    /// when external synchronization pins it.
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the count has reached zero.
    pub fn is_zero(&self) -> bool {
        self.get() == 0
    }
}

impl Default for AtomicRefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_decrement_reports_zero() {
        let count = AtomicRefCount::new();
        count.increment();
        assert!(!count.decrement());
        assert!(count.decrement());
        assert!(count.is_zero());
    }
}
