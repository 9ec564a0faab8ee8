//! Heap bookkeeping for runtime-owned buffers.
//!
//! Every heap block the built-in values allocate (string buffers, array
//! storage, sync-cell inners) is counted here, so embedders and tests can
//! assert that unwinding released everything it owned.

use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Record one runtime-owned allocation.
pub(crate) fn note_alloc() {
    LIVE_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

/// Record the release of one runtime-owned allocation.
pub(crate) fn note_dealloc() {
    let previous = LIVE_ALLOCATIONS.fetch_sub(1, Ordering::Relaxed);
    debug_assert!(previous > 0, "unbalanced runtime deallocation");
}

/// Number of currently live runtime-owned heap blocks.
pub fn live_allocations() -> usize {
    LIVE_ALLOCATIONS.load(Ordering::Relaxed)
}

/// Serializes unit tests that assert on the process-wide counter.
#[cfg(test)]
pub(crate) fn allocation_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
