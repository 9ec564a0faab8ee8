//! Mutex and reader/writer lock wrappers.
//!
//! The sync coordinator stores locks by address and releases them without
//! holding a guard object, which RAII guards cannot express; these wrappers
//! expose explicit `lock`/`unlock` pairs instead. Both are usable through a
//! shared reference so a lock embedded in a refcounted cell can be operated
//! on from any clone of the cell.

use std::sync::{Condvar, Mutex};

/// A mutex with explicit lock/unlock.
#[derive(Debug)]
pub struct RawMutex {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl RawMutex {
    /// An unlocked mutex.
    pub const fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Block until the mutex is held by this caller.
    pub fn lock(&self) {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.cond.wait(locked).unwrap();
        }
        *locked = true;
    }

    /// Acquire without blocking; returns whether the lock was taken.
    pub fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock().unwrap();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Release. The caller must currently hold the lock.
    pub fn unlock(&self) {
        let mut locked = self.locked.lock().unwrap();
        debug_assert!(*locked, "unlock of an unheld mutex");
        *locked = false;
        drop(locked);
        self.cond.notify_one();
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct RwState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// A reader/writer lock with explicit lock/unlock, writer-preferring.
#[derive(Debug)]
pub struct RawRwLock {
    state: Mutex<RwState>,
    readers: Condvar,
    writers: Condvar,
}

impl RawRwLock {
    /// An unlocked rwlock.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RwState {
                readers: 0,
                writer: false,
                waiting_writers: 0,
            }),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    /// Block until shared (reader) access is held.
    pub fn lock_shared(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writer || state.waiting_writers > 0 {
            state = self.readers.wait(state).unwrap();
        }
        state.readers += 1;
    }

    /// Take shared access without blocking; returns whether it was taken.
    pub fn try_lock_shared(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.writer || state.waiting_writers > 0 {
            false
        } else {
            state.readers += 1;
            true
        }
    }

    /// Release shared access.
    pub fn unlock_shared(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.readers > 0, "unlock_shared without readers");
        state.readers -= 1;
        let wake_writer = state.readers == 0;
        drop(state);
        if wake_writer {
            self.writers.notify_one();
        }
    }

    /// Block until exclusive (writer) access is held.
    pub fn lock_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            state = self.writers.wait(state).unwrap();
        }
        state.waiting_writers -= 1;
        state.writer = true;
    }

    /// Take exclusive access without blocking; returns whether it was taken.
    pub fn try_lock_exclusive(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.writer || state.readers > 0 {
            false
        } else {
            state.writer = true;
            true
        }
    }

    /// Release exclusive access.
    pub fn unlock_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.writer, "unlock_exclusive without a writer");
        state.writer = false;
        let wake_readers = state.waiting_writers == 0;
        drop(state);
        if wake_readers {
            self.readers.notify_all();
        } else {
            self.writers.notify_one();
        }
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        Self::new()
    }
}
