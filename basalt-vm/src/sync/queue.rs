//! The sync coordinator: a thread-local stack of address-ordered lock sets.
//!
//! Script code can request simultaneous locking of several shared-ownership
//! cells. Acquiring them in source order would deadlock two threads that
//! name the same cells in opposite orders, so every set is sorted by lock
//! address before anything is acquired. The order is total across all
//! threads, which rules out circular waits.
//!
//! The set currently being staged sits on top of the stack; acquired sets
//! sit below it. [`acquire`] locks the staged set and opens a fresh one;
//! [`release`] unlocks the most recently acquired set in reverse order and
//! pops it.

use std::cell::RefCell;

pub use basalt_asm::ops::AcquireKind;

use crate::sync::locks::RawRwLock;

/// Lock operations for one kind of lockable object, monomorphic over a raw
/// address so heterogeneous locks can share a set.
#[derive(Debug)]
pub struct LockVTable {
    /// Blocking writer acquisition.
    pub lock_exclusive: unsafe fn(*const ()),
    /// Non-blocking writer acquisition.
    pub try_lock_exclusive: unsafe fn(*const ()) -> bool,
    /// Writer release.
    pub unlock_exclusive: unsafe fn(*const ()),
    /// Blocking reader acquisition.
    pub lock_shared: unsafe fn(*const ()),
    /// Non-blocking reader acquisition.
    pub try_lock_shared: unsafe fn(*const ()) -> bool,
    /// Reader release.
    pub unlock_shared: unsafe fn(*const ()),
}

unsafe fn rwlock_lock_exclusive(ptr: *const ()) {
    unsafe { (*ptr.cast::<RawRwLock>()).lock_exclusive() }
}
unsafe fn rwlock_try_lock_exclusive(ptr: *const ()) -> bool {
    unsafe { (*ptr.cast::<RawRwLock>()).try_lock_exclusive() }
}
unsafe fn rwlock_unlock_exclusive(ptr: *const ()) {
    unsafe { (*ptr.cast::<RawRwLock>()).unlock_exclusive() }
}
unsafe fn rwlock_lock_shared(ptr: *const ()) {
    unsafe { (*ptr.cast::<RawRwLock>()).lock_shared() }
}
unsafe fn rwlock_try_lock_shared(ptr: *const ()) -> bool {
    unsafe { (*ptr.cast::<RawRwLock>()).try_lock_shared() }
}
unsafe fn rwlock_unlock_shared(ptr: *const ()) {
    unsafe { (*ptr.cast::<RawRwLock>()).unlock_shared() }
}

/// Vtable for [`RawRwLock`], the lock embedded in every sync cell.
pub static RWLOCK_VTABLE: LockVTable = LockVTable {
    lock_exclusive: rwlock_lock_exclusive,
    try_lock_exclusive: rwlock_try_lock_exclusive,
    unlock_exclusive: rwlock_unlock_exclusive,
    lock_shared: rwlock_lock_shared,
    try_lock_shared: rwlock_try_lock_shared,
    unlock_shared: rwlock_unlock_shared,
};

/// A lockable object staged for acquisition.
#[derive(Debug, Clone, Copy)]
pub struct SyncObject {
    /// Address of the lock. Keys the total acquisition order.
    pub ptr: *const (),
    /// Operations on the lock.
    pub vtable: &'static LockVTable,
}

impl SyncObject {
    /// Stage a [`RawRwLock`].
    ///
    /// # Safety
    ///
    /// The lock must stay alive until the set it joins has been released.
    pub unsafe fn rwlock(lock: *const RawRwLock) -> Self {
        Self {
            ptr: lock.cast(),
            vtable: &RWLOCK_VTABLE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    addr: usize,
    kind: AcquireKind,
    vtable: &'static LockVTable,
}

impl Entry {
    unsafe fn lock(&self) {
        match self.kind {
            AcquireKind::Exclusive => unsafe { (self.vtable.lock_exclusive)(self.addr as *const ()) },
            AcquireKind::Shared => unsafe { (self.vtable.lock_shared)(self.addr as *const ()) },
        }
    }

    unsafe fn try_lock(&self) -> bool {
        match self.kind {
            AcquireKind::Exclusive => unsafe {
                (self.vtable.try_lock_exclusive)(self.addr as *const ())
            },
            AcquireKind::Shared => unsafe { (self.vtable.try_lock_shared)(self.addr as *const ()) },
        }
    }

    unsafe fn unlock(&self) {
        match self.kind {
            AcquireKind::Exclusive => unsafe {
                (self.vtable.unlock_exclusive)(self.addr as *const ())
            },
            AcquireKind::Shared => unsafe { (self.vtable.unlock_shared)(self.addr as *const ()) },
        }
    }
}

#[derive(Debug, Default)]
struct SyncQueues {
    /// Entry sets; `sets[..current]` are acquired, `sets[current]` is being
    /// staged.
    sets: Vec<Vec<Entry>>,
    current: usize,
}

thread_local! {
    static QUEUES: RefCell<SyncQueues> = RefCell::new(SyncQueues::default());
}

fn with_staging<R>(f: impl FnOnce(&mut Vec<Entry>) -> R) -> R {
    QUEUES.with(|queues| {
        let mut queues = queues.borrow_mut();
        let current = queues.current;
        while queues.sets.len() <= current {
            queues.sets.push(Vec::new());
        }
        f(&mut queues.sets[current])
    })
}

fn add(object: SyncObject, kind: AcquireKind) {
    let addr = object.ptr as usize;
    with_staging(|set| {
        // Sorted insert by lock address; the first staging of an address
        // wins, so re-listing a cell cannot double-lock it.
        match set.binary_search_by_key(&addr, |entry| entry.addr) {
            Ok(_) => {}
            Err(index) => set.insert(
                index,
                Entry {
                    addr,
                    kind,
                    vtable: object.vtable,
                },
            ),
        }
    });
}

/// Stage a lock for exclusive acquisition in the current set.
pub fn add_exclusive(object: SyncObject) {
    add(object, AcquireKind::Exclusive);
}

/// Stage a lock for shared acquisition in the current set.
pub fn add_shared(object: SyncObject) {
    add(object, AcquireKind::Shared);
}

/// Number of entries staged in the current set.
pub fn staged_len() -> usize {
    with_staging(|set| set.len())
}

fn take_staged() -> Vec<Entry> {
    with_staging(std::mem::take)
}

/// Acquire every staged lock in ascending address order, then begin a new
/// staging set above the acquired one.
pub fn acquire() {
    let entries = take_staged();
    // Blocking lock calls happen outside the thread-local borrow.
    for entry in &entries {
        unsafe { entry.lock() };
    }
    QUEUES.with(|queues| {
        let mut queues = queues.borrow_mut();
        let current = queues.current;
        queues.sets[current] = entries;
        queues.current = current + 1;
    });
}

/// Try to acquire every staged lock; on any failure, release the ones
/// already taken in reverse order and clear the set. Returns whether the
/// whole set was acquired; partial acquisition is never observable.
pub fn try_acquire() -> bool {
    let entries = take_staged();
    let mut taken = 0;
    let all = loop {
        if taken == entries.len() {
            break true;
        }
        if unsafe { entries[taken].try_lock() } {
            taken += 1;
        } else {
            break false;
        }
    };

    if all {
        QUEUES.with(|queues| {
            let mut queues = queues.borrow_mut();
            let current = queues.current;
            queues.sets[current] = entries;
            queues.current = current + 1;
        });
        true
    } else {
        for entry in entries[..taken].iter().rev() {
            unsafe { entry.unlock() };
        }
        false
    }
}

/// Release the most recently acquired set in descending address order and
/// pop it. Panics when no set is acquired, since an unmatched unsync is a
/// code-generator bug.
pub fn release() {
    let entries = QUEUES.with(|queues| {
        let mut queues = queues.borrow_mut();
        assert!(queues.current > 0, "sync release without an acquired lock set");
        queues.current -= 1;
        let current = queues.current;
        std::mem::take(&mut queues.sets[current])
    });
    for entry in entries.iter().rev() {
        unsafe { entry.unlock() };
    }
}

/// Number of currently acquired sets on this thread.
pub fn acquired_depth() -> usize {
    QUEUES.with(|queues| queues.borrow().current)
}
