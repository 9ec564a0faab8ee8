//! Shared-ownership sync cells: [`Unique`], [`Shared`], and [`Weak`].
//!
//! All three observe the same refcounted inner: an embedded reader/writer
//! lock, strong and weak counts, and the owned value. Script code must hold
//! the lock (via the sync coordinator) while touching the value; the
//! coordinator obtains the lock through [`lock_addr`](Unique::lock_addr) so
//! that a weak observer orders against its owner on the very same lock.
//!
//! The strong side collectively holds one weak reference, so the inner is
//! freed when the weak count alone reaches zero.

use crate::consts::slots_for_size;
use crate::context::{self, TypeContext};
use crate::mem;
use crate::sync::atomic::AtomicRefCount;
use crate::sync::locks::RawRwLock;

struct CellInner {
    lock: RawRwLock,
    strong: AtomicRefCount,
    weak: AtomicRefCount,
    context: *const TypeContext,
    /// Owned value storage, slot-aligned. Null once the value is destroyed.
    value: *mut u64,
    value_slots: usize,
}

fn alloc_value_slots(bytes: &[u8], slots: usize) -> *mut u64 {
    let mut storage = vec![0u64; slots].into_boxed_slice();
    // Values are plain bytes; copy into the slot-aligned storage.
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), storage.as_mut_ptr().cast::<u8>(), bytes.len());
    }
    Box::into_raw(storage).cast::<u64>()
}

fn new_inner(value: &[u8], context: &TypeContext) -> *mut CellInner {
    let slots = slots_for_size(context.size);
    let inner = Box::new(CellInner {
        lock: RawRwLock::new(),
        strong: AtomicRefCount::new(),
        weak: AtomicRefCount::new(),
        context,
        value: alloc_value_slots(value, slots),
        value_slots: slots,
    });
    mem::note_alloc();
    Box::into_raw(inner)
}

/// Destroy the owned value. Called when the last strong reference leaves.
unsafe fn drop_value(inner: *mut CellInner) {
    unsafe {
        let value = (*inner).value;
        if value.is_null() {
            return;
        }
        (*inner).lock.lock_exclusive();
        context::fast_deinit(value.cast::<u8>(), &*(*inner).context);
        (*inner).lock.unlock_exclusive();
        drop(Box::from_raw(core::slice::from_raw_parts_mut(
            value,
            (*inner).value_slots,
        )));
        (*inner).value = core::ptr::null_mut();
    }
}

/// Release one weak reference, freeing the inner with the last one.
unsafe fn release_weak(inner: *mut CellInner) {
    unsafe {
        if (*inner).weak.decrement() {
            debug_assert!((*inner).value.is_null(), "value outlived its owners");
            drop(Box::from_raw(inner));
            mem::note_dealloc();
        }
    }
}

macro_rules! cell_common {
    ($name:ident) => {
        impl $name {
            /// Context of the owned value.
            pub fn value_context(&self) -> &TypeContext {
                unsafe { &*self.context }
            }

            /// Address of the embedded reader/writer lock, for the sync
            /// coordinator.
            pub fn lock_addr(&self) -> *const RawRwLock {
                unsafe { &(*self.inner).lock as *const RawRwLock }
            }

            /// Take shared access of the embedded lock.
            pub fn lock_shared(&self) {
                unsafe { (*self.inner).lock.lock_shared() }
            }

            /// Release shared access of the embedded lock.
            pub fn unlock_shared(&self) {
                unsafe { (*self.inner).lock.unlock_shared() }
            }

            /// Take exclusive access of the embedded lock.
            pub fn lock_exclusive(&self) {
                unsafe { (*self.inner).lock.lock_exclusive() }
            }

            /// Release exclusive access of the embedded lock.
            pub fn unlock_exclusive(&self) {
                unsafe { (*self.inner).lock.unlock_exclusive() }
            }

            /// Whether two handles observe the same cell.
            pub fn same_cell(&self, other: &Self) -> bool {
                core::ptr::eq(self.inner, other.inner)
            }

            /// Identity hash of the observed cell.
            pub fn hash(&self) -> u64 {
                crate::hash::hash_word(self.inner as u64)
            }
        }

        // The inner is guarded by its lock and atomics; handles are plain
        // pointers into it.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

/// An exclusively-owned, lockable cell.
///
/// Two slots wide. Exactly one strong owner exists; weak observers may
/// outlive it.
#[repr(C)]
#[derive(Debug)]
pub struct Unique {
    inner: *mut CellInner,
    context: *const TypeContext,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Unique>(), 16);
cell_common!(Unique);

impl Unique {
    /// Move `value` into a fresh cell.
    pub fn new<T>(value: T, context: &TypeContext) -> Self {
        assert_eq!(core::mem::size_of::<T>(), context.size, "value size mismatch");
        let bytes = unsafe {
            core::slice::from_raw_parts((&value as *const T).cast::<u8>(), context.size)
        };
        let inner = new_inner(bytes, context);
        core::mem::forget(value);
        Self { inner, context }
    }

    /// Read access to the owned value. The lock must be held shared or
    /// exclusive.
    pub fn get(&self) -> *const u8 {
        unsafe { (*self.inner).value.cast::<u8>() }
    }

    /// Write access to the owned value. The lock must be held exclusive.
    pub fn get_mut(&mut self) -> *mut u8 {
        unsafe { (*self.inner).value.cast::<u8>() }
    }

    /// A weak observer of this cell. Requires no locking.
    pub fn make_weak(&self) -> Weak {
        unsafe { (*self.inner).weak.increment() };
        Weak {
            inner: self.inner,
            context: self.context,
        }
    }

    /// A new cell owning a deep clone of the value. Takes the lock shared
    /// for the duration of the clone; must not already hold it.
    pub fn clone_cell(&self) -> Self {
        let context = self.value_context();
        let slots = slots_for_size(context.size);
        let mut staged = vec![0u64; slots];
        self.lock_shared();
        unsafe {
            context::fast_clone(staged.as_mut_ptr().cast::<u8>(), self.get(), context);
        }
        self.unlock_shared();
        let bytes =
            unsafe { core::slice::from_raw_parts(staged.as_ptr().cast::<u8>(), context.size) };
        let inner = new_inner(bytes, context);
        Self {
            inner,
            context: self.context,
        }
    }

    /// Destroy the owned value and release the cell. Must not be called
    /// while the lock is held.
    pub fn deinit(&mut self) {
        unsafe {
            if (*self.inner).strong.decrement() {
                drop_value(self.inner);
            }
            release_weak(self.inner);
        }
        self.inner = core::ptr::null_mut();
    }
}

/// A shared-ownership, lockable cell.
///
/// Two slots wide. Cloning bumps the strong count; the value dies with the
/// last strong owner.
#[repr(C)]
#[derive(Debug)]
pub struct Shared {
    inner: *mut CellInner,
    context: *const TypeContext,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Shared>(), 16);
cell_common!(Shared);

impl Shared {
    /// Move `value` into a fresh cell.
    pub fn new<T>(value: T, context: &TypeContext) -> Self {
        assert_eq!(core::mem::size_of::<T>(), context.size, "value size mismatch");
        let bytes = unsafe {
            core::slice::from_raw_parts((&value as *const T).cast::<u8>(), context.size)
        };
        let inner = new_inner(bytes, context);
        core::mem::forget(value);
        Self { inner, context }
    }

    /// Read access to the owned value. The lock must be held shared or
    /// exclusive.
    pub fn get(&self) -> *const u8 {
        unsafe { (*self.inner).value.cast::<u8>() }
    }

    /// Write access to the owned value. The lock must be held exclusive.
    pub fn get_mut(&mut self) -> *mut u8 {
        unsafe { (*self.inner).value.cast::<u8>() }
    }

    /// Another strong owner of the same cell. Requires no locking.
    pub fn clone_ref(&self) -> Self {
        unsafe { (*self.inner).strong.increment() };
        Self {
            inner: self.inner,
            context: self.context,
        }
    }

    /// A weak observer of this cell. Requires no locking.
    pub fn make_weak(&self) -> Weak {
        unsafe { (*self.inner).weak.increment() };
        Weak {
            inner: self.inner,
            context: self.context,
        }
    }

    /// Release this owner; the value is destroyed with the last one. Must
    /// not be called while the lock is held.
    pub fn deinit(&mut self) {
        unsafe {
            if (*self.inner).strong.decrement() {
                drop_value(self.inner);
            }
            release_weak(self.inner);
        }
        self.inner = core::ptr::null_mut();
    }
}

/// A weak observer of a [`Unique`] or [`Shared`] cell.
///
/// Two slots wide. Holding one keeps the cell's bookkeeping (and its lock)
/// alive, but not the value.
#[repr(C)]
#[derive(Debug)]
pub struct Weak {
    inner: *mut CellInner,
    context: *const TypeContext,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Weak>(), 16);
cell_common!(Weak);

impl Weak {
    /// Whether the observed value is gone. Only meaningful while the lock
    /// is held; the answer is otherwise stale by the time it returns.
    pub fn expired(&self) -> bool {
        unsafe { (*self.inner).strong.is_zero() }
    }

    /// Read access to the observed value. The lock must be held and the
    /// cell must not be expired.
    pub fn get(&self) -> *const u8 {
        let value = unsafe { (*self.inner).value };
        debug_assert!(!value.is_null(), "read of an expired weak reference");
        value.cast::<u8>()
    }

    /// Another observer of the same cell.
    pub fn clone_ref(&self) -> Self {
        unsafe { (*self.inner).weak.increment() };
        Self {
            inner: self.inner,
            context: self.context,
        }
    }

    /// Release this observer. Must not be called while the lock is held.
    pub fn deinit(&mut self) {
        unsafe { release_weak(self.inner) };
        self.inner = core::ptr::null_mut();
    }
}
