//! Immutable, atomically refcounted strings.

use crate::hash;
use crate::mem;
use crate::sync::atomic::AtomicRefCount;

struct StringBuf {
    refs: AtomicRefCount,
    bytes: Box<[u8]>,
}

/// An immutable UTF-8 string value.
///
/// Two slots wide. Clones share the buffer through a refcount; concatenation
/// builds a fresh buffer. The empty string owns no allocation.
#[repr(C)]
#[derive(Debug)]
pub struct ScriptString {
    len: usize,
    buf: *const StringBuf,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ScriptString>(), 16);

impl ScriptString {
    /// The empty string. Allocation-free.
    pub const fn empty() -> Self {
        Self {
            len: 0,
            buf: core::ptr::null(),
        }
    }

    /// Copy `s` into a fresh string value.
    pub fn new(s: &str) -> Self {
        if s.is_empty() {
            return Self::empty();
        }
        let buf = Box::new(StringBuf {
            refs: AtomicRefCount::new(),
            bytes: s.as_bytes().into(),
        });
        mem::note_alloc();
        Self {
            len: s.len(),
            buf: Box::into_raw(buf),
        }
    }

    /// Length in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the string is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the contents.
    pub fn as_str(&self) -> &str {
        if self.buf.is_null() {
            return "";
        }
        // Buffers are written once at construction and always valid UTF-8.
        unsafe { core::str::from_utf8_unchecked(&(*self.buf).bytes) }
    }

    /// A new handle to the same buffer.
    pub fn clone_ref(&self) -> Self {
        if !self.buf.is_null() {
            unsafe { (*self.buf).refs.increment() };
        }
        Self {
            len: self.len,
            buf: self.buf,
        }
    }

    /// Release this handle, freeing the buffer with the last one. The value
    /// is left empty and safe to deinit again.
    pub fn deinit(&mut self) {
        if !self.buf.is_null() {
            let last = unsafe { (*self.buf).refs.decrement() };
            if last {
                drop(unsafe { Box::from_raw(self.buf.cast_mut()) });
                mem::note_dealloc();
            }
        }
        *self = Self::empty();
    }

    /// Concatenation into a fresh string.
    pub fn concat(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone_ref();
        }
        if other.is_empty() {
            return self.clone_ref();
        }
        let mut joined = String::with_capacity(self.len + other.len);
        joined.push_str(self.as_str());
        joined.push_str(other.as_str());
        Self::new(&joined)
    }

    /// Byte equality.
    pub fn eql(&self, other: &Self) -> bool {
        core::ptr::eq(self.buf, other.buf) || self.as_str() == other.as_str()
    }

    /// Seed-composed content hash.
    pub fn hash(&self) -> u64 {
        hash::combine(hash::seed(), hash::bytes_hash(self.as_str().as_bytes()))
    }

    /// Number of handles sharing the buffer. One for the empty string.
    pub fn ref_count(&self) -> usize {
        if self.buf.is_null() {
            1
        } else {
            unsafe { (*self.buf).refs.get() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_and_deinit_releases() {
        let _guard = crate::mem::allocation_lock();
        let live = mem::live_allocations();
        let mut a = ScriptString::new("hello");
        assert_eq!(mem::live_allocations(), live + 1);

        let mut b = a.clone_ref();
        assert_eq!(a.ref_count(), 2);
        assert_eq!(b.as_str(), "hello");

        a.deinit();
        assert_eq!(mem::live_allocations(), live + 1, "buffer survives one handle");
        assert_eq!(b.ref_count(), 1);
        b.deinit();
        assert_eq!(mem::live_allocations(), live);
    }

    #[test]
    fn concat_builds_fresh_buffer() {
        let _guard = crate::mem::allocation_lock();
        let mut a = ScriptString::new("hello");
        let mut b = ScriptString::new(" world");
        let mut joined = a.concat(&b);
        assert_eq!(joined.as_str(), "hello world");
        assert_eq!(a.ref_count(), 1);

        joined.deinit();
        a.deinit();
        b.deinit();
    }

    #[test]
    fn empty_string_is_allocation_free() {
        let _guard = crate::mem::allocation_lock();
        let live = mem::live_allocations();
        let mut empty = ScriptString::new("");
        assert!(empty.is_empty());
        assert_eq!(mem::live_allocations(), live);
        empty.deinit();
    }

    #[test]
    fn hash_consistent_with_eql() {
        let _guard = crate::mem::allocation_lock();
        let mut a = ScriptString::new("basalt");
        let mut b = ScriptString::new("basalt");
        assert!(a.eql(&b));
        assert_eq!(a.hash(), b.hash());
        a.deinit();
        b.deinit();
    }
}
