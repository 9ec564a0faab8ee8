//! Hashed key/value maps.

use crate::consts::slots_for_size;
use crate::context::{self, TypeContext};
use crate::hash;
use crate::mem;

/// A map from context-described keys to context-described values.
///
/// Seven slots wide. Entries keep their full key hash beside the key and
/// value storage; lookups only fall back to the key's `eql` callable on a
/// hash hit.
#[repr(C)]
#[derive(Debug)]
pub struct ScriptMap {
    key: *const TypeContext,
    value: *const TypeContext,
    keys: *mut u64,
    values: *mut u64,
    hashes: *mut u64,
    len: usize,
    cap: usize,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ScriptMap>(), 56);

impl ScriptMap {
    /// An empty map. Allocation-free.
    pub fn new(key: &TypeContext, value: &TypeContext) -> Self {
        Self {
            key,
            value,
            keys: core::ptr::null_mut(),
            values: core::ptr::null_mut(),
            hashes: core::ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    /// Context of the keys.
    pub fn key_context(&self) -> &TypeContext {
        unsafe { &*self.key }
    }

    /// Context of the values.
    pub fn value_context(&self) -> &TypeContext {
        unsafe { &*self.value }
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the map holds no entries.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key_stride(&self) -> usize {
        slots_for_size(self.key_context().size)
    }

    fn value_stride(&self) -> usize {
        slots_for_size(self.value_context().size)
    }

    fn key_at(&self, index: usize) -> *const u8 {
        unsafe { self.keys.add(index * self.key_stride()).cast::<u8>() }
    }

    fn value_at(&self, index: usize) -> *mut u8 {
        unsafe { self.values.add(index * self.value_stride()).cast::<u8>() }
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed <= self.cap {
            return;
        }
        let new_cap = needed.max(self.cap * 2).max(4);
        let mut keys = vec![0u64; new_cap * self.key_stride()].into_boxed_slice();
        let mut values = vec![0u64; new_cap * self.value_stride()].into_boxed_slice();
        let mut hashes = vec![0u64; new_cap].into_boxed_slice();
        if !self.keys.is_null() {
            unsafe {
                core::ptr::copy_nonoverlapping(self.keys, keys.as_mut_ptr(), self.len * self.key_stride());
                core::ptr::copy_nonoverlapping(
                    self.values,
                    values.as_mut_ptr(),
                    self.len * self.value_stride(),
                );
                core::ptr::copy_nonoverlapping(self.hashes, hashes.as_mut_ptr(), self.len);
            }
            self.free_storage();
        }
        mem::note_alloc();
        self.keys = Box::into_raw(keys).cast::<u64>();
        self.values = Box::into_raw(values).cast::<u64>();
        self.hashes = Box::into_raw(hashes).cast::<u64>();
        self.cap = new_cap;
    }

    fn free_storage(&mut self) {
        unsafe {
            drop(Box::from_raw(core::slice::from_raw_parts_mut(
                self.keys,
                self.cap * self.key_stride(),
            )));
            drop(Box::from_raw(core::slice::from_raw_parts_mut(
                self.values,
                self.cap * self.value_stride(),
            )));
            drop(Box::from_raw(core::slice::from_raw_parts_mut(
                self.hashes,
                self.cap,
            )));
        }
        mem::note_dealloc();
    }

    fn index_of(&self, key: *const u8, key_hash: u64) -> Option<usize> {
        (0..self.len).find(|&i| {
            (unsafe { *self.hashes.add(i) == key_hash })
                && (unsafe { context::fast_eql(self.key_at(i), key, self.key_context()) })
        })
    }

    /// Address of the value stored under `key`; null when absent.
    pub fn find_raw(&self, key: *const u8) -> *const u8 {
        if self.len == 0 {
            return core::ptr::null();
        }
        let h = unsafe { context::fast_hash(key, self.key_context()) };
        match self.index_of(key, h) {
            Some(i) => self.value_at(i),
            None => core::ptr::null(),
        }
    }

    /// Move `key` and `value` into the map. An existing entry under an
    /// equal key has its value replaced (the old value and the incoming key
    /// are destroyed). Returns whether the map grew.
    pub fn insert_raw(&mut self, key: *mut u8, value: *mut u8) -> bool {
        let h = unsafe { context::fast_hash(key, self.key_context()) };
        if self.len > 0 {
            if let Some(i) = self.index_of(key, h) {
                unsafe {
                    context::fast_deinit(self.value_at(i), self.value_context());
                    core::ptr::copy_nonoverlapping(
                        value,
                        self.value_at(i),
                        self.value_context().size,
                    );
                    context::fast_deinit(key, self.key_context());
                }
                return false;
            }
        }
        self.grow_for(1);
        unsafe {
            core::ptr::copy_nonoverlapping(
                key,
                self.keys.add(self.len * self.key_stride()).cast::<u8>(),
                self.key_context().size,
            );
            core::ptr::copy_nonoverlapping(
                value,
                self.values.add(self.len * self.value_stride()).cast::<u8>(),
                self.value_context().size,
            );
            *self.hashes.add(self.len) = h;
        }
        self.len += 1;
        true
    }

    /// Destroy every entry and free the storage.
    pub fn deinit(&mut self) {
        if !self.keys.is_null() {
            for i in 0..self.len {
                unsafe {
                    context::fast_deinit(self.key_at(i).cast_mut(), self.key_context());
                    context::fast_deinit(self.value_at(i), self.value_context());
                }
            }
            self.free_storage();
        }
        self.keys = core::ptr::null_mut();
        self.values = core::ptr::null_mut();
        self.hashes = core::ptr::null_mut();
        self.len = 0;
        self.cap = 0;
    }

    /// Deep copy through both clone callables.
    pub fn clone_value(&self) -> Self {
        let mut out = Self::new(self.key_context(), self.value_context());
        if self.len > 0 {
            out.grow_for(self.len);
            for i in 0..self.len {
                unsafe {
                    context::fast_clone(
                        out.keys.add(i * out.key_stride()).cast::<u8>(),
                        self.key_at(i),
                        self.key_context(),
                    );
                    context::fast_clone(
                        out.values.add(i * out.value_stride()).cast::<u8>(),
                        self.value_at(i),
                        self.value_context(),
                    );
                    *out.hashes.add(i) = *self.hashes.add(i);
                }
            }
            out.len = self.len;
        }
        out
    }

    /// Map equality: same size and every entry of `self` present in
    /// `other` with an equal value.
    pub fn eql(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        (0..self.len).all(|i| {
            let theirs = other.find_raw(self.key_at(i));
            !theirs.is_null()
                && unsafe { context::fast_eql(self.value_at(i), theirs, self.value_context()) }
        })
    }

    /// Order-independent combined entry hash.
    pub fn hash(&self) -> u64 {
        let mut acc = 0u64;
        for i in 0..self.len {
            let pair = hash::combine(unsafe { *self.hashes.add(i) }, unsafe {
                context::fast_hash(self.value_at(i), self.value_context())
            });
            acc ^= pair;
        }
        hash::combine(hash::hash_word(self.len as u64), acc)
    }
}
