//! Named error values and ok-or-error results.

use crate::consts::slots_for_size;
use crate::context::{self, TypeContext};
use crate::hash;
use crate::mem;
use crate::value::ScriptString;

/// A named error, optionally carrying a payload.
///
/// Four slots wide. Errors have no default value; they are always
/// constructed explicitly.
#[repr(C)]
#[derive(Debug)]
pub struct ScriptError {
    name: ScriptString,
    payload: *mut u64,
    payload_context: *const TypeContext,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ScriptError>(), 32);

impl ScriptError {
    /// An error with no payload. Takes ownership of `name`.
    pub fn new(name: ScriptString) -> Self {
        Self {
            name,
            payload: core::ptr::null_mut(),
            payload_context: core::ptr::null(),
        }
    }

    /// An error carrying the `context.size` bytes at `payload`, moved in.
    pub fn with_payload(name: ScriptString, context: &TypeContext, payload: *const u8) -> Self {
        let slots = slots_for_size(context.size);
        let mut storage = vec![0u64; slots].into_boxed_slice();
        unsafe {
            core::ptr::copy_nonoverlapping(payload, storage.as_mut_ptr().cast::<u8>(), context.size);
        }
        mem::note_alloc();
        Self {
            name,
            payload: Box::into_raw(storage).cast::<u64>(),
            payload_context: context,
        }
    }

    /// The error's name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Destroy the name and any payload.
    pub fn deinit(&mut self) {
        self.name.deinit();
        if !self.payload.is_null() {
            unsafe {
                let ctx = &*self.payload_context;
                context::fast_deinit(self.payload.cast::<u8>(), ctx);
                drop(Box::from_raw(core::slice::from_raw_parts_mut(
                    self.payload,
                    slots_for_size(ctx.size),
                )));
            }
            mem::note_dealloc();
            self.payload = core::ptr::null_mut();
            self.payload_context = core::ptr::null();
        }
    }

    /// Deep copy.
    pub fn clone_value(&self) -> Self {
        if self.payload.is_null() {
            return Self::new(self.name.clone_ref());
        }
        let ctx = unsafe { &*self.payload_context };
        let slots = slots_for_size(ctx.size);
        let mut storage = vec![0u64; slots].into_boxed_slice();
        unsafe {
            context::fast_clone(storage.as_mut_ptr().cast::<u8>(), self.payload.cast::<u8>(), ctx);
        }
        mem::note_alloc();
        Self {
            name: self.name.clone_ref(),
            payload: Box::into_raw(storage).cast::<u64>(),
            payload_context: self.payload_context,
        }
    }

    /// Name equality; payloads compare when both are present and share a
    /// context.
    pub fn eql(&self, other: &Self) -> bool {
        if !self.name.eql(&other.name) {
            return false;
        }
        match (self.payload.is_null(), other.payload.is_null()) {
            (true, true) => true,
            (false, false) => {
                core::ptr::eq(self.payload_context, other.payload_context)
                    && unsafe {
                        context::fast_eql(
                            self.payload.cast::<u8>(),
                            other.payload.cast::<u8>(),
                            &*self.payload_context,
                        )
                    }
            }
            _ => false,
        }
    }

    /// Hash of the name.
    pub fn hash(&self) -> u64 {
        self.name.hash()
    }
}

/// A value that is either an ok payload or a [`ScriptError`].
///
/// Three slots wide. Results have no default value.
#[repr(C)]
#[derive(Debug)]
pub struct ScriptResult {
    /// Ok payload storage, or a boxed error when `is_err`.
    inner: *mut u64,
    context: *const TypeContext,
    is_err: bool,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ScriptResult>(), 24);

impl ScriptResult {
    /// An ok result holding the `context.size` bytes at `payload`, moved
    /// in.
    pub fn ok(context: &TypeContext, payload: *const u8) -> Self {
        let slots = slots_for_size(context.size);
        let mut storage = vec![0u64; slots].into_boxed_slice();
        unsafe {
            core::ptr::copy_nonoverlapping(payload, storage.as_mut_ptr().cast::<u8>(), context.size);
        }
        mem::note_alloc();
        Self {
            inner: Box::into_raw(storage).cast::<u64>(),
            context,
            is_err: false,
        }
    }

    /// An error result. Takes ownership of `error`.
    pub fn err(error: ScriptError) -> Self {
        let boxed = Box::new(error);
        mem::note_alloc();
        Self {
            inner: Box::into_raw(boxed).cast::<u64>(),
            context: core::ptr::null(),
            is_err: true,
        }
    }

    /// Whether this is the error branch.
    pub const fn is_err(&self) -> bool {
        self.is_err
    }

    /// Address of the ok payload. Must be the ok branch.
    pub fn get(&self) -> *const u8 {
        assert!(!self.is_err, "ok payload of an error result");
        self.inner.cast::<u8>()
    }

    /// The held error. Must be the error branch.
    pub fn error(&self) -> &ScriptError {
        assert!(self.is_err, "error of an ok result");
        unsafe { &*self.inner.cast::<ScriptError>() }
    }

    /// Destroy whichever branch is held.
    pub fn deinit(&mut self) {
        if self.inner.is_null() {
            return;
        }
        unsafe {
            if self.is_err {
                let mut error = Box::from_raw(self.inner.cast::<ScriptError>());
                error.deinit();
            } else {
                let ctx = &*self.context;
                context::fast_deinit(self.inner.cast::<u8>(), ctx);
                drop(Box::from_raw(core::slice::from_raw_parts_mut(
                    self.inner,
                    slots_for_size(ctx.size),
                )));
            }
        }
        mem::note_dealloc();
        self.inner = core::ptr::null_mut();
    }

    /// Deep copy of whichever branch is held.
    pub fn clone_value(&self) -> Self {
        if self.is_err {
            return Self::err(self.error().clone_value());
        }
        let ctx = unsafe { &*self.context };
        let slots = slots_for_size(ctx.size);
        let mut storage = vec![0u64; slots].into_boxed_slice();
        unsafe {
            context::fast_clone(storage.as_mut_ptr().cast::<u8>(), self.get(), ctx);
        }
        mem::note_alloc();
        Self {
            inner: Box::into_raw(storage).cast::<u64>(),
            context: self.context,
            is_err: false,
        }
    }

    /// Branch-wise equality.
    pub fn eql(&self, other: &Self) -> bool {
        match (self.is_err, other.is_err) {
            (true, true) => self.error().eql(other.error()),
            (false, false) => {
                core::ptr::eq(self.context, other.context)
                    && unsafe {
                        context::fast_eql(self.get(), other.get(), &*self.context)
                    }
            }
            _ => false,
        }
    }

    /// Branch-tagged hash.
    pub fn hash(&self) -> u64 {
        if self.is_err {
            hash::combine(1, self.error().hash())
        } else {
            hash::combine(0, unsafe { context::fast_hash(self.get(), &*self.context) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[test]
    fn error_round_trip() {
        let _guard = crate::mem::allocation_lock();
        let live = mem::live_allocations();
        let mut err = ScriptError::with_payload(
            ScriptString::new("file_not_found"),
            &context::INT,
            (&404i64 as *const i64).cast(),
        );
        assert_eq!(err.name(), "file_not_found");
        let mut copy = err.clone_value();
        assert!(err.eql(&copy));
        err.deinit();
        copy.deinit();
        assert_eq!(mem::live_allocations(), live);
    }

    #[test]
    fn result_branches() {
        let _guard = crate::mem::allocation_lock();
        let live = mem::live_allocations();
        let mut ok = ScriptResult::ok(&context::INT, (&5i64 as *const i64).cast());
        assert!(!ok.is_err());
        assert_eq!(unsafe { *ok.get().cast::<i64>() }, 5);

        let mut bad = ScriptResult::err(ScriptError::new(ScriptString::new("boom")));
        assert!(bad.is_err());
        assert!(!ok.eql(&bad));

        ok.deinit();
        bad.deinit();
        assert_eq!(mem::live_allocations(), live);
    }
}
