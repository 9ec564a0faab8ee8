//! The function-call ABI shared by script and native callees.
//!
//! A [`CallArgs`] stages arguments directly into the next, not-yet-pushed
//! frame region of the interpreter stack, so staging works without knowing
//! how the callee will execute. Script callees then get a frame sized to
//! their compiled requirement and run under the dispatcher; native callees
//! get a frame covering the arguments plus the tracking record, and pull
//! arguments out by index through their [`Handler`].

use core::mem::MaybeUninit;

use crate::consts::slots_for_size;
use crate::context::TypeContext;
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::function::Function;
use crate::interpreter;
use crate::program::ProgramInner;
use crate::stack;

/// Fixed-size storage a host provides for a call's return value.
///
/// Large enough for any built-in value; a returned value's real extent is
/// described by the context reported beside it.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct ValueStorage([u64; Self::SLOTS]);

impl ValueStorage {
    /// Slots of storage; covers every built-in value type.
    pub const SLOTS: usize = 8;

    /// Zeroed storage.
    pub const fn zeroed() -> Self {
        Self([0; Self::SLOTS])
    }

    /// Base address.
    pub fn as_ptr(&self) -> *const u8 {
        self.0.as_ptr().cast()
    }

    /// Mutable base address.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.0.as_mut_ptr().cast()
    }

    /// Copy the storage out as a `T`.
    ///
    /// # Safety
    ///
    /// A valid `T` must have been written here, and ownership of it passes
    /// to the caller.
    pub unsafe fn read<T>(&self) -> T {
        unsafe { self.as_ptr().cast::<T>().read_unaligned() }
    }
}

/// Out-slot for a returned value's type context.
#[derive(Debug)]
pub struct ContextOut(*const TypeContext);

impl ContextOut {
    /// An empty out-slot.
    pub const fn empty() -> Self {
        Self(core::ptr::null())
    }

    /// The reported context, once the call returned one.
    pub fn get(&self) -> Option<&TypeContext> {
        unsafe { self.0.as_ref() }
    }

    fn as_mut_ptr(&mut self) -> *mut *const TypeContext {
        &mut self.0
    }
}

/// The (value, context) destination pair a callee returns through.
///
/// Both pointers are null exactly when the callee has no return type.
#[derive(Debug, Clone, Copy)]
pub struct Return {
    value: *mut u8,
    context: *mut *const TypeContext,
}

impl Return {
    /// A destination for a value-returning call.
    pub fn new(storage: &mut ValueStorage, context: &mut ContextOut) -> Self {
        Self {
            value: storage.as_mut_ptr(),
            context: context.as_mut_ptr(),
        }
    }

    /// No destination: the callee must not return a value.
    pub const fn none() -> Self {
        Self {
            value: core::ptr::null_mut(),
            context: core::ptr::null_mut(),
        }
    }

    /// Build from raw destinations (used by the dispatcher, which returns
    /// into stack slots).
    pub(crate) fn from_raw(value: *mut u8, context: *mut *const TypeContext) -> Self {
        Self { value, context }
    }

    pub(crate) fn value_ptr(&self) -> *mut u8 {
        self.value
    }

    pub(crate) fn context_ptr(&self) -> *mut *const TypeContext {
        self.context
    }

    pub(crate) fn is_none(&self) -> bool {
        self.value.is_null()
    }
}

/// Argument staging for one invocation.
///
/// Owns no heap memory: just the target callable and two counters. Pushed
/// arguments are owned by the stack until the callee consumes them.
#[derive(Debug)]
pub struct CallArgs<'a> {
    func: &'a Function,
    /// Cumulative slot offset consumed by pushed arguments.
    offset: usize,
    /// Arguments pushed so far.
    pushed: usize,
    program: *const ProgramInner,
}

impl<'a> CallArgs<'a> {
    /// Stage a call of `func`.
    pub fn new(func: &'a Function) -> Self {
        let program = match func.record() {
            Some(record) => record.program() as *const ProgramInner,
            None => core::ptr::null(),
        };
        Self {
            func,
            offset: 0,
            pushed: 0,
            program,
        }
    }

    /// Stage a call with a known owning program, so native-side errors can
    /// reach its hooks.
    pub(crate) fn with_program(func: &'a Function, program: *const ProgramInner) -> Self {
        let mut args = Self::new(func);
        if args.program.is_null() {
            args.program = program;
        }
        args
    }

    /// Push the `context.size` bytes at `arg` as the next argument; the
    /// stack takes ownership of the value.
    ///
    /// Panics when more arguments are pushed than a script callee declares,
    /// or when the cumulative size overflows its declared frame.
    pub fn push_raw(&mut self, arg: *const u8, context: &TypeContext) {
        match self.func {
            Function::Script(_) => {
                let record = self.func.record().expect("script function has a record");
                assert!(
                    self.pushed < record.arity(),
                    "script function [{}] expects {} arguments",
                    record.fq_name(),
                    record.arity()
                );
                assert!(
                    self.offset + slots_for_size(context.size) <= record.stack_slots(),
                    "overflowed script function [{}] stack frame with arguments",
                    record.fq_name()
                );
                stack::push_script_arg(arg, context, self.offset);
            }
            Function::Native(_) => {
                stack::push_native_arg(arg, context, self.offset, self.pushed, self.offset);
            }
        }
        self.offset += slots_for_size(context.size);
        self.pushed += 1;
    }

    /// Push `value` as the next argument, transferring ownership to the
    /// stack.
    pub fn push<T>(&mut self, value: T, context: &TypeContext) {
        assert_eq!(
            core::mem::size_of::<T>(),
            context.size,
            "pushed value size does not match its context"
        );
        self.push_raw((&value as *const T).cast(), context);
        core::mem::forget(value);
    }

    /// Invoke the callee. For script callees the dispatcher runs the
    /// compiled bytecode; for native callees the entry point is invoked
    /// synchronously and unconsumed arguments are destroyed afterwards.
    ///
    /// Panics when the argument count does not match the callee's arity, or
    /// when a value-returning callee is given no destination.
    pub fn call(self, ret: Return) -> RuntimeResult<()> {
        match *self.func {
            Function::Script(_) => {
                let record = self.func.record().expect("script function has a record");
                assert_eq!(
                    self.pushed,
                    record.arity(),
                    "script function [{}] expects {} arguments, {} pushed",
                    record.fq_name(),
                    record.arity(),
                    self.pushed
                );
                if record.return_type().is_some() {
                    assert!(
                        !ret.value.is_null() && !ret.context.is_null(),
                        "script function [{}] expected a return destination",
                        record.fq_name()
                    );
                }
                interpreter::execute_function(record, ret)
            }
            Function::Native(entry) => {
                // Arguments, the count slot, and the 16-bit offset lanes.
                let frame_length = self.offset + 1 + self.pushed.div_ceil(4);
                stack::push_frame(frame_length, ret.value_ptr(), ret.context_ptr());
                let frame = stack::current_frame();

                let mut handler = Handler {
                    program: self.program,
                    frame_base: frame.base_offset,
                    arg_offset: self.offset,
                    arg_count: self.pushed,
                    ret,
                };
                let code = entry(&mut handler);

                let result = if code == 0 {
                    Ok(())
                } else {
                    let error = RuntimeError::new(
                        RuntimeErrorKind::NativeCallFailed,
                        format!("native function reported status {code}"),
                    );
                    if let Some(program) = unsafe { self.program.as_ref() } {
                        program.report_runtime_error(&error);
                    }
                    Err(error)
                };

                stack::unwind_frame();
                stack::pop_frame();
                result
            }
        }
    }
}

/// What a native callee receives: the frame it runs in, its argument
/// count, and the return destination.
#[derive(Debug)]
pub struct Handler {
    program: *const ProgramInner,
    frame_base: usize,
    /// In-frame offset of the argument tracking record.
    arg_offset: usize,
    arg_count: usize,
    ret: Return,
}

impl Handler {
    /// Number of arguments the caller pushed.
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Absolute base offset of the frame this invocation runs in.
    pub fn frame_base(&self) -> usize {
        self.frame_base
    }

    /// Whether the caller supplied a return destination.
    pub fn has_return_slot(&self) -> bool {
        !self.ret.is_none()
    }

    /// Transfer argument `index` out of the stack into `out`
    /// (`context.size` bytes are written); the argument's slot is nulled
    /// and its original context returned. Ownership passes to the callee.
    pub fn take_arg(&mut self, index: usize, out: *mut u8) -> &'static TypeContext {
        stack::take_arg(self.frame_base, self.arg_offset, self.arg_count, index, out)
    }

    /// Typed [`take_arg`](Self::take_arg).
    ///
    /// # Safety
    ///
    /// Argument `index` must hold a value of type `T`.
    pub unsafe fn take_arg_value<T>(&mut self, index: usize) -> (T, &'static TypeContext) {
        let mut out = MaybeUninit::<T>::uninit();
        let context = self.take_arg(index, out.as_mut_ptr().cast());
        debug_assert_eq!(core::mem::size_of::<T>(), context.size);
        (unsafe { out.assume_init() }, context)
    }

    /// Store the return value, transferring ownership to the caller.
    /// Panics without a return destination.
    pub fn set_return<T>(&mut self, value: T, context: &TypeContext) {
        assert_eq!(core::mem::size_of::<T>(), context.size);
        self.set_return_with(context, |out| unsafe {
            out.cast::<T>().write_unaligned(value);
        });
    }

    /// Store a return value by filling the destination in place.
    pub(crate) fn set_return_with(&mut self, context: &TypeContext, fill: impl FnOnce(*mut u8)) {
        assert!(
            !self.ret.value.is_null() && !self.ret.context.is_null(),
            "native callee returned a value without a destination"
        );
        fill(self.ret.value);
        unsafe { *self.ret.context = context };
    }

    /// Route a message to the owning program's print hook, when the
    /// invocation came from a program.
    pub fn print(&self, message: &str) {
        if let Some(program) = unsafe { self.program.as_ref() } {
            program.print(message);
        }
    }

    pub(crate) fn program_ptr(&self) -> *const ProgramInner {
        self.program
    }
}
