//! The thread-local interpreter stack.
//!
//! Two parallel arrays indexed by slot: 8-byte value cells, and one
//! pointer-sized context cell per slot. A context cell is a tagged pointer:
//! null means the slot is uninitialized, and the low bit marks a
//! *non-owning* view (type contexts are at least 8-byte aligned, so the bit
//! is free). Frame unwinding destroys exactly the owning slots.
//!
//! This tagged pointer is the single non-owning convention in the runtime:
//! `Dereference` and `GetMember` produce views by setting the bit through
//! [`set_reference_context_at`], and [`unwind_frame`] skips them by reading
//! it. There is no second mechanism.
//!
//! Each frame is preceded by a 4-slot reserved prefix capturing the
//! caller's instruction pointer, frame length, and return destinations.
//! The stack is a thread-owned resource: it is allocated on a thread's
//! first use and torn down when the thread exits.

use core::cell::Cell;

use basalt_asm::Bytecode;

use crate::consts::{
    slots_for_size, MAX_FRAME_LEN, OLD_FRAME_LENGTH, OLD_INSTRUCTION_POINTER,
    OLD_RETURN_CONTEXT_DST, OLD_RETURN_VALUE_DST, RESERVED_SLOTS, STACK_SLOTS,
};
use crate::context::{self, TypeContext};

static_assertions::const_assert!(core::mem::align_of::<TypeContext>() >= 2);

/// One tagged context cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct SlotContext(usize);

impl SlotContext {
    const NON_OWNING_BIT: usize = 1;

    const EMPTY: Self = Self(0);

    fn owned(context: &TypeContext) -> Self {
        Self(context as *const TypeContext as usize)
    }

    fn borrowed(context: &TypeContext) -> Self {
        Self(context as *const TypeContext as usize | Self::NON_OWNING_BIT)
    }

    /// The context pointer with the tag masked away.
    ///
    /// The returned lifetime is a promise the caller keeps: contexts are
    /// either `'static` built-ins or live in a program arena that outlives
    /// every execution touching it.
    fn context(self) -> Option<&'static TypeContext> {
        let ptr = (self.0 & !Self::NON_OWNING_BIT) as *const TypeContext;
        unsafe { ptr.as_ref() }
    }

    fn is_owning(self) -> bool {
        self.0 & Self::NON_OWNING_BIT == 0
    }
}

/// Per-thread stack state. Scalar state lives in `Cell`s and the arrays
/// behind raw pointers, so nested interpreter entries (a native callee
/// calling back into script code) never alias a Rust reference.
struct ThreadStack {
    ip: Cell<*const Bytecode>,
    /// Where the next frame's reserved prefix would start.
    next_base_offset: Cell<usize>,
    frame: Cell<Frame>,
    values: *mut u64,
    contexts: *mut SlotContext,
}

impl ThreadStack {
    fn alloc() -> Self {
        let values = vec![0u64; STACK_SLOTS].into_boxed_slice();
        let contexts = vec![SlotContext::EMPTY; STACK_SLOTS].into_boxed_slice();
        Self {
            ip: Cell::new(core::ptr::null()),
            next_base_offset: Cell::new(0),
            frame: Cell::new(Frame::default()),
            values: Box::into_raw(values).cast::<u64>(),
            contexts: Box::into_raw(contexts).cast::<SlotContext>(),
        }
    }
}

impl Drop for ThreadStack {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(core::slice::from_raw_parts_mut(
                self.values,
                STACK_SLOTS,
            )));
            drop(Box::from_raw(core::slice::from_raw_parts_mut(
                self.contexts,
                STACK_SLOTS,
            )));
        }
    }
}

thread_local! {
    static STACK: ThreadStack = ThreadStack::alloc();
}

/// One active stack frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Absolute slot offset of the frame's reserved prefix.
    pub base_offset: usize,
    /// Usable slots past the reserved prefix.
    pub frame_length: usize,
    /// Where a `Return` writes the value; null for no return.
    pub return_value: *mut u8,
    /// Where a `Return` writes the value's context; null for no return.
    pub return_context: *mut *const TypeContext,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            base_offset: 0,
            frame_length: 0,
            return_value: core::ptr::null_mut(),
            return_context: core::ptr::null_mut(),
        }
    }
}

fn with<R>(f: impl FnOnce(&ThreadStack) -> R) -> R {
    STACK.with(f)
}

/// Absolute slot index of in-frame `offset`, bounds-checked.
fn absolute(stack: &ThreadStack, offset: usize) -> usize {
    let frame = stack.frame.get();
    assert!(
        offset < frame.frame_length,
        "slot offset {offset} outside frame of length {}",
        frame.frame_length
    );
    frame.base_offset + RESERVED_SLOTS + offset
}

unsafe fn context_cell(stack: &ThreadStack, absolute: usize) -> *mut SlotContext {
    unsafe { stack.contexts.add(absolute) }
}

/// Write a context cell at an absolute slot, nulling the trailing cells a
/// multi-slot value spans.
unsafe fn set_cell(stack: &ThreadStack, absolute: usize, cell: SlotContext, size: usize) {
    unsafe {
        *context_cell(stack, absolute) = cell;
        for i in 1..slots_for_size(size) {
            *context_cell(stack, absolute + i) = SlotContext::EMPTY;
        }
    }
}

/// Reserve `frame_length + RESERVED_SLOTS` slots for a new frame, capturing
/// the current frame's state in the reserved prefix.
///
/// Panics when `frame_length` exceeds [`MAX_FRAME_LEN`] or the stack is
/// exhausted.
pub fn push_frame(
    frame_length: usize,
    return_value: *mut u8,
    return_context: *mut *const TypeContext,
) {
    assert!(
        frame_length <= MAX_FRAME_LEN as usize,
        "frame length {frame_length} exceeds {MAX_FRAME_LEN}"
    );
    with(|stack| {
        let base = stack.next_base_offset.get();
        assert!(
            base + RESERVED_SLOTS + frame_length <= STACK_SLOTS,
            "interpreter stack exhausted"
        );

        unsafe {
            let prefix = stack.values.add(base);
            if base == 0 {
                prefix.add(OLD_INSTRUCTION_POINTER).write(0);
                prefix.add(OLD_FRAME_LENGTH).write(0);
                prefix.add(OLD_RETURN_VALUE_DST).write(0);
                prefix.add(OLD_RETURN_CONTEXT_DST).write(0);
            } else {
                let frame = stack.frame.get();
                prefix
                    .add(OLD_INSTRUCTION_POINTER)
                    .write(stack.ip.get() as u64);
                prefix.add(OLD_FRAME_LENGTH).write(frame.frame_length as u64);
                prefix
                    .add(OLD_RETURN_VALUE_DST)
                    .write(frame.return_value as u64);
                prefix
                    .add(OLD_RETURN_CONTEXT_DST)
                    .write(frame.return_context as u64);
            }
        }

        stack.frame.set(Frame {
            base_offset: base,
            frame_length,
            return_value,
            return_context,
        });
        stack.next_base_offset.set(base + frame_length + RESERVED_SLOTS);
    });
}

/// Discard the current frame and restore the caller's saved state from the
/// reserved prefix. Values are not destroyed; call [`unwind_frame`] first
/// when the frame owns any.
///
/// Panics when no frame is active.
pub fn pop_frame() {
    with(|stack| {
        assert!(stack.next_base_offset.get() != 0, "no active frame to pop");

        let frame = stack.frame.get();
        let new_next = stack.next_base_offset.get() - (frame.frame_length + RESERVED_SLOTS);
        stack.next_base_offset.set(new_next);

        if new_next == 0 {
            stack.frame.set(Frame::default());
            stack.ip.set(core::ptr::null());
            return;
        }

        unsafe {
            let prefix = stack.values.add(frame.base_offset);
            let old_ip = prefix.add(OLD_INSTRUCTION_POINTER).read() as *const Bytecode;
            let old_frame_length = prefix.add(OLD_FRAME_LENGTH).read() as usize;
            let old_return_value = prefix.add(OLD_RETURN_VALUE_DST).read() as *mut u8;
            let old_return_context =
                prefix.add(OLD_RETURN_CONTEXT_DST).read() as *mut *const TypeContext;

            stack.frame.set(Frame {
                base_offset: new_next - old_frame_length - RESERVED_SLOTS,
                frame_length: old_frame_length,
                return_value: old_return_value,
                return_context: old_return_context,
            });
            stack.ip.set(old_ip);
        }
    });
}

/// Destroy every owning value in the current frame and null its context.
/// Non-owning views and empty slots are skipped. Does not pop the frame.
pub fn unwind_frame() {
    let frame_length = with(|stack| stack.frame.get().frame_length);
    for offset in 0..frame_length {
        let (value, context) = with(|stack| {
            let abs = absolute(stack, offset);
            let cell = unsafe { *context_cell(stack, abs) };
            match cell.context() {
                Some(ctx) if cell.is_owning() => {
                    (unsafe { stack.values.add(abs).cast::<u8>() }, Some(ctx))
                }
                _ => (core::ptr::null_mut(), None),
            }
        });
        if let Some(ctx) = context {
            // Destructors may re-enter the interpreter; the thread-local is
            // not borrowed while they run.
            unsafe { context::fast_deinit(value, ctx) };
            set_null_context_at(offset);
        }
    }
}

/// The current frame record.
pub fn current_frame() -> Frame {
    with(|stack| stack.frame.get())
}

/// Offset where the next frame's reserved prefix would start. Returns to
/// its pre-push value after every matching pop.
pub fn next_base_offset() -> usize {
    with(|stack| stack.next_base_offset.get())
}

/// Address of the value at in-frame slot `offset`.
pub fn value_ptr(offset: usize) -> *mut u8 {
    with(|stack| unsafe { stack.values.add(absolute(stack, offset)).cast::<u8>() })
}

/// Copy the value at slot `offset` out as a `T`.
///
/// # Safety
///
/// The slot must hold a valid value of type `T`.
pub unsafe fn read_value<T>(offset: usize) -> T {
    unsafe { value_ptr(offset).cast::<T>().read_unaligned() }
}

/// Write `value` into slot `offset` without touching its context.
///
/// # Safety
///
/// The value region must be in-frame; the caller sets the context.
pub unsafe fn write_value<T>(offset: usize, value: T) {
    unsafe { value_ptr(offset).cast::<T>().write_unaligned(value) }
}

/// The context at slot `offset`, with the non-owning tag masked away; `None`
/// for an uninitialized slot.
pub fn context_at(offset: usize) -> Option<&'static TypeContext> {
    with(|stack| unsafe { (*context_cell(stack, absolute(stack, offset))).context() })
}

/// Whether slot `offset` owns its value. Non-owning views are produced by
/// `Dereference` and `GetMember` and skipped on unwind.
pub fn is_owning_context_at(offset: usize) -> bool {
    with(|stack| unsafe {
        let cell = *context_cell(stack, absolute(stack, offset));
        cell.context().is_some() && cell.is_owning()
    })
}

/// Set an owning context at slot `offset`. Trailing slots of a multi-slot
/// value are nulled.
pub fn set_context_at(offset: usize, context: &TypeContext) {
    with(|stack| {
        let frame = stack.frame.get();
        assert!(
            offset + slots_for_size(context.size) <= frame.frame_length,
            "value of {} bytes does not fit at slot {offset}",
            context.size
        );
        unsafe {
            set_cell(
                stack,
                absolute(stack, offset),
                SlotContext::owned(context),
                context.size,
            );
        }
    });
}

/// Set a non-owning context at slot `offset`, so unwinding will not destroy
/// the viewed value. Trailing slots of a multi-slot value are nulled.
pub fn set_reference_context_at(offset: usize, context: &TypeContext) {
    with(|stack| unsafe {
        set_cell(
            stack,
            absolute(stack, offset),
            SlotContext::borrowed(context),
            context.size,
        );
    });
}

/// Clear the context at slot `offset`, marking it moved-out or empty.
pub fn set_null_context_at(offset: usize) {
    with(|stack| unsafe {
        *context_cell(stack, absolute(stack, offset)) = SlotContext::EMPTY;
    });
}

/// Raw address of the context cell at slot `offset`, for a callee to write
/// its return context through. A plain context pointer written here reads
/// back as an owning cell; the writer covers any trailing slots itself.
pub(crate) fn context_cell_ptr(offset: usize) -> *mut *const TypeContext {
    with(|stack| unsafe { context_cell(stack, absolute(stack, offset)).cast::<*const TypeContext>() })
}

/// The thread's current instruction pointer.
pub fn instruction_pointer() -> *const Bytecode {
    with(|stack| stack.ip.get())
}

/// Point the thread at `ip`.
pub fn set_instruction_pointer(ip: *const Bytecode) {
    assert!(!ip.is_null());
    with(|stack| stack.ip.set(ip));
}

/// Copy an argument into the next, not-yet-pushed frame region using the
/// script layout: the value lands at in-frame slot `offset` of the future
/// frame with an owning context.
pub fn push_script_arg(arg: *const u8, context: &TypeContext, offset: usize) {
    with(|stack| {
        let abs = stack.next_base_offset.get() + RESERVED_SLOTS + offset;
        assert!(abs + slots_for_size(context.size) <= STACK_SLOTS, "interpreter stack exhausted");
        unsafe {
            core::ptr::copy_nonoverlapping(arg, stack.values.add(abs).cast::<u8>(), context.size);
            set_cell(stack, abs, SlotContext::owned(context), context.size);
        }
    });
}

/// Copy an argument into the next frame region using the native layout,
/// maintaining the tracking record past the last pushed argument: one slot
/// holding the argument count, then the in-frame offsets of the arguments
/// as 16-bit lanes. The existing record shifts to the new end of the
/// argument run before the new argument is written over its old position.
pub fn push_native_arg(
    arg: *const u8,
    context: &TypeContext,
    offset: usize,
    current_arg_count: usize,
    arg_track_offset: usize,
) {
    with(|stack| {
        let base = stack.next_base_offset.get() + RESERVED_SLOTS;
        let abs = base + offset;
        let new_track = abs + slots_for_size(context.size);
        assert!(
            new_track + 1 + current_arg_count / 4 + 1 <= STACK_SLOTS,
            "interpreter stack exhausted"
        );
        unsafe {
            if arg_track_offset > 0 {
                // Count slot plus the filled lane slots.
                let slots_to_move = 1 + (1 + current_arg_count / 4);
                core::ptr::copy(
                    stack.values.add(base + arg_track_offset),
                    stack.values.add(new_track),
                    slots_to_move,
                );
            }

            core::ptr::copy_nonoverlapping(arg, stack.values.add(abs).cast::<u8>(), context.size);

            stack.values.add(new_track).write(current_arg_count as u64 + 1);
            let lanes = stack.values.add(new_track + 1).cast::<u16>();
            lanes.add(current_arg_count).write(offset as u16);

            set_cell(stack, abs, SlotContext::owned(context), context.size);
        }
    });
}

/// Transfer argument `index` of a native invocation out of the stack: the
/// bytes are copied to `out`, the source slot's context is nulled, and the
/// original context is reported. `frame_base` and `arg_track_offset` come
/// from the invocation's [`crate::call::Handler`].
pub fn take_arg(
    frame_base: usize,
    arg_track_offset: usize,
    arg_count: usize,
    index: usize,
    out: *mut u8,
) -> &'static TypeContext {
    assert!(index < arg_count, "argument index {index} out of {arg_count}");
    with(|stack| unsafe {
        let lanes = stack
            .values
            .add(frame_base + RESERVED_SLOTS + arg_track_offset + 1)
            .cast::<u16>();
        let arg_offset = lanes.add(index).read() as usize;

        let abs = frame_base + RESERVED_SLOTS + arg_offset;
        let cell = *context_cell(stack, abs);
        let context = cell
            .context()
            .expect("native argument already taken or never pushed");

        core::ptr::copy_nonoverlapping(stack.values.add(abs).cast::<u8>(), out, context.size);
        *context_cell(stack, abs) = SlotContext::EMPTY;
        context
    })
}

/// The current frame's return destination pair.
pub fn return_dst() -> (*mut u8, *mut *const TypeContext) {
    with(|stack| {
        let frame = stack.frame.get();
        (frame.return_value, frame.return_context)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::value::ScriptString;

    #[test]
    fn push_pop_restores_next_base_offset() {
        let before = next_base_offset();
        push_frame(10, core::ptr::null_mut(), core::ptr::null_mut());
        let first = next_base_offset();
        assert_eq!(first, before + 10 + RESERVED_SLOTS);

        push_frame(5, core::ptr::null_mut(), core::ptr::null_mut());
        assert_eq!(next_base_offset(), first + 5 + RESERVED_SLOTS);

        pop_frame();
        assert_eq!(next_base_offset(), first);
        assert_eq!(current_frame().frame_length, 10);
        pop_frame();
        assert_eq!(next_base_offset(), before);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn oversized_frame_panics() {
        push_frame(MAX_FRAME_LEN as usize + 1, core::ptr::null_mut(), core::ptr::null_mut());
    }

    #[test]
    fn owning_slot_is_destroyed_exactly_once_on_unwind() {
        let _guard = crate::mem::allocation_lock();
        let live = crate::mem::live_allocations();
        push_frame(8, core::ptr::null_mut(), core::ptr::null_mut());

        let s = ScriptString::new("unwind me");
        unsafe { write_value(0, s) };
        set_context_at(0, &context::STRING);

        assert!(is_owning_context_at(0));
        unwind_frame();
        assert!(context_at(0).is_none());
        assert_eq!(crate::mem::live_allocations(), live);

        // Idempotent: a second unwind sees only empty slots.
        unwind_frame();
        pop_frame();
    }

    #[test]
    fn borrowed_slot_survives_unwind() {
        let _guard = crate::mem::allocation_lock();
        let live = crate::mem::live_allocations();
        push_frame(8, core::ptr::null_mut(), core::ptr::null_mut());

        let s = ScriptString::new("borrowed");
        unsafe { write_value(0, s) };
        set_context_at(0, &context::STRING);

        // A non-owning view of the same value in another slot.
        set_reference_context_at(2, &context::STRING);
        assert!(!is_owning_context_at(2));

        unwind_frame();
        assert!(context_at(0).is_none(), "owner destroyed");
        assert!(context_at(2).is_some(), "view context left in place");
        assert_eq!(crate::mem::live_allocations(), live);

        pop_frame();
    }

    #[test]
    fn multi_slot_value_nulls_trailing_contexts() {
        push_frame(8, core::ptr::null_mut(), core::ptr::null_mut());
        set_context_at(3, &context::INT);
        set_context_at(4, &context::STRING);
        assert!(context_at(4).is_some());
        assert!(context_at(5).is_none(), "second slot of a string is trailing");
        unwind_frame();
        pop_frame();
    }

    #[test]
    fn script_args_land_in_next_frame() {
        push_frame(4, core::ptr::null_mut(), core::ptr::null_mut());

        let value = 99i64;
        push_script_arg((&value as *const i64).cast(), &context::INT, 0);

        push_frame(4, core::ptr::null_mut(), core::ptr::null_mut());
        assert_eq!(unsafe { read_value::<i64>(0) }, 99);
        assert_eq!(
            context_at(0).unwrap() as *const _,
            &context::INT as *const _
        );
        pop_frame();
        pop_frame();
    }

    #[test]
    fn native_arg_tracking_record_enumerates_in_order() {
        let _guard = crate::mem::allocation_lock();
        push_frame(4, core::ptr::null_mut(), core::ptr::null_mut());

        // Push a 2-slot string then an int; the record must shift past both.
        let s = ScriptString::new("tracked");
        push_native_arg((&s as *const ScriptString).cast(), &context::STRING, 0, 0, 0);
        core::mem::forget(s);
        let n = 41i64;
        push_native_arg((&n as *const i64).cast(), &context::INT, 2, 1, 2);

        // args occupy 3 slots, record 2 more
        push_frame(3 + 2, core::ptr::null_mut(), core::ptr::null_mut());
        let frame = current_frame();

        let mut first = ScriptString::empty();
        let ctx = take_arg(frame.base_offset, 3, 2, 0, (&mut first as *mut ScriptString).cast());
        assert!(core::ptr::eq(ctx, &context::STRING));
        assert_eq!(first.as_str(), "tracked");
        assert!(context_at(0).is_none(), "taken argument slot is nulled");

        let mut second = 0i64;
        let ctx = take_arg(frame.base_offset, 3, 2, 1, (&mut second as *mut i64).cast());
        assert!(core::ptr::eq(ctx, &context::INT));
        assert_eq!(second, 41);

        first.deinit();
        unwind_frame();
        pop_frame();
        pop_frame();
    }
}
