//! The dispatcher: fetch, decode, execute.
//!
//! One step reads the word under the thread's instruction pointer, extracts
//! the opcode, runs the matching handler, and advances the instruction
//! pointer by the handler's computed width, unless a `Return` popped the
//! frame, in which case the restored caller pointer is left alone. Jumps
//! override the advance with their signed offset.
//!
//! Runtime faults are reported to the owning program's host hooks at their
//! origin, then propagate outward; every frame between the fault and the
//! host unwinds its own values on the way.

use basalt_asm::ops::{
    self, Binary, CallImmediate, CallKind, CallSrc, Cast, CloneValue, Compare, Deinit,
    Dereference, GetMember, ImmediateType, Jump, JumpKind, LoadCloneFromPtr, LoadDefault,
    LoadImmediate, LoadImmediateLong, LoadKind, MakeReference, MathVariant, Move, Return as RetOp,
    SetMember, SetReference, Sync, SyncKind, SyncSource,
};
use basalt_asm::{Bytecode, OpCode, ValueTag};

use crate::call::{CallArgs, Return};
use crate::context::{self, TypeContext};
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::function::{Function, FunctionRecord};
use crate::program::ProgramInner;
use crate::stack;
use crate::sync::queue::{self, SyncObject};
use crate::value::{
    ScriptArray, ScriptMap, ScriptOption, ScriptRef, ScriptSet, ScriptString, Shared, Unique,
    Weak,
};

/// Execute a compiled function on the calling thread.
///
/// Pushes a frame sized to the record's requirement, enters the bytecode,
/// and runs until the function returns or faults. On a fault the faulting
/// frame is unwound and popped here before the error propagates.
pub fn execute_function(record: &FunctionRecord, ret: Return) -> RuntimeResult<()> {
    stack::push_frame(record.stack_slots(), ret.value_ptr(), ret.context_ptr());
    stack::set_instruction_pointer(record.bytecode_start());

    let result = execute_continuous(record.program());
    if result.is_err() {
        // The success path unwinds inside `Return`; the fault path has to
        // do it explicitly.
        stack::unwind_frame();
        stack::pop_frame();
    }
    result
}

fn execute_continuous(program: &ProgramInner) -> RuntimeResult<()> {
    loop {
        let word = unsafe { *stack::instruction_pointer() };
        let is_return = word.opcode_byte() == OpCode::Return as u8;
        execute_operation(program)?;
        if is_return {
            return Ok(());
        }
    }
}

/// Execute the single instruction under the instruction pointer.
pub(crate) fn execute_operation(program: &ProgramInner) -> RuntimeResult<()> {
    let ip = stack::instruction_pointer();
    let word = unsafe { *ip };
    let opcode = word
        .opcode()
        .expect("invalid opcode byte in frozen bytecode");
    tracing::trace!(?opcode, "dispatch");

    let mut advance: i64 = 1;
    match opcode {
        OpCode::Nop => {}
        OpCode::Load => exec_load(&mut advance, ip),
        OpCode::Return => {
            exec_return(word);
            // The pop restored the caller's instruction pointer; leave it.
            return Ok(());
        }
        OpCode::Call => exec_call(program, &mut advance, ip)?,
        OpCode::Jump => exec_jump(&mut advance, word),
        OpCode::Deinit => exec_deinit(word),
        OpCode::Sync => exec_sync(&mut advance, ip),
        OpCode::Move => exec_move(word),
        OpCode::Clone => exec_clone(word),
        OpCode::Dereference => exec_dereference(program, word)?,
        OpCode::SetReference => exec_set_reference(word),
        OpCode::MakeReference => exec_make_reference(word),
        OpCode::GetMember => exec_get_member(program, word)?,
        OpCode::SetMember => exec_set_member(program, word)?,
        OpCode::Cast => exec_cast(program, word)?,
        OpCode::Equal
        | OpCode::NotEqual
        | OpCode::Less
        | OpCode::Greater
        | OpCode::LessOrEqual
        | OpCode::GreaterOrEqual => exec_compare(opcode, word),
        OpCode::Increment => exec_increment(program, word)?,
        OpCode::Add => exec_add(program, word)?,
        OpCode::Divide => exec_divide(program, word)?,
        _ => unreachable!("unknown opcode in frozen bytecode"),
    }

    stack::set_instruction_pointer(unsafe { ip.offset(advance as isize) });
    Ok(())
}

/// Build a runtime error and report it to the host hooks at its origin.
fn raise(program: &ProgramInner, kind: RuntimeErrorKind, message: String) -> RuntimeError {
    let error = RuntimeError::new(kind, message);
    program.report_runtime_error(&error);
    error
}

fn expect_context(offset: u16) -> &'static TypeContext {
    stack::context_at(offset as usize)
        .unwrap_or_else(|| panic!("slot {offset} holds no value"))
}

fn exec_load(advance: &mut i64, ip: *const Bytecode) {
    let word = unsafe { *ip };
    match LoadKind::of(word) {
        LoadKind::Immediate => {
            let op = LoadImmediate::decode(word);
            match op.ty {
                ImmediateType::Bool => unsafe {
                    stack::write_value(op.dst as usize, op.imm != 0);
                    stack::set_context_at(op.dst as usize, &context::BOOL);
                },
                ImmediateType::Int => unsafe {
                    stack::write_value(op.dst as usize, op.imm);
                    stack::set_context_at(op.dst as usize, &context::INT);
                },
            }
        }
        LoadKind::ImmediateLong => {
            let op = LoadImmediateLong::decode(word);
            assert!(
                matches!(op.tag, ValueTag::Int | ValueTag::Float | ValueTag::Char),
                "64-bit immediate loads carry single-word scalars, not {:?}",
                op.tag
            );
            let payload = unsafe { (*ip.add(1)).raw() };
            unsafe { stack::write_value(op.dst as usize, payload) };
            stack::set_context_at(op.dst as usize, context::for_tag(op.tag));
            *advance = LoadImmediateLong::WORDS as i64;
        }
        LoadKind::Default => {
            let op = LoadDefault::decode(word);
            let dst = op.dst as usize;
            match op.tag {
                ValueTag::Bool => unsafe {
                    stack::write_value(dst, false);
                    stack::set_context_at(dst, &context::BOOL);
                },
                ValueTag::Int => unsafe {
                    stack::write_value(dst, 0i64);
                    stack::set_context_at(dst, &context::INT);
                },
                ValueTag::Float => unsafe {
                    stack::write_value(dst, 0f64);
                    stack::set_context_at(dst, &context::FLOAT);
                },
                ValueTag::Char => unsafe {
                    stack::write_value(dst, '\0');
                    stack::set_context_at(dst, &context::CHAR);
                },
                ValueTag::String => unsafe {
                    stack::write_value(dst, ScriptString::empty());
                    stack::set_context_at(dst, &context::STRING);
                },
                ValueTag::Array => {
                    let elem = unsafe { &*((*ip.add(1)).raw() as *const TypeContext) };
                    unsafe { stack::write_value(dst, ScriptArray::new(elem)) };
                    stack::set_context_at(dst, &context::ARRAY);
                    *advance = 2;
                }
                ValueTag::Set => {
                    let elem = unsafe { &*((*ip.add(1)).raw() as *const TypeContext) };
                    unsafe { stack::write_value(dst, ScriptSet::new(elem)) };
                    stack::set_context_at(dst, &context::SET);
                    *advance = 2;
                }
                ValueTag::Option => {
                    let payload = unsafe { &*((*ip.add(1)).raw() as *const TypeContext) };
                    unsafe { stack::write_value(dst, ScriptOption::none(payload)) };
                    stack::set_context_at(dst, &context::OPTION);
                    *advance = 2;
                }
                ValueTag::Map => {
                    let key = unsafe { &*((*ip.add(1)).raw() as *const TypeContext) };
                    let value = unsafe { &*((*ip.add(2)).raw() as *const TypeContext) };
                    unsafe { stack::write_value(dst, ScriptMap::new(key, value)) };
                    stack::set_context_at(dst, &context::MAP);
                    *advance = 3;
                }
                ValueTag::Error | ValueTag::Result => {
                    panic!("{:?} values have no default", op.tag)
                }
                other => panic!("no default construction for {other:?}"),
            }
        }
        LoadKind::CloneFromPtr => {
            let op = LoadCloneFromPtr::decode(word);
            let source = unsafe { (*ip.add(1)).raw() as *const u8 };
            let ctx = unsafe { &*((*ip.add(2)).raw() as *const TypeContext) };
            assert!(!source.is_null(), "clone-from-ptr with a null source");
            unsafe { context::fast_clone(stack::value_ptr(op.dst as usize), source, ctx) };
            stack::set_context_at(op.dst as usize, ctx);
            *advance = LoadCloneFromPtr::WORDS as i64;
        }
    }
}

fn exec_return(word: Bytecode) {
    let op = RetOp::decode(word);
    if op.has_return {
        let (ret_value, ret_context) = stack::return_dst();
        assert!(
            !ret_value.is_null() && !ret_context.is_null(),
            "return of a value without a destination"
        );
        let src = op.src as usize;
        let ctx = expect_context(op.src);
        unsafe {
            core::ptr::copy_nonoverlapping(stack::value_ptr(src), ret_value, ctx.size);
            *ret_context = ctx;
        }
        // A move, not a clone: the slot gives its value up.
        stack::set_null_context_at(src);
    }
    stack::unwind_frame();
    stack::pop_frame();
}

fn exec_call(program: &ProgramInner, advance: &mut i64, ip: *const Bytecode) -> RuntimeResult<()> {
    let word = unsafe { *ip };

    let (func, arg_count, has_return, ret_dst, args_offset) = match CallKind::of(word) {
        CallKind::Immediate => {
            let op = CallImmediate::decode(word);
            let bits = unsafe { (*ip.add(1)).raw() };
            let func = unsafe { Function::from_parts(op.callable, bits) };
            *advance = CallImmediate::words(op.arg_count as usize) as i64;
            (
                func,
                op.arg_count as usize,
                op.has_return,
                op.ret_dst as usize,
                CallImmediate::ARGS_OFFSET,
            )
        }
        CallKind::Src => {
            let op = CallSrc::decode(word);
            assert!(
                core::ptr::eq(expect_context(op.func_src), &context::FUNCTION),
                "call source slot does not hold a function"
            );
            let func = unsafe { stack::read_value::<Function>(op.func_src as usize) };
            *advance = CallSrc::words(op.arg_count as usize) as i64;
            (
                func,
                op.arg_count as usize,
                op.has_return,
                op.ret_dst as usize,
                CallSrc::ARGS_OFFSET,
            )
        }
    };

    let lanes =
        unsafe { core::slice::from_raw_parts(ip.add(args_offset), ops::lane_words(arg_count)) };

    let mut call = CallArgs::with_program(&func, program);
    for index in 0..arg_count {
        let slot = ops::lane_at(lanes, index);
        let ctx = expect_context(slot);
        call.push_raw(stack::value_ptr(slot as usize), ctx);
        // Arguments move into the callee; the caller's slot gives them up.
        stack::set_null_context_at(slot as usize);
    }

    if has_return {
        let ret = Return::from_raw(stack::value_ptr(ret_dst), stack::context_cell_ptr(ret_dst));
        call.call(ret)
    } else {
        call.call(Return::none())
    }
}

fn exec_jump(advance: &mut i64, word: Bytecode) {
    let op = Jump::decode(word);
    match op.kind {
        JumpKind::Always => *advance = op.offset as i64,
        JumpKind::IfTrue | JumpKind::IfFalse => {
            assert!(
                core::ptr::eq(expect_context(op.cond_src), &context::BOOL),
                "jump condition slot does not hold a bool"
            );
            let cond = unsafe { stack::read_value::<bool>(op.cond_src as usize) };
            let wanted = matches!(op.kind, JumpKind::IfTrue);
            if cond == wanted {
                *advance = op.offset as i64;
            }
        }
    }
}

fn exec_deinit(word: Bytecode) {
    let op = Deinit::decode(word);
    let ctx = expect_context(op.src);
    unsafe { context::fast_deinit(stack::value_ptr(op.src as usize), ctx) };
    stack::set_null_context_at(op.src as usize);
}

fn stage_sync_source(source: SyncSource) {
    let ctx = expect_context(source.src);
    let value = stack::value_ptr(source.src as usize);
    let exclusive = matches!(source.kind, ops::AcquireKind::Exclusive);

    let object = unsafe {
        if core::ptr::eq(ctx, &context::UNIQUE) {
            SyncObject::rwlock((*value.cast::<Unique>()).lock_addr())
        } else if core::ptr::eq(ctx, &context::SHARED) {
            SyncObject::rwlock((*value.cast::<Shared>()).lock_addr())
        } else if core::ptr::eq(ctx, &context::WEAK) {
            SyncObject::rwlock((*value.cast::<Weak>()).lock_addr())
        } else {
            panic!("cannot sync a value of type {}", ctx.name())
        }
    };

    if exclusive {
        queue::add_exclusive(object);
    } else {
        queue::add_shared(object);
    }
}

fn exec_sync(advance: &mut i64, ip: *const Bytecode) {
    let word = unsafe { *ip };
    match SyncKind::of(word) {
        SyncKind::Unsync => queue::release(),
        SyncKind::Sync => {
            let header = Sync::decode(word);
            let count = header.count as usize;
            *advance = Sync::words(count) as i64;

            // Stage everything first; the acquire happens in one step once
            // the whole set is known, in address order.
            stage_sync_source(header.first);
            if count > 1 {
                stage_sync_source(header.second);
                if count > 2 {
                    let spill = unsafe {
                        core::slice::from_raw_parts(
                            ip.add(Sync::SPILL_OFFSET),
                            ops::lane_words(count - 2),
                        )
                    };
                    for index in 0..count - 2 {
                        stage_sync_source(SyncSource::from_lane(ops::lane_at(spill, index)));
                    }
                }
            }
            queue::acquire();
        }
    }
}

fn exec_move(word: Bytecode) {
    let op = Move::decode(word);
    let ctx = expect_context(op.src);
    let owning = stack::is_owning_context_at(op.src as usize);
    unsafe {
        core::ptr::copy_nonoverlapping(
            stack::value_ptr(op.src as usize),
            stack::value_ptr(op.dst as usize),
            ctx.size,
        );
    }
    if owning {
        stack::set_context_at(op.dst as usize, ctx);
    } else {
        stack::set_reference_context_at(op.dst as usize, ctx);
    }
    stack::set_null_context_at(op.src as usize);
}

fn exec_clone(word: Bytecode) {
    let op = CloneValue::decode(word);
    let ctx = expect_context(op.src);
    unsafe {
        context::fast_clone(
            stack::value_ptr(op.dst as usize),
            stack::value_ptr(op.src as usize),
            ctx,
        );
    }
    stack::set_context_at(op.dst as usize, ctx);
}

/// Resolve a reference-like slot to its pointee. Weak references fault when
/// expired.
fn resolve_pointee(
    program: &ProgramInner,
    slot: u16,
) -> RuntimeResult<(*mut u8, &'static TypeContext)> {
    let ctx = expect_context(slot);
    let value = stack::value_ptr(slot as usize);
    unsafe {
        if core::ptr::eq(ctx, &context::CONST_REF) || core::ptr::eq(ctx, &context::MUT_REF) {
            let reference = value.cast::<ScriptRef>().read_unaligned();
            if reference.ptr().is_null() {
                return Err(raise(
                    program,
                    RuntimeErrorKind::NullDereference,
                    "dereference of a null reference".to_owned(),
                ));
            }
            Ok((reference.ptr(), &*(reference.pointee() as *const TypeContext)))
        } else if core::ptr::eq(ctx, &context::UNIQUE) {
            let cell = &*value.cast::<Unique>();
            Ok((
                cell.get().cast_mut(),
                &*(cell.value_context() as *const TypeContext),
            ))
        } else if core::ptr::eq(ctx, &context::SHARED) {
            let cell = &*value.cast::<Shared>();
            Ok((
                cell.get().cast_mut(),
                &*(cell.value_context() as *const TypeContext),
            ))
        } else if core::ptr::eq(ctx, &context::WEAK) {
            let cell = &*value.cast::<Weak>();
            if cell.expired() {
                return Err(raise(
                    program,
                    RuntimeErrorKind::ExpiredWeakReference,
                    "dereference of an expired weak reference".to_owned(),
                ));
            }
            Ok((
                cell.get().cast_mut(),
                &*(cell.value_context() as *const TypeContext),
            ))
        } else {
            panic!("cannot dereference a value of type {}", ctx.name())
        }
    }
}

fn exec_dereference(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = Dereference::decode(word);
    let (pointee, pointee_ctx) = resolve_pointee(program, op.src)?;
    unsafe {
        core::ptr::copy_nonoverlapping(
            pointee.cast_const(),
            stack::value_ptr(op.dst as usize),
            pointee_ctx.size,
        );
    }
    // The pointee still belongs to whoever owns the reference.
    stack::set_reference_context_at(op.dst as usize, pointee_ctx);
    Ok(())
}

fn exec_set_reference(word: Bytecode) {
    let op = SetReference::decode(word);
    let target_ctx = expect_context(op.dst);
    let value_ctx = expect_context(op.src);

    let target = unsafe {
        if core::ptr::eq(target_ctx, &context::MUT_REF) {
            let reference = stack::value_ptr(op.dst as usize)
                .cast::<ScriptRef>()
                .read_unaligned();
            assert!(
                core::ptr::eq(reference.pointee(), value_ctx),
                "reference assignment type mismatch"
            );
            reference.ptr()
        } else if core::ptr::eq(target_ctx, &context::UNIQUE) {
            let cell = &mut *stack::value_ptr(op.dst as usize).cast::<Unique>();
            assert!(core::ptr::eq(cell.value_context(), value_ctx));
            cell.get_mut()
        } else if core::ptr::eq(target_ctx, &context::SHARED) {
            let cell = &mut *stack::value_ptr(op.dst as usize).cast::<Shared>();
            assert!(core::ptr::eq(cell.value_context(), value_ctx));
            cell.get_mut()
        } else {
            panic!(
                "cannot assign through a value of type {}",
                target_ctx.name()
            )
        }
    };

    unsafe {
        // The previous pointee dies; the source value moves in.
        context::fast_deinit(target, value_ctx);
        core::ptr::copy_nonoverlapping(
            stack::value_ptr(op.src as usize).cast_const(),
            target,
            value_ctx.size,
        );
    }
    stack::set_null_context_at(op.src as usize);
}

fn exec_make_reference(word: Bytecode) {
    let op = MakeReference::decode(word);
    let pointee_ctx = expect_context(op.src);
    let reference = ScriptRef::new(stack::value_ptr(op.src as usize), pointee_ctx);
    unsafe { stack::write_value(op.dst as usize, reference) };
    stack::set_context_at(
        op.dst as usize,
        if op.mutable {
            &context::MUT_REF
        } else {
            &context::CONST_REF
        },
    );
}

/// Resolve a member-instruction operand: a struct value in place, or a
/// reference-like value auto-dereferenced to its struct pointee.
fn resolve_struct(
    program: &ProgramInner,
    slot: u16,
) -> RuntimeResult<(*mut u8, &'static TypeContext)> {
    let ctx = expect_context(slot);
    if context::is_reference_kind(ctx) {
        resolve_pointee(program, slot)
    } else {
        Ok((stack::value_ptr(slot as usize), ctx))
    }
}

fn exec_get_member(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = GetMember::decode(word);
    let (base, struct_ctx) = resolve_struct(program, op.src)?;
    let member = struct_ctx
        .members
        .get(op.member as usize)
        .unwrap_or_else(|| {
            panic!(
                "type {} has no member index {}",
                struct_ctx.name(),
                op.member
            )
        });
    unsafe {
        core::ptr::copy_nonoverlapping(
            base.add(member.offset).cast_const(),
            stack::value_ptr(op.dst as usize),
            member.context().size,
        );
    }
    stack::set_reference_context_at(op.dst as usize, member.context());
    Ok(())
}

fn exec_set_member(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = SetMember::decode(word);
    let (base, struct_ctx) = resolve_struct(program, op.dst)?;
    let member = struct_ctx
        .members
        .get(op.member as usize)
        .unwrap_or_else(|| {
            panic!(
                "type {} has no member index {}",
                struct_ctx.name(),
                op.member
            )
        });
    let value_ctx = expect_context(op.src);
    assert!(
        core::ptr::eq(member.context(), value_ctx),
        "member assignment type mismatch"
    );
    unsafe {
        let target = base.add(member.offset);
        context::fast_deinit(target, value_ctx);
        core::ptr::copy_nonoverlapping(
            stack::value_ptr(op.src as usize).cast_const(),
            target,
            value_ctx.size,
        );
    }
    stack::set_null_context_at(op.src as usize);
    Ok(())
}

fn exec_cast(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = Cast::decode(word);
    let src_ctx = expect_context(op.src);
    let dst = op.dst as usize;
    let target = context::for_tag(op.target);

    unsafe {
        if core::ptr::eq(src_ctx, target) {
            core::ptr::copy_nonoverlapping(
                stack::value_ptr(op.src as usize).cast_const(),
                stack::value_ptr(dst),
                src_ctx.size,
            );
        } else if core::ptr::eq(src_ctx, &context::INT) && matches!(op.target, ValueTag::Float) {
            let v = stack::read_value::<i64>(op.src as usize);
            stack::write_value(dst, v as f64);
        } else if core::ptr::eq(src_ctx, &context::INT) && matches!(op.target, ValueTag::Bool) {
            let v = stack::read_value::<i64>(op.src as usize);
            stack::write_value(dst, v != 0);
        } else if core::ptr::eq(src_ctx, &context::BOOL) && matches!(op.target, ValueTag::Int) {
            let v = stack::read_value::<bool>(op.src as usize);
            stack::write_value(dst, v as i64);
        } else if core::ptr::eq(src_ctx, &context::CHAR) && matches!(op.target, ValueTag::Int) {
            let v = stack::read_value::<u32>(op.src as usize);
            stack::write_value(dst, v as i64);
        } else if core::ptr::eq(src_ctx, &context::FLOAT) && matches!(op.target, ValueTag::Int) {
            let v = stack::read_value::<f64>(op.src as usize);
            // i64 range check before truncation.
            if !(v.is_finite() && (-(2f64.powi(63))..2f64.powi(63)).contains(&v)) {
                return Err(raise(
                    program,
                    RuntimeErrorKind::FloatToIntOverflow,
                    format!("float to int conversion overflow -> {v}"),
                ));
            }
            stack::write_value(dst, v as i64);
        } else {
            panic!(
                "unsupported cast from {} to {:?}",
                src_ctx.name(),
                op.target
            );
        }
    }
    stack::set_context_at(dst, target);
    Ok(())
}

fn exec_compare(opcode: OpCode, word: Bytecode) {
    let op = Compare::decode(word);
    let ctx = expect_context(op.src1);
    assert!(
        core::ptr::eq(ctx, expect_context(op.src2)),
        "comparison of mismatched types {} and {}",
        ctx.name(),
        expect_context(op.src2).name()
    );

    let a = stack::value_ptr(op.src1 as usize);
    let b = stack::value_ptr(op.src2 as usize);

    let result = match opcode {
        OpCode::Equal => unsafe { context::fast_eql(a, b, ctx) },
        OpCode::NotEqual => unsafe { !context::fast_eql(a, b, ctx) },
        _ => {
            let ordering = unsafe { ordering_of(a, b, ctx) };
            match opcode {
                OpCode::Less => ordering.is_lt(),
                OpCode::Greater => ordering.is_gt(),
                OpCode::LessOrEqual => ordering.is_le(),
                OpCode::GreaterOrEqual => ordering.is_ge(),
                _ => unreachable!("filtered by the dispatch match"),
            }
        }
    };

    unsafe { stack::write_value(op.dst as usize, result) };
    stack::set_context_at(op.dst as usize, &context::BOOL);
}

/// Ordering for the orderable built-ins.
///
/// # Safety
///
/// Both pointers must hold live values of `ctx`'s type.
unsafe fn ordering_of(a: *const u8, b: *const u8, ctx: &TypeContext) -> core::cmp::Ordering {
    unsafe {
        if core::ptr::eq(ctx, &context::INT) {
            (*a.cast::<i64>()).cmp(&*b.cast::<i64>())
        } else if core::ptr::eq(ctx, &context::FLOAT) {
            (*a.cast::<f64>())
                .partial_cmp(&*b.cast::<f64>())
                .unwrap_or(core::cmp::Ordering::Greater)
        } else if core::ptr::eq(ctx, &context::CHAR) {
            (*a.cast::<u32>()).cmp(&*b.cast::<u32>())
        } else if core::ptr::eq(ctx, &context::STRING) {
            (*a.cast::<ScriptString>())
                .as_str()
                .cmp((*b.cast::<ScriptString>()).as_str())
        } else {
            panic!("ordering is not defined for type {}", ctx.name())
        }
    }
}

fn exec_increment(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = basalt_asm::ops::Increment::decode(word);
    let ctx = expect_context(op.src);
    assert!(
        core::ptr::eq(ctx, &context::INT),
        "increment of a non-integer {}",
        ctx.name()
    );

    let a = unsafe { stack::read_value::<i64>(op.src as usize) };
    let result = if op.can_overflow {
        a.wrapping_add(1)
    } else {
        match a.checked_add(1) {
            Some(v) => v,
            None => {
                return Err(raise(
                    program,
                    RuntimeErrorKind::IncrementIntegerOverflow,
                    format!("increment integer overflow -> {a} + 1"),
                ))
            }
        }
    };

    match op.variant {
        MathVariant::Dst => unsafe {
            stack::write_value(op.dst as usize, result);
            stack::set_context_at(op.dst as usize, &context::INT);
        },
        MathVariant::SrcAssign => unsafe {
            stack::write_value(op.src as usize, result);
        },
    }
    Ok(())
}

fn store_math_result<T>(variant: MathVariant, dst: u16, src1: u16, result: T, ctx: &TypeContext) {
    match variant {
        MathVariant::Dst => unsafe {
            stack::write_value(dst as usize, result);
            stack::set_context_at(dst as usize, ctx);
        },
        MathVariant::SrcAssign => unsafe {
            stack::write_value(src1 as usize, result);
        },
    }
}

fn exec_add(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = Binary::decode(word);
    let ctx = expect_context(op.src1);
    assert!(
        core::ptr::eq(ctx, expect_context(op.src2)),
        "addition of mismatched types"
    );

    if core::ptr::eq(ctx, &context::INT) {
        let a = unsafe { stack::read_value::<i64>(op.src1 as usize) };
        let b = unsafe { stack::read_value::<i64>(op.src2 as usize) };
        let result = if op.can_overflow {
            a.wrapping_add(b)
        } else {
            match a.checked_add(b) {
                Some(v) => v,
                None => {
                    return Err(raise(
                        program,
                        RuntimeErrorKind::AdditionIntegerOverflow,
                        format!("integer overflow -> {a} + {b}"),
                    ))
                }
            }
        };
        store_math_result(op.variant, op.dst, op.src1, result, &context::INT);
    } else if core::ptr::eq(ctx, &context::FLOAT) {
        let a = unsafe { stack::read_value::<f64>(op.src1 as usize) };
        let b = unsafe { stack::read_value::<f64>(op.src2 as usize) };
        store_math_result(op.variant, op.dst, op.src1, a + b, &context::FLOAT);
    } else if core::ptr::eq(ctx, &context::STRING) {
        let a = unsafe { &*stack::value_ptr(op.src1 as usize).cast::<ScriptString>() };
        let b = unsafe { &*stack::value_ptr(op.src2 as usize).cast::<ScriptString>() };
        let joined = a.concat(b);
        match op.variant {
            MathVariant::Dst => unsafe {
                stack::write_value(op.dst as usize, joined);
                stack::set_context_at(op.dst as usize, &context::STRING);
            },
            MathVariant::SrcAssign => unsafe {
                // Release the old left-hand string before moving in.
                (*stack::value_ptr(op.src1 as usize).cast::<ScriptString>()).deinit();
                stack::write_value(op.src1 as usize, joined);
            },
        }
    } else {
        panic!("addition is not defined for type {}", ctx.name());
    }
    Ok(())
}

fn exec_divide(program: &ProgramInner, word: Bytecode) -> RuntimeResult<()> {
    let op = Binary::decode(word);
    let ctx = expect_context(op.src1);
    assert!(
        core::ptr::eq(ctx, expect_context(op.src2)),
        "division of mismatched types"
    );

    if core::ptr::eq(ctx, &context::INT) {
        let a = unsafe { stack::read_value::<i64>(op.src1 as usize) };
        let b = unsafe { stack::read_value::<i64>(op.src2 as usize) };
        if b == 0 {
            return Err(raise(
                program,
                RuntimeErrorKind::DivideByZero,
                format!("division by zero -> {a} / {b}"),
            ));
        }
        let result = if op.can_overflow {
            a.wrapping_div(b)
        } else {
            match a.checked_div(b) {
                Some(v) => v,
                None => {
                    return Err(raise(
                        program,
                        RuntimeErrorKind::DivisionIntegerOverflow,
                        format!("integer overflow -> {a} / {b}"),
                    ))
                }
            }
        };
        store_math_result(op.variant, op.dst, op.src1, result, &context::INT);
    } else if core::ptr::eq(ctx, &context::FLOAT) {
        let a = unsafe { stack::read_value::<f64>(op.src1 as usize) };
        let b = unsafe { stack::read_value::<f64>(op.src2 as usize) };
        store_math_result(op.variant, op.dst, op.src1, a / b, &context::FLOAT);
    } else {
        panic!("division is not defined for type {}", ctx.name());
    }
    Ok(())
}
