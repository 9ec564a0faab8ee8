//! References, member access, and slot-to-slot data movement.

use std::sync::{Mutex, MutexGuard};

use basalt_asm::ops::{
    CloneValue, Deinit, Dereference, GetMember, ImmediateType, LoadCloneFromPtr, LoadImmediate,
    MakeReference, Move, Return as RetOp, SetMember, SetReference,
};
use basalt_asm::Bytecode;
use basalt_vm::context;
use basalt_vm::mem;
use basalt_vm::prelude::*;

fn counter_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn invoke_int(args: CallArgs<'_>) -> Result<i64, RuntimeError> {
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    args.call(Return::new(&mut out, &mut out_ctx))?;
    assert!(core::ptr::eq(out_ctx.get().unwrap(), &context::INT));
    Ok(unsafe { out.read::<i64>() })
}

#[test]
fn make_reference_then_dereference() {
    let mut program = Program::new();

    // 0: load 7 -> s0
    // 1: make-ref s0 -> s1 (mutable)
    // 2: deref s1 -> s3 (non-owning view)
    // 3: return s3
    let mut f = FunctionBuilder::new("refs::roundtrip", "roundtrip")
        .with_return_type(&context::INT)
        .with_stack_slots(4);
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 0,
            imm: 7,
        }
        .encode(),
    );
    f.push_bytecode(
        MakeReference {
            dst: 1,
            src: 0,
            mutable: true,
        }
        .encode(),
    );
    f.push_bytecode(Dereference { dst: 3, src: 1 }.encode());
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 3,
        }
        .encode(),
    );
    f.build(&mut program);

    let func = program.find_function("refs::roundtrip").unwrap();
    assert_eq!(invoke_int(CallArgs::new(&func)).unwrap(), 7);
}

#[test]
fn set_reference_writes_through_a_shared_cell() {
    let mut program = Program::new();

    // store9(cell): *cell = 9
    let mut f = FunctionBuilder::new("refs::store9", "store9").with_stack_slots(3);
    f.add_arg(&context::SHARED);
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 2,
            imm: 9,
        }
        .encode(),
    );
    f.push_bytecode(SetReference { dst: 0, src: 2 }.encode());
    f.push_bytecode(
        RetOp {
            has_return: false,
            src: 0,
        }
        .encode(),
    );
    f.build(&mut program);

    let cell = Shared::new(1i64, &context::INT);
    let func = program.find_function("refs::store9").unwrap();
    let mut args = CallArgs::new(&func);
    args.push(cell.clone_ref(), &context::SHARED);
    args.call(Return::none()).unwrap();

    cell.lock_shared();
    assert_eq!(unsafe { *cell.get().cast::<i64>() }, 9);
    cell.unlock_shared();

    let mut cell = cell;
    cell.deinit();
}

#[test]
fn dereferencing_an_expired_weak_faults() {
    let mut program = Program::new();

    let mut f = FunctionBuilder::new("refs::peek", "peek")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.add_arg(&context::WEAK);
    f.push_bytecode(Dereference { dst: 2, src: 0 }.encode());
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    let mut owner = Unique::new(3i64, &context::INT);
    let weak = owner.make_weak();
    owner.deinit();

    let func = program.find_function("refs::peek").unwrap();
    let mut args = CallArgs::new(&func);
    args.push(weak, &context::WEAK);
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    let err = args.call(Return::new(&mut out, &mut out_ctx)).unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::ExpiredWeakReference);
}

#[repr(C)]
struct Pair {
    count: i64,
    label: ScriptString,
}

fn register_pair(program: &mut Program) -> &TypeContext {
    program.insert_type(
        "refs::Pair",
        TypeContext::new_struct(
            core::mem::size_of::<Pair>(),
            "Pair",
            vec![
                MemberContext::new("count", 0, &context::INT),
                MemberContext::new("label", 8, &context::STRING),
            ],
        ),
    )
}

#[test]
fn get_member_reads_a_field() {
    let _guard = counter_lock();
    let baseline = mem::live_allocations();

    let mut program = Program::new();
    register_pair(&mut program);

    // first(pair) = pair.count
    let mut f = FunctionBuilder::new("refs::first", "first")
        .with_return_type(&context::INT)
        .with_stack_slots(4);
    f.push_bytecode(
        GetMember {
            dst: 3,
            src: 0,
            member: 0,
        }
        .encode(),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 3,
        }
        .encode(),
    );
    let record = {
        let pair_ctx = program.find_type("refs::Pair").unwrap() as *const TypeContext;
        f.add_arg(unsafe { &*pair_ctx });
        f.build(&mut program)
    };
    let func = Function::script(record);

    let pair = Pair {
        count: 11,
        label: ScriptString::new("labelled"),
    };
    let pair_ctx = program.find_type("refs::Pair").unwrap();
    let mut args = CallArgs::new(&func);
    args.push(pair, pair_ctx);

    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    args.call(Return::new(&mut out, &mut out_ctx)).unwrap();
    assert_eq!(unsafe { out.read::<i64>() }, 11);

    // The pair (and its string member) died with the callee frame.
    assert_eq!(mem::live_allocations(), baseline);
}

#[test]
fn set_member_moves_a_value_in() {
    let _guard = counter_lock();

    let mut program = Program::new();
    register_pair(&mut program);

    // bump(pair): pair.count = 5; return pair.count
    let mut f = FunctionBuilder::new("refs::bump", "bump")
        .with_return_type(&context::INT)
        .with_stack_slots(5);
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 3,
            imm: 5,
        }
        .encode(),
    );
    f.push_bytecode(
        SetMember {
            dst: 0,
            src: 3,
            member: 0,
        }
        .encode(),
    );
    f.push_bytecode(
        GetMember {
            dst: 4,
            src: 0,
            member: 0,
        }
        .encode(),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    let record = {
        let pair_ctx = program.find_type("refs::Pair").unwrap() as *const TypeContext;
        f.add_arg(unsafe { &*pair_ctx });
        f.build(&mut program)
    };
    let func = Function::script(record);

    let pair = Pair {
        count: 0,
        label: ScriptString::new("bumped"),
    };
    let pair_ctx = program.find_type("refs::Pair").unwrap();
    let mut args = CallArgs::new(&func);
    args.push(pair, pair_ctx);

    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    args.call(Return::new(&mut out, &mut out_ctx)).unwrap();
    assert_eq!(unsafe { out.read::<i64>() }, 5);
}

#[test]
fn move_clone_and_deinit_keep_ownership_single() {
    let _guard = counter_lock();
    let baseline = mem::live_allocations();

    let mut literal = ScriptString::new("moved about");
    let mut program = Program::new();

    // 0..2:  clone literal -> s0
    // 3:     clone s0 -> s2
    // 4:     deinit s0
    // 5:     move s2 -> s4
    // 6:     return s4
    let mut f = FunctionBuilder::new("refs::shuffle", "shuffle")
        .with_return_type(&context::STRING)
        .with_stack_slots(6);
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        Bytecode::data(&literal as *const ScriptString as u64),
        Bytecode::data(&context::STRING as *const TypeContext as u64),
    ));
    f.push_bytecode(CloneValue { dst: 2, src: 0 }.encode());
    f.push_bytecode(Deinit { src: 0 }.encode());
    f.push_bytecode(Move { dst: 4, src: 2 }.encode());
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    f.build(&mut program);

    let func = program.find_function("refs::shuffle").unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    CallArgs::new(&func)
        .call(Return::new(&mut out, &mut out_ctx))
        .unwrap();

    let mut returned = unsafe { out.read::<ScriptString>() };
    assert_eq!(returned.as_str(), "moved about");
    assert_eq!(literal.ref_count(), 2, "literal plus the returned handle");

    returned.deinit();
    literal.deinit();
    assert_eq!(mem::live_allocations(), baseline);
}
