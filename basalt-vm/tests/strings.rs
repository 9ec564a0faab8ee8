//! String values through the interpreter: literals, concatenation, and
//! refcount bookkeeping across frame unwinds.

use std::sync::{Mutex, MutexGuard};

use basalt_asm::ops::{Binary, LoadCloneFromPtr, MathVariant, Return as RetOp};
use basalt_asm::{Bytecode, OpCode};
use basalt_vm::context;
use basalt_vm::mem;
use basalt_vm::prelude::*;

/// Serializes the tests in this binary that assert on the process-wide
/// allocation counter.
fn counter_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn data_ptr<T>(value: &T) -> Bytecode {
    Bytecode::data(value as *const T as u64)
}

/// Build `concat() = clone(lit_a) + clone(lit_b)` against two host-owned
/// literals.
fn build_concat(program: &mut Program, a: &ScriptString, b: &ScriptString) {
    let mut f = FunctionBuilder::new("strings::concat", "concat")
        .with_return_type(&context::STRING)
        .with_stack_slots(6);
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        data_ptr(a),
        data_ptr(&context::STRING),
    ));
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 2 }.encode(
        data_ptr(b),
        data_ptr(&context::STRING),
    ));
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 0,
            src2: 2,
            dst: 4,
        }
        .encode(OpCode::Add),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    f.build(program);
}

#[test]
fn concatenation_returns_joined_string() {
    let _guard = counter_lock();
    let baseline = mem::live_allocations();

    let mut hello = ScriptString::new("hello");
    let mut world = ScriptString::new(" world");

    let mut program = Program::new();
    build_concat(&mut program, &hello, &world);

    let func = program.find_function("strings::concat").unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    CallArgs::new(&func)
        .call(Return::new(&mut out, &mut out_ctx))
        .unwrap();

    assert!(core::ptr::eq(out_ctx.get().unwrap(), &context::STRING));
    let mut joined = unsafe { out.read::<ScriptString>() };
    assert_eq!(joined.as_str(), "hello world");

    // The two cloned literal slots were destroyed by the return's unwind:
    // the literals are back to a single handle each, and only the joined
    // buffer is extra.
    assert_eq!(hello.ref_count(), 1);
    assert_eq!(world.ref_count(), 1);
    assert_eq!(mem::live_allocations(), baseline + 3);

    joined.deinit();
    hello.deinit();
    world.deinit();
    assert_eq!(mem::live_allocations(), baseline);
}

#[test]
fn string_equality_and_ordering() {
    use basalt_asm::ops::Compare;

    let _guard = counter_lock();

    let mut alpha = ScriptString::new("alpha");
    let mut beta = ScriptString::new("beta");

    let mut program = Program::new();
    let mut f = FunctionBuilder::new("strings::less", "less")
        .with_return_type(&context::BOOL)
        .with_stack_slots(5);
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        data_ptr(&alpha),
        data_ptr(&context::STRING),
    ));
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 2 }.encode(
        data_ptr(&beta),
        data_ptr(&context::STRING),
    ));
    f.push_bytecode(
        Compare {
            dst: 4,
            src1: 0,
            src2: 2,
        }
        .encode(OpCode::Less),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    f.build(&mut program);

    let func = program.find_function("strings::less").unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    CallArgs::new(&func)
        .call(Return::new(&mut out, &mut out_ctx))
        .unwrap();

    assert!(core::ptr::eq(out_ctx.get().unwrap(), &context::BOOL));
    assert!(unsafe { out.read::<bool>() });

    alpha.deinit();
    beta.deinit();
}
