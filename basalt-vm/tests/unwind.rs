//! Error-path unwinding: owned values die exactly once when a frame is
//! abandoned by a runtime fault.

use std::sync::{Arc, Mutex, MutexGuard};

use basalt_asm::ops::{
    Binary, ImmediateType, LoadCloneFromPtr, LoadImmediate, MathVariant, Return as RetOp,
};
use basalt_asm::{Bytecode, OpCode};
use basalt_vm::context;
use basalt_vm::mem;
use basalt_vm::prelude::*;

fn counter_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Capture {
    errors: Arc<Mutex<Vec<RuntimeErrorKind>>>,
}

impl HostHooks for Capture {
    fn runtime_error(&mut self, kind: RuntimeErrorKind, _message: &str) {
        self.errors.lock().unwrap().push(kind);
    }

    fn print(&mut self, _message: &str) {}
}

/// A function holding an owned string in slot 0 hits a divide-by-zero. The
/// error propagates, the hook sees it once, and the string's destructor
/// runs exactly once during the unwind.
#[test]
fn fault_unwinds_owned_values() {
    let _guard = counter_lock();
    let baseline = mem::live_allocations();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut program = Program::with_hooks(Box::new(Capture {
        errors: Arc::clone(&errors),
    }));

    let mut literal = ScriptString::new("held across the fault");

    let mut f = FunctionBuilder::new("unwind::faulty", "faulty")
        .with_return_type(&context::INT)
        .with_stack_slots(5);
    f.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        Bytecode::data(&literal as *const ScriptString as u64),
        Bytecode::data(&context::STRING as *const TypeContext as u64),
    ));
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 2,
            imm: 4,
        }
        .encode(),
    );
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 3,
            imm: 0,
        }
        .encode(),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 2,
            src2: 3,
            dst: 4,
        }
        .encode(OpCode::Divide),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    f.build(&mut program);

    let func = program.find_function("unwind::faulty").unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    let err = CallArgs::new(&func)
        .call(Return::new(&mut out, &mut out_ctx))
        .unwrap_err();

    assert_eq!(err.kind, RuntimeErrorKind::DivideByZero);
    assert_eq!(&*errors.lock().unwrap(), &[RuntimeErrorKind::DivideByZero]);

    // The cloned string in slot 0 was destroyed exactly once: the literal
    // is back to one handle and nothing leaked.
    assert_eq!(literal.ref_count(), 1);
    assert_eq!(mem::live_allocations(), baseline + 1);

    literal.deinit();
    assert_eq!(mem::live_allocations(), baseline);
}

/// A fault below a script-to-script call unwinds both frames; each owner
/// dies exactly once.
#[test]
fn nested_fault_unwinds_every_frame() {
    use basalt_asm::ops::{CallImmediate, CallableKind};

    let _guard = counter_lock();
    let baseline = mem::live_allocations();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut program = Program::with_hooks(Box::new(Capture {
        errors: Arc::clone(&errors),
    }));

    let mut inner_literal = ScriptString::new("inner");
    let mut outer_literal = ScriptString::new("outer");

    // inner() -> int: holds a string, divides by zero.
    let mut inner = FunctionBuilder::new("unwind::inner", "inner")
        .with_return_type(&context::INT)
        .with_stack_slots(5);
    inner.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        Bytecode::data(&inner_literal as *const ScriptString as u64),
        Bytecode::data(&context::STRING as *const TypeContext as u64),
    ));
    inner.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 2,
            imm: 1,
        }
        .encode(),
    );
    inner.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 3,
            imm: 0,
        }
        .encode(),
    );
    inner.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 2,
            src2: 3,
            dst: 4,
        }
        .encode(OpCode::Divide),
    );
    inner.push_bytecode(
        RetOp {
            has_return: true,
            src: 4,
        }
        .encode(),
    );
    inner.build(&mut program);

    let (_, inner_bits) = program
        .find_function("unwind::inner")
        .unwrap()
        .to_parts();

    // outer() -> int: holds its own string, calls inner().
    let mut outer = FunctionBuilder::new("unwind::outer", "outer")
        .with_return_type(&context::INT)
        .with_stack_slots(4);
    outer.push_bytecode_many(&LoadCloneFromPtr { dst: 0 }.encode(
        Bytecode::data(&outer_literal as *const ScriptString as u64),
        Bytecode::data(&context::STRING as *const TypeContext as u64),
    ));
    outer.push_bytecode_many(
        &CallImmediate {
            arg_count: 0,
            has_return: true,
            ret_dst: 2,
            callable: CallableKind::Script,
        }
        .encode(Bytecode::data(inner_bits), &[]),
    );
    outer.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    outer.build(&mut program);

    let func = program.find_function("unwind::outer").unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    let err = CallArgs::new(&func)
        .call(Return::new(&mut out, &mut out_ctx))
        .unwrap_err();

    assert_eq!(err.kind, RuntimeErrorKind::DivideByZero);
    assert_eq!(errors.lock().unwrap().len(), 1, "reported once, at the origin");

    assert_eq!(inner_literal.ref_count(), 1);
    assert_eq!(outer_literal.ref_count(), 1);
    assert_eq!(mem::live_allocations(), baseline + 2);

    inner_literal.deinit();
    outer_literal.deinit();
    assert_eq!(mem::live_allocations(), baseline);
}
