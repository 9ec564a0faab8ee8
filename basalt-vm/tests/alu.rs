//! Arithmetic semantics: checked overflow traps, wrapping forms, casts.

use std::sync::{Arc, Mutex};

use basalt_asm::ops::{
    Binary, Cast, ImmediateType, Increment, LoadImmediate, LoadImmediateLong, MathVariant,
    Return as RetOp,
};
use basalt_asm::{Bytecode, OpCode, ValueTag};
use basalt_vm::context;
use basalt_vm::prelude::*;

#[derive(Default)]
struct Capture {
    errors: Arc<Mutex<Vec<(RuntimeErrorKind, String)>>>,
}

impl HostHooks for Capture {
    fn runtime_error(&mut self, kind: RuntimeErrorKind, message: &str) {
        self.errors.lock().unwrap().push((kind, message.to_owned()));
    }

    fn print(&mut self, _message: &str) {}
}

fn capturing_program() -> (Program, Arc<Mutex<Vec<(RuntimeErrorKind, String)>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let program = Program::with_hooks(Box::new(Capture {
        errors: Arc::clone(&errors),
    }));
    (program, errors)
}

fn invoke_int(program: &Program, name: &str) -> Result<i64, RuntimeError> {
    let func = program.find_function(name).unwrap();
    let mut out = ValueStorage::zeroed();
    let mut out_ctx = ContextOut::empty();
    CallArgs::new(&func).call(Return::new(&mut out, &mut out_ctx))?;
    Ok(unsafe { out.read::<i64>() })
}

/// `i64::MAX + 1` with checking on: the add traps, the hook fires once with
/// both operands in the message, and the error propagates to the host.
#[test]
fn checked_add_overflow_traps() {
    let (mut program, errors) = capturing_program();

    let mut f = FunctionBuilder::new("alu::overflow", "overflow")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Int,
            dst: 0,
        }
        .encode(Bytecode::data_signed(i64::MAX)),
    );
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 1,
            imm: 1,
        }
        .encode(),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 0,
            src2: 1,
            dst: 2,
        }
        .encode(OpCode::Add),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    let err = invoke_int(&program, "alu::overflow").unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::AdditionIntegerOverflow);

    let seen = errors.lock().unwrap();
    assert_eq!(seen.len(), 1, "hook fires exactly once, at the origin");
    assert_eq!(seen[0].0, RuntimeErrorKind::AdditionIntegerOverflow);
    assert!(seen[0].1.contains(&i64::MAX.to_string()));
    assert!(seen[0].1.contains('1'));
}

#[test]
fn wrapping_add_does_not_trap() {
    let (mut program, errors) = capturing_program();

    let mut f = FunctionBuilder::new("alu::wrap", "wrap")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Int,
            dst: 0,
        }
        .encode(Bytecode::data_signed(i64::MAX)),
    );
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 1,
            imm: 1,
        }
        .encode(),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: true,
            src1: 0,
            src2: 1,
            dst: 2,
        }
        .encode(OpCode::Add),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    assert_eq!(invoke_int(&program, "alu::wrap").unwrap(), i64::MIN);
    assert!(errors.lock().unwrap().is_empty());
}

#[test]
fn increment_overflow_traps() {
    let (mut program, errors) = capturing_program();

    let mut f = FunctionBuilder::new("alu::inc", "inc")
        .with_return_type(&context::INT)
        .with_stack_slots(2);
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Int,
            dst: 0,
        }
        .encode(Bytecode::data_signed(i64::MAX)),
    );
    f.push_bytecode(
        Increment {
            variant: MathVariant::Dst,
            can_overflow: false,
            src: 0,
            dst: 1,
        }
        .encode(),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 1,
        }
        .encode(),
    );
    f.build(&mut program);

    let err = invoke_int(&program, "alu::inc").unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::IncrementIntegerOverflow);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn divide_by_zero_traps() {
    let (mut program, errors) = capturing_program();

    let mut f = FunctionBuilder::new("alu::div0", "div0")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 0,
            imm: 4,
        }
        .encode(),
    );
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 1,
            imm: 0,
        }
        .encode(),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 0,
            src2: 1,
            dst: 2,
        }
        .encode(OpCode::Divide),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    let err = invoke_int(&program, "alu::div0").unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::DivideByZero);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn division_min_by_minus_one_traps() {
    let (mut program, _) = capturing_program();

    let mut f = FunctionBuilder::new("alu::divmin", "divmin")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Int,
            dst: 0,
        }
        .encode(Bytecode::data_signed(i64::MIN)),
    );
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 1,
            imm: -1,
        }
        .encode(),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 0,
            src2: 1,
            dst: 2,
        }
        .encode(OpCode::Divide),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    let err = invoke_int(&program, "alu::divmin").unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::DivisionIntegerOverflow);
}

#[test]
fn float_arithmetic_never_traps() {
    let (mut program, errors) = capturing_program();

    // 1.5 / 0.0 -> inf, cast to int traps instead.
    let mut f = FunctionBuilder::new("alu::fdiv", "fdiv")
        .with_return_type(&context::INT)
        .with_stack_slots(4);
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Float,
            dst: 0,
        }
        .encode(Bytecode::data_float(1.5)),
    );
    f.push_bytecode_many(
        &LoadImmediateLong {
            tag: ValueTag::Float,
            dst: 1,
        }
        .encode(Bytecode::data_float(0.0)),
    );
    f.push_bytecode(
        Binary {
            variant: MathVariant::Dst,
            can_overflow: false,
            src1: 0,
            src2: 1,
            dst: 2,
        }
        .encode(OpCode::Divide),
    );
    f.push_bytecode(
        Cast {
            dst: 3,
            src: 2,
            target: ValueTag::Int,
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
    f.build(&mut program);

    let err = invoke_int(&program, "alu::fdiv").unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::FloatToIntOverflow);
    assert_eq!(errors.lock().unwrap().len(), 1, "the divide itself is silent");
}

#[test]
fn int_to_float_cast_round_trips() {
    let (mut program, _) = capturing_program();

    let mut f = FunctionBuilder::new("alu::casts", "casts")
        .with_return_type(&context::INT)
        .with_stack_slots(3);
    f.push_bytecode(
        LoadImmediate {
            ty: ImmediateType::Int,
            dst: 0,
            imm: 1234,
        }
        .encode(),
    );
    f.push_bytecode(
        Cast {
            dst: 1,
            src: 0,
            target: ValueTag::Float,
        }
        .encode(),
    );
    f.push_bytecode(
        Cast {
            dst: 2,
            src: 1,
            target: ValueTag::Int,
        }
        .encode(),
    );
    f.push_bytecode(
        RetOp {
            has_return: true,
            src: 2,
        }
        .encode(),
    );
    f.build(&mut program);

    assert_eq!(invoke_int(&program, "alu::casts").unwrap(), 1234);
}
