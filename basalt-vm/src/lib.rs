//! Basalt scripting runtime.
//!
//! The runtime core of the Basalt embeddable scripting language: a
//! register-based bytecode interpreter over a thread-local slotted value
//! stack, a uniform type-context mechanism, a calling convention shared by
//! native host functions and compiled script functions, and a sync
//! coordinator that acquires reader/writer locks on shared-ownership cells
//! in a deadlock-free total order.
//!
//! A host builds a [`program::Program`], registers type contexts and
//! compiles functions through [`function::FunctionBuilder`], then invokes
//! entry points by name:
//!
//! ```no_run
//! use basalt_vm::context;
//! use basalt_vm::prelude::*;
//!
//! # fn demo(program: &Program) -> Result<(), RuntimeError> {
//! let func = program.find_function("example::main").unwrap();
//! let mut out = ValueStorage::zeroed();
//! let mut out_ctx = ContextOut::empty();
//! let mut args = CallArgs::new(&func);
//! args.push(7i64, &context::INT);
//! args.call(Return::new(&mut out, &mut out_ctx))?;
//! let answer = unsafe { out.read::<i64>() };
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unused_must_use)]

pub mod call;
pub mod consts;
pub mod context;
pub mod error;
pub mod function;
pub mod hash;
pub mod interpreter;
pub mod mem;
pub mod program;
pub mod stack;
pub mod sync;
pub mod value;

pub mod prelude {
    //! Re-exports of the types a typical embedder touches.

    pub use basalt_asm::{ops, Bytecode, OpCode, ValueTag};

    pub use crate::call::{CallArgs, ContextOut, Handler, Return, ValueStorage};
    pub use crate::context::{MemberContext, TypeContext};
    pub use crate::error::{RuntimeError, RuntimeErrorKind};
    pub use crate::function::{Function, FunctionBuilder, FunctionRecord, NativeFn};
    pub use crate::program::{HostHooks, Program};
    pub use crate::value::{ScriptString, Shared, Unique, Weak};
}
