//! Typed operand records for every instruction.
//!
//! Each record knows how to `encode` itself into one or more [`Bytecode`]
//! words and how to `decode` itself back from a leading word. The dispatcher
//! never reinterprets raw words directly; it matches on the opcode and hands
//! the word to the matching record here. Encoders panic on out-of-range
//! operands, since a malformed instruction is a code-generator bug rather
//! than a runtime condition.

pub use call::{CallImmediate, CallSrc, CallableKind, CallKind};
pub use data::{
    Cast, CloneValue, Dereference, GetMember, MakeReference, Move, SetMember, SetReference,
};
pub use flow::{Deinit, Jump, JumpKind, Return};
pub use load::{
    ImmediateType, LoadCloneFromPtr, LoadDefault, LoadImmediate, LoadImmediateLong, LoadKind,
};
pub use math::{Binary, Compare, Increment, MathVariant};
pub use sync::{AcquireKind, Sync, SyncKind, SyncSource, Unsync};

mod call;
mod data;
mod flow;
mod load;
mod math;
mod sync;

use crate::Bytecode;

/// Read 16-bit lane `index` out of a run of data words laid out four lanes
/// per word. `words` must start at the first data word of the run.
pub fn lane_at(words: &[Bytecode], index: usize) -> u16 {
    crate::unpack::lane(words[index / 4].raw(), index % 4)
}

/// Number of data words a run of `count` 16-bit lanes occupies.
pub const fn lane_words(count: usize) -> usize {
    count.div_ceil(4)
}
