//! `Call` in its immediate and slot-sourced forms.

use crate::{pack, unpack, Bytecode, OpCode};

/// Bit positions shared by both call forms.
const KIND_SHIFT: u32 = 8;
const ARG_COUNT_SHIFT: u32 = 9;
const HAS_RETURN_SHIFT: u32 = 22;
const RET_DST_SHIFT: u32 = 23;
const TAIL_SHIFT: u32 = 36;

/// Form selector of a `Call` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallKind {
    /// The callable is an immediate pointer in the first data word.
    Immediate = 0,
    /// The callable is loaded from a function-valued stack slot.
    Src = 1,
}

impl CallKind {
    /// Decode the form of a leading `Call` word.
    pub const fn of(word: Bytecode) -> Self {
        match unpack::field(word.raw(), KIND_SHIFT, 1) {
            0 => Self::Immediate,
            _ => Self::Src,
        }
    }
}

/// Kind discriminant of an immediate callable pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallableKind {
    /// A native entry point.
    Native = 0,
    /// A compiled script function record.
    Script = 1,
}

fn common_fields(op_kind: CallKind, arg_count: u16, has_return: bool, ret_dst: u16) -> u64 {
    let mut w = pack::word_from_opcode(OpCode::Call);
    w = pack::field(w, op_kind as u64, KIND_SHIFT, 1);
    w = pack::slot(w, arg_count, ARG_COUNT_SHIFT);
    w = pack::flag(w, has_return, HAS_RETURN_SHIFT);
    w = pack::slot(w, ret_dst, RET_DST_SHIFT);
    w
}

/// `Call` of an immediate callable.
///
/// Layout: opcode 0..8, kind 8, arg_count 9..22, has_return 22,
/// ret_dst 23..36, callable kind 36. The first data word is the raw
/// callable pointer; the argument slot indices follow as 16-bit lanes,
/// four per word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallImmediate {
    /// Number of argument slots.
    pub arg_count: u16,
    /// Whether the callee's return value is stored.
    pub has_return: bool,
    /// Destination slot of the return value; ignored without `has_return`.
    pub ret_dst: u16,
    /// Whether the immediate pointer is a native entry or a script record.
    pub callable: CallableKind,
}

impl CallImmediate {
    /// Total width in words for a call with `arg_count` arguments.
    pub const fn words(arg_count: usize) -> usize {
        2 + super::lane_words(arg_count)
    }

    /// Index of the first argument-lane data word, relative to the leading
    /// word.
    pub const ARGS_OFFSET: usize = 2;

    /// Encode into the leading word, the callable data word, and the packed
    /// argument lanes.
    pub fn encode(self, callable: Bytecode, args: &[u16]) -> Vec<Bytecode> {
        assert_eq!(args.len(), self.arg_count as usize, "argument count mismatch");
        let mut w = common_fields(CallKind::Immediate, self.arg_count, self.has_return, self.ret_dst);
        w = pack::field(w, self.callable as u64, TAIL_SHIFT, 1);
        let mut out = Vec::with_capacity(Self::words(args.len()));
        out.push(Bytecode::from_raw(w));
        out.push(callable);
        pack::pack_lanes(args.iter().copied(), &mut out);
        out
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        let callable = match unpack::field(word.raw(), TAIL_SHIFT, 1) {
            0 => CallableKind::Native,
            _ => CallableKind::Script,
        };
        Self {
            arg_count: unpack::slot(word.raw(), ARG_COUNT_SHIFT),
            has_return: unpack::flag(word.raw(), HAS_RETURN_SHIFT),
            ret_dst: unpack::slot(word.raw(), RET_DST_SHIFT),
            callable,
        }
    }
}

/// `Call` of a function value held in a stack slot.
///
/// Layout: opcode 0..8, kind 8, arg_count 9..22, has_return 22,
/// ret_dst 23..36, func_src 36..49. Argument slot indices follow
/// immediately as 16-bit lanes, four per word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSrc {
    /// Number of argument slots.
    pub arg_count: u16,
    /// Whether the callee's return value is stored.
    pub has_return: bool,
    /// Destination slot of the return value; ignored without `has_return`.
    pub ret_dst: u16,
    /// Slot holding the function value to invoke.
    pub func_src: u16,
}

impl CallSrc {
    /// Total width in words for a call with `arg_count` arguments.
    pub const fn words(arg_count: usize) -> usize {
        1 + super::lane_words(arg_count)
    }

    /// Index of the first argument-lane data word, relative to the leading
    /// word.
    pub const ARGS_OFFSET: usize = 1;

    /// Encode into the leading word and the packed argument lanes.
    pub fn encode(self, args: &[u16]) -> Vec<Bytecode> {
        assert_eq!(args.len(), self.arg_count as usize, "argument count mismatch");
        let mut w = common_fields(CallKind::Src, self.arg_count, self.has_return, self.ret_dst);
        w = pack::slot(w, self.func_src, TAIL_SHIFT);
        let mut out = Vec::with_capacity(Self::words(args.len()));
        out.push(Bytecode::from_raw(w));
        pack::pack_lanes(args.iter().copied(), &mut out);
        out
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            arg_count: unpack::slot(word.raw(), ARG_COUNT_SHIFT),
            has_return: unpack::flag(word.raw(), HAS_RETURN_SHIFT),
            ret_dst: unpack::slot(word.raw(), RET_DST_SHIFT),
            func_src: unpack::slot(word.raw(), TAIL_SHIFT),
        }
    }
}
