//! Comparisons and arithmetic.

use crate::{pack, unpack, Bytecode, OpCode};

/// Where an arithmetic result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MathVariant {
    /// Result goes to a separate destination slot.
    Dst = 0,
    /// Result overwrites the (first) source slot.
    SrcAssign = 1,
}

impl MathVariant {
    const fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::Dst,
            _ => Self::SrcAssign,
        }
    }
}

/// A comparison of two slots into a bool destination.
///
/// Layout (shared by all six comparison opcodes): opcode 0..8, dst 8..21,
/// src1 21..34, src2 34..47.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compare {
    /// Destination slot; becomes a bool.
    pub dst: u16,
    /// Left operand slot.
    pub src1: u16,
    /// Right operand slot.
    pub src2: u16,
}

impl Compare {
    /// Encode under one of the comparison opcodes.
    pub fn encode(self, op: OpCode) -> Bytecode {
        assert!(
            matches!(
                op,
                OpCode::Equal
                    | OpCode::NotEqual
                    | OpCode::Less
                    | OpCode::Greater
                    | OpCode::LessOrEqual
                    | OpCode::GreaterOrEqual
            ),
            "{op} is not a comparison opcode"
        );
        let mut w = pack::word_from_opcode(op);
        w = pack::slot(w, self.dst, 8);
        w = pack::slot(w, self.src1, 21);
        w = pack::slot(w, self.src2, 34);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            dst: unpack::slot(word.raw(), 8),
            src1: unpack::slot(word.raw(), 21),
            src2: unpack::slot(word.raw(), 34),
        }
    }
}

/// `Increment` of an integer slot.
///
/// Layout: opcode 0..8, variant 8, can_overflow 9, src 10..23,
/// dst 23..36 (only meaningful for [`MathVariant::Dst`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Destination form.
    pub variant: MathVariant,
    /// Whether wrapping is permitted; unchecked increments never trap.
    pub can_overflow: bool,
    /// Source slot.
    pub src: u16,
    /// Destination slot for the [`MathVariant::Dst`] form.
    pub dst: u16,
}

impl Increment {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = pack::word_from_opcode(OpCode::Increment);
        w = pack::field(w, self.variant as u64, 8, 1);
        w = pack::flag(w, self.can_overflow, 9);
        w = pack::slot(w, self.src, 10);
        w = pack::slot(w, self.dst, 23);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            variant: MathVariant::from_bits(unpack::field(word.raw(), 8, 1)),
            can_overflow: unpack::flag(word.raw(), 9),
            src: unpack::slot(word.raw(), 10),
            dst: unpack::slot(word.raw(), 23),
        }
    }
}

/// A two-operand arithmetic instruction (`Add`, `Divide`).
///
/// Layout: opcode 0..8, variant 8, can_overflow 9, src1 10..23,
/// src2 23..36, dst 36..49 (only meaningful for [`MathVariant::Dst`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binary {
    /// Destination form.
    pub variant: MathVariant,
    /// Whether wrapping is permitted; unchecked arithmetic never traps.
    pub can_overflow: bool,
    /// Left operand slot; also the destination in the
    /// [`MathVariant::SrcAssign`] form.
    pub src1: u16,
    /// Right operand slot.
    pub src2: u16,
    /// Destination slot for the [`MathVariant::Dst`] form.
    pub dst: u16,
}

impl Binary {
    /// Encode under one of the binary arithmetic opcodes.
    pub fn encode(self, op: OpCode) -> Bytecode {
        assert!(
            matches!(op, OpCode::Add | OpCode::Divide),
            "{op} is not a binary arithmetic opcode"
        );
        let mut w = pack::word_from_opcode(op);
        w = pack::field(w, self.variant as u64, 8, 1);
        w = pack::flag(w, self.can_overflow, 9);
        w = pack::slot(w, self.src1, 10);
        w = pack::slot(w, self.src2, 23);
        w = pack::slot(w, self.dst, 36);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            variant: MathVariant::from_bits(unpack::field(word.raw(), 8, 1)),
            can_overflow: unpack::flag(word.raw(), 9),
            src1: unpack::slot(word.raw(), 10),
            src2: unpack::slot(word.raw(), 23),
            dst: unpack::slot(word.raw(), 36),
        }
    }
}
