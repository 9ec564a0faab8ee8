//! `Return`, `Jump`, and `Deinit`.

use crate::{pack, unpack, Bytecode, OpCode};

/// `Return` from the current frame.
///
/// Layout: opcode 0..8, has_return 8, src 9..22. When `has_return` is set
/// the source value is moved (not cloned) to the frame's return
/// destination; the frame is always unwound and popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Return {
    /// Whether a value is moved out before the frame unwinds.
    pub has_return: bool,
    /// Source slot of the return value; ignored when `has_return` is false.
    pub src: u16,
}

impl Return {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = pack::word_from_opcode(OpCode::Return);
        w = pack::flag(w, self.has_return, 8);
        w = pack::slot(w, self.src, 9);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            has_return: unpack::flag(word.raw(), 8),
            src: unpack::slot(word.raw(), 9),
        }
    }
}

/// Condition selector of a `Jump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JumpKind {
    /// Unconditional.
    Always = 0,
    /// Taken when the condition slot holds `true`.
    IfTrue = 1,
    /// Taken when the condition slot holds `false`.
    IfFalse = 2,
}

/// `Jump` relative to the current instruction pointer.
///
/// Layout: opcode 0..8, kind 8..10, cond_src 10..23, offset 23..55 (signed
/// 32-bit word count). Conditional jumps require the condition slot to hold
/// a bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jump {
    /// Condition selector.
    pub kind: JumpKind,
    /// Condition slot; ignored for [`JumpKind::Always`].
    pub cond_src: u16,
    /// Signed instruction-pointer displacement, in words.
    pub offset: i32,
}

impl Jump {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = pack::word_from_opcode(OpCode::Jump);
        w = pack::field(w, self.kind as u64, 8, 2);
        w = pack::slot(w, self.cond_src, 10);
        w = pack::signed_field(w, self.offset as i64, 23, 32);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        let kind = match unpack::field(word.raw(), 8, 2) {
            0 => JumpKind::Always,
            1 => JumpKind::IfTrue,
            _ => JumpKind::IfFalse,
        };
        Self {
            kind,
            cond_src: unpack::slot(word.raw(), 10),
            offset: unpack::signed_field(word.raw(), 23, 32) as i32,
        }
    }
}

/// `Deinit` a slot in place.
///
/// Layout: opcode 0..8, src 8..21. Runs the slot's destructor and clears
/// its context. Frame unwinding covers the common case; this exists for
/// explicit early destruction such as variable reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deinit {
    /// Slot to destroy.
    pub src: u16,
}

impl Deinit {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let w = pack::slot(pack::word_from_opcode(OpCode::Deinit), self.src, 8);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            src: unpack::slot(word.raw(), 8),
        }
    }
}
