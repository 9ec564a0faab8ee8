//! Slot-to-slot data movement, references, members, and casts.

use crate::{pack, unpack, Bytecode, OpCode, ValueTag};

const DST_SHIFT: u32 = 8;
const SRC_SHIFT: u32 = 21;
const TAIL_SHIFT: u32 = 34;

fn two_slot_word(op: OpCode, dst: u16, src: u16) -> u64 {
    let mut w = pack::word_from_opcode(op);
    w = pack::slot(w, dst, DST_SHIFT);
    w = pack::slot(w, src, SRC_SHIFT);
    w
}

const fn two_slot_fields(word: Bytecode) -> (u16, u16) {
    (
        unpack::slot(word.raw(), DST_SHIFT),
        unpack::slot(word.raw(), SRC_SHIFT),
    )
}

macro_rules! two_slot_op {
    ($(#[$docs:meta])* $name:ident, $op:expr) => {
        $(#[$docs])*
        ///
        /// Layout: opcode 0..8, dst 8..21, src 21..34.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Destination slot.
            pub dst: u16,
            /// Source slot.
            pub src: u16,
        }

        impl $name {
            /// Encode into a single word.
            pub fn encode(self) -> Bytecode {
                Bytecode::from_raw(two_slot_word($op, self.dst, self.src))
            }

            /// Decode from a leading word.
            pub const fn decode(word: Bytecode) -> Self {
                let (dst, src) = two_slot_fields(word);
                Self { dst, src }
            }
        }
    };
}

two_slot_op!(
    /// Transfer bytes and context from `src` to `dst`, invalidating `src`.
    Move,
    OpCode::Move
);
two_slot_op!(
    /// Duplicate `src` into `dst` through the context's clone callable,
    /// leaving `src` intact.
    CloneValue,
    OpCode::Clone
);
two_slot_op!(
    /// Read the pointee of the reference-like value at `src` into `dst` as
    /// a non-owning view. Works for const/mut references and the
    /// unique/shared/weak sync cells.
    Dereference,
    OpCode::Dereference
);
two_slot_op!(
    /// Write the value at `src` through the mutable reference-like value at
    /// `dst`, moving out of `src`.
    SetReference,
    OpCode::SetReference
);

/// Construct a reference to the slot at `src`, storing it in `dst`.
///
/// Layout: opcode 0..8, dst 8..21, src 21..34, mutable 34.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeReference {
    /// Destination slot of the new reference value.
    pub dst: u16,
    /// Slot being referenced.
    pub src: u16,
    /// Whether the reference permits writes.
    pub mutable: bool,
}

impl MakeReference {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = two_slot_word(OpCode::MakeReference, self.dst, self.src);
        w = pack::flag(w, self.mutable, TAIL_SHIFT);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        let (dst, src) = two_slot_fields(word);
        Self {
            dst,
            src,
            mutable: unpack::flag(word.raw(), TAIL_SHIFT),
        }
    }
}

macro_rules! member_op {
    ($(#[$docs:meta])* $name:ident, $op:expr) => {
        $(#[$docs])*
        ///
        /// Layout: opcode 0..8, dst 8..21, src 21..34, member 34..50. The
        /// member index selects into the struct context's member array;
        /// reference-like sources auto-dereference first.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Destination slot.
            pub dst: u16,
            /// Source slot.
            pub src: u16,
            /// Member index within the struct context.
            pub member: u16,
        }

        impl $name {
            /// Encode into a single word.
            pub fn encode(self) -> Bytecode {
                let mut w = two_slot_word($op, self.dst, self.src);
                w = pack::field(w, self.member as u64, TAIL_SHIFT, 16);
                Bytecode::from_raw(w)
            }

            /// Decode from a leading word.
            pub const fn decode(word: Bytecode) -> Self {
                let (dst, src) = two_slot_fields(word);
                Self {
                    dst,
                    src,
                    member: unpack::field(word.raw(), TAIL_SHIFT, 16) as u16,
                }
            }
        }
    };
}

member_op!(
    /// Produce a non-owning view of member `member` of the struct at `src`
    /// in `dst`.
    GetMember,
    OpCode::GetMember
);
member_op!(
    /// Move the value at `src` into member `member` of the struct at `dst`.
    SetMember,
    OpCode::SetMember
);

/// Convert the scalar at `src` to the built-in type `target`, storing in
/// `dst`.
///
/// Layout: opcode 0..8, dst 8..21, src 21..34, target tag 34..40.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cast {
    /// Destination slot.
    pub dst: u16,
    /// Source slot.
    pub src: u16,
    /// Built-in type to convert to.
    pub target: ValueTag,
}

impl Cast {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = two_slot_word(OpCode::Cast, self.dst, self.src);
        w = pack::field(w, self.target as u64, TAIL_SHIFT, ValueTag::BITS);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word. Panics on a reserved tag.
    pub fn decode(word: Bytecode) -> Self {
        let (dst, src) = two_slot_fields(word);
        let bits = unpack::field(word.raw(), TAIL_SHIFT, ValueTag::BITS) as u8;
        Self {
            dst,
            src,
            target: ValueTag::from_bits(bits).expect("malformed cast target tag"),
        }
    }
}
