//! `Load` and its four sub-operations.

use crate::{pack, unpack, Bytecode, OpCode, ValueTag};

/// Bit position of the 2-bit load sub-operation selector.
const KIND_SHIFT: u32 = 8;

/// Sub-operation selector of a `Load` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadKind {
    /// Small inline immediate (bool or int).
    Immediate = 0,
    /// Full 64-bit immediate in a trailing data word.
    ImmediateLong = 1,
    /// Default-construct a built-in type.
    Default = 2,
    /// Clone the value behind an immediate pointer.
    CloneFromPtr = 3,
}

impl LoadKind {
    /// Decode the sub-operation of a leading `Load` word.
    pub const fn of(word: Bytecode) -> Self {
        match unpack::field(word.raw(), KIND_SHIFT, 2) {
            0 => Self::Immediate,
            1 => Self::ImmediateLong,
            2 => Self::Default,
            _ => Self::CloneFromPtr,
        }
    }
}

/// Type selector of [`LoadImmediate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImmediateType {
    /// The immediate is a boolean (`imm != 0`).
    Bool = 0,
    /// The immediate is a signed integer.
    Int = 1,
}

/// `Load` with a small inline immediate.
///
/// Layout: opcode 0..8, kind 8..10, type 10, dst 11..24, imm 24..64
/// (40-bit signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadImmediate {
    /// Whether the immediate is a bool or an int.
    pub ty: ImmediateType,
    /// Destination slot.
    pub dst: u16,
    /// Signed immediate; must fit in 40 bits.
    pub imm: i64,
}

impl LoadImmediate {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = pack::word_from_opcode(OpCode::Load);
        w = pack::field(w, LoadKind::Immediate as u64, KIND_SHIFT, 2);
        w = pack::field(w, self.ty as u64, 10, 1);
        w = pack::slot(w, self.dst, 11);
        w = pack::signed_field(w, self.imm, 24, 40);
        Bytecode::from_raw(w)
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        let ty = match unpack::field(word.raw(), 10, 1) {
            0 => ImmediateType::Bool,
            _ => ImmediateType::Int,
        };
        Self {
            ty,
            dst: unpack::slot(word.raw(), 11),
            imm: unpack::signed_field(word.raw(), 24, 40),
        }
    }
}

/// `Load` with a full 64-bit payload in the following data word.
///
/// Layout: opcode 0..8, kind 8..10, tag 10..16, dst 16..29. Booleans never
/// use this form; their immediate fits inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadImmediateLong {
    /// Built-in type of the payload.
    pub tag: ValueTag,
    /// Destination slot.
    pub dst: u16,
}

impl LoadImmediateLong {
    /// Total width of this instruction in words.
    pub const WORDS: usize = 2;

    /// Encode into a leading word plus the payload data word.
    pub fn encode(self, payload: Bytecode) -> [Bytecode; 2] {
        assert!(
            !matches!(self.tag, ValueTag::Bool),
            "64-bit immediate loads are forbidden for booleans"
        );
        let mut w = pack::word_from_opcode(OpCode::Load);
        w = pack::field(w, LoadKind::ImmediateLong as u64, KIND_SHIFT, 2);
        w = pack::field(w, self.tag as u64, 10, ValueTag::BITS);
        w = pack::slot(w, self.dst, 16);
        [Bytecode::from_raw(w), payload]
    }

    /// Decode from a leading word. Panics on a reserved tag; a bad tag is a
    /// malformed encoding.
    pub fn decode(word: Bytecode) -> Self {
        let bits = unpack::field(word.raw(), 10, ValueTag::BITS) as u8;
        let tag = ValueTag::from_bits(bits).expect("malformed immediate-long value tag");
        Self {
            tag,
            dst: unpack::slot(word.raw(), 16),
        }
    }
}

/// `Load` that default-constructs a built-in type.
///
/// Layout: opcode 0..8, kind 8..10, dst 10..23, tag 23..29. Generic
/// containers carry their element context pointers in trailing data words:
/// one word for array/set/option, two (key then value) for map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadDefault {
    /// Built-in type to construct.
    pub tag: ValueTag,
    /// Destination slot.
    pub dst: u16,
}

impl LoadDefault {
    /// Number of trailing data words for a given tag.
    pub const fn data_words(tag: ValueTag) -> usize {
        match tag {
            ValueTag::Array | ValueTag::Set | ValueTag::Option => 1,
            ValueTag::Map => 2,
            _ => 0,
        }
    }

    /// Encode into a leading word plus any required context data words.
    pub fn encode(self, contexts: &[Bytecode]) -> Vec<Bytecode> {
        assert_eq!(
            contexts.len(),
            Self::data_words(self.tag),
            "default load for {:?} takes {} context words",
            self.tag,
            Self::data_words(self.tag),
        );
        let mut w = pack::word_from_opcode(OpCode::Load);
        w = pack::field(w, LoadKind::Default as u64, KIND_SHIFT, 2);
        w = pack::slot(w, self.dst, 10);
        w = pack::field(w, self.tag as u64, 23, ValueTag::BITS);
        let mut out = vec![Bytecode::from_raw(w)];
        out.extend_from_slice(contexts);
        out
    }

    /// Decode from a leading word. Panics on a reserved tag.
    pub fn decode(word: Bytecode) -> Self {
        let bits = unpack::field(word.raw(), 23, ValueTag::BITS) as u8;
        let tag = ValueTag::from_bits(bits).expect("malformed default-load value tag");
        Self {
            tag,
            dst: unpack::slot(word.raw(), 10),
        }
    }
}

/// `Load` that clones the value behind an immediate pointer.
///
/// Layout: opcode 0..8, kind 8..10, dst 10..23. The two trailing data words
/// carry the source pointer and the type-context pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCloneFromPtr {
    /// Destination slot.
    pub dst: u16,
}

impl LoadCloneFromPtr {
    /// Total width of this instruction in words.
    pub const WORDS: usize = 3;

    /// Encode into a leading word plus the pointer and context data words.
    pub fn encode(self, src: Bytecode, context: Bytecode) -> [Bytecode; 3] {
        let mut w = pack::word_from_opcode(OpCode::Load);
        w = pack::field(w, LoadKind::CloneFromPtr as u64, KIND_SHIFT, 2);
        w = pack::slot(w, self.dst, 10);
        [Bytecode::from_raw(w), src, context]
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            dst: unpack::slot(word.raw(), 10),
        }
    }
}
