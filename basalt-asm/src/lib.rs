//! Instruction set of the Basalt scripting runtime.
//!
//! Every instruction occupies one or more 8-byte [`Bytecode`] words. The low
//! 8 bits of the leading word carry the [`OpCode`]; the remaining 56 bits
//! carry operand fields. Multi-word instructions follow the leading word with
//! *data words* holding raw 64-bit payloads (immediates, pointers, or packed
//! 16-bit lanes).
//!
//! Operand records live in [`ops`] as plain structs with `encode`/`decode`
//! pairs so that the encoder and the dispatcher agree on the exact bit
//! layout by construction.

#![warn(missing_docs)]
#![deny(unused_must_use)]

mod opcode;
mod pack;
mod unpack;
mod word;

pub mod ops;


pub use opcode::{InvalidOpcode, OpCode};
pub use word::{Bytecode, RawBytecode};

/// Bit width of a stack-slot operand.
pub const BITS_PER_SLOT_OPERAND: u32 = 13;

/// Largest addressable in-frame slot offset, and therefore the largest
/// permitted frame length.
pub const MAX_FRAME_LEN: u16 = (1 << BITS_PER_SLOT_OPERAND) - 1;

/// Tag namespace shared by `LoadImmediateLong`, `LoadDefault`, and `Cast`.
///
/// A tag selects one of the built-in runtime types. It occupies 6 bits in
/// operand encodings; `None` is reserved and never a valid operand tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ValueTag {
    /// Reserved for internal use; never encoded.
    None = 0,
    /// Boolean value.
    Bool = 1,
    /// 64-bit signed integer.
    Int = 2,
    /// 64-bit IEEE-754 float.
    Float = 3,
    /// Unicode scalar value.
    Char = 4,
    /// Immutable refcounted string.
    String = 5,
    /// Typed growable array.
    Array = 6,
    /// Hashed set.
    Set = 7,
    /// Hashed key/value map.
    Map = 8,
    /// Optional value.
    Option = 9,
    /// Named error value.
    Error = 10,
    /// Ok-or-error value.
    Result = 11,
    /// Immutable reference.
    ConstRef = 12,
    /// Mutable reference.
    MutRef = 13,
    /// Exclusively-owned sync cell.
    Unique = 14,
    /// Shared-ownership sync cell.
    Shared = 15,
    /// Weak observer of a sync cell.
    Weak = 16,
    /// First-class function value.
    Function = 17,
}

impl ValueTag {
    /// Bits a tag occupies in operand encodings.
    pub const BITS: u32 = 6;

    /// Recover a tag from its encoded bits. Returns `None` for out-of-range
    /// or reserved values.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Float,
            4 => Self::Char,
            5 => Self::String,
            6 => Self::Array,
            7 => Self::Set,
            8 => Self::Map,
            9 => Self::Option,
            10 => Self::Error,
            11 => Self::Result,
            12 => Self::ConstRef,
            13 => Self::MutRef,
            14 => Self::Unique,
            15 => Self::Shared,
            16 => Self::Weak,
            17 => Self::Function,
            _ => return None,
        })
    }
}
