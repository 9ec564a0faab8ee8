use crate::opcode::{InvalidOpcode, OpCode, OPCODE_BITS};

use core::fmt;

/// Raw representation of one bytecode word.
pub type RawBytecode = u64;

/// One 8-byte bytecode word.
///
/// The low [`OPCODE_BITS`] bits of a *leading* word are the opcode; the rest
/// are operand fields whose layout is instruction-specific (see
/// [`crate::ops`]). *Data* words following a leading word are opaque 64-bit
/// payloads and must never be decoded as instructions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Bytecode(RawBytecode);

static_assertions::assert_eq_size!(Bytecode, u64);
static_assertions::assert_eq_align!(Bytecode, u64);

impl Bytecode {
    /// Size of one word in bytes.
    pub const SIZE: usize = core::mem::size_of::<RawBytecode>();

    /// Wrap a raw word.
    pub const fn from_raw(raw: RawBytecode) -> Self {
        Self(raw)
    }

    /// A data word carrying an opaque 64-bit payload.
    pub const fn data(payload: u64) -> Self {
        Self(payload)
    }

    /// A data word carrying a signed 64-bit payload.
    pub const fn data_signed(payload: i64) -> Self {
        Self(payload as u64)
    }

    /// A data word carrying the bit pattern of a float.
    pub const fn data_float(payload: f64) -> Self {
        Self(payload.to_bits())
    }

    /// The raw 64-bit word.
    pub const fn raw(self) -> RawBytecode {
        self.0
    }

    /// The opcode byte of a leading word.
    pub const fn opcode_byte(self) -> u8 {
        (self.0 & ((1 << OPCODE_BITS) - 1)) as u8
    }

    /// Decode the opcode of a leading word.
    pub fn opcode(self) -> Result<OpCode, InvalidOpcode> {
        OpCode::try_from(self.opcode_byte())
    }
}

impl From<RawBytecode> for Bytecode {
    fn from(raw: RawBytecode) -> Self {
        Self(raw)
    }
}

impl From<Bytecode> for RawBytecode {
    fn from(word: Bytecode) -> Self {
        word.0
    }
}

impl fmt::LowerHex for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
