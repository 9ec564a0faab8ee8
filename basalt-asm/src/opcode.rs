use core::fmt;

/// Operation selector stored in the low 8 bits of every leading bytecode
/// word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// No operation.
    Nop = 0x00,
    /// Load a value into a stack slot. Four sub-operations: small immediate,
    /// full-word immediate (multi-word), default construction (may be
    /// multi-word), and clone-from-pointer (three words).
    Load = 0x01,
    /// Move the optional return value out, unwind, and pop the frame.
    Return = 0x02,
    /// Invoke a script or native function. Multi-word; trailing words pack
    /// the argument slot indices four to a word.
    Call = 0x03,
    /// Relocate the instruction pointer, optionally on a boolean condition.
    Jump = 0x04,
    /// Explicitly destroy the value in a slot and clear its context.
    Deinit = 0x05,
    /// Stage the locks of several sync cells and acquire them in address
    /// order, or release the most recently acquired set.
    Sync = 0x06,
    /// Transfer a value between slots, invalidating the source.
    Move = 0x07,
    /// Duplicate a value between slots through its clone callable.
    Clone = 0x08,
    /// Read through a reference-like value, producing a non-owning view.
    Dereference = 0x09,
    /// Write through a reference-like value, moving from the source slot.
    SetReference = 0x0a,
    /// Construct a reference to a stack slot.
    MakeReference = 0x0b,
    /// Produce a non-owning view of a member of a struct value.
    GetMember = 0x0c,
    /// Move a value into a member of a struct value.
    SetMember = 0x0d,
    /// Convert between built-in scalar representations.
    Cast = 0x0e,
    /// `src1 == src2` into a bool slot.
    Equal = 0x0f,
    /// `src1 != src2` into a bool slot.
    NotEqual = 0x10,
    /// `src1 < src2` into a bool slot.
    Less = 0x11,
    /// `src1 > src2` into a bool slot.
    Greater = 0x12,
    /// `src1 <= src2` into a bool slot.
    LessOrEqual = 0x13,
    /// `src1 >= src2` into a bool slot.
    GreaterOrEqual = 0x14,
    /// Add one to an integer, checked unless flagged otherwise.
    Increment = 0x15,
    /// Add two values: checked integer addition, IEEE float addition, or
    /// string concatenation.
    Add = 0x16,
    /// Divide two values: checked integer division or IEEE float division.
    Divide = 0x17,
}

/// Bits of a word reserved for the opcode.
pub(crate) const OPCODE_BITS: u32 = 8;

/// The byte can't be mapped to any known [`OpCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcode(pub u8);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode byte {:#04x}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidOpcode {}

impl TryFrom<u8> for OpCode {
    type Error = InvalidOpcode;

    fn try_from(b: u8) -> Result<Self, InvalidOpcode> {
        use OpCode::*;
        Ok(match b {
            0x00 => Nop,
            0x01 => Load,
            0x02 => Return,
            0x03 => Call,
            0x04 => Jump,
            0x05 => Deinit,
            0x06 => Sync,
            0x07 => Move,
            0x08 => Clone,
            0x09 => Dereference,
            0x0a => SetReference,
            0x0b => MakeReference,
            0x0c => GetMember,
            0x0d => SetMember,
            0x0e => Cast,
            0x0f => Equal,
            0x10 => NotEqual,
            0x11 => Less,
            0x12 => Greater,
            0x13 => LessOrEqual,
            0x14 => GreaterOrEqual,
            0x15 => Increment,
            0x16 => Add,
            0x17 => Divide,
            _ => return Err(InvalidOpcode(b)),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcode_byte_round_trip() {
        for op in OpCode::iter() {
            let byte = op as u8;
            assert_eq!(OpCode::try_from(byte), Ok(op));
        }
    }

    #[test]
    fn unknown_bytes_rejected() {
        let last = OpCode::iter().last().unwrap() as u8;
        for b in (last + 1)..=u8::MAX {
            assert_eq!(OpCode::try_from(b), Err(InvalidOpcode(b)));
        }
    }
}
