//! Runtime fault reporting.
//!
//! Two strata of failure exist and are never converted into one another:
//! misuse of the runtime (malformed encodings, arity mismatches, stack
//! exhaustion, duplicate registration) panics immediately, while faults a
//! running script can legitimately hit surface as a [`RuntimeError`] flowing
//! back through `Result` values.

use core::fmt;

/// Classification of a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
#[non_exhaustive]
pub enum RuntimeErrorKind {
    /// Dereferenced a null or invalidated reference.
    NullDereference = 0x01,
    /// Checked increment overflowed.
    IncrementIntegerOverflow = 0x02,
    /// Checked addition overflowed.
    AdditionIntegerOverflow = 0x03,
    /// Checked subtraction overflowed.
    SubtractionIntegerOverflow = 0x04,
    /// Checked multiplication overflowed.
    MultiplicationIntegerOverflow = 0x05,
    /// Checked division overflowed (`i64::MIN / -1`).
    DivisionIntegerOverflow = 0x06,
    /// Integer division by zero.
    DivideByZero = 0x07,
    /// Integer modulo by zero.
    ModuloByZero = 0x08,
    /// Integer remainder by zero.
    RemainderByZero = 0x09,
    /// Checked exponentiation overflowed.
    PowerIntegerOverflow = 0x0a,
    /// Zero raised to a negative power.
    ZeroToPowerOfNegative = 0x0b,
    /// Shift amount outside `0..64`.
    InvalidBitShiftAmount = 0x0c,
    /// Float-to-int conversion outside the integer range.
    FloatToIntOverflow = 0x0d,
    /// Even root of a negative number.
    NegativeRoot = 0x0e,
    /// Logarithm of zero or a negative number.
    LogarithmZeroOrNegative = 0x0f,
    /// Dereferenced a weak reference whose owner is gone.
    ExpiredWeakReference = 0x10,
    /// A native callee reported a non-zero status code.
    NativeCallFailed = 0x11,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A runtime fault: its kind plus a human-readable message carrying the
/// offending operands.
///
/// The dispatcher unwinds the faulting frame, reports the error to the
/// program's host hooks at its origin, and propagates it to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
#[must_use]
pub struct RuntimeError {
    /// Fault classification.
    pub kind: RuntimeErrorKind,
    /// Bounded human-readable description.
    pub message: String,
}

impl RuntimeError {
    /// Longest message the runtime itself produces; longer host-provided
    /// messages are truncated at a char boundary.
    pub const MAX_MESSAGE_LEN: usize = 256;

    /// Build an error, truncating over-long messages.
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > Self::MAX_MESSAGE_LEN {
            let mut cut = Self::MAX_MESSAGE_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self { kind, message }
    }
}

/// Outcome of executing script code.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
