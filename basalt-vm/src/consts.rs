//! Runtime parameters.

use core::mem;

pub use basalt_asm::{BITS_PER_SLOT_OPERAND, MAX_FRAME_LEN};

/// Size of one stack slot, in bytes.
pub const SLOT_SIZE: usize = mem::size_of::<u64>();

/// Number of slots in a thread's interpreter stack (1 MiB of value storage).
pub const STACK_SLOTS: usize = 1 << 17;

static_assertions::const_assert!(STACK_SLOTS > (MAX_FRAME_LEN as usize) + RESERVED_SLOTS);

/// Reserved bookkeeping slots prefixed to every frame.
pub const RESERVED_SLOTS: usize = 4;

/// Reserved-slot index of the caller's saved instruction pointer.
pub const OLD_INSTRUCTION_POINTER: usize = 0;
/// Reserved-slot index of the caller's saved frame length.
pub const OLD_FRAME_LENGTH: usize = 1;
/// Reserved-slot index of the caller's saved return-value destination.
pub const OLD_RETURN_VALUE_DST: usize = 2;
/// Reserved-slot index of the caller's saved return-context destination.
pub const OLD_RETURN_CONTEXT_DST: usize = 3;

/// Number of slots a value of `size` bytes occupies.
pub const fn slots_for_size(size: usize) -> usize {
    size.div_ceil(SLOT_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_rounding() {
        assert_eq!(slots_for_size(1), 1);
        assert_eq!(slots_for_size(8), 1);
        assert_eq!(slots_for_size(9), 2);
        assert_eq!(slots_for_size(16), 2);
        assert_eq!(slots_for_size(17), 3);
    }
}
