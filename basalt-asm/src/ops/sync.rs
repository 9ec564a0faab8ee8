//! `Sync` and `Unsync`.

use crate::{pack, unpack, Bytecode, OpCode, MAX_FRAME_LEN};

const KIND_SHIFT: u32 = 8;
const COUNT_SHIFT: u32 = 16;
const FIRST_SHIFT: u32 = 32;
const SECOND_SHIFT: u32 = 48;

/// Form selector of a `Sync` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncKind {
    /// Stage the listed locks and acquire them in address order.
    Sync = 0,
    /// Release the most recently acquired lock set.
    Unsync = 1,
}

impl SyncKind {
    /// Decode the form of a leading `Sync` word.
    pub const fn of(word: Bytecode) -> Self {
        match unpack::field(word.raw(), KIND_SHIFT, 1) {
            0 => Self::Sync,
            _ => Self::Unsync,
        }
    }
}

/// How a staged lock is to be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AcquireKind {
    /// Reader lock; many may hold it concurrently.
    Shared = 0,
    /// Writer lock; exclusive.
    Exclusive = 1,
}

/// One `(slot, acquire-kind)` pair of a `Sync` instruction, packed into a
/// 16-bit lane: slot in bits 0..13, kind in bit 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSource {
    /// Slot holding the sync cell.
    pub src: u16,
    /// Shared or exclusive acquisition.
    pub kind: AcquireKind,
}

impl SyncSource {
    /// Pack into a 16-bit lane.
    pub fn to_lane(self) -> u16 {
        assert!(self.src <= MAX_FRAME_LEN, "sync source slot out of range");
        self.src | ((self.kind as u16) << 13)
    }

    /// Unpack from a 16-bit lane.
    pub const fn from_lane(lane: u16) -> Self {
        let kind = if (lane >> 13) & 1 == 0 {
            AcquireKind::Shared
        } else {
            AcquireKind::Exclusive
        };
        Self {
            src: lane & MAX_FRAME_LEN,
            kind,
        }
    }
}

/// `Sync`: stage-and-acquire of one or more sync cells.
///
/// Layout: opcode 0..8, kind 8, count 16..32, first pair 32..48, second
/// pair 48..64. Pairs beyond the two inline lanes spill into trailing data
/// words, four lanes per word. Acquisition happens only after every inline
/// and trailing source has been staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sync {
    /// Number of staged sources; at least one.
    pub count: u16,
    /// First inline pair.
    pub first: SyncSource,
    /// Second inline pair; zeroed when `count == 1`.
    pub second: SyncSource,
}

impl Sync {
    /// Total width in words for `count` staged sources.
    pub const fn words(count: usize) -> usize {
        1 + super::lane_words(count.saturating_sub(2))
    }

    /// Index of the first spilled-pair data word, relative to the leading
    /// word.
    pub const SPILL_OFFSET: usize = 1;

    /// Encode a stage-and-acquire of `sources`.
    pub fn encode(sources: &[SyncSource]) -> Vec<Bytecode> {
        assert!(!sources.is_empty(), "sync requires at least one source");
        let mut w = pack::word_from_opcode(OpCode::Sync);
        w = pack::field(w, SyncKind::Sync as u64, KIND_SHIFT, 1);
        w = pack::field(w, sources.len() as u64, COUNT_SHIFT, 16);
        w = pack::field(w, sources[0].to_lane() as u64, FIRST_SHIFT, 16);
        if sources.len() > 1 {
            w = pack::field(w, sources[1].to_lane() as u64, SECOND_SHIFT, 16);
        }
        let mut out = Vec::with_capacity(Self::words(sources.len()));
        out.push(Bytecode::from_raw(w));
        pack::pack_lanes(sources.iter().skip(2).map(|s| s.to_lane()), &mut out);
        out
    }

    /// Decode from a leading word.
    pub const fn decode(word: Bytecode) -> Self {
        Self {
            count: unpack::field(word.raw(), COUNT_SHIFT, 16) as u16,
            first: SyncSource::from_lane(unpack::field(word.raw(), FIRST_SHIFT, 16) as u16),
            second: SyncSource::from_lane(unpack::field(word.raw(), SECOND_SHIFT, 16) as u16),
        }
    }
}

/// `Unsync`: release the most recently acquired lock set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsync;

impl Unsync {
    /// Encode into a single word.
    pub fn encode(self) -> Bytecode {
        let mut w = pack::word_from_opcode(OpCode::Sync);
        w = pack::field(w, SyncKind::Unsync as u64, KIND_SHIFT, 1);
        Bytecode::from_raw(w)
    }
}
