//! Block headers and handles.

use std::fmt;
use std::panic::Location;
use std::thread::ThreadId;

/// Header magic of a live block.
pub const START_MAGIC: u32 = 0x7312_F8DC;
/// Header magic of a block parked in a free list.
pub const CACHED_MAGIC: u32 = 0xFB82_77DC;
/// Canary written directly after the requested bytes.
pub const END_MAGIC: u32 = 0x2A8F_CC84;

/// Byte written over released memory when guards are on.
pub(crate) const SCRUB_BYTE: u8 = 0x5a;

/// Width of the end canary.
pub(crate) const CANARY_LEN: usize = std::mem::size_of::<u32>();

/// Generation-checked handle to an arena block.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BlockId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Result of verifying one block.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BlockStatus {
    Valid,
    /// Parked in a size-class free list.
    Cached,
    /// Returned to the system, or the handle is stale.
    Freed,
    /// The header magic was overwritten.
    Overrun { magic: u32 },
    /// `bytes` bytes of the end canary were overwritten.
    Overflown { bytes: usize },
}

impl BlockStatus {
    #[inline]
    pub fn is_corrupted(self) -> bool {
        matches!(self, BlockStatus::Overrun { .. } | BlockStatus::Overflown { .. })
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockStatus::Valid => write!(f, "OK"),
            BlockStatus::Cached => write!(f, "Cached"),
            BlockStatus::Freed => write!(f, "Freed"),
            BlockStatus::Overrun { magic } => {
                write!(f, "Overrun (magic=0x{magic:08X}, expected=0x{START_MAGIC:08X})")
            }
            BlockStatus::Overflown { bytes } => {
                let plural = if *bytes == 1 { "" } else { "s" };
                write!(f, "Overflown ({bytes} byte{plural} overwritten)")
            }
        }
    }
}

/// Header plus storage of one block.
#[derive(Debug)]
pub(crate) struct Block {
    /// Bytes the caller asked for.
    pub(crate) size: usize,
    /// `size` rounded to its class.
    pub(crate) real_size: usize,
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
    pub(crate) cached: bool,
    /// Corrupted and refused by `release`; freed at shutdown.
    pub(crate) quarantined: bool,
    /// Already listed as a leak or as corrupted.
    pub(crate) reported: bool,
    pub(crate) magic: u32,
    pub(crate) site: &'static Location<'static>,
    pub(crate) thread: ThreadId,
    /// `real_size` bytes, plus the canary when guards are on.
    pub(crate) data: Vec<u8>,
}

impl Block {
    pub(crate) fn write_canary(&mut self) {
        let end = self.size + CANARY_LEN;
        if let Some(canary) = self.data.get_mut(self.size..end) {
            canary.copy_from_slice(&END_MAGIC.to_ne_bytes());
        }
    }

    /// Verify magic values. Only meaningful with guards on.
    pub(crate) fn verify(&self) -> BlockStatus {
        if self.cached {
            return if self.magic == CACHED_MAGIC {
                BlockStatus::Cached
            } else {
                BlockStatus::Overrun { magic: self.magic }
            };
        }
        if self.magic != START_MAGIC {
            return BlockStatus::Overrun { magic: self.magic };
        }
        let expected = END_MAGIC.to_ne_bytes();
        let canary = self.data.get(self.size..self.size + CANARY_LEN).unwrap_or(&[]);
        let intact = canary
            .iter()
            .zip(expected.iter())
            .filter(|(a, b)| a == b)
            .count();
        match CANARY_LEN - intact {
            0 => BlockStatus::Valid,
            bytes => BlockStatus::Overflown { bytes },
        }
    }

    pub(crate) fn scrub(&mut self) {
        self.data.fill(SCRUB_BYTE);
    }
}
