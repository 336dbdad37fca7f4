//! Leak and integrity reports.

use std::fmt;
use std::panic::Location;

use crate::{BlockId, BlockStatus};

/// A block still live at shutdown, with later leaks from the same site folded in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leak {
    pub site: &'static Location<'static>,
    pub size: usize,
    /// Further leaked blocks allocated at `site`.
    pub repeats: usize,
    /// Bytes held by those further blocks.
    pub repeated_bytes: usize,
}

impl Leak {
    pub fn blocks(&self) -> usize {
        self.repeats + 1
    }

    pub fn bytes(&self) -> usize {
        self.size + self.repeated_bytes
    }
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: leaked {} bytes", self.site, self.size)?;
        if self.repeats > 0 {
            write!(
                f,
                " (last leak repeated {} time{}, {} more bytes)",
                self.repeats,
                if self.repeats == 1 { "" } else { "s" },
                self.repeated_bytes
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
    pub leaks: Vec<Leak>,
}

impl LeakReport {
    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }

    pub fn total_blocks(&self) -> usize {
        self.leaks.iter().map(Leak::blocks).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.leaks.iter().map(Leak::bytes).sum()
    }
}

/// One corrupted block found by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockFault {
    pub block: BlockId,
    pub status: BlockStatus,
    pub site: &'static Location<'static>,
    pub size: usize,
}

impl fmt::Display for BlockFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} ({} bytes) allocated at {}: {}",
            self.block, self.size, self.site, self.status
        )
    }
}

/// Result of [`Arena::full_check`](crate::Arena::full_check).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub checked: usize,
    pub faults: Vec<BlockFault>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}
