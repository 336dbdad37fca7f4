//! Allocator error types.

use std::panic::Location;

use thiserror::Error;

use crate::BlockStatus;

/// Why an allocation or reallocation did not produce a block.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The soft ceiling would be crossed. Request-fatal for the caller.
    #[error("Allowed memory size of {limit} bytes exhausted (tried to allocate {requested} bytes)")]
    LimitExceeded { limit: usize, requested: usize },

    /// `count * size + offset` does not fit in a `usize`.
    #[error("Possible integer overflow in memory allocation ({count} * {size} + {offset})")]
    Overflow {
        count: usize,
        size: usize,
        offset: usize,
    },

    /// The request cannot be rounded to a size class.
    #[error("requested size {size} is too large")]
    SizeOverflow { size: usize },

    /// The system allocator refused a `try_reallocate`; the old block is intact.
    #[error("Out of memory (tried to allocate {requested} bytes)")]
    Exhausted { requested: usize },

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// A block handle could not be used.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block was already freed")]
    AlreadyFreed,

    #[error("block is sitting in the free-list cache")]
    AlreadyCached,

    #[error("block allocated at {site} is corrupted: {status}")]
    Corrupted {
        status: BlockStatus,
        site: &'static Location<'static>,
    },

    #[error("block belongs to another thread")]
    ForeignThread,
}
