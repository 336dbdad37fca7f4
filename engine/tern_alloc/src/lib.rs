//! Request-scoped arena allocator for the Tern engine.
//!
//! Every allocation made on behalf of a request goes through an [`Arena`].
//! The arena sits in front of a [`SystemAllocator`] and adds:
//!
//! - **Size classes**: requests are rounded up to 8 bytes. Small classes
//!   keep a free list so a released block is reused without touching the
//!   system allocator.
//! - **A soft memory ceiling**: exceeding it fails the allocation with
//!   [`AllocError::LimitExceeded`], which the call layer turns into a
//!   request-ending condition. The process keeps running.
//! - **Guards** (optional): blocks carry a start magic in their header and
//!   an end canary after the requested bytes. [`Arena::release`] and
//!   [`Arena::full_check`] verify both and report corruption with the
//!   allocation site instead of crashing.
//! - **Leak reporting**: [`Arena::shutdown`] lists every block that is
//!   still live, grouping repeats from the same call site.
//!
//! Blocks are addressed by generation-checked [`BlockId`] handles into a
//! slab, so a stale handle is detected rather than dereferenced.
//!
//! Exhaustion of the system allocator itself, and overflow of the usage
//! counter, are process-fatal: they are logged and the process aborts.

mod arena;
mod block;
mod cache;
mod config;
mod errors;
mod leak;
mod system;

pub use arena::{Arena, MemoryUsage};
pub use block::{BlockId, BlockStatus, CACHED_MAGIC, END_MAGIC, START_MAGIC};
pub use cache::ClassStats;
pub use config::AllocConfig;
pub use errors::{AllocError, BlockError};
pub use leak::{BlockFault, IntegrityReport, Leak, LeakReport};
pub use system::{StdSystem, SystemAllocator, SystemStats};

use std::panic::Location;

/// Granularity every request is rounded up to.
pub const ALIGNMENT: usize = 8;

/// Extra headroom granted when the ceiling is crossed mid-execution.
pub const LIMIT_GRACE: usize = 1024 * 1024;

/// Round a request up to its size class, or `None` if that overflows.
#[inline]
pub fn real_size(size: usize) -> Option<usize> {
    let rounded = size.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1);
    (rounded <= isize::MAX.unsigned_abs()).then_some(rounded)
}

/// Size-class index of an already rounded size.
#[inline]
pub fn class_index(real_size: usize) -> usize {
    real_size >> 3
}

/// The system allocator could not satisfy a request. Not recoverable.
#[cold]
pub(crate) fn fatal_exhaustion(size: usize, site: &'static Location<'static>) -> ! {
    tracing::error!(
        size,
        %site,
        "Out of memory (tried to allocate {size} bytes)"
    );
    std::process::abort()
}

/// The usage counter itself overflowed. Not recoverable.
#[cold]
pub(crate) fn fatal_accounting(allocated: usize, size: usize) -> ! {
    tracing::error!(
        allocated,
        size,
        "Integer overflow in memory accounting (tried to allocate {size} bytes)"
    );
    std::process::abort()
}
