//! The allocator underneath the arena.

/// Source of raw buffers for the arena.
///
/// Returning `None` (or `Err` with the untouched buffer from
/// [`SystemAllocator::reallocate`]) signals exhaustion.
pub trait SystemAllocator {
    fn allocate(&mut self, size: usize) -> Option<Vec<u8>>;

    fn reallocate(&mut self, buffer: Vec<u8>, size: usize) -> Result<Vec<u8>, Vec<u8>>;

    fn release(&mut self, buffer: Vec<u8>);
}

/// The global Rust allocator, asked fallibly.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdSystem;

impl SystemAllocator for StdSystem {
    fn allocate(&mut self, size: usize) -> Option<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(size).ok()?;
        buffer.resize(size, 0);
        Some(buffer)
    }

    fn reallocate(&mut self, mut buffer: Vec<u8>, size: usize) -> Result<Vec<u8>, Vec<u8>> {
        if size > buffer.len() && buffer.try_reserve_exact(size - buffer.len()).is_err() {
            return Err(buffer);
        }
        buffer.resize(size, 0);
        buffer.shrink_to_fit();
        Ok(buffer)
    }

    fn release(&mut self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Calls the arena made into its [`SystemAllocator`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemStats {
    pub allocations: usize,
    pub reallocations: usize,
    pub releases: usize,
}
