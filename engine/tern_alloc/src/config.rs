/// Allocator slice of the engine configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocConfig {
    /// Soft ceiling on bytes charged to the current run.
    pub memory_limit: usize,
    /// Maximum number of blocks kept per size-class free list.
    pub cache_capacity: usize,
    /// Number of size classes that are cached (class `n` holds `8 * n` byte blocks).
    pub cache_classes: usize,
    /// Bracket blocks with magic values and verify them.
    pub debug_guards: bool,
}

impl AllocConfig {
    pub const DEFAULT_MEMORY_LIMIT: usize = 8 * 1024 * 1024;
    pub const DEFAULT_CACHE_CAPACITY: usize = 256;
    pub const DEFAULT_CACHE_CLASSES: usize = 11;
}

impl Default for AllocConfig {
    fn default() -> Self {
        AllocConfig {
            memory_limit: Self::DEFAULT_MEMORY_LIMIT,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            cache_classes: Self::DEFAULT_CACHE_CLASSES,
            debug_guards: cfg!(debug_assertions),
        }
    }
}
