//! The arena: slab storage, pool list, size-class cache and accounting.
//!
//! Every block lives in a slab entry. Live blocks are threaded onto a
//! doubly-linked pool list (newest first) so shutdown and integrity scans
//! can walk them; parked blocks are unlinked and sit in exactly one
//! size-class free list. A block is never in both.

use std::panic::Location;
use std::thread;

use crate::block::{Block, CANARY_LEN};
use crate::cache::SizeClasses;
use crate::{
    class_index, fatal_accounting, fatal_exhaustion, real_size, AllocConfig, AllocError, BlockError,
    BlockFault, BlockId, BlockStatus, ClassStats, IntegrityReport, Leak, LeakReport, StdSystem,
    SystemAllocator, SystemStats, CACHED_MAGIC, LIMIT_GRACE, START_MAGIC,
};

#[derive(Debug)]
struct Entry {
    generation: u32,
    block: Option<Block>,
}

/// Bytes charged to the current run.
///
/// Only live blocks are charged. Parking a block refunds its bytes and a
/// cache hit charges them again, so a warm cache never shifts the ceiling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub allocated: usize,
    pub peak: usize,
    pub limit: usize,
}

/// Request-scoped allocator.
#[derive(Debug)]
pub struct Arena<S: SystemAllocator = StdSystem> {
    config: AllocConfig,
    system: S,
    entries: Vec<Entry>,
    vacant: Vec<u32>,
    /// Newest live block.
    head: Option<u32>,
    classes: SizeClasses,
    allocated: usize,
    peak: usize,
    limit: usize,
    /// Grace headroom was already granted this run.
    grace_granted: bool,
    executing: bool,
    stats: SystemStats,
}

impl Arena<StdSystem> {
    pub fn new(config: AllocConfig) -> Self {
        Self::with_system(config, StdSystem)
    }
}

impl Default for Arena<StdSystem> {
    fn default() -> Self {
        Self::new(AllocConfig::default())
    }
}

impl<S: SystemAllocator> Arena<S> {
    pub fn with_system(config: AllocConfig, system: S) -> Self {
        let classes = SizeClasses::new(config.cache_classes, config.cache_capacity);
        let limit = config.memory_limit;
        Arena {
            config,
            system,
            entries: Vec::new(),
            vacant: Vec::new(),
            head: None,
            classes,
            allocated: 0,
            peak: 0,
            limit,
            grace_granted: false,
            executing: false,
            stats: SystemStats::default(),
        }
    }

    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    #[inline]
    fn guard_len(&self) -> usize {
        if self.config.debug_guards {
            CANARY_LEN
        } else {
            0
        }
    }

    /// Begin a run.
    ///
    /// Resets the ceiling, counters and statistics. Blocks parked by a
    /// previous `shutdown(false)` remain available but uncharged.
    pub fn start(&mut self) {
        self.limit = self.config.memory_limit;
        self.grace_granted = false;
        self.executing = false;
        self.allocated = 0;
        self.peak = 0;
        self.stats = SystemStats::default();
        self.classes.reset_stats();
        tracing::debug!(parked = self.classes.parked().count(), "arena started");
    }

    /// Allocate `size` bytes.
    #[track_caller]
    pub fn allocate(&mut self, size: usize) -> Result<BlockId, AllocError> {
        self.allocate_at(size, Location::caller())
    }

    /// Allocate `count * size` zeroed bytes.
    #[track_caller]
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<BlockId, AllocError> {
        let total = count.checked_mul(size).ok_or(AllocError::Overflow {
            count,
            size,
            offset: 0,
        })?;
        let id = self.allocate_at(total, Location::caller())?;
        self.data_mut(id)?.fill(0);
        Ok(id)
    }

    /// Allocate `count * size + offset` bytes, failing locally on overflow.
    #[track_caller]
    pub fn allocate_array(
        &mut self,
        count: usize,
        size: usize,
        offset: usize,
    ) -> Result<BlockId, AllocError> {
        let total = count
            .checked_mul(size)
            .and_then(|bytes| bytes.checked_add(offset))
            .ok_or(AllocError::Overflow {
                count,
                size,
                offset,
            })?;
        self.allocate_at(total, Location::caller())
    }

    /// Copy `bytes` into a new block followed by a NUL byte.
    #[track_caller]
    pub fn strndup(&mut self, bytes: &[u8]) -> Result<BlockId, AllocError> {
        let size = bytes
            .len()
            .checked_add(1)
            .ok_or(AllocError::SizeOverflow { size: bytes.len() })?;
        let id = self.allocate_at(size, Location::caller())?;
        let data = self.data_mut(id)?;
        data[..bytes.len()].copy_from_slice(bytes);
        data[bytes.len()] = 0;
        Ok(id)
    }

    #[track_caller]
    pub fn strdup(&mut self, text: &str) -> Result<BlockId, AllocError> {
        self.strndup(text.as_bytes())
    }

    fn allocate_at(
        &mut self,
        size: usize,
        site: &'static Location<'static>,
    ) -> Result<BlockId, AllocError> {
        let real = real_size(size).ok_or(AllocError::SizeOverflow { size })?;
        let class = class_index(real);
        self.charge(real, size)?;
        if self.classes.covers(class) {
            if let Some(index) = self.classes.pop(class) {
                return Ok(self.reissue(index, size, site));
            }
        }

        let Some(data) = self.system.allocate(real + self.guard_len()) else {
            fatal_exhaustion(size, site)
        };
        self.stats.allocations += 1;

        let mut block = Block {
            size,
            real_size: real,
            prev: None,
            next: None,
            cached: false,
            quarantined: false,
            reported: false,
            magic: START_MAGIC,
            site,
            thread: thread::current().id(),
            data,
        };
        if self.config.debug_guards {
            block.write_canary();
        }
        let id = self.insert(block, site);
        self.link(id.index);
        tracing::trace!(%id, size, "allocated");
        Ok(id)
    }

    /// Hand a parked block out again under a fresh generation.
    fn reissue(&mut self, index: u32, size: usize, site: &'static Location<'static>) -> BlockId {
        let guards = self.config.debug_guards;
        let entry = &mut self.entries[index as usize];
        entry.generation = entry.generation.wrapping_add(1);
        let id = BlockId {
            index,
            generation: entry.generation,
        };
        if let Some(block) = entry.block.as_mut() {
            block.size = size;
            block.cached = false;
            block.quarantined = false;
            block.reported = false;
            block.magic = START_MAGIC;
            block.site = site;
            block.thread = thread::current().id();
            if guards {
                block.write_canary();
            }
        }
        self.link(index);
        tracing::trace!(%id, size, "allocated from cache");
        id
    }

    fn insert(&mut self, block: Block, site: &'static Location<'static>) -> BlockId {
        if let Some(index) = self.vacant.pop() {
            let entry = &mut self.entries[index as usize];
            entry.block = Some(block);
            return BlockId {
                index,
                generation: entry.generation,
            };
        }
        let Ok(index) = u32::try_from(self.entries.len()) else {
            fatal_exhaustion(block.size, site)
        };
        self.entries.push(Entry {
            generation: 0,
            block: Some(block),
        });
        BlockId {
            index,
            generation: 0,
        }
    }

    /// Charge `real` bytes against the ceiling.
    fn charge(&mut self, real: usize, requested: usize) -> Result<(), AllocError> {
        let Some(total) = self.allocated.checked_add(real) else {
            fatal_accounting(self.allocated, requested)
        };
        if total > self.limit {
            let limit = self.limit;
            if self.executing && !self.grace_granted {
                self.grace_granted = true;
                self.limit = self.allocated.saturating_add(LIMIT_GRACE);
            }
            tracing::warn!(limit, requested, allocated = self.allocated, "memory limit exceeded");
            return Err(AllocError::LimitExceeded { limit, requested });
        }
        self.allocated = total;
        self.peak = self.peak.max(total);
        Ok(())
    }

    /// Resize a block, preserving its contents.
    ///
    /// The returned handle replaces `id`, which becomes stale.
    #[track_caller]
    pub fn reallocate(&mut self, id: BlockId, new_size: usize) -> Result<BlockId, AllocError> {
        self.reallocate_at(id, new_size, Location::caller(), false)
    }

    /// Like [`Arena::reallocate`], but system exhaustion returns
    /// [`AllocError::Exhausted`] and leaves `id` valid.
    #[track_caller]
    pub fn try_reallocate(&mut self, id: BlockId, new_size: usize) -> Result<BlockId, AllocError> {
        self.reallocate_at(id, new_size, Location::caller(), true)
    }

    fn reallocate_at(
        &mut self,
        id: BlockId,
        new_size: usize,
        site: &'static Location<'static>,
        allow_failure: bool,
    ) -> Result<BlockId, AllocError> {
        let guards = self.config.debug_guards;
        let real = real_size(new_size).ok_or(AllocError::SizeOverflow { size: new_size })?;
        let block = self.live_block_mut(id)?;
        if guards {
            guard_check(block, id)?;
        }
        let old_real = block.real_size;

        if real > old_real {
            self.charge(real - old_real, new_size)?;
        }

        let capacity = real + self.guard_len();
        let entry = &mut self.entries[id.index as usize];
        let Some(block) = entry.block.as_mut() else {
            return Err(BlockError::AlreadyFreed.into());
        };
        let data = std::mem::take(&mut block.data);
        match self.system.reallocate(data, capacity) {
            Ok(data) => block.data = data,
            Err(data) => {
                block.data = data;
                if !allow_failure {
                    fatal_exhaustion(new_size, site);
                }
                if real > old_real {
                    self.allocated -= real - old_real;
                }
                return Err(AllocError::Exhausted {
                    requested: new_size,
                });
            }
        }
        self.stats.reallocations += 1;

        block.size = new_size;
        block.real_size = real;
        block.site = site;
        if guards {
            block.write_canary();
        }
        if old_real > real {
            self.allocated -= old_real - real;
        }
        entry.generation = entry.generation.wrapping_add(1);
        let new_id = BlockId {
            index: id.index,
            generation: entry.generation,
        };
        tracing::trace!(from = %id, to = %new_id, new_size, "reallocated");
        Ok(new_id)
    }

    /// Release a block into its free list, or to the system.
    ///
    /// A corrupted block is reported and quarantined: it stays on the
    /// pool list and is freed at shutdown.
    pub fn release(&mut self, id: BlockId) -> Result<(), BlockError> {
        let guards = self.config.debug_guards;
        let block = self.live_block_mut(id)?;
        if guards {
            guard_check(block, id)?;
            block.scrub();
        }
        let real = block.real_size;
        let class = class_index(real);

        self.unlink(id.index);
        if self.classes.covers(class) && self.classes.push(class, id.index) {
            if let Some(block) = self.block_at_mut(id.index) {
                block.cached = true;
                block.magic = CACHED_MAGIC;
            }
            self.allocated = self.allocated.saturating_sub(real);
            tracing::trace!(%id, class, "parked");
            return Ok(());
        }
        self.free_entry(id.index);
        tracing::trace!(%id, "released to system");
        Ok(())
    }

    /// Drop a block to the system allocator. The caller has unlinked it.
    fn free_entry(&mut self, index: u32) {
        let Some(entry) = self.entries.get_mut(index as usize) else {
            return;
        };
        let Some(block) = entry.block.take() else {
            return;
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(index);
        if !block.cached {
            self.allocated = self.allocated.saturating_sub(block.real_size);
        }
        self.system.release(block.data);
        self.stats.releases += 1;
    }

    fn block_at(&self, index: u32) -> Option<&Block> {
        self.entries.get(index as usize)?.block.as_ref()
    }

    fn block_at_mut(&mut self, index: u32) -> Option<&mut Block> {
        self.entries.get_mut(index as usize)?.block.as_mut()
    }

    fn block(&self, id: BlockId) -> Option<&Block> {
        self.entries
            .get(id.index as usize)
            .filter(|entry| entry.generation == id.generation)?
            .block
            .as_ref()
    }

    fn live_block(&self, id: BlockId) -> Result<&Block, BlockError> {
        let block = self.block(id).ok_or(BlockError::AlreadyFreed)?;
        if block.cached {
            return Err(BlockError::AlreadyCached);
        }
        Ok(block)
    }

    fn live_block_mut(&mut self, id: BlockId) -> Result<&mut Block, BlockError> {
        let block = self
            .entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.block.as_mut())
            .ok_or(BlockError::AlreadyFreed)?;
        if block.cached {
            return Err(BlockError::AlreadyCached);
        }
        Ok(block)
    }

    fn link(&mut self, index: u32) {
        let old_head = self.head;
        if let Some(block) = self.block_at_mut(index) {
            block.prev = None;
            block.next = old_head;
        }
        if let Some(old) = old_head.and_then(|old| self.block_at_mut(old)) {
            old.prev = Some(index);
        }
        self.head = Some(index);
    }

    fn unlink(&mut self, index: u32) {
        let Some((prev, next)) = self.block_at(index).map(|b| (b.prev, b.next)) else {
            return;
        };
        if let Some(prev) = prev {
            if let Some(prev_block) = self.block_at_mut(prev) {
                prev_block.next = next;
            }
        } else {
            self.head = next;
        }
        if let Some(next_block) = next.and_then(|n| self.block_at_mut(n)) {
            next_block.prev = prev;
        }
        if let Some(block) = self.block_at_mut(index) {
            block.prev = None;
            block.next = None;
        }
    }

    /// Live blocks, newest first.
    fn pool(&self) -> impl Iterator<Item = (u32, &Block)> + '_ {
        std::iter::successors(
            self.head.and_then(|i| self.block_at(i).map(|b| (i, b))),
            |(_, block)| block.next.and_then(|i| self.block_at(i).map(|b| (i, b))),
        )
    }

    fn id_of(&self, index: u32) -> BlockId {
        BlockId {
            index,
            generation: self.entries[index as usize].generation,
        }
    }

    /// The requested bytes of a live block.
    pub fn data(&self, id: BlockId) -> Result<&[u8], BlockError> {
        let block = self.live_block(id)?;
        Ok(&block.data[..block.size])
    }

    pub fn data_mut(&mut self, id: BlockId) -> Result<&mut [u8], BlockError> {
        let block = self.live_block_mut(id)?;
        let size = block.size;
        Ok(&mut block.data[..size])
    }

    /// Requested size of a live block.
    pub fn size_of(&self, id: BlockId) -> Result<usize, BlockError> {
        self.live_block(id).map(|block| block.size)
    }

    /// Classify one block without modifying it.
    pub fn check_block(&self, id: BlockId) -> BlockStatus {
        match self.block(id) {
            None => BlockStatus::Freed,
            Some(block) if self.config.debug_guards => block.verify(),
            Some(block) if block.cached => BlockStatus::Cached,
            Some(_) => BlockStatus::Valid,
        }
    }

    /// Verify every live and parked block.
    pub fn full_check(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        let parked = self
            .classes
            .parked()
            .filter_map(|index| self.block_at(index).map(|block| (index, block)));
        for (index, block) in self.pool().chain(parked) {
            report.checked += 1;
            if !self.config.debug_guards {
                continue;
            }
            let status = block.verify();
            if status.is_corrupted() {
                let fault = BlockFault {
                    block: self.id_of(index),
                    status,
                    site: block.site,
                    size: block.size,
                };
                tracing::error!(%fault, "heap corruption");
                report.faults.push(fault);
            }
        }
        tracing::debug!(
            checked = report.checked,
            errors = report.faults.len(),
            "integrity scan finished"
        );
        report
    }

    /// End a run: report leaks and release every live block.
    ///
    /// Parked blocks go back to the system only with `force_release_cache`;
    /// otherwise they stay cached for the next run.
    pub fn shutdown(&mut self, force_release_cache: bool) -> LeakReport {
        let report = self.collect_leaks();
        let quarantined = self.pool().filter(|(_, block)| block.quarantined).count();

        let mut cursor = self.head.take();
        while let Some(index) = cursor {
            cursor = self.block_at(index).and_then(|block| block.next);
            self.free_entry(index);
        }
        if force_release_cache {
            let parked: Vec<u32> = self.classes.drain().collect();
            for index in parked {
                self.free_entry(index);
            }
        }
        self.executing = false;
        tracing::debug!(
            leaked_blocks = report.total_blocks(),
            leaked_bytes = report.total_bytes(),
            quarantined,
            force_release_cache,
            "arena shut down"
        );
        report
    }

    fn collect_leaks(&mut self) -> LeakReport {
        let unreported: Vec<u32> = self
            .pool()
            .filter(|(_, block)| !block.reported)
            .map(|(index, _)| index)
            .collect();

        let mut report = LeakReport::default();
        for index in unreported {
            let Some(block) = self.block_at_mut(index) else {
                continue;
            };
            block.reported = true;
            let (site, size) = (block.site, block.size);
            match report.leaks.iter_mut().find(|leak| leak.site == site) {
                Some(leak) => {
                    leak.repeats += 1;
                    leak.repeated_bytes += size;
                }
                None => report.leaks.push(Leak {
                    site,
                    size,
                    repeats: 0,
                    repeated_bytes: 0,
                }),
            }
        }
        for leak in &report.leaks {
            tracing::warn!(%leak, "memory leak");
        }
        report
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            allocated: self.allocated,
            peak: self.peak,
            limit: self.limit,
        }
    }

    pub fn set_memory_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.grace_granted = false;
    }

    /// Mark whether script code is running; enables ceiling grace.
    pub fn set_executing(&mut self, executing: bool) {
        self.executing = executing;
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Number of live (unparked) blocks.
    pub fn live_blocks(&self) -> usize {
        self.pool().count()
    }

    pub fn cache_stats(&self) -> Vec<ClassStats> {
        self.classes.stats()
    }

    pub fn system_stats(&self) -> SystemStats {
        self.stats
    }
}

/// Refuse foreign-thread access and quarantine corrupted blocks.
fn guard_check(block: &mut Block, id: BlockId) -> Result<(), BlockError> {
    if block.thread != thread::current().id() {
        return Err(BlockError::ForeignThread);
    }
    let status = block.verify();
    if status.is_corrupted() {
        block.quarantined = true;
        block.reported = true;
        let site = block.site;
        tracing::error!(%id, %site, %status, size = block.size, "corrupted block");
        return Err(BlockError::Corrupted { status, site });
    }
    Ok(())
}
