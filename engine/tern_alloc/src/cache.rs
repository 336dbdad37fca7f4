//! Per-size-class free lists.

use crate::ALIGNMENT;

#[derive(Debug, Default)]
struct SizeClass {
    /// Slab indices of parked blocks, most recently released last.
    free: Vec<u32>,
    hits: usize,
    misses: usize,
}

/// Snapshot of one size class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassStats {
    pub block_size: usize,
    pub cached: usize,
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug)]
pub(crate) struct SizeClasses {
    classes: Vec<SizeClass>,
    capacity: usize,
}

impl SizeClasses {
    pub(crate) fn new(classes: usize, capacity: usize) -> Self {
        SizeClasses {
            classes: (0..classes).map(|_| SizeClass::default()).collect(),
            capacity,
        }
    }

    #[inline]
    pub(crate) fn covers(&self, class: usize) -> bool {
        class < self.classes.len()
    }

    /// Pop a parked block, counting the hit or miss.
    pub(crate) fn pop(&mut self, class: usize) -> Option<u32> {
        let entry = self.classes.get_mut(class)?;
        match entry.free.pop() {
            Some(index) => {
                entry.hits += 1;
                Some(index)
            }
            None => {
                entry.misses += 1;
                None
            }
        }
    }

    /// Park a block unless the class is full.
    pub(crate) fn push(&mut self, class: usize, index: u32) -> bool {
        let capacity = self.capacity;
        match self.classes.get_mut(class) {
            Some(entry) if entry.free.len() < capacity => {
                entry.free.push(index);
                true
            }
            _ => false,
        }
    }

    /// Empty every free list, yielding the parked indices.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = u32> + '_ {
        self.classes.iter_mut().flat_map(|c| c.free.drain(..))
    }

    pub(crate) fn parked(&self) -> impl Iterator<Item = u32> + '_ {
        self.classes.iter().flat_map(|c| c.free.iter().copied())
    }

    pub(crate) fn reset_stats(&mut self) {
        for class in &mut self.classes {
            class.hits = 0;
            class.misses = 0;
        }
    }

    pub(crate) fn stats(&self) -> Vec<ClassStats> {
        self.classes
            .iter()
            .enumerate()
            .map(|(index, class)| ClassStats {
                block_size: index * ALIGNMENT,
                cached: class.free.len(),
                hits: class.hits,
                misses: class.misses,
            })
            .collect()
    }
}
