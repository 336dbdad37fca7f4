//! Activation records.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use tern_alloc::BlockId;
use tern_value::Slot;

use crate::Function;

/// A function's named variables.
pub type Locals = FxHashMap<Arc<str>, Slot>;

/// Arguments as marshaled for one call.
pub type Args = SmallVec<[Slot; 8]>;

/// Arena bytes charged for each activation record.
pub const FRAME_RECORD_BYTES: usize = 64;

/// Additional arena bytes charged per argument.
pub const ARG_RECORD_BYTES: usize = 16;

/// Cleared locals tables kept for reuse.
pub const LOCALS_CACHE_SIZE: usize = 32;

/// One active call.
#[derive(Debug)]
pub struct Frame {
    pub function: Arc<Function>,
    /// Receiver of a method call, bound as `this` by reference.
    pub this: Option<Slot>,
    pub args: Args,
    /// `None` for native functions.
    pub locals: Option<Locals>,
    /// Arena record backing this frame.
    pub(crate) block: Option<BlockId>,
    /// `locals` came from the caller and goes back to it on return.
    pub(crate) borrowed_locals: bool,
}

impl Frame {
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Bounded stack of emptied locals tables.
///
/// Tables keep their capacity, so nested calls of similar shape stop
/// allocating after warm-up.
#[derive(Debug, Default)]
pub struct LocalsCache {
    tables: Vec<Locals>,
}

impl LocalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take(&mut self) -> Locals {
        self.tables.pop().unwrap_or_default()
    }

    /// Clear `table` and keep it if there is room.
    pub(crate) fn put(&mut self, mut table: Locals) {
        table.clear();
        if self.tables.len() < LOCALS_CACHE_SIZE {
            self.tables.push(table);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Drop every cached table.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
