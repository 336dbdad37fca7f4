//! Reference-counted value cells with copy-on-write.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{ResolveContext, Value, ValueError};

struct Cell {
    value: RwLock<Value>,
    /// Holders are aliases of one variable rather than copies.
    is_ref: AtomicBool,
}

/// Handle to one value identity.
///
/// `Clone` adds a reference; the identity is released when the last
/// handle drops. See the crate docs for the write discipline.
#[derive(Clone)]
pub struct Slot(Arc<Cell>);

impl Slot {
    pub fn new(value: Value) -> Self {
        Slot(Arc::new(Cell {
            value: RwLock::new(value),
            is_ref: AtomicBool::new(false),
        }))
    }

    /// A slot already flagged as a reference.
    pub fn new_ref(value: Value) -> Self {
        let slot = Slot::new(value);
        slot.0.is_ref.store(true, Ordering::Relaxed);
        slot
    }

    pub fn null() -> Self {
        Slot::new(Value::Null)
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.value.read()
    }

    /// Independent copy of the current value.
    pub fn get(&self) -> Value {
        self.read().duplicate()
    }

    /// Number of handles sharing this identity.
    #[inline]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        self.0.is_ref.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.refcount() > 1
    }

    pub fn same_identity(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Give this handle a private copy if the identity is shared and not a
    /// reference.
    pub fn separate(&mut self) {
        if self.is_shared() && !self.is_ref() {
            let copy = self.get();
            tracing::trace!(refcount = self.refcount(), "separating shared value");
            *self = Slot::new(copy);
        }
    }

    /// Writable access to the value.
    ///
    /// A shared, non-reference identity is separated first, so the write
    /// is invisible to other holders. A reference is written in place.
    pub fn ensure_exclusive(&mut self) -> RwLockWriteGuard<'_, Value> {
        self.separate();
        self.0.value.write()
    }

    /// Write through an explicit reference. `None` unless `is_ref` is set.
    pub fn write_shared(&self) -> Option<RwLockWriteGuard<'_, Value>> {
        self.is_ref().then(|| self.0.value.write())
    }

    /// Replace the value, separating first.
    pub fn assign(&mut self, value: Value) {
        *self.ensure_exclusive() = value;
    }

    /// Turn this handle into a reference, separating first if the identity
    /// is shared by independent copies.
    pub fn make_ref(&mut self) {
        if self.is_ref() {
            return;
        }
        self.separate();
        self.0.is_ref.store(true, Ordering::Relaxed);
    }

    /// Promote to a reference and return a second alias of it.
    pub fn reference(&mut self) -> Slot {
        self.make_ref();
        self.clone()
    }

    /// Substitute deferred constants in place.
    ///
    /// Every holder observes the resolved value, so a placeholder is looked
    /// up once no matter how widely it is shared. A cell that is already
    /// borrowed further up the stack (a self-containing array) is skipped.
    pub fn resolve(&self, cx: &mut ResolveContext<'_>) -> Result<(), ValueError> {
        let Some(mut value) = self.0.value.try_write() else {
            return Ok(());
        };
        if !value.is_unresolved() {
            return Ok(());
        }
        value.resolve_constants(cx)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) != 2 || !self.is_ref() {
            return;
        }
        // One holder remains: it is no longer an alias of anything.
        if let Some(value) = self.0.value.try_read() {
            if !value.is_object() {
                self.0.is_ref.store(false, Ordering::Relaxed);
            }
        }
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other) || *self.read() == *other.read()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Slot");
        match self.0.value.try_read() {
            Some(value) => s.field("value", &*value),
            None => s.field("value", &"<borrowed>"),
        };
        s.field("refcount", &self.refcount())
            .field("is_ref", &self.is_ref())
            .finish()
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::new(value)
    }
}
