//! Resource handles and the reference-counted table behind them.
//!
//! The value model only ever calls [`ResourceTable::add_ref`] and
//! [`ResourceTable::release`]. What a resource *is* stays with the table.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub type ResourceId = i64;

/// External reference-counted handle table.
pub trait ResourceTable: Send + Sync {
    fn add_ref(&self, id: ResourceId);

    /// Drop one reference; the table destroys the resource at zero.
    fn release(&self, id: ResourceId);
}

/// One counted reference to a resource.
pub struct ResourceRef {
    id: ResourceId,
    table: Arc<dyn ResourceTable>,
}

impl ResourceRef {
    /// Adopt a reference the table already counted for the caller.
    pub fn adopt(id: ResourceId, table: Arc<dyn ResourceTable>) -> Self {
        ResourceRef { id, table }
    }

    #[inline]
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl Clone for ResourceRef {
    fn clone(&self) -> Self {
        self.table.add_ref(self.id);
        ResourceRef {
            id: self.id,
            table: Arc::clone(&self.table),
        }
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource(#{})", self.id)
    }
}

type Destructor = Box<dyn FnOnce() + Send>;

struct Entry {
    kind: &'static str,
    refcount: usize,
    destructor: Option<Destructor>,
}

#[derive(Default)]
struct ListInner {
    entries: FxHashMap<ResourceId, Entry>,
    next_id: ResourceId,
}

/// In-process [`ResourceTable`] with destructor callbacks.
#[derive(Default)]
pub struct ResourceList {
    inner: Mutex<ListInner>,
}

impl ResourceList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a resource; the returned handle holds its only reference.
    pub fn register(
        self: &Arc<Self>,
        kind: &'static str,
        destructor: impl FnOnce() + Send + 'static,
    ) -> ResourceRef {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.entries.insert(
                id,
                Entry {
                    kind,
                    refcount: 1,
                    destructor: Some(Box::new(destructor)),
                },
            );
            id
        };
        tracing::trace!(id, kind, "resource registered");
        let table: Arc<dyn ResourceTable> = Arc::clone(self) as Arc<dyn ResourceTable>;
        ResourceRef::adopt(id, table)
    }

    pub fn refcount(&self, id: ResourceId) -> Option<usize> {
        self.inner.lock().entries.get(&id).map(|e| e.refcount)
    }

    pub fn kind(&self, id: ResourceId) -> Option<&'static str> {
        self.inner.lock().entries.get(&id).map(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every remaining resource regardless of its count.
    ///
    /// Handles that outlive this call release into an empty table.
    pub fn clear(&self) -> usize {
        let drained: Vec<Entry> = self.inner.lock().entries.drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            if let Some(destructor) = entry.destructor {
                destructor();
            }
        }
        count
    }
}

impl ResourceTable for ResourceList {
    fn add_ref(&self, id: ResourceId) {
        if let Some(entry) = self.inner.lock().entries.get_mut(&id) {
            entry.refcount += 1;
        }
    }

    fn release(&self, id: ResourceId) {
        let destructor = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.entries.get_mut(&id) else {
                return;
            };
            entry.refcount -= 1;
            if entry.refcount > 0 {
                return;
            }
            inner.entries.remove(&id).and_then(|e| e.destructor)
        };
        tracing::trace!(id, "resource destroyed");
        if let Some(destructor) = destructor {
            destructor();
        }
    }
}
