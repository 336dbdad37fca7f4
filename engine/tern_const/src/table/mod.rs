//! Constant storage and lookup.

use std::cell::Cell;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tern_diagnostic::DiagnosticQueue;
use tern_value::{ConstantLookup, Value};

use crate::{ConstError, ConstFlags};

/// Identifies the module that registered a constant.
pub type ModuleId = u32;

/// Owner of the builtin constants.
pub const CORE_MODULE: ModuleId = 0;

/// A named value.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    /// Name as registered.
    pub name: Box<str>,
    pub value: Value,
    pub flags: ConstFlags,
    pub module: ModuleId,
}

impl Constant {
    /// A case-sensitive, request-scoped constant owned by the core.
    pub fn new(name: impl Into<Box<str>>, value: Value) -> Self {
        Constant {
            name: name.into(),
            value,
            flags: ConstFlags::CASE_SENSITIVE,
            module: CORE_MODULE,
        }
    }

    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.flags |= ConstFlags::PERSISTENT;
        self
    }

    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.flags -= ConstFlags::CASE_SENSITIVE;
        self
    }

    #[must_use]
    pub fn owned_by(mut self, module: ModuleId) -> Self {
        self.module = module;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.flags.contains(ConstFlags::PERSISTENT)
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.flags.contains(ConstFlags::CASE_SENSITIVE)
    }

    /// Key the constant is stored under.
    fn key(&self) -> Box<str> {
        if self.is_case_sensitive() {
            self.name.clone()
        } else {
            self.name.to_lowercase().into_boxed_str()
        }
    }
}

type Entries = FxHashMap<Box<str>, Constant>;

/// Find `name` with the case-insensitive fallback.
/// Exact name in every table first, then the lowercased name against
/// case-insensitive entries.
fn find<'a>(tables: &[&'a Entries], name: &str) -> Option<&'a Constant> {
    if let Some(constant) = tables.iter().copied().find_map(|entries| entries.get(name)) {
        return Some(constant);
    }
    let lowered = name.to_lowercase();
    if lowered == name {
        return None;
    }
    tables.iter().copied().find_map(|entries| {
        entries
            .get(lowered.as_str())
            .filter(|constant| !constant.is_case_sensitive())
    })
}

/// The shared half of the registry.
#[derive(Clone, Debug, Default)]
pub struct PersistentConstants {
    entries: Entries,
}

impl PersistentConstants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Constant> {
        find(&[&self.entries], name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.values()
    }
}

/// One worker's view of the registry.
///
/// Lookups consult the request overlay first, then the shared half.
#[derive(Debug)]
pub struct ConstantTable {
    persistent: Arc<PersistentConstants>,
    request: Entries,
    lookups: Cell<usize>,
}

impl Default for ConstantTable {
    fn default() -> Self {
        Self::new(Arc::new(PersistentConstants::new()))
    }
}

impl ConstantTable {
    pub fn new(persistent: Arc<PersistentConstants>) -> Self {
        ConstantTable {
            persistent,
            request: Entries::default(),
            lookups: Cell::new(0),
        }
    }

    /// The shared half, for handing to further workers.
    ///
    /// Once a second handle exists, persistent registration is frozen.
    pub fn persistent(&self) -> Arc<PersistentConstants> {
        Arc::clone(&self.persistent)
    }

    /// Register a constant.
    ///
    /// A duplicate name raises a notice and drops the new value.
    pub fn register(
        &mut self,
        constant: Constant,
        diagnostics: &mut DiagnosticQueue,
    ) -> Result<(), ConstError> {
        let key = constant.key();
        if self.request.contains_key(&key) || self.persistent.entries.contains_key(&key) {
            diagnostics.notice(format!("Constant {} already defined", constant.name));
            return Err(ConstError::AlreadyDefined {
                name: constant.name.into_string(),
            });
        }

        tracing::trace!(name = %constant.name, flags = ?constant.flags, "constant registered");
        if constant.is_persistent() {
            let Some(persistent) = Arc::get_mut(&mut self.persistent) else {
                return Err(ConstError::Frozen {
                    name: constant.name.into_string(),
                });
            };
            persistent.entries.insert(key, constant);
        } else {
            self.request.insert(key, constant);
        }
        Ok(())
    }

    /// The named constant, with the case-insensitive fallback.
    pub fn get(&self, name: &str) -> Option<&Constant> {
        self.lookups.set(self.lookups.get() + 1);
        find(&[&self.request, &self.persistent.entries], name)
    }

    /// An independent copy of the named constant's value.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).map(|constant| constant.value.duplicate())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop every constant `module` registered.
    ///
    /// Persistent entries go too while the shared half is still exclusively
    /// owned (module unload at startup or shutdown).
    pub fn sweep_by_owner(&mut self, module: ModuleId) -> usize {
        let before = self.request.len();
        self.request.retain(|_, constant| constant.module != module);
        let mut removed = before - self.request.len();
        if let Some(persistent) = Arc::get_mut(&mut self.persistent) {
            let before = persistent.entries.len();
            persistent.entries.retain(|_, constant| constant.module != module);
            removed += before - persistent.entries.len();
        }
        tracing::debug!(module, removed, "constants swept by owner");
        removed
    }

    /// Drop the request overlay.
    pub fn sweep_non_persistent(&mut self) -> usize {
        let removed = self.request.len();
        self.request.clear();
        tracing::debug!(removed, "request constants swept");
        removed
    }

    /// Constants visible to this table.
    pub fn len(&self) -> usize {
        self.request.len() + self.persistent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of name lookups performed so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl ConstantLookup for ConstantTable {
    fn lookup_constant(&self, name: &str) -> Option<Value> {
        self.lookup(name)
    }
}
