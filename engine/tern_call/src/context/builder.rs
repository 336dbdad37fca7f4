//! Builder for `ExecContext`.

use std::sync::Arc;

use tern_alloc::Arena;
use tern_const::ConstantTable;
use tern_diagnostic::DiagnosticQueue;
use tern_timeout::InterruptFlag;
use tern_value::{ResourceList, UndefinedConstantPolicy};

use super::ExecContext;
use crate::{ClassTable, FunctionTable, Locals, LocalsCache, Registry};

/// Builder for creating [`ExecContext`] instances.
///
/// The arena and constant table are borrowed from the worker for the
/// lifetime of the context; everything else has a request-local default.
pub struct ExecContextBuilder<'a> {
    arena: &'a mut Arena,
    constants: &'a mut ConstantTable,
    registry: Option<Arc<Registry>>,
    interrupt: Option<InterruptFlag>,
    policy: UndefinedConstantPolicy,
    resources: Option<Arc<ResourceList>>,
    diagnostics: Option<DiagnosticQueue>,
    locals_cache: Option<LocalsCache>,
}

impl<'a> ExecContextBuilder<'a> {
    pub fn new(arena: &'a mut Arena, constants: &'a mut ConstantTable) -> Self {
        Self {
            arena,
            constants,
            registry: None,
            interrupt: None,
            policy: UndefinedConstantPolicy::default(),
            resources: None,
            diagnostics: None,
            locals_cache: None,
        }
    }

    /// Startup functions and classes.
    #[must_use]
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Flag polled at every call boundary and by [`ExecContext::checkpoint`].
    #[must_use]
    pub fn interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    #[must_use]
    pub fn undefined_constants(mut self, policy: UndefinedConstantPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn resources(mut self, resources: Arc<ResourceList>) -> Self {
        self.resources = Some(resources);
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, diagnostics: DiagnosticQueue) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Reuse the tables a previous request left behind.
    #[must_use]
    pub fn locals_cache(mut self, cache: LocalsCache) -> Self {
        self.locals_cache = Some(cache);
        self
    }

    pub fn build(self) -> ExecContext<'a> {
        ExecContext {
            arena: self.arena,
            constants: self.constants,
            registry: self.registry.unwrap_or_default(),
            functions: FunctionTable::new(),
            classes: ClassTable::new(),
            interrupt: self.interrupt,
            policy: self.policy,
            resources: self.resources.unwrap_or_else(ResourceList::new),
            diagnostics: self.diagnostics.unwrap_or_default(),
            locals_cache: self.locals_cache.unwrap_or_default(),
            frames: Vec::new(),
            globals: Locals::default(),
        }
    }
}
