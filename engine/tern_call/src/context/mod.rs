//! Per-request execution state.
//!
//! An `ExecContext` is what compiled bodies and native functions see: the
//! frame stack, variable scopes, the worker's arena and constant table,
//! and the request's diagnostics. It lives for one request and is torn
//! down with [`ExecContext::finish`].

mod builder;

use std::sync::Arc;

use tern_alloc::Arena;
use tern_const::{Constant, ConstError, ConstantTable};
use tern_diagnostic::DiagnosticQueue;
use tern_stack::ensure_sufficient_stack;
use tern_timeout::InterruptFlag;
use tern_value::{ResolveContext, ResourceList, Slot, UndefinedConstantPolicy, Value};

pub use builder::ExecContextBuilder;

use crate::{
    CallError, ClassEntry, ClassTable, Frame, Function, FunctionTable, Locals, LocalsCache,
    OpArray, Registry, MAIN_FUNCTION_NAME,
};

pub struct ExecContext<'a> {
    pub(crate) arena: &'a mut Arena,
    pub(crate) constants: &'a mut ConstantTable,
    pub(crate) registry: Arc<Registry>,
    /// Functions declared while the request runs.
    pub(crate) functions: FunctionTable,
    pub(crate) classes: ClassTable,
    pub(crate) interrupt: Option<InterruptFlag>,
    pub(crate) policy: UndefinedConstantPolicy,
    pub(crate) resources: Arc<ResourceList>,
    pub(crate) diagnostics: DiagnosticQueue,
    pub(crate) locals_cache: LocalsCache,
    pub(crate) frames: Vec<Frame>,
    pub(crate) globals: Locals,
}

/// What a finished context hands back to its worker.
pub struct Finished<'f> {
    pub arena: &'f mut Arena,
    pub constants: &'f mut ConstantTable,
    pub diagnostics: DiagnosticQueue,
    pub locals_cache: LocalsCache,
}

impl<'a> ExecContext<'a> {
    pub fn builder(arena: &'a mut Arena, constants: &'a mut ConstantTable) -> ExecContextBuilder<'a> {
        ExecContextBuilder::new(arena, constants)
    }

    /// Run a top-level body with the arena in executing mode.
    pub fn execute_main(&mut self, body: &dyn OpArray) -> Result<Value, CallError> {
        self.run_main(|cx| body.execute(cx))
    }

    /// [`execute_main`](Self::execute_main) for host closures.
    pub fn run_main<F>(&mut self, f: F) -> Result<Value, CallError>
    where
        F: FnOnce(&mut Self) -> Result<Value, CallError>,
    {
        self.arena.set_executing(true);
        let result = ensure_sufficient_stack(|| {
            self.checkpoint()?;
            f(self)
        });
        self.arena.set_executing(false);
        result
    }

    /// Tear the context down. Globals are released here, before the
    /// worker's leak report.
    ///
    /// Request declarations are dropped as well; the context is left empty.
    pub fn finish(&mut self) -> Finished<'_> {
        debug_assert!(self.frames.is_empty(), "finish with frames still active");
        self.frames.clear();
        self.globals.clear();
        self.functions.clear();
        self.classes.clear();
        Finished {
            arena: &mut *self.arena,
            constants: &mut *self.constants,
            diagnostics: std::mem::take(&mut self.diagnostics),
            locals_cache: std::mem::take(&mut self.locals_cache),
        }
    }

    /// Fail with the pending interrupt, if any.
    ///
    /// Long-running bodies call this on loop back-edges; calls check it on
    /// entry.
    #[inline]
    pub fn checkpoint(&self) -> Result<(), CallError> {
        match &self.interrupt {
            Some(flag) => flag.check().map_err(CallError::from),
            None => Ok(()),
        }
    }

    // Frames

    /// Name of the innermost active function, or `main` at top level.
    pub fn current_function_name(&self) -> &str {
        self.frames.last().map_or(MAIN_FUNCTION_NAME, |frame| frame.name())
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Argument `index` of the innermost call, as passed.
    pub fn arg(&self, index: usize) -> Option<Slot> {
        self.frames.last()?.args.get(index).cloned()
    }

    /// Mutable access to an argument slot. Writing through a forced
    /// reference reaches the caller's variable.
    pub fn arg_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.frames.last_mut()?.args.get_mut(index)
    }

    pub fn arg_count(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.args.len())
    }

    /// The bound receiver, if this is a method call on an object.
    pub fn this(&self) -> Option<Slot> {
        self.frames.last()?.this.clone()
    }

    // Variables

    fn scope(&self) -> &Locals {
        match self.frames.last() {
            Some(Frame {
                locals: Some(locals),
                ..
            }) => locals,
            _ => &self.globals,
        }
    }

    fn scope_mut(&mut self) -> &mut Locals {
        match self.frames.last_mut() {
            Some(Frame {
                locals: Some(locals),
                ..
            }) => locals,
            _ => &mut self.globals,
        }
    }

    /// The named variable in the active scope (the innermost interpreted
    /// function, else globals).
    pub fn local(&self, name: &str) -> Option<Slot> {
        self.scope().get(name).cloned()
    }

    pub fn local_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.scope_mut().get_mut(name)
    }

    /// Assign by value: an existing variable is written with copy-on-write
    /// (through, if it is a reference); a new one is created.
    pub fn assign(&mut self, name: &str, value: Value) {
        let scope = self.scope_mut();
        match scope.get_mut(name) {
            Some(slot) => slot.assign(value),
            None => {
                scope.insert(Arc::from(name), Slot::new(value));
            }
        }
    }

    /// Bind `name` to an existing identity.
    pub fn bind(&mut self, name: &str, slot: Slot) {
        self.scope_mut().insert(Arc::from(name), slot);
    }

    pub fn unset(&mut self, name: &str) -> Option<Slot> {
        self.scope_mut().remove(name)
    }

    pub fn global(&self, name: &str) -> Option<Slot> {
        self.globals.get(name).cloned()
    }

    // Declarations

    /// Declare a function for the rest of the request.
    pub fn declare_function(&mut self, function: Function) -> Result<(), CallError> {
        if self.registry.functions.contains(&function.name) {
            return Err(CallError::Redeclared {
                name: function.name.to_string(),
            });
        }
        self.functions.declare(function)
    }

    pub fn declare_class(&mut self, class: ClassEntry) -> Result<(), CallError> {
        if self.registry.classes.get(&class.name).is_some() {
            return Err(CallError::Redeclared {
                name: class.name.to_string(),
            });
        }
        self.classes.declare(class)
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.functions.contains(name) || self.registry.functions.contains(name)
    }

    /// Register a request constant.
    pub fn define_constant(&mut self, constant: Constant) -> Result<(), ConstError> {
        self.constants.register(constant, &mut self.diagnostics)
    }

    /// Substitute deferred constants in `slot`.
    pub fn resolve(&mut self, slot: &Slot) -> Result<(), CallError> {
        let mut cx = ResolveContext::new(&*self.constants, &mut self.diagnostics, self.policy);
        slot.resolve(&mut cx)?;
        Ok(())
    }

    // Services

    pub fn arena(&mut self) -> &mut Arena {
        &mut *self.arena
    }

    pub fn constants(&self) -> &ConstantTable {
        &*self.constants
    }

    pub fn resources(&self) -> &Arc<ResourceList> {
        &self.resources
    }

    pub fn diagnostics(&self) -> &DiagnosticQueue {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticQueue {
        &mut self.diagnostics
    }

    pub fn policy(&self) -> UndefinedConstantPolicy {
        self.policy
    }
}
