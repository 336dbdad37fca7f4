//! Callable definitions and the tables they are looked up in.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use tern_value::Value;

use crate::{CallError, ExecContext};

/// How a parameter receives its argument.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefMode {
    /// An independent value; writes stay local to the callee.
    #[default]
    Value,
    /// Always a reference; writes are visible to the caller.
    Force,
    /// A reference if the caller passed one, else a value.
    Allow,
    /// `Force` for this and every later argument, declared or not.
    ForceRest,
}

impl RefMode {
    #[inline]
    pub fn is_forced(self) -> bool {
        matches!(self, RefMode::Force | RefMode::ForceRest)
    }
}

/// A declared parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Arc<str>,
    pub mode: RefMode,
    /// Bound when the caller omits the argument. May hold unresolved
    /// constants; they are resolved at bind time.
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Param {
            name: name.into(),
            mode: RefMode::Value,
            default: None,
        }
    }

    #[must_use]
    pub fn by_ref(mut self) -> Self {
        self.mode = RefMode::Force;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RefMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// A compiled body. The opcode loop lives behind this seam.
pub trait OpArray: Send + Sync {
    fn execute(&self, cx: &mut ExecContext<'_>) -> Result<Value, CallError>;
}

/// Host-provided implementation of a function.
pub type NativeFn = fn(&mut ExecContext<'_>) -> Result<Value, CallError>;

#[derive(Clone)]
pub enum FunctionKind {
    /// Interpreted; gets a locals table with parameters bound.
    User(Arc<dyn OpArray>),
    /// Reads its arguments straight from the frame.
    Native(NativeFn),
}

#[derive(Clone)]
pub struct Function {
    pub name: Arc<str>,
    pub params: Vec<Param>,
    pub kind: FunctionKind,
}

impl Function {
    pub fn user(name: impl Into<Arc<str>>, params: Vec<Param>, body: Arc<dyn OpArray>) -> Self {
        Function {
            name: name.into(),
            params,
            kind: FunctionKind::User(body),
        }
    }

    pub fn native(name: impl Into<Arc<str>>, params: Vec<Param>, handler: NativeFn) -> Self {
        Function {
            name: name.into(),
            params,
            kind: FunctionKind::Native(handler),
        }
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }

    /// Passing mode for the argument at `index`.
    ///
    /// A trailing `ForceRest` covers every argument after it; otherwise
    /// undeclared arguments are passed by value.
    pub fn arg_mode(&self, index: usize) -> RefMode {
        if let Some(param) = self.params.get(index) {
            return match param.mode {
                RefMode::ForceRest => RefMode::Force,
                mode => mode,
            };
        }
        match self.params.last() {
            Some(last) if last.mode == RefMode::ForceRest => RefMode::Force,
            _ => RefMode::Value,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FunctionKind::User(_) => "user",
            FunctionKind::Native(_) => "native",
        };
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("params", &self.params)
            .finish()
    }
}

/// Functions keyed by lowercased name.
#[derive(Clone, Debug, Default)]
pub struct FunctionTable {
    entries: FxHashMap<Box<str>, Arc<Function>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `function`, refusing a second definition of the same name.
    pub fn declare(&mut self, function: Function) -> Result<(), CallError> {
        let key = function.name.to_lowercase().into_boxed_str();
        if self.entries.contains_key(&key) {
            return Err(CallError::Redeclared {
                name: function.name.to_string(),
            });
        }
        self.entries.insert(key, Arc::new(function));
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<Function>> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(name.to_lowercase().as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A class: its name and method table.
#[derive(Clone, Debug)]
pub struct ClassEntry {
    pub name: Arc<str>,
    pub methods: FunctionTable,
}

impl ClassEntry {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        ClassEntry {
            name: name.into(),
            methods: FunctionTable::new(),
        }
    }

    /// Builder-style method declaration.
    pub fn with_method(mut self, method: Function) -> Result<Self, CallError> {
        self.methods.declare(method)?;
        Ok(self)
    }

    pub fn method(&self, name: &str) -> Option<&Arc<Function>> {
        self.methods.get(name)
    }
}

/// Classes keyed by lowercased name.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    entries: FxHashMap<Box<str>, Arc<ClassEntry>>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, class: ClassEntry) -> Result<(), CallError> {
        let key = class.name.to_lowercase().into_boxed_str();
        if self.entries.contains_key(&key) {
            return Err(CallError::Redeclared {
                name: class.name.to_string(),
            });
        }
        self.entries.insert(key, Arc::new(class));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ClassEntry>> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(name.to_lowercase().as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Functions and classes known at startup, shared read-only by workers.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    pub functions: FunctionTable,
    pub classes: ClassTable,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }
}
