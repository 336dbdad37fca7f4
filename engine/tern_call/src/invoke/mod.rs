//! Resolve, marshal, dispatch, unwind.

use std::sync::Arc;

use tern_stack::ensure_sufficient_stack;
use tern_value::{ArrayKey, ResolveContext, Slot, Value};

use crate::frame::Args;
use crate::{
    CallError, ClassEntry, ExecContext, Frame, Function, FunctionKind, Locals, RefMode,
    ARG_RECORD_BYTES, FRAME_RECORD_BYTES, THIS,
};

/// Per-call switches for [`ExecContext::invoke`].
#[derive(Default)]
pub struct InvokeOptions<'o> {
    /// A forced-reference parameter given a shared non-reference value
    /// gets a private reference instead of failing the call.
    pub allow_separation: bool,
    /// Run an interpreted callee in this scope instead of a fresh one.
    pub locals: Option<&'o mut Locals>,
}

impl<'o> InvokeOptions<'o> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_separation(mut self) -> Self {
        self.allow_separation = true;
        self
    }

    #[must_use]
    pub fn with_locals(mut self, locals: &'o mut Locals) -> Self {
        self.locals = Some(locals);
        self
    }
}

/// What a callable resolved to.
struct Target {
    function: Arc<Function>,
    this: Option<Slot>,
}

impl ExecContext<'_> {
    /// Call `callable` with `args`.
    ///
    /// `callable` is a function name or a `[object_or_class, method]`
    /// pair. With a `receiver` holding an object, a name is looked up in
    /// the object's class instead and the receiver is bound as `this`.
    ///
    /// Arguments are marshaled in place: a forced-reference parameter
    /// promotes the caller's slot to a reference, so writes by the callee
    /// are visible through `args` after the call returns.
    pub fn invoke(
        &mut self,
        callable: &mut Slot,
        receiver: Option<&mut Slot>,
        args: &mut [Slot],
        options: InvokeOptions<'_>,
    ) -> Result<Value, CallError> {
        self.checkpoint()?;
        let Target { function, this } = self.resolve_callable(callable, receiver)?;
        let args = marshal(&function, args, options.allow_separation)?;
        self.dispatch(function, this, args, options.locals)
    }

    /// Call a function by name.
    pub fn call(&mut self, name: &str, args: &mut [Slot]) -> Result<Value, CallError> {
        let mut callable = Slot::new(Value::from(name));
        self.invoke(&mut callable, None, args, InvokeOptions::default())
    }

    /// Call `method` on the object held by `receiver`.
    pub fn call_method(
        &mut self,
        receiver: &mut Slot,
        method: &str,
        args: &mut [Slot],
    ) -> Result<Value, CallError> {
        let mut callable = Slot::new(Value::from(method));
        self.invoke(&mut callable, Some(receiver), args, InvokeOptions::default())
    }

    // Resolve

    fn resolve_callable(
        &mut self,
        callable: &mut Slot,
        receiver: Option<&mut Slot>,
    ) -> Result<Target, CallError> {
        let name = match &*callable.read() {
            Value::Str(name) => Some(name.clone()),
            Value::Array(_) => None,
            other => {
                return Err(CallError::InvalidCallable {
                    type_name: other.type_name(),
                })
            }
        };
        match name {
            Some(name) => match receiver {
                Some(receiver) => self.resolve_on_receiver(receiver, &name),
                None => Ok(Target {
                    function: self.lookup_function(&name)?,
                    this: None,
                }),
            },
            None => self.resolve_pair(callable),
        }
    }

    /// A name called with a receiver. A non-object receiver is ignored.
    fn resolve_on_receiver(&self, receiver: &mut Slot, name: &str) -> Result<Target, CallError> {
        let class_name = match &*receiver.read() {
            Value::Object(object) => Some(Arc::clone(&object.class_name)),
            _ => None,
        };
        let Some(class_name) = class_name else {
            return Ok(Target {
                function: self.lookup_function(name)?,
                this: None,
            });
        };
        let class = self.lookup_class(&class_name)?;
        Ok(Target {
            function: lookup_method(&class, name)?,
            this: Some(receiver.reference()),
        })
    }

    /// The `[object_or_class, method]` form.
    fn resolve_pair(&self, callable: &mut Slot) -> Result<Target, CallError> {
        let invalid = CallError::InvalidCallable { type_name: "array" };
        let mut value = callable.ensure_exclusive();
        let Some(pair) = value.as_array_mut() else {
            return Err(invalid);
        };
        if pair.len() != 2 {
            return Err(invalid);
        }
        let method = match pair.get(&ArrayKey::Int(1)).map(|slot| slot.get()) {
            Some(Value::Str(method)) => method,
            _ => return Err(invalid),
        };
        let Some(target) = pair.get_mut(&ArrayKey::Int(0)) else {
            return Err(invalid);
        };

        let (class_name, bound) = match &*target.read() {
            Value::Object(object) => (Arc::clone(&object.class_name), true),
            Value::Str(class_name) => (Arc::from(class_name.as_str()), false),
            other => {
                return Err(CallError::InvalidCallable {
                    type_name: other.type_name(),
                })
            }
        };
        let class = self.lookup_class(&class_name)?;
        let function = lookup_method(&class, &method)?;
        let this = bound.then(|| target.reference());
        Ok(Target { function, this })
    }

    /// Request declarations first, then the startup registry.
    fn lookup_function(&self, name: &str) -> Result<Arc<Function>, CallError> {
        self.functions
            .get(name)
            .or_else(|| self.registry.functions.get(name))
            .cloned()
            .ok_or_else(|| CallError::UndefinedFunction {
                name: name.to_owned(),
            })
    }

    fn lookup_class(&self, name: &str) -> Result<Arc<ClassEntry>, CallError> {
        self.classes
            .get(name)
            .or_else(|| self.registry.classes.get(name))
            .cloned()
            .ok_or_else(|| CallError::UndefinedClass {
                name: name.to_owned(),
            })
    }

    // Dispatch

    #[tracing::instrument(level = "debug", skip_all, fields(function = %function.name))]
    fn dispatch(
        &mut self,
        function: Arc<Function>,
        this: Option<Slot>,
        args: Args,
        mut supplied: Option<&mut Locals>,
    ) -> Result<Value, CallError> {
        ensure_sufficient_stack(|| {
            self.checkpoint()?;
            let record = FRAME_RECORD_BYTES.saturating_add(args.len().saturating_mul(ARG_RECORD_BYTES));
            let block = self.arena.allocate(record)?;

            let borrowed_locals = supplied.is_some() && !function.is_native();
            let locals = match (&function.kind, supplied.as_deref_mut()) {
                (FunctionKind::Native(_), _) => None,
                (FunctionKind::User(_), Some(table)) => Some(std::mem::take(table)),
                (FunctionKind::User(_), None) => Some(self.locals_cache.take()),
            };
            let frame = Frame {
                function: Arc::clone(&function),
                this,
                args,
                locals,
                block: Some(block),
                borrowed_locals,
            };

            let mut guard = self.enter_frame(frame);
            let result = guard.run_body(&function);
            let returned = guard.finish();
            if let (Some(table), Some(locals)) = (supplied, returned) {
                *table = locals;
            }
            result
        })
    }

    fn run_body(&mut self, function: &Function) -> Result<Value, CallError> {
        match &function.kind {
            FunctionKind::User(body) => {
                self.bind_parameters(function)?;
                body.execute(self)
            }
            FunctionKind::Native(handler) => handler(self),
        }
    }

    /// Bind arguments, then defaults, into the top frame's locals.
    fn bind_parameters(&mut self, function: &Function) -> Result<(), CallError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let Some(locals) = frame.locals.as_mut() else {
            return Ok(());
        };
        for (index, param) in function.params.iter().enumerate() {
            let slot = match (frame.args.get(index), &param.default) {
                (Some(arg), _) => arg.clone(),
                (None, Some(default)) => {
                    let slot = Slot::new(default.duplicate());
                    let mut cx =
                        ResolveContext::new(&*self.constants, &mut self.diagnostics, self.policy);
                    slot.resolve(&mut cx)?;
                    slot
                }
                (None, None) => {
                    return Err(CallError::MissingArgument {
                        function: function.name.to_string(),
                        position: index + 1,
                    })
                }
            };
            locals.insert(Arc::clone(&param.name), slot);
        }
        if let Some(this) = &frame.this {
            locals.insert(Arc::from(THIS), this.clone());
        }
        Ok(())
    }
}

fn lookup_method(class: &ClassEntry, name: &str) -> Result<Arc<Function>, CallError> {
    class
        .method(name)
        .cloned()
        .ok_or_else(|| CallError::UndefinedMethod {
            class: class.name.to_string(),
            name: name.to_owned(),
        })
}

/// Pass each argument per its parameter's mode.
fn marshal(function: &Function, args: &mut [Slot], allow_separation: bool) -> Result<Args, CallError> {
    let mut marshaled = Args::with_capacity(args.len());
    for (index, arg) in args.iter_mut().enumerate() {
        let slot = match function.arg_mode(index) {
            RefMode::Force | RefMode::ForceRest => {
                if !arg.is_ref() && arg.is_shared() && !allow_separation {
                    tracing::debug!(function = %function.name, position = index + 1, "refusing to separate shared argument");
                    return Err(CallError::Marshal {
                        function: function.name.to_string(),
                        position: index + 1,
                    });
                }
                arg.reference()
            }
            RefMode::Allow if arg.is_ref() => arg.clone(),
            RefMode::Value | RefMode::Allow => {
                if arg.is_ref() {
                    Slot::new(arg.get())
                } else {
                    arg.clone()
                }
            }
        };
        marshaled.push(slot);
    }
    Ok(marshaled)
}

#[cfg(test)]
mod tests;
