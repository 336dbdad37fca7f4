//! Deferred constant placeholders and their resolution.

use rustc_hash::FxHashSet;
use tern_diagnostic::DiagnosticQueue;
use tern_stack::ensure_sufficient_stack;

use crate::{Array, ArrayKey, Slot, Value, ValueError};

/// Read access to the constant registry.
pub trait ConstantLookup {
    /// An independent copy of the named constant's value.
    fn lookup_constant(&self, name: &str) -> Option<Value>;
}

/// What to do when a placeholder names an unknown constant.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum UndefinedConstantPolicy {
    /// Fail with [`ValueError::UndefinedConstant`].
    #[default]
    Error,
    /// Legacy behaviour: use the name itself as a string and raise a notice.
    AssumeName,
}

/// Array literal whose marked keys are constant names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantArray {
    entries: Array,
    constant_keys: FxHashSet<ArrayKey>,
}

impl ConstantArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain entry; the value may itself be a placeholder.
    pub fn insert(&mut self, key: impl Into<ArrayKey>, value: Value) {
        self.entries.insert(key, value);
    }

    /// Entry keyed by the value of constant `name`.
    pub fn insert_constant_key(&mut self, name: &str, value: Value) {
        let key = ArrayKey::Str(name.into());
        self.entries.insert_slot(key.clone(), Slot::new(value));
        self.constant_keys.insert(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything constant resolution needs from its caller.
pub struct ResolveContext<'a> {
    pub constants: &'a dyn ConstantLookup,
    pub diagnostics: &'a mut DiagnosticQueue,
    pub policy: UndefinedConstantPolicy,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        constants: &'a dyn ConstantLookup,
        diagnostics: &'a mut DiagnosticQueue,
        policy: UndefinedConstantPolicy,
    ) -> Self {
        ResolveContext {
            constants,
            diagnostics,
            policy,
        }
    }

    /// Look `name` up, applying the undefined-constant policy on a miss.
    fn constant(&mut self, name: &str) -> Result<Value, ValueError> {
        if let Some(value) = self.constants.lookup_constant(name) {
            return Ok(value);
        }
        match self.policy {
            UndefinedConstantPolicy::Error => Err(ValueError::UndefinedConstant {
                name: name.to_owned(),
            }),
            UndefinedConstantPolicy::AssumeName => {
                self.assumed(name);
                Ok(Value::Str(name.to_owned()))
            }
        }
    }

    fn assumed(&mut self, name: &str) {
        self.diagnostics
            .notice(format!("Use of undefined constant {name} - assumed '{name}'"));
    }
}

impl Value {
    /// Replace a placeholder with its resolved value.
    ///
    /// Other values are left untouched, so resolving twice is a no-op.
    pub fn resolve_constants(&mut self, cx: &mut ResolveContext<'_>) -> Result<(), ValueError> {
        ensure_sufficient_stack(|| match self {
            Value::ConstantRef(name) => {
                let name = name.clone();
                *self = cx.constant(&name)?;
                tracing::trace!(%name, "constant resolved");
                Ok(())
            }
            Value::ConstantArray(array) => {
                resolve_keys(array, cx)?;
                let entries = std::mem::take(&mut array.entries);
                *self = Value::Array(entries);
                if let Value::Array(entries) = self {
                    for slot in entries.slots() {
                        slot.resolve(cx)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        })
    }
}

/// Re-key every entry whose key names a constant.
///
/// Markers are cleared as keys are processed, so a failed pass can be
/// retried without repeating finished work.
fn resolve_keys(array: &mut ConstantArray, cx: &mut ResolveContext<'_>) -> Result<(), ValueError> {
    let marked: Vec<ArrayKey> = array
        .entries
        .keys()
        .filter(|key| array.constant_keys.contains(*key))
        .cloned()
        .collect();

    for key in marked {
        let ArrayKey::Str(name) = &key else {
            array.constant_keys.remove(&key);
            continue;
        };
        let Some(value) = cx.constants.lookup_constant(name) else {
            if cx.policy == UndefinedConstantPolicy::Error {
                return Err(ValueError::UndefinedConstant {
                    name: name.to_string(),
                });
            }
            cx.assumed(name);
            array.constant_keys.remove(&key);
            continue;
        };
        array.constant_keys.remove(&key);

        let new_key = match &value {
            Value::Str(s) if s.as_str() == &**name => continue,
            Value::Str(s) => ArrayKey::from(s.as_str()),
            Value::Int(n) => ArrayKey::Int(*n),
            other => {
                cx.diagnostics.warning(format!(
                    "Illegal offset type {} for constant key {name}",
                    other.type_name()
                ));
                continue;
            }
        };
        if let Some(slot) = array.entries.remove(&key) {
            array.entries.insert_slot(new_key, slot);
        }
    }
    Ok(())
}
