//! The closed set of runtime value shapes.

use std::fmt;
use std::sync::Arc;

use crate::{Array, ArrayKey, ConstantArray, ResourceRef};

/// An object instance: its class name and property table.
///
/// Objects are values here. Duplicating one copies its property table.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub class_name: Arc<str>,
    pub properties: Array,
}

impl Object {
    pub fn new(class_name: impl Into<Arc<str>>) -> Self {
        Object {
            class_name: class_name.into(),
            properties: Array::new(),
        }
    }
}

/// A runtime value.
///
/// `ConstantRef` and `ConstantArray` only occur inside compiled values
/// that have not been linked yet; see [`Slot::resolve`](crate::Slot::resolve).
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Array),
    Object(Object),
    Resource(ResourceRef),
    /// Name of a constant to be substituted on first read.
    ConstantRef(Arc<str>),
    /// Array literal whose marked keys name constants.
    ConstantArray(ConstantArray),
}

impl Value {
    /// Independent copy of this value.
    ///
    /// Owned storage (string buffer, array map, property map) is copied;
    /// array elements are shared with the source by reference count,
    /// and resource handles gain a reference.
    #[inline]
    pub fn duplicate(&self) -> Value {
        self.clone()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Resource(_) => "resource",
            Value::ConstantRef(_) => "constant",
            Value::ConstantArray(_) => "constant array",
        }
    }

    /// Truthiness as used by conditionals.
    ///
    /// Unresolved constant placeholders are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::ConstantRef(_) | Value::ConstantArray(_) => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !(s.is_empty() || s == "0"),
            Value::Array(array) => !array.is_empty(),
            Value::Object(object) => !object.properties.is_empty(),
            Value::Resource(resource) => resource.id() != 0,
        }
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Placeholder that still needs constant resolution.
    #[inline]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Value::ConstantRef(_) | Value::ConstantArray(_))
    }

    /// The array key this value selects, or `None` for illegal offsets.
    #[expect(clippy::cast_possible_truncation, reason = "float keys truncate toward zero")]
    pub fn to_key(&self) -> Option<ArrayKey> {
        match self {
            Value::Null => Some(ArrayKey::from("")),
            Value::Bool(b) => Some(ArrayKey::Int(i64::from(*b))),
            Value::Int(n) => Some(ArrayKey::Int(*n)),
            Value::Float(f) => Some(ArrayKey::Int(*f as i64)),
            Value::Str(s) => Some(ArrayKey::from(s.as_str())),
            Value::Resource(resource) => Some(ArrayKey::Int(resource.id())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }
}

/// String conversion.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Bool(false) => Ok(()),
            Value::Bool(true) => write!(f, "1"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(_) | Value::ConstantArray(_) => write!(f, "Array"),
            Value::Object(_) => write!(f, "Object"),
            Value::Resource(resource) => write!(f, "Resource id #{}", resource.id()),
            Value::ConstantRef(name) => write!(f, "{name}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}
