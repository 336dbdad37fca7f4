//! Call error types.

use thiserror::Error;

use tern_alloc::AllocError;
use tern_const::ConstError;
use tern_timeout::TimedOut;
use tern_value::ValueError;

/// Conditions that end the whole request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestFatal {
    #[error(transparent)]
    Timeout(#[from] TimedOut),

    /// The memory ceiling was crossed.
    #[error(transparent)]
    MemoryExhausted(AllocError),

    /// Raised by script code or a native function.
    #[error("{message}")]
    User { message: String },
}

/// Why a call did not return a value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("Call to undefined function {name}()")]
    UndefinedFunction { name: String },

    #[error("Call to undefined method {class}::{name}()")]
    UndefinedMethod { class: String, name: String },

    #[error("Class '{name}' not found")]
    UndefinedClass { name: String },

    #[error("Invalid callback of type {type_name}")]
    InvalidCallable { type_name: &'static str },

    #[error("Cannot redeclare {name}()")]
    Redeclared { name: String },

    #[error("Missing argument {position} for {function}()")]
    MissingArgument { function: String, position: usize },

    /// A forced-reference parameter received a shared non-reference value.
    #[error("Parameter {position} to {function}() expected to be a reference, value given")]
    Marshal { function: String, position: usize },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Const(#[from] ConstError),

    /// Allocation failures other than the memory ceiling.
    #[error(transparent)]
    Alloc(AllocError),

    #[error(transparent)]
    Fatal(#[from] RequestFatal),
}

impl CallError {
    /// A script-raised fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        CallError::Fatal(RequestFatal::User {
            message: message.into(),
        })
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, CallError::Fatal(_))
    }

    pub fn as_fatal(&self) -> Option<&RequestFatal> {
        match self {
            CallError::Fatal(fatal) => Some(fatal),
            _ => None,
        }
    }
}

impl From<AllocError> for CallError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::LimitExceeded { .. } => CallError::Fatal(RequestFatal::MemoryExhausted(err)),
            other => CallError::Alloc(other),
        }
    }
}

impl From<TimedOut> for CallError {
    fn from(err: TimedOut) -> Self {
        CallError::Fatal(RequestFatal::Timeout(err))
    }
}

impl From<tern_alloc::BlockError> for CallError {
    fn from(err: tern_alloc::BlockError) -> Self {
        CallError::Alloc(AllocError::Block(err))
    }
}
