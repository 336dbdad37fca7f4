//! Call invocation protocol for the Tern engine.
//!
//! Every call site, whether the opcode loop or a native function calling
//! back into script code, goes through [`ExecContext::invoke`]:
//!
//! 1. **Resolve**: a callable is a function name, or a two-element array
//!    `[object_or_class_name, method_name]`. Names are case-insensitive.
//! 2. **Marshal**: each argument is passed per its parameter's
//!    [`RefMode`]: as an independent value, as a forced reference, or as
//!    a reference only when the caller already holds one.
//! 3. **Dispatch**: an activation record ([`Frame`]) is pushed. Interpreted
//!    functions get a locals table with parameters and `this` bound, then
//!    run their [`OpArray`]; native functions run directly.
//! 4. **Unwind**: the frame is popped by a guard, its locals table is
//!    cleared into a reuse cache and its arena block released.
//!
//! Local failures (unknown function, missing argument, refused reference)
//! are returned as [`CallError`] values. Request-fatal conditions
//! ([`RequestFatal`]: timeout, memory ceiling, script fatal) travel in
//! [`CallError::Fatal`] through every open frame back to the host.

mod context;
mod errors;
mod frame;
mod function;
mod guard;
mod invoke;

pub use context::{ExecContext, ExecContextBuilder, Finished};
pub use errors::{CallError, RequestFatal};
pub use frame::{Args, Frame, Locals, LocalsCache, ARG_RECORD_BYTES, FRAME_RECORD_BYTES, LOCALS_CACHE_SIZE};
pub use function::{
    ClassEntry, ClassTable, Function, FunctionKind, FunctionTable, NativeFn, OpArray, Param,
    RefMode, Registry,
};
pub use guard::FrameGuard;
pub use invoke::InvokeOptions;

/// Name reported for code running outside any function.
pub const MAIN_FUNCTION_NAME: &str = "main";

/// Local that binds the receiver inside a method.
pub const THIS: &str = "this";
