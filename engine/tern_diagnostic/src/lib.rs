//! Runtime diagnostics for the Tern engine.
//!
//! The allocator, value model, constant registry and call protocol never
//! print anything themselves. They push [`Diagnostic`]s into a
//! [`DiagnosticQueue`] owned by the request, which mirrors each one to
//! `tracing` and keeps it for the embedder to inspect when the request
//! ends.
//!
//! # Severity
//!
//! - [`Severity::Notice`]: informational, execution continues
//! - [`Severity::Warning`]: something was wrong but recoverable
//! - [`Severity::Fatal`]: the request is being aborted
//!
//! [`ErrorLevel`] carries the classic numeric level bits so embedders can
//! filter with a reporting mask.

mod diagnostic;
mod level;
mod queue;

pub use diagnostic::{Diagnostic, Severity};
pub use level::ErrorLevel;
pub use queue::DiagnosticQueue;
