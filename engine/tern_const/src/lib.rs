//! Named constants for the Tern engine.
//!
//! The registry has two halves:
//!
//! - [`PersistentConstants`]: filled once at startup (builtins, module
//!   constants), then frozen behind an `Arc` and shared read-only by every
//!   worker thread.
//! - A per-request overlay inside each [`ConstantTable`], cleared by
//!   [`ConstantTable::sweep_non_persistent`] when the request ends.
//!
//! Case-insensitive constants are stored under their lowercased name;
//! lookups try the exact name first and fall back to the lowercased one.

mod builtins;
mod errors;
mod flags;
mod table;

pub use builtins::register_builtins;
pub use errors::ConstError;
pub use flags::ConstFlags;
pub use table::{Constant, ConstantTable, ModuleId, PersistentConstants, CORE_MODULE};
