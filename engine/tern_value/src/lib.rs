//! Runtime value model for the Tern engine.
//!
//! # Ownership
//!
//! A script variable holds a [`Slot`]: a reference-counted handle to one
//! value identity. Assigning a variable to another clones the handle
//! (the identity is now shared); nothing is copied until someone writes.
//!
//! - Reads go through [`Slot::read`].
//! - Writes go through [`Slot::ensure_exclusive`], which takes `&mut self`
//!   and separates a shared identity into a private copy first
//!   (copy-on-write). A handle that is shared cannot be written through
//!   any other path.
//! - Slots flagged as references (`is_ref`) are deliberate aliases: writes
//!   through them are seen by every holder.
//!
//! Dropping the last handle releases the value, recursively releasing
//! array elements and resource references.
//!
//! # Deferred constants
//!
//! Compiled values may still contain [`Value::ConstantRef`] and
//! [`Value::ConstantArray`] placeholders. [`Slot::resolve`] rewrites them
//! in place using a [`ConstantLookup`], so each placeholder is looked up
//! once.

mod array;
mod constant;
mod errors;
mod resource;
mod slot;
mod value;

pub use array::{Array, ArrayKey};
pub use constant::{ConstantArray, ConstantLookup, ResolveContext, UndefinedConstantPolicy};
pub use errors::ValueError;
pub use resource::{ResourceId, ResourceList, ResourceRef, ResourceTable};
pub use slot::Slot;
pub use value::{Object, Value};
