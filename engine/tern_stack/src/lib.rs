//! Stack growth guard for recursive runtime walks.
//!
//! Value duplication, constant-array resolution and nested call dispatch
//! all recurse on data the script controls (array nesting depth, call
//! depth). Wrapping the recursive step in [`ensure_sufficient_stack`]
//! keeps those walks from overflowing the native stack.
//!
//! - **Native targets**: `stacker` grows the stack on demand.
//! - **WASM targets**: the closure is called directly.

/// Remaining stack below which a new segment is allocated (128KB).
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment (2MB).
///
/// Interpreted calls keep a locals table and an argument vector per
/// frame, so segments are sized larger than a plain tree walk needs.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Run `f`, growing the stack first if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
