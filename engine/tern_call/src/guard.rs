//! RAII guard for activation records.
//!
//! [`FrameGuard`] pushes a [`Frame`] on creation and pops it on drop, so a
//! frame is unwound on every exit path: normal return, an error travelling
//! up through `?`, or a panic unwinding through the call.
//!
//! # Usage
//!
//! ```text
//! let mut guard = cx.enter_frame(frame);
//! let result = guard.run_body(&function);
//! let locals = guard.finish(); // frame popped, block released
//! ```

use std::ops::{Deref, DerefMut};

use crate::{ExecContext, Frame, Locals};

/// Holds the context with one extra frame on top.
///
/// Derefs to [`ExecContext`]. Dropping the guard without calling
/// [`finish`](FrameGuard::finish) still pops and releases the frame; the
/// locals table is discarded instead of recycled.
pub struct FrameGuard<'guard, 'cx> {
    cx: &'guard mut ExecContext<'cx>,
    finished: bool,
}

impl<'guard, 'cx> FrameGuard<'guard, 'cx> {
    pub(crate) fn enter(cx: &'guard mut ExecContext<'cx>, frame: Frame) -> Self {
        tracing::trace!(function = %frame.name(), depth = cx.frames.len() + 1, "enter frame");
        cx.frames.push(frame);
        FrameGuard {
            cx,
            finished: false,
        }
    }

    /// Pop the frame. Returns the locals table if it was supplied by the
    /// caller; an owned table goes back to the cache.
    pub fn finish(mut self) -> Option<Locals> {
        self.finished = true;
        let frame = self.cx.frames.pop()?;
        self.cx.release_frame(frame)
    }
}

impl Drop for FrameGuard<'_, '_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(mut frame) = self.cx.frames.pop() {
            frame.locals = None;
            self.cx.release_frame(frame);
        }
    }
}

impl<'cx> Deref for FrameGuard<'_, 'cx> {
    type Target = ExecContext<'cx>;

    fn deref(&self) -> &Self::Target {
        self.cx
    }
}

impl DerefMut for FrameGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cx
    }
}

impl<'cx> ExecContext<'cx> {
    pub(crate) fn enter_frame(&mut self, frame: Frame) -> FrameGuard<'_, 'cx> {
        FrameGuard::enter(self, frame)
    }

    fn release_frame(&mut self, frame: Frame) -> Option<Locals> {
        tracing::trace!(function = %frame.name(), depth = self.frames.len(), "leave frame");
        if let Some(block) = frame.block {
            if let Err(err) = self.arena.release(block) {
                tracing::error!(%err, function = %frame.name(), "activation record release failed");
            }
        }
        match frame.locals {
            Some(locals) if frame.borrowed_locals => Some(locals),
            Some(locals) => {
                self.locals_cache.put(locals);
                None
            }
            None => None,
        }
    }
}
