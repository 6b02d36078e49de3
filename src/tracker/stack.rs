//! LIFO of suspended contexts.
//!
//! The active context is a distinguished mutable slot, not the stack's top:
//! entering a new context pushes the current active onto the stack and
//! replaces the slot. Popping with an empty stack resets the slot to a
//! fresh global context; the previous one is discarded, not reused.

use crate::context::{Context, ContextHandle};

pub(crate) struct ContextStack {
    active: ContextHandle,
    suspended: Vec<ContextHandle>,
}

impl ContextStack {
    pub(crate) fn new() -> Self {
        Self {
            active: Context::global_handle(),
            suspended: Vec::new(),
        }
    }

    pub(crate) fn active(&self) -> &ContextHandle {
        &self.active
    }

    pub(crate) fn depth(&self) -> usize {
        self.suspended.len()
    }

    pub(crate) fn push(&mut self, ctx: ContextHandle) {
        let previous = std::mem::replace(&mut self.active, ctx);
        self.suspended.push(previous);
    }

    pub(crate) fn pop(&mut self) {
        self.active = self
            .suspended
            .pop()
            .unwrap_or_else(Context::global_handle);
    }

    /// Active context first, then suspended frames from newest to oldest.
    pub(crate) fn all_frames(&self) -> Vec<ContextHandle> {
        let mut frames = Vec::with_capacity(self.suspended.len() + 1);
        frames.push(self.active.clone());
        frames.extend(self.suspended.iter().rev().cloned());
        frames
    }
}
