//! The context-propagation state machine.
//!
//! This module owns the mutable tracker state: the active context, the LIFO
//! of suspended contexts, the shared status word, and the two re-entrancy
//! guards. The lifecycle entry points invoked by native collaborators live
//! in [`lifecycle`] and are re-exported here.
//!
//! All state is thread-local; the runtime is single-threaded cooperative
//! and the tracker is installed explicitly at startup via [`install`].

mod lifecycle;
mod stack;
mod status;

pub use lifecycle::{error_handler, load_async_queue, run_async_queue, unload_async_queue};
pub use status::{StatusWord, SLOT_PROVIDER, SLOT_QUEUE_LENGTH, SLOT_WATCHED};

use crate::config::TrackerConfig;
use crate::context::{ContextHandle, DetachOutcome};
use crate::listener::{CallbackSet, Listener, ListenerSpec};
use crate::provider::ProviderMask;
use crate::tracing_compat::debug;
use serde_json::Value;
use stack::ContextStack;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) struct TrackerState {
    stack: ContextStack,
    status: Arc<StatusWord>,
    pub(crate) in_async_tick: bool,
    pub(crate) in_error_tick: bool,
    exiting: bool,
    pub(crate) config: TrackerConfig,
}

impl TrackerState {
    fn new(config: TrackerConfig) -> Self {
        Self {
            stack: ContextStack::new(),
            status: Arc::new(StatusWord::new()),
            in_async_tick: false,
            in_error_tick: false,
            exiting: false,
            config,
        }
    }

    pub(crate) fn active(&self) -> ContextHandle {
        self.stack.active().clone()
    }

    pub(crate) fn push(&mut self, ctx: ContextHandle) {
        self.stack.push(ctx);
        self.mirror_active();
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
        self.mirror_active();
    }

    pub(crate) fn begin_exit(&mut self) {
        self.exiting = true;
    }

    /// Rewrites the status word from the active context. Invariant: the
    /// word reflects the active context after every mutation.
    pub(crate) fn mirror_active(&self) {
        let active = self.stack.active().borrow();
        self.status.store(
            active.provider().bits(),
            active.listener_count() as u32,
            active.watched_aggregate().bits(),
        );
    }
}

thread_local! {
    pub(crate) static TRACKER: RefCell<TrackerState> =
        RefCell::new(TrackerState::new(TrackerConfig::default()));
}

/// Installs the tracker with the given configuration, discarding any
/// previous state. Call once at startup, before any listener or context
/// exists.
pub fn install(config: TrackerConfig) {
    TRACKER.with(|cell| *cell.borrow_mut() = TrackerState::new(config));
}

/// Constructs a listener record, or passes an existing record through
/// unchanged (in which case `initial_data` and `watch_mask` are ignored).
///
/// `initial_data` defaults to `Value::Null`; `watch_mask` defaults to
/// [`ProviderMask::DEFAULT_WATCH`].
pub fn create_listener(
    spec: impl Into<ListenerSpec>,
    initial_data: Option<Value>,
    watch_mask: Option<ProviderMask>,
) -> Rc<Listener> {
    match spec.into() {
        ListenerSpec::Existing(listener) => listener,
        ListenerSpec::Callbacks(callbacks) => {
            Listener::register(callbacks, initial_data, watch_mask)
        }
    }
}

/// Constructs (or passes through) a listener record and attaches it to the
/// active context. Attaching an already-attached listener is a no-op.
pub fn add_listener(
    spec: impl Into<ListenerSpec>,
    initial_data: Option<Value>,
    watch_mask: Option<ProviderMask>,
) -> Rc<Listener> {
    let listener = create_listener(spec, initial_data, watch_mask);
    TRACKER.with(|cell| {
        let tracker = cell.borrow_mut();
        let attached = tracker.active().borrow_mut().attach(&listener);
        if attached {
            debug!("listener {} attached to active context", listener.id());
            tracker.mirror_active();
        }
    });
    listener
}

/// Convenience: attaches a fresh callback set with default data and mask.
pub fn add_callbacks(callbacks: CallbackSet) -> Rc<Listener> {
    add_listener(callbacks, None, None)
}

/// Detaches the listener from the active context and from every context
/// suspended on the stack. Contexts emptied by the removal fire their
/// teardown hook.
pub fn remove_listener(listener: &Rc<Listener>) {
    let hooks = TRACKER.with(|cell| {
        let tracker = cell.borrow_mut();
        let mut hooks = Vec::new();
        for frame in tracker.stack.all_frames() {
            let mut ctx = frame.borrow_mut();
            if let DetachOutcome::Emptied = ctx.detach(listener.id()) {
                if let Some(hook) = ctx.teardown_hook() {
                    hooks.push(hook);
                }
            }
        }
        debug!("listener {} detached", listener.id());
        tracker.mirror_active();
        hooks
    });
    // Teardown hooks are external-collaborator code; run them with no
    // tracker borrow held so they may re-enter the API.
    for hook in hooks {
        hook();
    }
}

/// Pops the active context if it is exactly `ctx`, without firing any
/// callbacks. Wrap-layer callers use this to restore stack symmetry when
/// the error hook declines a fault without unwinding.
pub(crate) fn pop_if_active(ctx: &ContextHandle) -> bool {
    TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        if Rc::ptr_eq(&tracker.active(), ctx) {
            tracker.pop();
            true
        } else {
            false
        }
    })
}

/// Returns a handle to the shared status word.
#[must_use]
pub fn status_word() -> Arc<StatusWord> {
    TRACKER.with(|cell| Arc::clone(&cell.borrow().status))
}

/// Returns the current active context.
#[must_use]
pub fn active_context() -> ContextHandle {
    TRACKER.with(|cell| cell.borrow().active())
}

/// Returns the number of suspended contexts.
#[must_use]
pub fn stack_depth() -> usize {
    TRACKER.with(|cell| cell.borrow().stack.depth())
}

/// Returns true while a create/before/after callback is executing.
#[must_use]
pub fn in_async_tick() -> bool {
    TRACKER.with(|cell| cell.borrow().in_async_tick)
}

/// Returns true while an error callback is executing.
#[must_use]
pub fn in_error_tick() -> bool {
    TRACKER.with(|cell| cell.borrow().in_error_tick)
}

/// Returns true once a failing error callback has forced process
/// termination.
#[must_use]
pub fn exit_in_progress() -> bool {
    TRACKER.with(|cell| cell.borrow().exiting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::rc::Rc;

    #[test]
    fn create_listener_is_idempotent_on_records() {
        let listener = create_listener(CallbackSet::new(), None, None);
        let again = create_listener(&listener, Some(Value::from(9)), None);
        assert!(Rc::ptr_eq(&listener, &again));
        // Pass-through ignores the new initial data.
        assert_eq!(again.initial_data(), &Value::Null);
    }

    #[test]
    fn add_listener_updates_active_and_status_word() {
        install(TrackerConfig::default());
        let status = status_word();
        assert_eq!(status.snapshot(), [0, 0, 0]);

        let listener = add_listener(
            CallbackSet::new().with_before(|_, _| Ok(())),
            None,
            Some(ProviderMask::from(Provider::Tcp)),
        );
        assert!(active_context().borrow().is_attached(listener.id()));
        assert_eq!(status.queue_length(), 1);
        assert_eq!(status.watched_bits(), Provider::Tcp.bits());

        // Re-adding the same record does not grow the queue.
        add_listener(&listener, None, None);
        assert_eq!(status.queue_length(), 1);
    }

    #[test]
    fn remove_listener_clears_active_and_status_word() {
        install(TrackerConfig::default());
        let listener = add_callbacks(CallbackSet::new().with_before(|_, _| Ok(())));
        assert_eq!(status_word().queue_length(), 1);

        remove_listener(&listener);
        assert!(!active_context().borrow().is_attached(listener.id()));
        assert_eq!(status_word().snapshot(), [0, 0, 0]);

        // Removing again is harmless.
        remove_listener(&listener);
        assert_eq!(status_word().queue_length(), 0);
    }

    #[test]
    fn install_discards_previous_state() {
        install(TrackerConfig::default());
        add_callbacks(CallbackSet::new());
        assert_eq!(status_word().queue_length(), 1);
        install(TrackerConfig::default());
        assert_eq!(status_word().queue_length(), 0);
        assert_eq!(stack_depth(), 0);
    }
}
