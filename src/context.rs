//! Per-operation observer environment.
//!
//! A [`Context`] snapshots "which listeners observe this asynchronous
//! operation": the install-ordered listener sequence, one storage slot per
//! attached listener, the owning provider, and aggregate filter masks.
//! Contexts are produced by the create phase of the lifecycle protocol,
//! never constructed by user code; native resource constructors obtain an
//! empty handle from [`Context::handle`] and pass it to the create phase.
//!
//! The slot map is deliberately sparse. A key that is absent means the
//! listener is not attached to this context; a key present with
//! `Value::Null` means attached with no data. Collapsing those two states
//! would break attachment tracking.

use crate::listener::{CallbackFlags, Listener, ListenerId};
use crate::provider::{Provider, ProviderMask};
use core::fmt;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared handle to a context.
///
/// The context stack and the native resource that owns the operation both
/// hold handles; all access is single-threaded.
pub type ContextHandle = Rc<RefCell<Context>>;

/// Teardown hook fired when detaching empties a context's listener
/// sequence, letting the owning resource release its attachment.
pub type TeardownFn = Rc<dyn Fn()>;

pub(crate) enum DetachOutcome {
    NotAttached,
    Removed,
    Emptied,
}

/// One asynchronous operation's observer environment.
pub struct Context {
    listeners: Vec<Rc<Listener>>,
    slots: BTreeMap<ListenerId, Value>,
    provider: Provider,
    watched_aggregate: ProviderMask,
    callback_flag_aggregate: CallbackFlags,
    on_empty: Option<TeardownFn>,
}

impl Context {
    /// Creates an empty context handle for a freshly constructed resource.
    ///
    /// The handle stays inert (every lifecycle phase short-circuits on it)
    /// until the create phase snapshots the active listener queue onto it.
    #[must_use]
    pub fn handle() -> ContextHandle {
        Rc::new(RefCell::new(Self::empty()))
    }

    /// A fresh global context: empty queue, provider `None`, zero
    /// aggregates.
    pub(crate) fn global_handle() -> ContextHandle {
        Rc::new(RefCell::new(Self::empty()))
    }

    fn empty() -> Self {
        Self {
            listeners: Vec::new(),
            slots: BTreeMap::new(),
            provider: Provider::None,
            watched_aggregate: ProviderMask::EMPTY,
            callback_flag_aggregate: CallbackFlags::EMPTY,
            on_empty: None,
        }
    }

    /// Returns the provider category that created this context.
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Returns the OR of all attached listeners' watch masks.
    #[must_use]
    pub const fn watched_aggregate(&self) -> ProviderMask {
        self.watched_aggregate
    }

    /// Returns the OR of all attached listeners' callback flags.
    #[must_use]
    pub const fn callback_flags(&self) -> CallbackFlags {
        self.callback_flag_aggregate
    }

    /// Returns the number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if a listener with the given id is attached.
    #[must_use]
    pub fn is_attached(&self, id: ListenerId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Returns a copy of the storage slot for the given listener, or `None`
    /// if the listener is not attached. An attached listener with no data
    /// yields `Some(Value::Null)`.
    #[must_use]
    pub fn slot_value(&self, id: ListenerId) -> Option<Value> {
        self.slots.get(&id).cloned()
    }

    /// Installs the teardown hook fired when detaching empties the
    /// listener sequence.
    pub fn set_on_empty(&mut self, hook: TeardownFn) {
        self.on_empty = Some(hook);
    }

    pub(crate) fn listeners_snapshot(&self) -> Vec<Rc<Listener>> {
        self.listeners.clone()
    }

    pub(crate) fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
    }

    pub(crate) fn set_callback_flags(&mut self, flags: CallbackFlags) {
        self.callback_flag_aggregate = flags;
    }

    pub(crate) fn set_slot(&mut self, id: ListenerId, value: Value) {
        self.slots.insert(id, value);
    }

    /// Appends a listener during the create phase. The storage slot is
    /// assigned separately once the create callback has decided its value.
    pub(crate) fn adopt(&mut self, listener: &Rc<Listener>) {
        self.listeners.push(Rc::clone(listener));
        self.watched_aggregate |= listener.watch_mask();
    }

    /// Attaches a listener directly, seeding its slot with the initial
    /// datum. No-op if the listener is already attached.
    pub(crate) fn attach(&mut self, listener: &Rc<Listener>) -> bool {
        if self.slots.contains_key(&listener.id()) {
            return false;
        }
        self.listeners.push(Rc::clone(listener));
        self.slots
            .insert(listener.id(), listener.initial_data().clone());
        self.callback_flag_aggregate |= listener.callback_flags();
        self.watched_aggregate |= listener.watch_mask();
        true
    }

    /// Removes the first occurrence of the listener and recomputes the
    /// aggregates by OR-folding the survivors.
    pub(crate) fn detach(&mut self, id: ListenerId) -> DetachOutcome {
        if self.slots.remove(&id).is_none() {
            return DetachOutcome::NotAttached;
        }
        if let Some(pos) = self.listeners.iter().position(|l| l.id() == id) {
            self.listeners.remove(pos);
        }
        self.watched_aggregate = ProviderMask::EMPTY;
        self.callback_flag_aggregate = CallbackFlags::EMPTY;
        for listener in &self.listeners {
            self.watched_aggregate |= listener.watch_mask();
            self.callback_flag_aggregate |= listener.callback_flags();
        }
        if self.listeners.is_empty() {
            DetachOutcome::Emptied
        } else {
            DetachOutcome::Removed
        }
    }

    pub(crate) fn teardown_hook(&self) -> Option<TeardownFn> {
        self.on_empty.clone()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("provider", &self.provider)
            .field("listeners", &self.listeners.len())
            .field("watched", &self.watched_aggregate)
            .field("flags", &self.callback_flag_aggregate)
            .finish()
    }
}
