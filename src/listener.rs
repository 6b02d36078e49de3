//! Listener records: installed observers of asynchronous operations.
//!
//! A listener bundles up to four callbacks (create, before, after, error),
//! an opaque initial datum, and a watch mask naming the provider categories
//! it observes. Records are immutable after construction and identified by a
//! process-wide monotonic id.

use crate::context::ContextHandle;
use crate::error::Fault;
use crate::provider::ProviderMask;
use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback invoked when a new asynchronous operation is created.
///
/// Receives the listener's initial datum and the provider name. Returning
/// `Ok(Some(value))` overrides the per-operation storage slot; `Ok(None)`
/// keeps the initial datum.
pub type CreateFn = Rc<dyn Fn(&Value, &'static str) -> Result<Option<Value>, Fault>>;

/// Callback invoked before or after an operation dispatches its user
/// callback. Receives the operation's context and the listener's storage
/// slot for that context.
pub type PhaseFn = Rc<dyn Fn(&ContextHandle, &Value) -> Result<(), Fault>>;

/// Callback invoked when a user callback raises a fault. Returning
/// `Ok(true)` marks the fault handled.
pub type ErrorFn = Rc<dyn Fn(&ContextHandle, &Value, &Fault) -> Result<bool, Fault>>;

/// A unique identifier for a listener record.
///
/// Ids are positive, assigned monotonically, and stable for the life of the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener id.
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The set of callbacks a listener provides, as a 4-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallbackFlags(u8);

impl CallbackFlags {
    /// No callbacks.
    pub const EMPTY: Self = Self(0);
    /// The create callback is present.
    pub const CREATE: Self = Self(1 << 0);
    /// The before callback is present.
    pub const BEFORE: Self = Self(1 << 1);
    /// The after callback is present.
    pub const AFTER: Self = Self(1 << 2);
    /// The error callback is present.
    pub const ERROR: Self = Self(1 << 3);

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for CallbackFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CallbackFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The up-to-four callbacks of a listener, assembled builder-style.
///
/// Any subset may be present; an empty set is a valid (if inert) listener.
#[derive(Clone, Default)]
pub struct CallbackSet {
    create: Option<CreateFn>,
    before: Option<PhaseFn>,
    after: Option<PhaseFn>,
    error: Option<ErrorFn>,
}

impl CallbackSet {
    /// Creates an empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the create callback.
    #[must_use]
    pub fn with_create(
        mut self,
        f: impl Fn(&Value, &'static str) -> Result<Option<Value>, Fault> + 'static,
    ) -> Self {
        self.create = Some(Rc::new(f));
        self
    }

    /// Sets the before callback.
    #[must_use]
    pub fn with_before(
        mut self,
        f: impl Fn(&ContextHandle, &Value) -> Result<(), Fault> + 'static,
    ) -> Self {
        self.before = Some(Rc::new(f));
        self
    }

    /// Sets the after callback.
    #[must_use]
    pub fn with_after(
        mut self,
        f: impl Fn(&ContextHandle, &Value) -> Result<(), Fault> + 'static,
    ) -> Self {
        self.after = Some(Rc::new(f));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn with_error(
        mut self,
        f: impl Fn(&ContextHandle, &Value, &Fault) -> Result<bool, Fault> + 'static,
    ) -> Self {
        self.error = Some(Rc::new(f));
        self
    }

    /// Derives the flag mask from the callbacks that are present.
    #[must_use]
    pub fn flags(&self) -> CallbackFlags {
        let mut flags = CallbackFlags::EMPTY;
        if self.create.is_some() {
            flags |= CallbackFlags::CREATE;
        }
        if self.before.is_some() {
            flags |= CallbackFlags::BEFORE;
        }
        if self.after.is_some() {
            flags |= CallbackFlags::AFTER;
        }
        if self.error.is_some() {
            flags |= CallbackFlags::ERROR;
        }
        flags
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("create", &self.create.is_some())
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// An installed observer of asynchronous operations.
///
/// Immutable after construction. The `initial_data` datum seeds each
/// per-context storage slot unless a create callback overrides it.
pub struct Listener {
    id: ListenerId,
    callbacks: CallbackSet,
    callback_flags: CallbackFlags,
    initial_data: Value,
    watch_mask: ProviderMask,
}

impl Listener {
    pub(crate) fn register(
        callbacks: CallbackSet,
        initial_data: Option<Value>,
        watch_mask: Option<ProviderMask>,
    ) -> Rc<Self> {
        let callback_flags = callbacks.flags();
        Rc::new(Self {
            id: ListenerId::next(),
            callbacks,
            callback_flags,
            initial_data: initial_data.unwrap_or(Value::Null),
            watch_mask: watch_mask.unwrap_or(ProviderMask::DEFAULT_WATCH),
        })
    }

    /// Returns the listener's stable id.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns the mask of callbacks this listener provides.
    #[must_use]
    pub const fn callback_flags(&self) -> CallbackFlags {
        self.callback_flags
    }

    /// Returns the initial storage datum.
    #[must_use]
    pub const fn initial_data(&self) -> &Value {
        &self.initial_data
    }

    /// Returns the provider categories this listener observes.
    #[must_use]
    pub const fn watch_mask(&self) -> ProviderMask {
        self.watch_mask
    }

    pub(crate) fn create(&self) -> Option<&CreateFn> {
        self.callbacks.create.as_ref()
    }

    pub(crate) fn before(&self) -> Option<&PhaseFn> {
        self.callbacks.before.as_ref()
    }

    pub(crate) fn after(&self) -> Option<&PhaseFn> {
        self.callbacks.after.as_ref()
    }

    pub(crate) fn error(&self) -> Option<&ErrorFn> {
        self.callbacks.error.as_ref()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("callbacks", &self.callbacks)
            .field("watch_mask", &self.watch_mask)
            .finish()
    }
}

/// Input to listener construction: either a fresh callback set or an
/// already-constructed record, which passes through unchanged.
#[derive(Clone)]
pub enum ListenerSpec {
    /// Construct a new record from these callbacks.
    Callbacks(CallbackSet),
    /// An existing record; returned as-is.
    Existing(Rc<Listener>),
}

impl From<CallbackSet> for ListenerSpec {
    fn from(callbacks: CallbackSet) -> Self {
        Self::Callbacks(callbacks)
    }
}

impl From<Rc<Listener>> for ListenerSpec {
    fn from(listener: Rc<Listener>) -> Self {
        Self::Existing(listener)
    }
}

impl From<&Rc<Listener>> for ListenerSpec {
    fn from(listener: &Rc<Listener>) -> Self {
        Self::Existing(Rc::clone(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_positive_and_monotonic() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert!(a.get() >= 1);
        assert!(b.get() > a.get());
        assert_eq!(format!("{a}"), format!("L{}", a.get()));
    }

    #[test]
    fn flags_derived_from_present_callbacks() {
        let set = CallbackSet::new()
            .with_before(|_, _| Ok(()))
            .with_error(|_, _, _| Ok(false));
        let flags = set.flags();
        assert!(flags.contains(CallbackFlags::BEFORE));
        assert!(flags.contains(CallbackFlags::ERROR));
        assert!(!flags.contains(CallbackFlags::CREATE));
        assert!(!flags.contains(CallbackFlags::AFTER));
        assert_eq!(flags.bits(), 0b1010);
    }

    #[test]
    fn empty_set_has_empty_flags() {
        assert!(CallbackSet::new().flags().is_empty());
    }

    #[test]
    fn register_defaults() {
        let listener = Listener::register(CallbackSet::new(), None, None);
        assert_eq!(listener.initial_data(), &Value::Null);
        assert_eq!(listener.watch_mask(), ProviderMask::DEFAULT_WATCH);
        assert!(listener.callback_flags().is_empty());
    }

    #[test]
    fn register_honors_explicit_fields() {
        let listener = Listener::register(
            CallbackSet::new().with_create(|_, _| Ok(None)),
            Some(Value::from(7)),
            Some(ProviderMask::new(0x400)),
        );
        assert_eq!(listener.initial_data(), &Value::from(7));
        assert_eq!(listener.watch_mask().bits(), 0x400);
        assert!(listener.callback_flags().contains(CallbackFlags::CREATE));
    }

    #[test]
    fn callback_flags_union() {
        let mut flags = CallbackFlags::CREATE;
        flags |= CallbackFlags::AFTER;
        assert_eq!(flags, CallbackFlags::CREATE | CallbackFlags::AFTER);
        assert!(flags.contains(CallbackFlags::CREATE));
        assert!(!flags.contains(CallbackFlags::ERROR));
    }

    #[test]
    fn callback_set_debug_reports_presence() {
        let set = CallbackSet::new().with_after(|_, _| Ok(()));
        let dbg = format!("{set:?}");
        assert!(dbg.contains("after: true"), "{dbg}");
        assert!(dbg.contains("create: false"), "{dbg}");
    }
}
