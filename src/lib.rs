//! Asynctap: an asynchronous execution-context tracker.
//!
//! # Overview
//!
//! Asynctap associates user-installed listener callbacks with logical
//! asynchronous operations, so the listeners observe the full lifecycle of
//! every callback descended from the point the listener was installed. It
//! answers "what logical operation is this callback part of?" across
//! arbitrary asynchronous chains: the primitive beneath distributed
//! tracing, request-scoped storage, domain-style error handling, and
//! performance attribution.
//!
//! # Core Model
//!
//! - **Listeners** bundle up to four callbacks (create, before, after,
//!   error), an opaque initial datum, and a watch mask of provider
//!   categories.
//! - **Contexts** snapshot the listener queue of the operation that was
//!   active when a resource was constructed, with one storage slot per
//!   attached listener.
//! - The **context stack** suspends contexts LIFO while nested callbacks
//!   run; a shared three-slot **status word** mirrors the active context so
//!   native collaborators can fast-path the "nobody is listening" case.
//! - The **lifecycle protocol** (`run_async_queue`, `load_async_queue`,
//!   `unload_async_queue`, `error_handler`) is the contract native resource
//!   constructors call into.
//! - The **scheduler** promotes user-space tick and timer callbacks into
//!   the same lifecycle.
//!
//! # Module Structure
//!
//! - [`provider`]: Provider categories and mask algebra
//! - [`listener`]: Listener records and callback sets
//! - [`context`]: Per-operation observer environments
//! - [`tracker`]: Context stack, status word, and the lifecycle protocol
//! - [`scheduler`]: Deterministic tick/timer scheduler with instrumentation
//! - [`config`]: Tracker configuration
//! - [`error`](mod@error): The fault type carried through the error hook
//! - [`tracing_compat`]: Optional tracing integration (requires the
//!   `tracing-integration` feature)
//!
//! # Concurrency
//!
//! The runtime is single-threaded cooperative. All tracker state is
//! thread-local; there is no internal locking and no suspension point
//! inside the core.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod context;
pub mod error;
pub mod listener;
pub mod provider;
pub mod scheduler;
pub mod tracing_compat;
pub mod tracker;

#[doc(hidden)]
pub mod test_utils;

pub use config::{EmptyCreatePolicy, TrackerConfig};
pub use context::{Context, ContextHandle, TeardownFn};
pub use error::Fault;
pub use listener::{CallbackFlags, CallbackSet, Listener, ListenerId, ListenerSpec};
pub use provider::{Provider, ProviderMask, ALL_PROVIDERS};
pub use scheduler::{Scheduler, Time, TimerKey};
pub use tracker::{
    add_callbacks, add_listener, create_listener, error_handler, install, load_async_queue,
    remove_listener, run_async_queue, status_word, unload_async_queue, StatusWord,
};
