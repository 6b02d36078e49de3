//! Lifecycle protocol entry points.
//!
//! Native resource constructors call [`run_async_queue`] when a resource is
//! instantiated, then bracket the resource's user callback with
//! [`load_async_queue`] and [`unload_async_queue`]. A fault raised by the
//! user callback detours through [`error_handler`] before the unload would
//! otherwise run.
//!
//! Re-entrancy guards: `in_async_tick` is set while create/before/after
//! user code runs, `in_error_tick` while error user code runs. Both are
//! plain booleans, not counters; a nested phase's exit clears the flag even
//! while an outer phase is still iterating. A fault unwinding out of a
//! guarded loop leaves the flag set.

use super::TRACKER;
use crate::config::EmptyCreatePolicy;
use crate::context::ContextHandle;
use crate::error::Fault;
use crate::listener::{CallbackFlags, Listener};
use crate::provider::Provider;
use crate::tracing_compat::{debug, error, trace, warn};
use serde_json::Value;
use std::rc::Rc;

fn slot_of(ctx: &ContextHandle, listener: &Rc<Listener>) -> Value {
    ctx.borrow()
        .slot_value(listener.id())
        .unwrap_or(Value::Null)
}

/// CREATE phase: snapshots the active context's listener queue onto
/// `new_ctx`, invoking each listener's create callback to seed its
/// per-operation storage slot.
///
/// The caller is expected to have consulted the status word; entering with
/// an empty active queue is a collaborator bug and panics under the
/// default [`EmptyCreatePolicy`].
///
/// # Panics
///
/// Panics when the active context has no listeners and the installed
/// policy is [`EmptyCreatePolicy::Abort`].
pub fn run_async_queue(new_ctx: &ContextHandle, provider: Provider) -> Result<(), Fault> {
    let prep = TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        let active = tracker.active();
        let (listeners, parent_flags) = {
            let active = active.borrow();
            (active.listeners_snapshot(), active.callback_flags())
        };
        if listeners.is_empty() {
            match tracker.config.empty_create {
                EmptyCreatePolicy::Abort => panic!(
                    "run_async_queue invoked with no active listeners; \
                     callers must consult the status word first"
                ),
                EmptyCreatePolicy::Ignore => {
                    warn!("create phase entered with an empty active queue; ignoring");
                    return None;
                }
            }
        }
        tracker.in_async_tick = true;
        Some((listeners, parent_flags))
    });
    let Some((listeners, parent_flags)) = prep else {
        return Ok(());
    };

    debug!(
        "create: snapshotting {} listener(s) onto {} context",
        listeners.len(),
        provider.name()
    );
    new_ctx.borrow_mut().set_provider(provider);

    for listener in &listeners {
        new_ctx.borrow_mut().adopt(listener);
        // A fault from the create callback unwinds here with the guard
        // still set.
        let stored = match listener.create().cloned() {
            Some(create) if listener.watch_mask().contains(provider) => {
                (*create)(listener.initial_data(), provider.name())?
            }
            _ => None,
        };
        let value = stored.unwrap_or_else(|| listener.initial_data().clone());
        new_ctx.borrow_mut().set_slot(listener.id(), value);
    }

    // The flag aggregate is carried over from the parent wholesale rather
    // than recomputed: a listener that provides only an error callback
    // must keep propagating even when the provider filter kept its create
    // callback from running.
    new_ctx.borrow_mut().set_callback_flags(parent_flags);

    TRACKER.with(|cell| cell.borrow_mut().in_async_tick = false);
    Ok(())
}

/// BEFORE phase: pushes the context and fires matching before callbacks in
/// install order.
///
/// A context with no listeners is skipped without touching the stack;
/// external callers such as timer wraps cannot always suppress the call.
pub fn load_async_queue(ctx: &ContextHandle) -> Result<(), Fault> {
    let fire = TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        let (provider, watched, flags, listeners) = {
            let c = ctx.borrow();
            if c.listener_count() == 0 {
                return None;
            }
            (
                c.provider(),
                c.watched_aggregate(),
                c.callback_flags(),
                c.listeners_snapshot(),
            )
        };
        tracker.push(ctx.clone());
        trace!("load: entered {} context", provider.name());
        if !watched.contains(provider) || !flags.contains(CallbackFlags::BEFORE) {
            return None;
        }
        tracker.in_async_tick = true;
        Some((provider, listeners))
    });
    let Some((provider, listeners)) = fire else {
        return Ok(());
    };

    for listener in &listeners {
        if !listener.watch_mask().contains(provider)
            || !listener.callback_flags().contains(CallbackFlags::BEFORE)
        {
            continue;
        }
        let Some(before) = listener.before().cloned() else {
            continue;
        };
        let value = slot_of(ctx, listener);
        (*before)(ctx, &value)?;
    }

    TRACKER.with(|cell| cell.borrow_mut().in_async_tick = false);
    Ok(())
}

/// AFTER phase: fires matching after callbacks in install order, then pops
/// the context. The pop happens even when no callback fires.
pub fn unload_async_queue(ctx: &ContextHandle) -> Result<(), Fault> {
    let fire = TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        let (provider, watched, flags, listeners) = {
            let c = ctx.borrow();
            (
                c.provider(),
                c.watched_aggregate(),
                c.callback_flags(),
                c.listeners_snapshot(),
            )
        };
        if !watched.contains(provider) || !flags.contains(CallbackFlags::AFTER) {
            tracker.pop();
            trace!("unload: left {} context (no after callbacks)", provider.name());
            return None;
        }
        tracker.in_async_tick = true;
        Some((provider, listeners))
    });
    let Some((provider, listeners)) = fire else {
        return Ok(());
    };

    for listener in &listeners {
        if !listener.watch_mask().contains(provider)
            || !listener.callback_flags().contains(CallbackFlags::AFTER)
        {
            continue;
        }
        let Some(after) = listener.after().cloned() else {
            continue;
        };
        let value = slot_of(ctx, listener);
        // A fault here unwinds with the guard set and the context still
        // loaded.
        (*after)(ctx, &value)?;
    }

    TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        tracker.pop();
        tracker.in_async_tick = false;
    });
    trace!("unload: left {} context", provider.name());
    Ok(())
}

/// ERROR hook: offers the fault to every error listener of the active
/// context, in install order and with no provider filter.
///
/// Returns true only if some listener claimed the fault and the failure
/// did not originate inside a create/before/after callback; suppressing a
/// fault raised while nested would poison the outer frame. Every
/// processing path, a forced exit included, clears the guard and pops the
/// context; after callbacks do not fire for a handled fault.
pub fn error_handler(fault: &Fault) -> bool {
    let prep = TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        if tracker.in_error_tick {
            return None;
        }
        let active = tracker.active();
        let (flags, listeners) = {
            let a = active.borrow();
            (a.callback_flags(), a.listeners_snapshot())
        };
        if !flags.contains(CallbackFlags::ERROR) {
            return None;
        }
        tracker.in_error_tick = true;
        Some((active, listeners))
    });
    let Some((active, listeners)) = prep else {
        return false;
    };

    debug!("error: offering fault to error listeners: {fault}");
    let mut handled = false;
    let mut exit_forced = false;
    for listener in &listeners {
        let Some(error_cb) = listener.error().cloned() else {
            continue;
        };
        let value = slot_of(&active, listener);
        match (*error_cb)(&active, &value, fault) {
            Ok(claimed) => handled = claimed || handled,
            Err(_) => {
                // An error callback that itself fails is unrecoverable:
                // flag the exit, notify, and skip the remaining listeners.
                error!("error listener {} failed; forcing exit", listener.id());
                exit_forced = true;
                break;
            }
        }
    }

    if exit_forced {
        let hook = TRACKER.with(|cell| {
            let mut tracker = cell.borrow_mut();
            tracker.begin_exit();
            tracker.config.exit_hook()
        });
        if let Some(hook) = hook {
            hook(1);
        }
    }

    // Cleanup runs on every path out of the loop, forced exit included:
    // the exit hook only flags termination, and the tracker must stay
    // coherent for whatever still runs before the embedder honors it.
    TRACKER.with(|cell| {
        let mut tracker = cell.borrow_mut();
        tracker.in_error_tick = false;
        tracker.pop();
        !exit_forced && handled && !tracker.in_async_tick
    })
}
