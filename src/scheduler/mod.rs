//! Deterministic user-space scheduler with lifecycle instrumentation.
//!
//! The scheduler owns a next-tick queue, an immediate queue, and a timer
//! wheel over virtual time; [`Scheduler::run_until_idle`] drains them in
//! that order, advancing time only when the next deadline is reached.
//!
//! An instrumented scheduler promotes every scheduled callback into the
//! lifecycle protocol: the callback is captured, a context is associated
//! with the operation, and dispatch brackets the callback with the before
//! and after phases. Timer-family operations carry the `TIMER` provider;
//! next-tick operations carry the `TICK` sentinel because their
//! originating category cannot be determined. In both cases the create
//! phase runs only when the status word reports a non-empty active queue.

mod timer;

pub use timer::{Time, TimerKey};

use crate::context::{Context, ContextHandle};
use crate::error::Fault;
use crate::provider::Provider;
use crate::tracing_compat::trace;
use crate::tracker;
use crate::tracker::StatusWord;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use timer::TimerWheel;

/// A scheduled user callback.
pub type TaskFn = Box<dyn FnMut() -> Result<(), Fault>>;

pub(crate) struct ScheduledTask {
    cb: TaskFn,
    ctx: Option<ContextHandle>,
}

impl ScheduledTask {
    pub(crate) fn plain(cb: TaskFn) -> Self {
        Self { cb, ctx: None }
    }

    fn with_context(cb: TaskFn, ctx: Option<ContextHandle>) -> Self {
        Self { cb, ctx }
    }
}

/// Single-threaded cooperative scheduler over virtual time.
pub struct Scheduler {
    next_ticks: VecDeque<ScheduledTask>,
    immediates: VecDeque<ScheduledTask>,
    timers: TimerWheel,
    now: Time,
    status: Option<Arc<StatusWord>>,
}

impl Scheduler {
    /// Creates a raw scheduler: callbacks run without lifecycle
    /// instrumentation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_ticks: VecDeque::new(),
            immediates: VecDeque::new(),
            timers: TimerWheel::new(),
            now: Time::ZERO,
            status: None,
        }
    }

    /// Creates a scheduler wired to the installed tracker. Call once at
    /// startup, after [`crate::tracker::install`].
    #[must_use]
    pub fn instrumented() -> Self {
        let mut scheduler = Self::new();
        scheduler.status = Some(tracker::status_word());
        scheduler
    }

    /// Returns the current virtual time.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.now
    }

    /// Returns true if any tick, immediate, or timer is pending.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.next_ticks.is_empty() || !self.immediates.is_empty() || !self.timers.is_empty()
    }

    /// Associates a context with a new operation when instrumentation is
    /// on and somebody is listening.
    fn instrument(&mut self, provider: Provider) -> Result<Option<ContextHandle>, Fault> {
        let Some(status) = &self.status else {
            return Ok(None);
        };
        if provider == Provider::Tick {
            // The tick has no resource handle of its own; skip entirely
            // when nothing watches the active context.
            if status.queue_length() == 0 {
                return Ok(None);
            }
            let ctx = Context::handle();
            tracker::run_async_queue(&ctx, Provider::Tick)?;
            return Ok(Some(ctx));
        }
        // Timer family: the handle exists regardless; the create phase
        // runs only when the active queue is non-empty, leaving an inert
        // context that the load phase skips.
        let ctx = Context::handle();
        if status.queue_length() > 0 {
            tracker::run_async_queue(&ctx, provider)?;
        }
        Ok(Some(ctx))
    }

    /// Schedules a callback on the next-tick queue.
    pub fn schedule_tick(
        &mut self,
        cb: impl FnMut() -> Result<(), Fault> + 'static,
    ) -> Result<(), Fault> {
        let ctx = self.instrument(Provider::Tick)?;
        self.next_ticks
            .push_back(ScheduledTask::with_context(Box::new(cb), ctx));
        Ok(())
    }

    /// Schedules a callback on the immediate queue.
    pub fn schedule_immediate(
        &mut self,
        cb: impl FnMut() -> Result<(), Fault> + 'static,
    ) -> Result<(), Fault> {
        let ctx = self.instrument(Provider::Timer)?;
        self.immediates
            .push_back(ScheduledTask::with_context(Box::new(cb), ctx));
        Ok(())
    }

    /// Schedules a one-shot callback `delay` from now.
    pub fn set_timeout(
        &mut self,
        cb: impl FnMut() -> Result<(), Fault> + 'static,
        delay: Duration,
    ) -> Result<TimerKey, Fault> {
        let ctx = self.instrument(Provider::Timer)?;
        let deadline = self.now.saturating_add(delay);
        Ok(self
            .timers
            .insert(ScheduledTask::with_context(Box::new(cb), ctx), deadline, None))
    }

    /// Schedules a repeating callback every `period` from now.
    pub fn set_interval(
        &mut self,
        cb: impl FnMut() -> Result<(), Fault> + 'static,
        period: Duration,
    ) -> Result<TimerKey, Fault> {
        let ctx = self.instrument(Provider::Timer)?;
        let deadline = self.now.saturating_add(period);
        Ok(self.timers.insert(
            ScheduledTask::with_context(Box::new(cb), ctx),
            deadline,
            Some(period),
        ))
    }

    /// Cancels a pending timeout or interval. Returns false if the timer
    /// already fired or was cancelled.
    pub fn clear_timer(&mut self, key: TimerKey) -> bool {
        self.timers.cancel(key)
    }

    /// Runs until every queue is empty. Repeating intervals keep the
    /// scheduler busy forever; bound those runs with [`Self::run_until`].
    pub fn run_until_idle(&mut self) -> Result<(), Fault> {
        self.run_inner(Time::from_nanos(u64::MAX))
    }

    /// Runs until idle or until the next timer deadline would pass
    /// `limit`, whichever comes first.
    pub fn run_until(&mut self, limit: Time) -> Result<(), Fault> {
        self.run_inner(limit)
    }

    fn run_inner(&mut self, limit: Time) -> Result<(), Fault> {
        loop {
            if let Some(mut task) = self.next_ticks.pop_front() {
                Self::run_task(&mut task)?;
                continue;
            }
            if let Some(mut task) = self.immediates.pop_front() {
                Self::run_task(&mut task)?;
                continue;
            }
            let Some(deadline) = self.timers.next_deadline() else {
                break;
            };
            if deadline > limit {
                break;
            }
            if deadline > self.now {
                trace!("advancing virtual time to {deadline}");
                self.now = deadline;
            }
            if let Some((key, mut task, period)) = self.timers.pop_due(self.now) {
                let result = Self::run_task(&mut task);
                if period.is_some() {
                    self.timers.requeue(key, task, self.now);
                }
                result?;
            }
        }
        Ok(())
    }

    /// Dispatches one task: load, user callback, unload. A fault detours
    /// through the error hook before the unload would run; an unhandled
    /// fault unwinds the frame the load pushed, then aborts the turn.
    fn run_task(task: &mut ScheduledTask) -> Result<(), Fault> {
        // Checked once for the pair: unload must not pop what load never
        // pushed.
        let ctx = task
            .ctx
            .clone()
            .filter(|ctx| ctx.borrow().listener_count() > 0);
        let outcome = match &ctx {
            Some(ctx) => Self::dispatch(task, ctx),
            None => (task.cb)(),
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(fault) => {
                if tracker::error_handler(&fault) {
                    return Ok(());
                }
                // Declined. A hook that never processed (no error
                // listener attached, or a guard rejected the fault) left
                // the frame active; it comes off here before the fault
                // travels. A hook that processed already popped.
                if let Some(ctx) = &ctx {
                    tracker::pop_if_active(ctx);
                }
                Err(fault)
            }
        }
    }

    fn dispatch(task: &mut ScheduledTask, ctx: &ContextHandle) -> Result<(), Fault> {
        tracker::load_async_queue(ctx)?;
        (task.cb)()?;
        tracker::unload_async_queue(ctx)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> Rc<RefCell<Vec<u32>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn ticks_run_before_immediates_and_timers() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();

        let s = Rc::clone(&seen);
        scheduler
            .set_timeout(
                move || {
                    s.borrow_mut().push(3);
                    Ok(())
                },
                Duration::from_millis(1),
            )
            .unwrap();
        let s = Rc::clone(&seen);
        scheduler
            .schedule_immediate(move || {
                s.borrow_mut().push(2);
                Ok(())
            })
            .unwrap();
        let s = Rc::clone(&seen);
        scheduler
            .schedule_tick(move || {
                s.borrow_mut().push(1);
                Ok(())
            })
            .unwrap();

        scheduler.run_until_idle().unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert!(!scheduler.has_work());
    }

    #[test]
    fn timeouts_fire_in_deadline_order_and_advance_time() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();

        let s = Rc::clone(&seen);
        scheduler
            .set_timeout(
                move || {
                    s.borrow_mut().push(20);
                    Ok(())
                },
                Duration::from_millis(20),
            )
            .unwrap();
        let s = Rc::clone(&seen);
        scheduler
            .set_timeout(
                move || {
                    s.borrow_mut().push(10);
                    Ok(())
                },
                Duration::from_millis(10),
            )
            .unwrap();

        scheduler.run_until_idle().unwrap();
        assert_eq!(*seen.borrow(), vec![10, 20]);
        assert_eq!(scheduler.now(), Time::from_millis(20));
    }

    #[test]
    fn interval_fires_until_cleared() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();
        let s = Rc::clone(&seen);
        let key = scheduler
            .set_interval(
                move || {
                    s.borrow_mut().push(0);
                    Ok(())
                },
                Duration::from_millis(10),
            )
            .unwrap();

        scheduler.run_until(Time::from_millis(35)).unwrap();
        assert_eq!(seen.borrow().len(), 3);
        assert!(scheduler.clear_timer(key));
        scheduler.run_until_idle().unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn cancelled_timeout_does_not_fire() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();
        let s = Rc::clone(&seen);
        let key = scheduler
            .set_timeout(
                move || {
                    s.borrow_mut().push(1);
                    Ok(())
                },
                Duration::from_millis(5),
            )
            .unwrap();
        assert!(scheduler.clear_timer(key));
        scheduler.run_until_idle().unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn work_scheduled_between_runs_is_picked_up() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();

        let s = Rc::clone(&seen);
        scheduler
            .set_timeout(
                move || {
                    s.borrow_mut().push(1);
                    Ok(())
                },
                Duration::from_millis(5),
            )
            .unwrap();
        scheduler.run_until_idle().unwrap();

        // Work scheduled after a run is picked up by the next run.
        let s = Rc::clone(&seen);
        scheduler
            .schedule_tick(move || {
                s.borrow_mut().push(2);
                Ok(())
            })
            .unwrap();
        scheduler.run_until_idle().unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn unhandled_fault_aborts_the_turn() {
        let mut scheduler = Scheduler::new();
        let seen = recorder();
        scheduler
            .schedule_tick(|| Err(Fault::new("tick failed")))
            .unwrap();
        let s = Rc::clone(&seen);
        scheduler
            .schedule_tick(move || {
                s.borrow_mut().push(9);
                Ok(())
            })
            .unwrap();

        let err = scheduler.run_until_idle().unwrap_err();
        assert_eq!(err.message(), "tick failed");
        assert!(seen.borrow().is_empty(), "turn aborted before later ticks");

        // The queue is still intact; a later run drains it.
        scheduler.run_until_idle().unwrap();
        assert_eq!(*seen.borrow(), vec![9]);
    }
}
