//! Worker pool loop.
//!
//! Each worker pops a job id, takes the job's payload out of the table,
//! runs it with the table unlocked, then puts it back (or purges it).
//! A job id is in the run queue at most once per Running period, so two
//! workers never hold the same payload.

use crate::descriptor::{Descriptor, DispatchStatus};
use crate::job::{Payload, Periodic};
use crate::multiplexer::Shared;
use strand_core::{Cycle, EventSet, JobId, JobState, TaskContext};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Keep,
    Purge,
}

pub(crate) fn worker_loop(shared: Arc<Shared>, worker: usize) {
    tracing::debug!(worker, "worker started");
    while !shared.stopping.load(Ordering::Acquire) {
        match shared.queue.pop() {
            Some(id) => run_job(&shared, id, worker),
            None => shared.queue.park(shared.config.park_timeout),
        }
    }
    tracing::debug!(worker, "worker stopped");
}

fn run_job(shared: &Shared, id: JobId, worker: usize) {
    let (payload, events, purge) = {
        let mut table = shared.table.lock();
        let Some(slot) = table.jobs.get_mut(&id) else {
            // Cancelled while queued
            return;
        };
        if !slot.state.is_active() {
            return;
        }
        let Some(payload) = slot.payload.take() else {
            return;
        };
        // Everything pending is consumed by this run
        slot.state = JobState::Running;
        (payload, slot.pending.take(), slot.purge_requested)
    };

    let start = shared.clock.now();
    let (payload, outcome, signals) = match payload {
        Payload::Io(mut descriptor) => {
            let outcome = if purge {
                Outcome::Purge
            } else {
                dispatch_io(shared, id, worker, &mut descriptor, events)
            };
            let signals = descriptor.take_signals();
            (Payload::Io(descriptor), outcome, signals)
        }
        Payload::Periodic(mut periodic) => {
            let outcome = if purge {
                Outcome::Purge
            } else {
                run_periodic(shared, id, worker, &mut periodic)
            };
            (Payload::Periodic(periodic), outcome, EventSet::EMPTY)
        }
    };

    finish(shared, id, payload, outcome, signals, start);
}

fn dispatch_io(shared: &Shared, id: JobId, worker: usize, descriptor: &mut Descriptor, events: EventSet) -> Outcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        for event in events.iter() {
            shared.counters.dispatches.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(job = %id, descriptor = %descriptor.id(), worker, %event, "dispatch");
            if descriptor.dispatch(event) == DispatchStatus::Closed {
                return DispatchStatus::Closed;
            }
        }
        DispatchStatus::Open
    }));

    match result {
        Ok(DispatchStatus::Open) => Outcome::Keep,
        Ok(DispatchStatus::Closed) => Outcome::Purge,
        Err(panic) => {
            shared.counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                job = %id,
                descriptor = %descriptor.id(),
                worker,
                panic = panic_message(&*panic),
                "stream panicked, closing descriptor"
            );
            if panic::catch_unwind(AssertUnwindSafe(|| descriptor.close())).is_err() {
                tracing::error!(job = %id, "descriptor close panicked");
            }
            Outcome::Purge
        }
    }
}

fn run_periodic(shared: &Shared, id: JobId, worker: usize, periodic: &mut Periodic) -> Outcome {
    let ctx = TaskContext { job: id, run: periodic.runs, worker };
    periodic.runs += 1;
    shared.counters.periodic_runs.fetch_add(1, Ordering::Relaxed);

    match panic::catch_unwind(AssertUnwindSafe(|| periodic.task.run(&ctx))) {
        Ok(Cycle::Again) => Outcome::Keep,
        Ok(Cycle::Done) => Outcome::Purge,
        Err(panic) => {
            shared.counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                job = %id,
                task = periodic.task.name(),
                worker,
                panic = panic_message(&*panic),
                "periodic task panicked, run dropped"
            );
            Outcome::Keep
        }
    }
}

/// Hand the payload back to the table, or purge the job.
fn finish(shared: &Shared, id: JobId, payload: Payload, outcome: Outcome, signals: EventSet, start: Instant) {
    let mut purged = None;
    let mut rearmed = false;
    let idle;
    {
        let mut guard = shared.table.lock();
        let table = &mut *guard;
        let purge = outcome == Outcome::Purge
            || table.shutting_down
            || table.jobs.get(&id).map_or(true, |s| s.purge_requested);

        if purge {
            table.purge(id);
            purged = Some(payload);
        } else if let Some(slot) = table.jobs.get_mut(&id) {
            let interval = match &payload {
                Payload::Io(descriptor) => {
                    slot.interest = descriptor.interest();
                    None
                }
                Payload::Periodic(periodic) => Some(periodic.interval),
            };
            slot.payload = Some(payload);
            slot.pending = slot.pending.union(signals);

            let requeue = slot.state == JobState::Cycling || !slot.pending.is_empty();
            slot.state = if requeue { JobState::Running } else { JobState::Waiting };

            if requeue {
                shared.queue.push(id);
            } else {
                table.active -= 1;
                if let Some(interval) = interval {
                    table.arm(id, start + interval);
                }
                rearmed = true;
            }
        }
        idle = table.active == 0;
    }

    if let Some(payload) = purged {
        shared.teardown(id, payload);
    }
    if rearmed {
        shared.wake_poller();
    }
    if idle {
        shared.idle.notify_all();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
