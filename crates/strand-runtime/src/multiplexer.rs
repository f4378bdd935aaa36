//! Multiplexer: job table, readiness polling and the worker pool.
//!
//! ```text
//!   register / schedule / notify            tick (poller thread or manual)
//!            |                                        |
//!            v                                        v
//!   +------------------+   Waiting -> Running   +-----------+
//!   |    job table     | ---------------------> | run queue |
//!   +------------------+                        +-----------+
//!            ^                                        |
//!            |        finish: Waiting / Purged        v
//!            +------------------------------------ workers (N)
//! ```
//!
//! One lock guards the job table and is held only for state flips. Stream
//! code, endpoint I/O and periodic tasks always run with it released.

use crate::clock::{Clock, SystemClock};
use crate::config::MultiplexerConfig;
use crate::descriptor::Descriptor;
use crate::job::{Fired, JobKind, JobSlot, JobTable, Payload};
use crate::poller::{PollEntry, PollPoller, Poller, Readiness};
use crate::run_queue::RunQueue;
use crate::timer::Deadline;
use crate::waker::Waker;
use crate::worker::worker_loop;
use strand_core::{
    Cycle, DescriptorId, EventSet, EventType, Interest, JobId, JobState, PeriodicTask, Result,
    StrandError, TaskContext,
};

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
pub(crate) struct Counters {
    pub registered: AtomicU64,
    pub periodic: AtomicU64,
    pub dispatches: AtomicU64,
    pub periodic_runs: AtomicU64,
    pub purged: AtomicU64,
    pub panics: AtomicU64,
    pub poll_errors: AtomicU64,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Descriptors registered
    pub registered: u64,
    /// Periodic (and one-shot) jobs scheduled
    pub periodic: u64,
    /// Events delivered to descriptors
    pub dispatches: u64,
    pub periodic_runs: u64,
    pub purged: u64,
    /// Panics caught at the dispatch boundary
    pub panics: u64,
    pub poll_errors: u64,
    /// Jobs currently in the table
    pub live_jobs: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live={} registered={} periodic={} dispatches={} runs={} purged={} panics={} poll_errors={}",
            self.live_jobs,
            self.registered,
            self.periodic,
            self.dispatches,
            self.periodic_runs,
            self.purged,
            self.panics,
            self.poll_errors
        )
    }
}

/// Poller plus scratch space reused across ticks
struct PollState {
    poller: Box<dyn Poller>,
    entries: Vec<PollEntry>,
    ids: Vec<JobId>,
    ready: Vec<Readiness>,
    expired: Vec<Deadline>,
}

pub(crate) struct Shared {
    pub config: MultiplexerConfig,
    pub table: Mutex<JobTable>,
    /// Signalled when the last active job returns
    pub idle: Condvar,
    pub queue: RunQueue,
    pub waker: Waker,
    pub clock: Arc<dyn Clock>,
    /// Workers and poller exit when set
    pub stopping: AtomicBool,
    pub counters: Counters,
    poll: Mutex<PollState>,
}

impl Shared {
    pub fn wake_poller(&self) {
        if let Err(e) = self.waker.wake() {
            tracing::warn!(error = %e, "failed to wake poller");
        }
    }

    fn register(&self, descriptor: Descriptor) -> Result<JobId> {
        let id = JobId::next();
        let descriptor_id = descriptor.id();
        let chain = descriptor.chain_summary();
        {
            let mut table = self.table.lock();
            if table.shutting_down {
                return Err(StrandError::ShuttingDown);
            }
            table.insert(id, JobSlot::io(descriptor));
            if table.fire(id, EventType::Opened.into()) == Fired::Enqueue {
                self.queue.push(id);
            }
        }
        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(job = %id, descriptor = %descriptor_id, %chain, "descriptor registered");
        self.wake_poller();
        Ok(id)
    }

    fn schedule(&self, task: Box<dyn PeriodicTask>, interval: Duration, first_delay: Duration) -> Result<JobId> {
        let id = JobId::next();
        let name = task.name().to_owned();
        {
            let mut table = self.table.lock();
            if table.shutting_down {
                return Err(StrandError::ShuttingDown);
            }
            table.insert(id, JobSlot::periodic(task, interval));
            let due = self.clock.now() + first_delay;
            table.arm(id, due);
        }
        self.counters.periodic.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(job = %id, task = %name, ?interval, "periodic job scheduled");
        self.wake_poller();
        Ok(id)
    }

    fn cancel(&self, id: JobId) -> Result<()> {
        let payload = {
            let mut table = self.table.lock();
            let Some(slot) = table.jobs.get_mut(&id) else {
                return Err(StrandError::JobNotFound(id));
            };
            if slot.payload.is_none() {
                // A worker holds it; purged when the dispatch returns
                slot.purge_requested = true;
                None
            } else {
                table.purge(id)
            }
        };
        if let Some(payload) = payload {
            self.teardown(id, payload);
            self.idle.notify_all();
        }
        Ok(())
    }

    fn unregister(&self, descriptor: DescriptorId) -> Result<()> {
        let id = self
            .table
            .lock()
            .by_descriptor
            .get(&descriptor)
            .copied()
            .ok_or(StrandError::DescriptorNotRegistered(descriptor))?;
        self.cancel(id).map_err(|e| match e {
            StrandError::JobNotFound(_) => StrandError::DescriptorNotRegistered(descriptor),
            other => other,
        })
    }

    fn notify(&self, id: JobId, event: EventType) -> Result<()> {
        let mut table = self.table.lock();
        let kind = table.jobs.get(&id).map(|s| s.kind).ok_or(StrandError::JobNotFound(id))?;
        if kind != JobKind::Io {
            return Err(StrandError::InvalidJobKind(id));
        }
        if table.fire(id, event.into()) == Fired::Enqueue {
            self.queue.push(id);
        }
        Ok(())
    }

    fn job_state(&self, id: JobId) -> Option<JobState> {
        match self.table.lock().jobs.get(&id) {
            Some(slot) => Some(slot.state),
            None if id.was_issued() => Some(JobState::Purged),
            None => None,
        }
    }

    fn stats(&self) -> Stats {
        let c = &self.counters;
        Stats {
            registered: c.registered.load(Ordering::Relaxed),
            periodic: c.periodic.load(Ordering::Relaxed),
            dispatches: c.dispatches.load(Ordering::Relaxed),
            periodic_runs: c.periodic_runs.load(Ordering::Relaxed),
            purged: c.purged.load(Ordering::Relaxed),
            panics: c.panics.load(Ordering::Relaxed),
            poll_errors: c.poll_errors.load(Ordering::Relaxed),
            live_jobs: self.table.lock().jobs.len(),
        }
    }

    /// Drop a purged job's payload. Runs the descriptor's closing path if
    /// it has not run yet. Never called with the table locked.
    pub fn teardown(&self, id: JobId, payload: Payload) {
        if let Payload::Io(mut descriptor) = payload {
            if !descriptor.is_closed() && panic::catch_unwind(AssertUnwindSafe(|| descriptor.close())).is_err() {
                self.counters.panics.fetch_add(1, Ordering::Relaxed);
                tracing::error!(job = %id, descriptor = %descriptor.id(), "stream panicked while closing");
            }
        }
        self.counters.purged.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(job = %id, "job purged");
    }

    /// One poll round. Returns how many jobs were moved to Running.
    fn tick(&self, timeout: Duration) -> Result<usize> {
        let mut guard = self.poll.lock();
        let PollState { poller, entries, ids, ready, expired } = &mut *guard;
        entries.clear();
        ids.clear();
        ready.clear();
        expired.clear();

        entries.push(PollEntry { fd: self.waker.raw_fd(), interest: Interest::READABLE });
        let timeout = {
            let table = self.table.lock();
            for (&fd, &id) in &table.by_fd {
                let Some(slot) = table.jobs.get(&id) else { continue };
                if slot.state == JobState::Waiting && !slot.interest.is_none() {
                    entries.push(PollEntry { fd, interest: slot.interest });
                    ids.push(id);
                }
            }
            match table.timers.peek() {
                Some(due) => timeout.min(due.saturating_duration_since(self.clock.now())),
                None => timeout,
            }
        };

        if let Err(e) = poller.poll(entries, timeout, ready) {
            self.counters.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "readiness poll failed");
            return Err(e);
        }

        let mut scheduled = 0;
        let mut table = self.table.lock();
        for r in ready.iter() {
            if r.index == 0 {
                self.waker.drain();
                continue;
            }
            let Some(&id) = ids.get(r.index - 1) else { continue };
            if table.fire(id, r.events) == Fired::Enqueue {
                self.queue.push(id);
                scheduled += 1;
            }
        }

        table.timers.pop_expired(self.clock.now(), expired);
        for deadline in expired.iter() {
            if table.is_current(deadline) && table.fire(deadline.job, EventSet::EMPTY) == Fired::Enqueue {
                self.queue.push(deadline.job);
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }
}

fn poller_loop(shared: Arc<Shared>) {
    tracing::debug!("poller started");
    while !shared.stopping.load(Ordering::Acquire) {
        if shared.tick(shared.config.poll_timeout).is_err() {
            thread::sleep(shared.config.poll_backoff);
        }
    }
    tracing::debug!("poller stopped");
}

/// Wraps a one-shot closure as a periodic task that finishes after one run
struct Once<F>(Option<F>);

impl<F: FnOnce() + Send> PeriodicTask for Once<F> {
    fn run(&mut self, _ctx: &TaskContext) -> Cycle {
        if let Some(f) = self.0.take() {
            f();
        }
        Cycle::Done
    }

    fn name(&self) -> &str {
        "once"
    }
}

/// Cloneable scheduling handle.
///
/// Everything that can be done to a running multiplexer except shutting
/// it down. Streams keep one to register new descriptors (an accepting
/// listener, for example).
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    /// Add a descriptor. An `Opened` dispatch is queued immediately.
    pub fn register(&self, descriptor: Descriptor) -> Result<JobId> {
        self.shared.register(descriptor)
    }

    /// Remove a descriptor's job. A running dispatch finishes first.
    pub fn unregister(&self, descriptor: DescriptorId) -> Result<()> {
        self.shared.unregister(descriptor)
    }

    /// Run `task` every `interval`, measured from the start of each run.
    /// The first run is one interval from now.
    pub fn schedule_periodic<T: PeriodicTask + 'static>(&self, task: T, interval: Duration) -> Result<JobId> {
        if interval.is_zero() {
            return Err(StrandError::InvalidInterval);
        }
        self.shared.schedule(Box::new(task), interval, interval)
    }

    /// Run `f` once after `delay` (zero runs on the next tick).
    pub fn schedule_once<F: FnOnce() + Send + 'static>(&self, f: F, delay: Duration) -> Result<JobId> {
        self.shared.schedule(Box::new(Once(Some(f))), delay, delay)
    }

    pub fn cancel(&self, job: JobId) -> Result<()> {
        self.shared.cancel(job)
    }

    /// Inject readiness for an I/O job (fd-less endpoints, cross-component
    /// wake-ups). Periodic jobs reject it.
    pub fn notify(&self, job: JobId, event: EventType) -> Result<()> {
        self.shared.notify(job, event)
    }

    /// Current state. Issued ids that left the table report `Purged`;
    /// ids never issued report `None`.
    pub fn job_state(&self, job: JobId) -> Option<JobState> {
        self.shared.job_state(job)
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats()
    }

    pub fn config(&self) -> &MultiplexerConfig {
        &self.shared.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("stats", &self.stats()).finish()
    }
}

/// The scheduler context.
///
/// Owns the worker pool (spawned in `new`) and, once `start` is called,
/// the poller thread. Without `start`, drive polling with `tick`.
pub struct Multiplexer {
    handle: Handle,
    workers: Mutex<Vec<JoinHandle<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Multiplexer {
    pub fn new(config: MultiplexerConfig) -> Result<Self> {
        Self::with_parts(config, Box::new(PollPoller::new()), Arc::new(SystemClock))
    }

    /// Build with a custom poller and clock.
    pub fn with_parts(config: MultiplexerConfig, poller: Box<dyn Poller>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        config.log();

        let num_workers = config.num_workers;
        let shared = Arc::new(Shared {
            config,
            table: Mutex::new(JobTable::default()),
            idle: Condvar::new(),
            queue: RunQueue::new(),
            waker: Waker::new()?,
            clock,
            stopping: AtomicBool::new(false),
            counters: Counters::default(),
            poll: Mutex::new(PollState {
                poller,
                entries: Vec::new(),
                ids: Vec::new(),
                ready: Vec::new(),
                expired: Vec::new(),
            }),
        });

        let mux = Multiplexer {
            handle: Handle { shared: Arc::clone(&shared) },
            workers: Mutex::new(Vec::with_capacity(num_workers)),
            poller: Mutex::new(None),
        };

        for worker in 0..num_workers {
            let shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("strand-worker-{}", worker))
                .spawn(move || worker_loop(shared, worker));
            match spawned {
                Ok(handle) => mux.workers.lock().push(handle),
                // Dropping `mux` stops the workers already running
                Err(e) => return Err(StrandError::Spawn(e)),
            }
        }

        tracing::info!(workers = num_workers, "multiplexer ready");
        Ok(mux)
    }

    /// Spawn the poller thread. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.poller.lock();
        if slot.is_some() {
            return Ok(());
        }
        if self.handle.is_shutting_down() {
            return Err(StrandError::ShuttingDown);
        }
        let shared = Arc::clone(&self.handle.shared);
        let handle = thread::Builder::new()
            .name("strand-poller".to_owned())
            .spawn(move || poller_loop(shared))
            .map_err(StrandError::Spawn)?;
        *slot = Some(handle);
        Ok(())
    }

    /// Poll once, blocking at most `timeout` (less if a periodic deadline
    /// comes first). Returns the number of jobs moved to Running.
    pub fn tick(&self, timeout: Duration) -> Result<usize> {
        self.handle.shared.tick(timeout)
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn register(&self, descriptor: Descriptor) -> Result<JobId> {
        self.handle.register(descriptor)
    }

    pub fn unregister(&self, descriptor: DescriptorId) -> Result<()> {
        self.handle.unregister(descriptor)
    }

    pub fn schedule_periodic<T: PeriodicTask + 'static>(&self, task: T, interval: Duration) -> Result<JobId> {
        self.handle.schedule_periodic(task, interval)
    }

    pub fn schedule_once<F: FnOnce() + Send + 'static>(&self, f: F, delay: Duration) -> Result<JobId> {
        self.handle.schedule_once(f, delay)
    }

    pub fn cancel(&self, job: JobId) -> Result<()> {
        self.handle.cancel(job)
    }

    pub fn notify(&self, job: JobId, event: EventType) -> Result<()> {
        self.handle.notify(job, event)
    }

    pub fn job_state(&self, job: JobId) -> Option<JobState> {
        self.handle.job_state(job)
    }

    pub fn stats(&self) -> Stats {
        self.handle.stats()
    }

    pub fn config(&self) -> &MultiplexerConfig {
        self.handle.config()
    }

    /// Block until no job is Running or queued. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let shared = &self.handle.shared;
        let deadline = Instant::now() + timeout;
        let mut table = shared.table.lock();
        while table.active > 0 {
            if shared.idle.wait_until(&mut table, deadline).timed_out() {
                return table.active == 0;
            }
        }
        true
    }

    /// Stop polling, purge every job, join the workers. Idempotent.
    ///
    /// Running dispatches are not interrupted; their jobs are purged when
    /// they return.
    pub fn shutdown(&self) {
        let shared = &self.handle.shared;
        {
            let mut table = shared.table.lock();
            if table.shutting_down {
                return;
            }
            table.shutting_down = true;
        }
        tracing::info!("multiplexer shutting down");

        shared.stopping.store(true, Ordering::Release);
        shared.wake_poller();
        if let Some(poller) = self.poller.lock().take() {
            if poller.join().is_err() {
                tracing::error!("poller thread panicked");
            }
        }

        let doomed: Vec<(JobId, Payload)> = {
            let mut table = shared.table.lock();
            let ids: Vec<JobId> = table.jobs.keys().copied().collect();
            let mut doomed = Vec::with_capacity(ids.len());
            for id in ids {
                let held = table.jobs.get(&id).is_some_and(|s| s.payload.is_none());
                if held {
                    if let Some(slot) = table.jobs.get_mut(&id) {
                        slot.purge_requested = true;
                    }
                } else if let Some(payload) = table.purge(id) {
                    doomed.push((id, payload));
                }
            }
            table.timers.clear();
            doomed
        };
        let drained = shared.queue.drain();
        for (id, payload) in doomed {
            shared.teardown(id, payload);
        }

        shared.queue.wake_all();
        for worker in self.workers.lock().drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        shared.idle.notify_all();
        tracing::info!(stats = %shared.stats(), drained, "multiplexer stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.handle.is_shutting_down()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("workers", &self.workers.lock().len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::endpoint::MemoryEndpoint;

    fn config(workers: usize) -> MultiplexerConfig {
        MultiplexerConfig::new().num_workers(workers)
    }

    #[test]
    fn test_register_runs_opened() {
        let mux = Multiplexer::new(config(2)).unwrap();
        let (ep, _peer) = MemoryEndpoint::new();
        let id = mux.register(Descriptor::new(ep)).unwrap();
        assert!(mux.wait_idle(Duration::from_secs(5)));
        assert_eq!(mux.job_state(id), Some(JobState::Waiting));
        let stats = mux.stats();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.live_jobs, 1);
    }

    #[test]
    fn test_unknown_ids() {
        let mux = Multiplexer::new(config(1)).unwrap();
        let never = JobId::from_raw(u64::MAX);
        assert_eq!(mux.job_state(never), None);
        assert!(matches!(mux.cancel(never), Err(StrandError::JobNotFound(_))));
        assert!(matches!(mux.notify(never, EventType::Readable), Err(StrandError::JobNotFound(_))));
        assert!(matches!(
            mux.unregister(DescriptorId::from_raw(u64::MAX)),
            Err(StrandError::DescriptorNotRegistered(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mux = Multiplexer::new(config(1)).unwrap();
        let r = mux.schedule_periodic(|_: &TaskContext| Cycle::Again, Duration::ZERO);
        assert!(matches!(r, Err(StrandError::InvalidInterval)));
    }

    #[test]
    fn test_notify_rejects_periodic() {
        let mux = Multiplexer::new(config(1)).unwrap();
        let id = mux.schedule_periodic(|_: &TaskContext| Cycle::Again, Duration::from_secs(60)).unwrap();
        assert!(matches!(mux.notify(id, EventType::Readable), Err(StrandError::InvalidJobKind(_))));
    }

    #[test]
    fn test_cancel_waiting_job_purges() {
        let mux = Multiplexer::new(config(1)).unwrap();
        let (ep, peer) = MemoryEndpoint::new();
        let id = mux.register(Descriptor::new(ep)).unwrap();
        assert!(mux.wait_idle(Duration::from_secs(5)));
        mux.cancel(id).unwrap();
        assert_eq!(mux.job_state(id), Some(JobState::Purged));
        assert!(peer.is_released());
        assert!(matches!(mux.cancel(id), Err(StrandError::JobNotFound(_))));
        assert_eq!(mux.stats().purged, 1);
    }

    #[test]
    fn test_schedule_once_runs_then_purges() {
        let clock = ManualClock::new();
        let mux = Multiplexer::with_parts(config(1), Box::new(PollPoller::new()), Arc::new(clock.clone())).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let id = mux.schedule_once(move || tx.send(()).unwrap(), Duration::from_millis(5)).unwrap();

        mux.tick(Duration::ZERO).unwrap();
        assert!(mux.wait_idle(Duration::from_secs(5)));
        assert!(rx.try_recv().is_err());

        clock.advance(Duration::from_millis(5));
        assert_eq!(mux.tick(Duration::ZERO).unwrap(), 1);
        assert!(mux.wait_idle(Duration::from_secs(5)));
        assert!(rx.try_recv().is_ok());
        assert_eq!(mux.job_state(id), Some(JobState::Purged));
    }

    #[test]
    fn test_shutdown_idempotent_and_rejects_work() {
        let mux = Multiplexer::new(config(2)).unwrap();
        mux.start().unwrap();
        let (ep, peer) = MemoryEndpoint::new();
        let id = mux.register(Descriptor::new(ep)).unwrap();
        mux.shutdown();
        mux.shutdown();
        assert!(mux.is_shutting_down());
        assert_eq!(mux.job_state(id), Some(JobState::Purged));
        assert!(peer.is_released());

        let (ep, _peer) = MemoryEndpoint::new();
        assert!(matches!(mux.register(Descriptor::new(ep)), Err(StrandError::ShuttingDown)));
        assert!(matches!(mux.start(), Ok(()) | Err(StrandError::ShuttingDown)));
    }

    #[test]
    fn test_stats_display() {
        let stats = Stats { registered: 2, live_jobs: 1, ..Stats::default() };
        let text = stats.to_string();
        assert!(text.starts_with("live=1 registered=2"));
    }
}
