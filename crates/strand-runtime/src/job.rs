//! Job table: one slot per scheduled job plus the lookup maps.
//!
//! Guarded by a single lock in `Shared`; everything here runs with that
//! lock held, so nothing in this module may block or call into streams.

use crate::descriptor::Descriptor;
use crate::timer::{Deadline, DeadlineHeap};
use strand_core::{DescriptorId, EventSet, Interest, JobId, JobState, PeriodicTask};

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// What a job drives
pub(crate) enum Payload {
    Io(Descriptor),
    Periodic(Periodic),
}

pub(crate) struct Periodic {
    pub task: Box<dyn PeriodicTask>,
    pub interval: Duration,
    pub runs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobKind {
    Io,
    Periodic,
}

pub(crate) struct JobSlot {
    pub state: JobState,
    pub kind: JobKind,
    /// `None` while a worker holds it
    pub payload: Option<Payload>,
    pub pending: EventSet,
    pub purge_requested: bool,
    pub descriptor: Option<DescriptorId>,
    pub fd: Option<RawFd>,
    pub interest: Interest,
    /// Bumped on every re-arm; stale heap entries carry an older value
    pub generation: u64,
}

impl JobSlot {
    pub fn io(descriptor: Descriptor) -> Self {
        Self {
            state: JobState::Waiting,
            kind: JobKind::Io,
            descriptor: Some(descriptor.id()),
            fd: descriptor.raw_fd(),
            interest: descriptor.interest(),
            payload: Some(Payload::Io(descriptor)),
            pending: EventSet::EMPTY,
            purge_requested: false,
            generation: 0,
        }
    }

    pub fn periodic(task: Box<dyn PeriodicTask>, interval: Duration) -> Self {
        Self {
            state: JobState::Waiting,
            kind: JobKind::Periodic,
            payload: Some(Payload::Periodic(Periodic { task, interval, runs: 0 })),
            pending: EventSet::EMPTY,
            purge_requested: false,
            descriptor: None,
            fd: None,
            interest: Interest::NONE,
            generation: 0,
        }
    }
}

/// Result of feeding readiness to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fired {
    /// Waiting -> Running, caller must enqueue
    Enqueue,
    /// Already running; folded into its pending set
    Coalesced,
    Ignored,
}

#[derive(Default)]
pub(crate) struct JobTable {
    pub jobs: HashMap<JobId, JobSlot>,
    pub by_fd: HashMap<RawFd, JobId>,
    pub by_descriptor: HashMap<DescriptorId, JobId>,
    pub timers: DeadlineHeap,
    /// Jobs in Running or Cycling
    pub active: usize,
    pub shutting_down: bool,
}

impl JobTable {
    pub fn insert(&mut self, id: JobId, slot: JobSlot) {
        if let Some(fd) = slot.fd {
            self.by_fd.insert(fd, id);
        }
        if let Some(d) = slot.descriptor {
            self.by_descriptor.insert(d, id);
        }
        self.jobs.insert(id, slot);
    }

    /// Apply readiness to a job per the state machine.
    pub fn fire(&mut self, id: JobId, events: EventSet) -> Fired {
        let Some(slot) = self.jobs.get_mut(&id) else {
            return Fired::Ignored;
        };
        match slot.state {
            JobState::Waiting => {
                slot.pending = slot.pending.union(events);
                slot.state = JobState::Running;
                self.active += 1;
                Fired::Enqueue
            }
            JobState::Running => {
                slot.pending = slot.pending.union(events);
                slot.state = JobState::Cycling;
                Fired::Coalesced
            }
            JobState::Cycling => {
                slot.pending = slot.pending.union(events);
                Fired::Coalesced
            }
            JobState::Purged => Fired::Ignored,
        }
    }

    /// Remove a job for good. The payload (if still here) is returned so
    /// the caller can tear it down outside the lock.
    pub fn purge(&mut self, id: JobId) -> Option<Payload> {
        let mut slot = self.jobs.remove(&id)?;
        if slot.state.is_active() {
            self.active -= 1;
        }
        slot.state = JobState::Purged;
        if let Some(fd) = slot.fd {
            if self.by_fd.get(&fd) == Some(&id) {
                self.by_fd.remove(&fd);
            }
        }
        if let Some(d) = slot.descriptor {
            self.by_descriptor.remove(&d);
        }
        slot.payload.take()
    }

    /// Arm the next deadline of a periodic job
    pub fn arm(&mut self, id: JobId, due: Instant) {
        if let Some(slot) = self.jobs.get_mut(&id) {
            slot.generation += 1;
            self.timers.insert(Deadline { due, job: id, generation: slot.generation });
        }
    }

    /// Whether a popped heap entry still refers to a Waiting job's
    /// current deadline
    pub fn is_current(&self, deadline: &Deadline) -> bool {
        self.jobs
            .get(&deadline.job)
            .is_some_and(|s| s.generation == deadline.generation && s.state == JobState::Waiting)
    }

    #[cfg(test)]
    pub fn periodic_count(&self) -> usize {
        self.jobs.values().filter(|s| s.kind == JobKind::Periodic).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpoint;
    use strand_core::{Cycle, EventType, TaskContext};

    fn io_slot() -> JobSlot {
        let (ep, _peer) = MemoryEndpoint::new();
        JobSlot::io(Descriptor::new(ep))
    }

    #[test]
    fn test_fire_walks_state_machine() {
        let mut table = JobTable::default();
        let id = JobId::next();
        table.insert(id, io_slot());

        assert_eq!(table.fire(id, EventType::Opened.into()), Fired::Enqueue);
        assert_eq!(table.jobs[&id].state, JobState::Running);
        assert_eq!(table.active, 1);

        assert_eq!(table.fire(id, EventType::Readable.into()), Fired::Coalesced);
        assert_eq!(table.jobs[&id].state, JobState::Cycling);
        assert_eq!(table.fire(id, EventType::Writable.into()), Fired::Coalesced);
        assert_eq!(table.jobs[&id].pending.len(), 3);
        assert_eq!(table.active, 1);
    }

    #[test]
    fn test_purge_is_terminal() {
        let mut table = JobTable::default();
        let id = JobId::next();
        table.insert(id, io_slot());
        table.fire(id, EventSet::single(EventType::Opened));

        assert!(matches!(table.purge(id), Some(Payload::Io(_))));
        assert_eq!(table.active, 0);
        assert!(table.by_descriptor.is_empty());
        assert!(table.purge(id).is_none());
        assert_eq!(table.fire(id, EventType::Readable.into()), Fired::Ignored);
    }

    #[test]
    fn test_stale_deadlines_detected() {
        let mut table = JobTable::default();
        let id = JobId::next();
        let task = |_: &TaskContext| Cycle::Again;
        table.insert(id, JobSlot::periodic(Box::new(task), Duration::from_millis(10)));

        let now = Instant::now();
        table.arm(id, now);
        table.arm(id, now + Duration::from_millis(10));
        let mut out = Vec::new();
        table.timers.pop_expired(now + Duration::from_millis(10), &mut out);
        assert_eq!(out.len(), 2);
        assert!(!table.is_current(&out[0]));
        assert!(table.is_current(&out[1]));
        assert_eq!(table.periodic_count(), 1);
    }
}
