//! Run queue shared by the worker pool.
//!
//! Lock-free MPMC queue of job ids with Condvar parking for idle workers.
//! Workers park with a timeout so a missed wake-up costs at most one
//! park interval.

use strand_core::JobId;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct RunQueue {
    queue: SegQueue<JobId>,
    lock: Mutex<()>,
    cond: Condvar,
    parked: AtomicUsize,
}

impl RunQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            lock: Mutex::new(()),
            cond: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, job: JobId) {
        self.queue.push(job);
        if self.parked.load(Ordering::Acquire) > 0 {
            let _guard = self.lock.lock();
            self.cond.notify_one();
        }
    }

    #[inline]
    pub fn pop(&self) -> Option<JobId> {
        self.queue.pop()
    }

    /// Block until woken or `timeout` elapses.
    pub fn park(&self, timeout: Duration) {
        let mut guard = self.lock.lock();
        self.parked.fetch_add(1, Ordering::AcqRel);
        if self.queue.is_empty() {
            let _ = self.cond.wait_for(&mut guard, timeout);
        }
        self.parked.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove everything still queued
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while self.queue.pop().is_some() {
            n += 1;
        }
        n
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo() {
        let q = RunQueue::new();
        let (a, b) = (JobId::next(), JobId::next());
        q.push(a);
        q.push(b);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_park_times_out_when_empty() {
        let q = RunQueue::new();
        let start = Instant::now();
        q.park(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_push_wakes_parked_worker() {
        let q = Arc::new(RunQueue::new());
        let q2 = Arc::clone(&q);
        let worker = thread::spawn(move || {
            let start = Instant::now();
            loop {
                if let Some(job) = q2.pop() {
                    return (job, start.elapsed());
                }
                q2.park(Duration::from_secs(5));
            }
        });
        thread::sleep(Duration::from_millis(20));
        let job = JobId::next();
        q.push(job);
        let (got, waited) = worker.join().unwrap();
        assert_eq!(got, job);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_drain() {
        let q = RunQueue::new();
        for _ in 0..5 {
            q.push(JobId::next());
        }
        assert_eq!(q.drain(), 5);
        assert!(q.is_empty());
    }
}
