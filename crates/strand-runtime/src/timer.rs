//! Deadline heap for periodic jobs.
//!
//! # Cancellation Strategy
//!
//! Lazy: a cancelled or rescheduled job leaves its old entry in the heap.
//! Each entry carries the generation it was armed with; the multiplexer
//! drops entries whose generation no longer matches the job's.

use strand_core::JobId;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub due: Instant,
    pub job: JobId,
    pub generation: u64,
}

/// Min-heap ordering, earliest first, ties by job id
struct HeapEntry(Deadline);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.0.due.cmp(&self.0.due) {
            Ordering::Equal => match other.0.job.as_u64().cmp(&self.0.job.as_u64()) {
                Ordering::Equal => other.0.generation.cmp(&self.0.generation),
                ord => ord,
            },
            ord => ord,
        }
    }
}

#[derive(Default)]
pub struct DeadlineHeap {
    heap: BinaryHeap<HeapEntry>,
}

impl DeadlineHeap {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deadline: Deadline) {
        self.heap.push(HeapEntry(deadline));
    }

    /// Earliest armed deadline (may be stale)
    pub fn peek(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.0.due)
    }

    /// Pop every entry due at or before `now`, in deadline order.
    pub fn pop_expired(&mut self, now: Instant, out: &mut Vec<Deadline>) {
        while let Some(top) = self.heap.peek() {
            if top.0.due > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                out.push(entry.0);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, ms: u64, job: JobId) -> Deadline {
        Deadline { due: base + Duration::from_millis(ms), job, generation: 0 }
    }

    #[test]
    fn test_pops_in_deadline_order() {
        let base = Instant::now();
        let (a, b, c) = (JobId::next(), JobId::next(), JobId::next());
        let mut heap = DeadlineHeap::new();
        heap.insert(at(base, 30, a));
        heap.insert(at(base, 10, b));
        heap.insert(at(base, 20, c));
        assert_eq!(heap.peek(), Some(base + Duration::from_millis(10)));

        let mut out = Vec::new();
        heap.pop_expired(base + Duration::from_millis(25), &mut out);
        assert_eq!(out.iter().map(|d| d.job).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_nothing_due_yet() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();
        heap.insert(at(base, 10, JobId::next()));
        let mut out = Vec::new();
        heap.pop_expired(base + Duration::from_millis(9), &mut out);
        assert!(out.is_empty());
        heap.pop_expired(base + Duration::from_millis(10), &mut out);
        assert_eq!(out.len(), 1);
        assert!(heap.is_empty());
    }
}
