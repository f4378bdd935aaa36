//! Job and descriptor identifiers
//!
//! Both ids are allocated from process-wide counters that start at 1 and
//! only ever grow, so an id is never handed out twice. The multiplexer
//! relies on this to answer "was this job purged?" without tombstones.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a scheduled job
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Allocate the next job id
    #[inline]
    pub fn next() -> Self {
        JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value (for lookups only; does not allocate)
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        JobId(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this id has already been handed out by `next()`
    #[inline]
    pub fn was_issued(self) -> bool {
        self.0 != 0 && self.0 < NEXT_JOB_ID.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Unique identifier for a descriptor
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DescriptorId(u64);

impl DescriptorId {
    /// Allocate the next descriptor id
    #[inline]
    pub fn next() -> Self {
        DescriptorId(NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        DescriptorId(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DescriptorId({})", self.0)
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd#{}", self.0)
    }
}
