//! Lifecycle events, event sets and poll interest

use core::fmt;

/// Event delivered to a descriptor's stream chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    /// Descriptor was registered; first event every chain sees
    Opened = 0,
    /// Endpoint has input (or a stream signalled more work)
    Readable = 1,
    /// Endpoint can accept output
    Writable = 2,
    /// Descriptor is being torn down; delivered last-added stream first
    Closing = 3,
}

impl EventType {
    /// All events in the order a single dispatch drains them
    pub const ALL: [EventType; 4] = [
        EventType::Opened,
        EventType::Readable,
        EventType::Writable,
        EventType::Closing,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Opened => write!(f, "opened"),
            EventType::Readable => write!(f, "readable"),
            EventType::Writable => write!(f, "writable"),
            EventType::Closing => write!(f, "closing"),
        }
    }
}

/// Small set of pending events, coalesced per job
///
/// Two `Readable` notifications that arrive before the job runs collapse
/// into one dispatch; streams drain their endpoint until `Wait` anyway.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventSet(u8);

impl EventSet {
    pub const EMPTY: EventSet = EventSet(0);

    #[inline]
    pub const fn single(event: EventType) -> Self {
        EventSet(event.bit())
    }

    #[inline]
    pub fn insert(&mut self, event: EventType) {
        self.0 |= event.bit();
    }

    #[inline]
    pub fn remove(&mut self, event: EventType) {
        self.0 &= !event.bit();
    }

    #[inline]
    pub const fn contains(&self, event: EventType) -> bool {
        self.0 & event.bit() != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn union(self, other: EventSet) -> EventSet {
        EventSet(self.0 | other.0)
    }

    /// Take the contents, leaving the set empty
    #[inline]
    pub fn take(&mut self) -> EventSet {
        core::mem::take(self)
    }

    /// Iterate in drain order (Opened, Readable, Writable, Closing)
    pub fn iter(self) -> impl Iterator<Item = EventType> {
        EventType::ALL.into_iter().filter(move |e| self.contains(*e))
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }
}

impl From<EventType> for EventSet {
    fn from(event: EventType) -> Self {
        EventSet::single(event)
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Readiness the poller should watch for a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const NONE: Interest = Interest { readable: false, writable: false };
    pub const READABLE: Interest = Interest { readable: true, writable: false };
    pub const WRITABLE: Interest = Interest { readable: false, writable: true };
    pub const BOTH: Interest = Interest { readable: true, writable: true };

    #[inline]
    pub const fn is_none(&self) -> bool {
        !self.readable && !self.writable
    }
}

impl Default for Interest {
    fn default() -> Self {
        Interest::READABLE
    }
}
