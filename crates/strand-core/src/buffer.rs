//! Byte staging buffer with head/tail cursors
//!
//! ```text
//!  0         head         tail            size
//!  |--wasted--|----used----|-----free-----|
//! ```
//!
//! Readers consume from `head()`, writers fill `tail()` and then `push()`
//! what they wrote. Consumed space at the front is reclaimed by
//! `compact()`, which `pop()` runs on its own once the wasted prefix
//! exceeds the high-water mark.
//!
//! A buffer has exactly one owner (a stream or an endpoint) and is never
//! shared between threads while in use.

/// Growable byte buffer
#[derive(Clone)]
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    tail: usize,
    high_water: usize,
}

impl Buffer {
    /// Create a buffer of `size` bytes; high-water mark is half the size
    pub fn new(size: usize) -> Self {
        Self::with_high_water(size, size / 2)
    }

    /// Create a buffer with an explicit compaction high-water mark
    pub fn with_high_water(size: usize, high_water: usize) -> Self {
        Self {
            data: vec![0u8; size],
            head: 0,
            tail: 0,
            high_water: high_water.min(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Bytes written but not yet consumed
    #[inline]
    pub fn used(&self) -> usize {
        self.tail - self.head
    }

    /// Bytes available after `tail`
    #[inline]
    pub fn free(&self) -> usize {
        self.data.len() - self.tail
    }

    /// Consumed bytes still occupying the front
    #[inline]
    pub fn wasted(&self) -> usize {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Readable region
    #[inline]
    pub fn head(&self) -> &[u8] {
        &self.data[self.head..self.tail]
    }

    /// Writable region; follow up with `push(n)` for the bytes written
    #[inline]
    pub fn tail(&mut self) -> &mut [u8] {
        &mut self.data[self.tail..]
    }

    /// Commit `n` bytes written into `tail()`.
    ///
    /// Returns `n`, or 0 without touching anything if `n > free()`.
    pub fn push(&mut self, n: usize) -> usize {
        if n > self.free() {
            return 0;
        }
        self.tail += n;
        n
    }

    /// Consume up to `n` bytes from the front. Returns the count consumed.
    pub fn pop(&mut self, n: usize) -> usize {
        let n = n.min(self.used());
        self.head += n;
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        } else if self.head > self.high_water {
            self.compact();
        }
        n
    }

    /// Move the used bytes to offset 0
    pub fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.data.copy_within(self.head..self.tail, 0);
        self.tail -= self.head;
        self.head = 0;
    }

    /// Make sure at least `n` bytes are free, compacting first and growing
    /// the storage only when compaction is not enough.
    pub fn reserve(&mut self, n: usize) {
        if self.free() >= n {
            return;
        }
        self.compact();
        if self.free() < n {
            let new_size = self.tail + n;
            self.data.resize(new_size, 0);
        }
    }

    /// Copy as much of `src` as fits. Returns the count copied.
    pub fn append(&mut self, src: &[u8]) -> usize {
        if self.free() < src.len() && self.head > 0 {
            self.compact();
        }
        let n = src.len().min(self.free());
        self.data[self.tail..self.tail + n].copy_from_slice(&src[..n]);
        self.tail += n;
        n
    }

    /// Copy up to `dst.len()` bytes out and consume them
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.used());
        dst[..n].copy_from_slice(&self.data[self.head..self.head + n]);
        self.pop(n)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}
