//! Reusable scratch buffers for the hot parsing and formatting paths.
//!
//! The pool is process-wide and internally synchronized, independent of any
//! writer lock, because buffers are also reused outside the writer's
//! critical section. Released buffers are zero-filled before they return to
//! the free list so pooled storage never retains log content.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Free-list size cap; buffers released beyond it are simply dropped.
const MAX_POOLED: usize = 8;

static POOL: Lazy<Mutex<Vec<PoolBuf>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Byte range into a [`PoolBuf`]'s byte buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub(crate) fn slice(self, bytes: &[u8]) -> &[u8] {
        &bytes[self.start..self.end]
    }
}

/// A growable byte buffer plus a span table, both reused across calls.
#[derive(Debug, Default)]
pub struct PoolBuf {
    pub(crate) bytes: Vec<u8>,
    pub(crate) spans: Vec<Span>,
}

impl PoolBuf {
    /// The composed bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access for callers composing output text.
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    /// Zero-fill the byte buffer and forget all content.
    pub(crate) fn scrub(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.bytes.clear();
        self.spans.clear();
    }
}

/// Take a cleared buffer from the pool, or a fresh one when it is empty.
pub fn acquire() -> PoolBuf {
    let mut buf = POOL.lock().pop().unwrap_or_default();
    buf.bytes.clear();
    buf.spans.clear();
    buf
}

/// Scrub a buffer and return it to the pool. Contents are undefined to the
/// caller afterwards.
pub fn release(mut buf: PoolBuf) {
    buf.scrub();
    let mut pool = POOL.lock();
    if pool.len() < MAX_POOLED {
        pool.push(buf);
    }
}
