use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::error::{IoError, Result};

/// Default scratch buffer capacity: 8 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Smallest usable capacity: the widest number is 8 bytes.
pub const MIN_BUFFER_SIZE: usize = 8;

/// Fixed-capacity byte region backing one direction of one connection.
///
/// ```text
/// 0          position         limit            capacity
/// ├──────────┼────────────────┼────────────────┤
/// │ consumed │ readable bytes │ free space     │
/// ```
///
/// Transport reads land in the free space and extend `limit`; requests
/// consume readable bytes and advance `position`. The write side encodes
/// into the free space and drains the readable region the same way.
pub struct ScratchBuffer {
    data: Box<[u8]>,
    position: usize,
    limit: usize,
}

impl ScratchBuffer {
    /// Allocate a zeroed buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_storage(vec![0u8; capacity].into_boxed_slice())
    }

    fn from_storage(data: Box<[u8]>) -> Self {
        Self {
            data,
            position: 0,
            limit: 0,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::from_storage(Box::default())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Readable bytes, `limit - position`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Free space after `limit`.
    pub fn free(&self) -> usize {
        self.capacity() - self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.position == self.limit
    }

    /// The readable region.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Consume `amount` readable bytes.
    pub(crate) fn advance(&mut self, amount: usize) {
        debug_assert!(amount <= self.remaining());
        self.position += amount;
    }

    /// Consume and return the next `amount` readable bytes.
    pub(crate) fn take(&mut self, amount: usize) -> &[u8] {
        debug_assert!(amount <= self.remaining());
        let start = self.position;
        self.position += amount;
        &self.data[start..start + amount]
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        debug_assert!(position <= self.limit);
        self.position = position;
    }

    /// Forget every byte and rewind to the start.
    pub(crate) fn clear(&mut self) {
        self.position = 0;
        self.limit = 0;
    }

    /// Move the readable bytes to the front of the buffer.
    pub(crate) fn compact(&mut self) {
        let remaining = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = 0;
        self.limit = remaining;
    }

    /// Free space for the transport (or an encoder) to fill.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.limit..]
    }

    /// Mark `amount` bytes of free space as filled.
    pub(crate) fn commit(&mut self, amount: usize) {
        debug_assert!(amount <= self.free());
        self.limit += amount;
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Recycles scratch buffers of one capacity between connections.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    max_idle: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    /// Default number of idle buffers kept for reuse.
    pub const DEFAULT_MAX_IDLE: usize = 64;

    /// Create a pool handing out buffers of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_max_idle(capacity, Self::DEFAULT_MAX_IDLE)
    }

    /// Create a pool that retains at most `max_idle` released buffers.
    pub fn with_max_idle(capacity: usize, max_idle: usize) -> Result<Self> {
        if capacity < MIN_BUFFER_SIZE {
            return Err(IoError::CapacityTooSmall {
                capacity,
                min: MIN_BUFFER_SIZE,
            });
        }
        Ok(Self {
            capacity,
            max_idle,
            idle: Mutex::new(Vec::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Take a cleared buffer, reusing an idle one when possible.
    pub fn acquire(&self) -> ScratchBuffer {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match reused {
            Some(storage) => ScratchBuffer::from_storage(storage),
            None => ScratchBuffer::with_capacity(self.capacity),
        }
    }

    /// Return a buffer to the pool. Foreign capacities are dropped.
    pub fn release(&self, buffer: ScratchBuffer) {
        if buffer.capacity() != self.capacity {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(buffer.data);
        } else {
            trace!(capacity = self.capacity, "pool full, dropping buffer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(bytes: &[u8], capacity: usize) -> ScratchBuffer {
        let mut buffer = ScratchBuffer::with_capacity(capacity);
        buffer.spare_mut()[..bytes.len()].copy_from_slice(bytes);
        buffer.commit(bytes.len());
        buffer
    }

    #[test]
    fn new_buffer_is_empty() {
        let buffer = ScratchBuffer::with_capacity(16);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.free(), 16);
        assert!(buffer.is_empty());
    }

    #[test]
    fn commit_and_take() {
        let mut buffer = filled(b"abcdef", 8);
        assert_eq!(buffer.remaining(), 6);
        assert_eq!(buffer.free(), 2);

        assert_eq!(buffer.take(2), b"ab");
        assert_eq!(buffer.readable(), b"cdef");
        buffer.advance(3);
        assert_eq!(buffer.readable(), b"f");
        assert_eq!(buffer.position(), 5);
        assert_eq!(buffer.limit(), 6);
    }

    #[test]
    fn compact_moves_unread_bytes_to_front() {
        let mut buffer = filled(b"abcdefgh", 8);
        buffer.advance(5);
        buffer.compact();

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 3);
        assert_eq!(buffer.readable(), b"fgh");
        assert_eq!(buffer.free(), 5);
    }

    #[test]
    fn clear_discards_everything() {
        let mut buffer = filled(b"abc", 8);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), 8);
    }

    #[test]
    fn pool_rejects_tiny_capacity() {
        let err = BufferPool::new(4).unwrap_err();
        assert!(matches!(
            err,
            IoError::CapacityTooSmall {
                capacity: 4,
                min: MIN_BUFFER_SIZE
            }
        ));
    }

    #[test]
    fn pool_reuses_released_buffers() {
        let pool = BufferPool::new(32).unwrap();
        let mut buffer = pool.acquire();
        buffer.commit(10);
        buffer.advance(4);
        pool.release(buffer);
        assert_eq!(pool.idle(), 1);

        let reused = pool.acquire();
        assert_eq!(pool.idle(), 0);
        assert_eq!(reused.capacity(), 32);
        assert!(reused.is_empty());
        assert_eq!(reused.position(), 0);
    }

    #[test]
    fn pool_caps_idle_buffers_and_ignores_foreign_capacity() {
        let pool = BufferPool::with_max_idle(16, 1).unwrap();
        let first = pool.acquire();
        let second = pool.acquire();
        pool.release(first);
        pool.release(second);
        pool.release(ScratchBuffer::with_capacity(17));
        assert_eq!(pool.idle(), 1);
    }
}
