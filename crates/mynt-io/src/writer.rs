use std::sync::{Arc, Weak};

use bytes::Buf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::{BufferPool, ScratchBuffer, MIN_BUFFER_SIZE};
use crate::error::{IoError, Result};
use crate::inflight::{until_closed, AbandonGuard};
use crate::number::Number;

/// The write request currently waiting on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingWrite {
    /// Bytes of the request not yet accepted by the transport.
    Drain { required: usize },
}

impl PendingWrite {
    fn required(&self) -> usize {
        match *self {
            PendingWrite::Drain { required } => required,
        }
    }

    /// Apply one transport completion; `None` once nothing is left.
    fn transition(self, count: usize) -> Option<PendingWrite> {
        match self {
            PendingWrite::Drain { required } if count >= required => None,
            PendingWrite::Drain { required } => Some(PendingWrite::Drain {
                required: required - count,
            }),
        }
    }
}

/// Drains write requests into one transport write half.
///
/// Caller buffers are written straight from their own memory; numbers and
/// zero padding are staged in the scratch buffer first. Every request
/// completes only once the transport has accepted all of its bytes.
pub struct WriteCoordinator<W> {
    transport: W,
    buffer: ScratchBuffer,
    pending: Option<PendingWrite>,
    closed: CancellationToken,
    pool: Option<Arc<BufferPool>>,
}

impl<W> WriteCoordinator<W> {
    /// Create a coordinator owning `buffer`.
    pub fn new(transport: W, buffer: ScratchBuffer) -> Result<Self> {
        if buffer.capacity() < MIN_BUFFER_SIZE {
            return Err(IoError::CapacityTooSmall {
                capacity: buffer.capacity(),
                min: MIN_BUFFER_SIZE,
            });
        }
        Ok(Self {
            transport,
            buffer,
            pending: None,
            closed: CancellationToken::new(),
            pool: None,
        })
    }

    /// Create a coordinator whose buffer comes from, and returns to, `pool`.
    pub fn from_pool(transport: W, pool: &Arc<BufferPool>) -> Self {
        Self {
            transport,
            buffer: pool.acquire(),
            pending: None,
            closed: CancellationToken::new(),
            pool: Some(Arc::clone(pool)),
        }
    }

    /// Fail requests with [`IoError::Closed`] once `closed` is cancelled.
    pub fn with_close_signal(mut self, closed: CancellationToken) -> Self {
        self.closed = closed;
        self
    }

    pub fn close_signal(&self) -> &CancellationToken {
        &self.closed
    }

    pub fn scratch(&self) -> &ScratchBuffer {
        &self.buffer
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn get_ref(&self) -> &W {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.transport
    }

    fn begin(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(IoError::Closed);
        }
        if self.pending.is_some() {
            return Err(IoError::WritePending);
        }
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin> WriteCoordinator<W> {
    /// Write every remaining byte of `src`, straight from its chunks.
    ///
    /// Returns the number of bytes written.
    pub async fn buffer<B: Buf>(&mut self, src: &mut B) -> Result<usize> {
        self.begin()?;
        let amount = src.remaining();
        if amount == 0 {
            return Ok(0);
        }

        let guard = AbandonGuard::new(self.closed.clone(), "write");
        self.pending = Some(PendingWrite::Drain { required: amount });
        let result = drain(&mut self.transport, &self.closed, &mut self.pending, src).await;
        self.pending = None;
        guard.disarm();

        self.buffer.clear();
        result.map(|()| amount)
    }

    /// Write `src[offset..offset + amount]`.
    pub async fn bytes(&mut self, src: &[u8], amount: usize, offset: usize) -> Result<usize> {
        let end = offset
            .checked_add(amount)
            .filter(|end| *end <= src.len())
            .ok_or(IoError::OutOfBounds {
                offset,
                amount,
                len: src.len(),
            })?;
        let mut span = &src[offset..end];
        self.buffer(&mut span).await
    }

    /// Write all of `src`.
    pub async fn write_all(&mut self, src: &[u8]) -> Result<usize> {
        self.bytes(src, src.len(), 0).await
    }

    /// Encode `value` big-endian and write it.
    pub async fn number<N: Number>(&mut self, value: N) -> Result<()> {
        self.begin()?;
        self.buffer.clear();
        value.encode(self.buffer.spare_mut());
        self.buffer.commit(N::WIDTH);
        self.drain_scratch().await
    }

    pub async fn byte(&mut self, value: i8) -> Result<()> {
        self.number(value).await
    }

    pub async fn short(&mut self, value: i16) -> Result<()> {
        self.number(value).await
    }

    pub async fn int(&mut self, value: i32) -> Result<()> {
        self.number(value).await
    }

    pub async fn long(&mut self, value: i64) -> Result<()> {
        self.number(value).await
    }

    pub async fn float(&mut self, value: f32) -> Result<()> {
        self.number(value).await
    }

    pub async fn double(&mut self, value: f64) -> Result<()> {
        self.number(value).await
    }

    /// Write `amount` zero bytes, at most one scratch buffer per chunk.
    pub async fn skip(&mut self, amount: usize) -> Result<()> {
        self.begin()?;
        let mut outstanding = amount;
        while outstanding > 0 {
            let chunk = outstanding.min(self.buffer.capacity());
            self.buffer.clear();
            self.buffer.spare_mut()[..chunk].fill(0);
            self.buffer.commit(chunk);
            outstanding -= chunk;

            self.drain_scratch().await.map_err(|err| match err {
                IoError::ClosedStream { required } => IoError::ClosedStream {
                    required: required + outstanding,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Flush the transport.
    pub async fn flush(&mut self) -> Result<()> {
        self.begin()?;
        let guard = AbandonGuard::new(self.closed.clone(), "flush");
        let result = loop {
            let transport = &mut self.transport;
            let flushed = until_closed(&self.closed, async move {
                transport.flush().await.map(|()| 0)
            })
            .await;
            match flushed {
                Ok(None) => continue,
                other => break other.map(|_| ()),
            }
        };
        guard.disarm();
        result
    }

    /// Shut down the write direction of the transport.
    ///
    /// Runs even after the close signal fired, since closing is what
    /// triggers it.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.pending.is_some() {
            if !self.closed.is_cancelled() {
                return Err(IoError::WritePending);
            }
            // Left behind by a dropped request; nothing will resume it.
            self.pending = None;
        }
        debug!("shutting down write half");
        self.transport.shutdown().await.map_err(IoError::Transport)
    }

    async fn drain_scratch(&mut self) -> Result<()> {
        let guard = AbandonGuard::new(self.closed.clone(), "write");
        let mut readable = self.buffer.readable();
        self.pending = Some(PendingWrite::Drain {
            required: readable.len(),
        });
        let result = drain(&mut self.transport, &self.closed, &mut self.pending, &mut readable).await;
        self.pending = None;
        guard.disarm();

        self.buffer.clear();
        result
    }
}

/// Hand `src` to the transport until it is empty.
async fn drain<W, B>(
    transport: &mut W,
    closed: &CancellationToken,
    pending: &mut Option<PendingWrite>,
    src: &mut B,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    B: Buf,
{
    while let Some(current) = *pending {
        let Some(count) = until_closed(closed, transport.write(src.chunk())).await? else {
            continue;
        };
        if count == 0 {
            let required = current.required();
            debug!(required, "stream closed while write pending");
            return Err(IoError::ClosedStream { required });
        }

        src.advance(count);
        *pending = current.transition(count);
        trace!(count, next = ?*pending, "write progressed");
    }
    Ok(())
}

impl<W> Drop for WriteCoordinator<W> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::replace(&mut self.buffer, ScratchBuffer::empty()));
        }
    }
}

impl<W> std::fmt::Debug for WriteCoordinator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("buffer", &self.buffer)
            .field("pending", &self.pending)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Shareable write side of a connection.
///
/// Clones drive the same coordinator; a call made while another call is in
/// flight fails immediately with [`IoError::WritePending`].
pub struct Writer<W> {
    inner: Arc<Mutex<WriteCoordinator<W>>>,
}

impl<W> Clone for Writer<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl<W> Writer<W> {
    pub fn new(coordinator: WriteCoordinator<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(coordinator)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    pub fn downgrade(&self) -> WeakWriter<W> {
        WeakWriter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, WriteCoordinator<W>>> {
        self.inner.try_lock().map_err(|_| IoError::WritePending)
    }
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    pub async fn buffer<B: Buf>(&self, src: &mut B) -> Result<usize> {
        self.acquire()?.buffer(src).await
    }

    pub async fn bytes(&self, src: &[u8], amount: usize, offset: usize) -> Result<usize> {
        self.acquire()?.bytes(src, amount, offset).await
    }

    pub async fn write_all(&self, src: &[u8]) -> Result<usize> {
        self.acquire()?.write_all(src).await
    }

    pub async fn number<N: Number>(&self, value: N) -> Result<()> {
        self.acquire()?.number(value).await
    }

    pub async fn byte(&self, value: i8) -> Result<()> {
        self.number(value).await
    }

    pub async fn short(&self, value: i16) -> Result<()> {
        self.number(value).await
    }

    pub async fn int(&self, value: i32) -> Result<()> {
        self.number(value).await
    }

    pub async fn long(&self, value: i64) -> Result<()> {
        self.number(value).await
    }

    pub async fn float(&self, value: f32) -> Result<()> {
        self.number(value).await
    }

    pub async fn double(&self, value: f64) -> Result<()> {
        self.number(value).await
    }

    pub async fn skip(&self, amount: usize) -> Result<()> {
        self.acquire()?.skip(amount).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.acquire()?.flush().await
    }

    /// Shut down the write direction.
    ///
    /// Waits for an in-flight write to resolve first. Once the close signal
    /// has fired that write fails at its next suspension point, so the wait
    /// is short.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

/// A write side reference that does not keep the coordinator alive.
pub struct WeakWriter<W> {
    inner: Weak<Mutex<WriteCoordinator<W>>>,
}

impl<W> WeakWriter<W> {
    /// The write side, if some [`Writer`] still holds it.
    pub fn upgrade(&self) -> Option<Writer<W>> {
        self.inner.upgrade().map(|inner| Writer { inner })
    }
}

impl<W> Clone for WeakWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}
