use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::buffer::{BufferPool, ScratchBuffer, MIN_BUFFER_SIZE};
use crate::error::{IoError, Result};
use crate::inflight::{until_closed, AbandonGuard};
use crate::number::Number;

/// The read request currently waiting on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingRead {
    /// Bytes still to discard.
    Skip { required: usize },
    /// Next offset in the caller's slice and bytes still to copy there.
    Array { offset: usize, required: usize },
    /// Spare capacity of the caller's buffer still to fill.
    Buffer { required: usize },
    /// The number's window starts at `mark` in the scratch buffer.
    Number {
        width: usize,
        mark: usize,
        required: usize,
    },
}

impl PendingRead {
    fn required(&self) -> usize {
        match *self {
            PendingRead::Skip { required }
            | PendingRead::Array { required, .. }
            | PendingRead::Buffer { required }
            | PendingRead::Number { required, .. } => required,
        }
    }
}

enum Step {
    Continue(PendingRead),
    Complete,
}

/// Where a transport read lands.
enum Destination<'a> {
    /// The scratch buffer's free space.
    Scratch,
    /// The scratch buffer, copied out into the caller's slice.
    Slice(&'a mut [u8]),
    /// Straight into the caller's spare capacity.
    Bytes(&'a mut BytesMut),
}

/// Serves read requests from one scratch buffer and one transport read half.
///
/// Requests covered by buffered bytes complete without touching the
/// transport. Otherwise exactly one request is recorded as pending and the
/// coordinator issues transport reads until it is satisfied. Bytes a read
/// delivers past the end of the request stay buffered for the next one.
pub struct ReadCoordinator<R> {
    transport: R,
    buffer: ScratchBuffer,
    pending: Option<PendingRead>,
    closed: CancellationToken,
    pool: Option<Arc<BufferPool>>,
}

impl<R> ReadCoordinator<R> {
    /// Create a coordinator owning `buffer`.
    pub fn new(transport: R, buffer: ScratchBuffer) -> Result<Self> {
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
    pub fn from_pool(transport: R, pool: &Arc<BufferPool>) -> Self {
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

    /// The close signal observed by this coordinator.
    pub fn close_signal(&self) -> &CancellationToken {
        &self.closed
    }

    /// Inspect the scratch buffer.
    pub fn scratch(&self) -> &ScratchBuffer {
        &self.buffer
    }

    /// Bytes readable without touching the transport.
    pub fn buffered(&self) -> usize {
        self.buffer.remaining()
    }

    /// True while a request is waiting on the transport.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Borrow the transport.
    pub fn get_ref(&self) -> &R {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.transport
    }

    fn begin(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(IoError::Closed);
        }
        if self.pending.is_some() {
            return Err(IoError::ReadPending);
        }
        Ok(())
    }

    /// Apply one transport completion of `count` bytes to `pending`.
    fn transition(&mut self, pending: PendingRead, count: usize, dst: &mut Destination<'_>) -> Step {
        match pending {
            PendingRead::Skip { required } => {
                self.buffer.commit(count);
                if count >= required {
                    // Overshoot belongs to the next request.
                    self.buffer.advance(required);
                    Step::Complete
                } else {
                    self.buffer.clear();
                    Step::Continue(PendingRead::Skip {
                        required: required - count,
                    })
                }
            }
            PendingRead::Array { offset, required } => {
                self.buffer.commit(count);
                let copied = count.min(required);
                if let Destination::Slice(dst) = dst {
                    dst[offset..offset + copied].copy_from_slice(self.buffer.take(copied));
                }
                if copied == required {
                    Step::Complete
                } else {
                    self.buffer.clear();
                    Step::Continue(PendingRead::Array {
                        offset: offset + copied,
                        required: required - copied,
                    })
                }
            }
            PendingRead::Buffer { required } => {
                if count >= required {
                    Step::Complete
                } else {
                    Step::Continue(PendingRead::Buffer {
                        required: required - count,
                    })
                }
            }
            PendingRead::Number {
                width,
                mark,
                required,
            } => {
                self.buffer.commit(count);
                if count >= required {
                    self.buffer.set_position(mark);
                    Step::Complete
                } else {
                    Step::Continue(PendingRead::Number {
                        width,
                        mark,
                        required: required - count,
                    })
                }
            }
        }
    }
}

impl<R: AsyncRead + Unpin> ReadCoordinator<R> {
    /// Discard `amount` bytes.
    pub async fn skip(&mut self, amount: usize) -> Result<()> {
        self.begin()?;
        let remaining = self.buffer.remaining();
        if amount <= remaining {
            self.buffer.advance(amount);
            return Ok(());
        }
        // Whatever is buffered is skipped too.
        self.buffer.clear();
        self.await_transport(
            PendingRead::Skip {
                required: amount - remaining,
            },
            Destination::Scratch,
        )
        .await
    }

    /// Copy the next `amount` bytes into `dst[offset..offset + amount]`.
    ///
    /// Returns the number of bytes copied, always `amount` on success.
    pub async fn bytes(&mut self, dst: &mut [u8], amount: usize, offset: usize) -> Result<usize> {
        self.begin()?;
        let end = offset
            .checked_add(amount)
            .filter(|end| *end <= dst.len())
            .ok_or(IoError::OutOfBounds {
                offset,
                amount,
                len: dst.len(),
            })?;

        let remaining = self.buffer.remaining();
        if amount <= remaining {
            dst[offset..end].copy_from_slice(self.buffer.take(amount));
            return Ok(amount);
        }

        dst[offset..offset + remaining].copy_from_slice(self.buffer.take(remaining));
        self.buffer.clear();
        self.await_transport(
            PendingRead::Array {
                offset: offset + remaining,
                required: amount - remaining,
            },
            Destination::Slice(dst),
        )
        .await?;
        Ok(amount)
    }

    /// Fill all of `dst`.
    pub async fn fill(&mut self, dst: &mut [u8]) -> Result<usize> {
        let amount = dst.len();
        self.bytes(dst, amount, 0).await
    }

    /// Read the next `amount` bytes into a new vector.
    pub async fn bytes_vec(&mut self, amount: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; amount];
        self.bytes(&mut out, amount, 0).await?;
        Ok(out)
    }

    /// Fill the spare capacity of `dst` (`capacity() - len()` bytes).
    ///
    /// Buffered bytes are copied first; after that the transport reads
    /// directly into `dst`. Returns the number of bytes appended.
    pub async fn buffer(&mut self, dst: &mut BytesMut) -> Result<usize> {
        self.begin()?;
        let spare = dst.capacity() - dst.len();
        let buffered = spare.min(self.buffer.remaining());
        dst.extend_from_slice(self.buffer.take(buffered));

        let required = spare - buffered;
        if required == 0 {
            return Ok(spare);
        }
        self.await_transport(PendingRead::Buffer { required }, Destination::Bytes(dst))
            .await?;
        Ok(spare)
    }

    /// Decode the next big-endian number.
    pub async fn number<N: Number>(&mut self) -> Result<N> {
        self.begin()?;
        let width = N::WIDTH;
        let remaining = self.buffer.remaining();
        if width <= remaining {
            return Ok(N::decode(self.buffer.take(width)));
        }

        // Keep the buffered prefix of the number readable while the rest
        // arrives: extend in place when it fits, compact when it does not,
        // rewind when nothing is buffered.
        let required = width - remaining;
        let mark = if remaining == 0 {
            self.buffer.clear();
            0
        } else if self.buffer.free() < required {
            self.buffer.compact();
            0
        } else {
            self.buffer.position()
        };

        self.await_transport(
            PendingRead::Number {
                width,
                mark,
                required,
            },
            Destination::Scratch,
        )
        .await?;
        Ok(N::decode(self.buffer.take(width)))
    }

    pub async fn byte(&mut self) -> Result<i8> {
        self.number().await
    }

    pub async fn short(&mut self) -> Result<i16> {
        self.number().await
    }

    pub async fn int(&mut self) -> Result<i32> {
        self.number().await
    }

    pub async fn long(&mut self) -> Result<i64> {
        self.number().await
    }

    pub async fn float(&mut self) -> Result<f32> {
        self.number().await
    }

    pub async fn double(&mut self) -> Result<f64> {
        self.number().await
    }

    async fn await_transport(&mut self, pending: PendingRead, mut dst: Destination<'_>) -> Result<()> {
        trace!(?pending, buffer = ?self.buffer, "read awaiting transport");
        let guard = AbandonGuard::new(self.closed.clone(), "read");
        self.pending = Some(pending);

        let result = self.drive(pending, &mut dst).await;

        self.pending = None;
        guard.disarm();
        result
    }

    async fn drive(&mut self, mut pending: PendingRead, dst: &mut Destination<'_>) -> Result<()> {
        loop {
            let outcome = match dst {
                Destination::Bytes(bytes) => {
                    until_closed(&self.closed, self.transport.read_buf(&mut **bytes)).await?
                }
                Destination::Scratch | Destination::Slice(_) => {
                    until_closed(&self.closed, self.transport.read(self.buffer.spare_mut())).await?
                }
            };
            let Some(count) = outcome else {
                continue;
            };

            if count == 0 {
                let required = pending.required();
                debug!(?pending, required, "stream closed while read pending");
                return Err(IoError::ClosedStream { required });
            }

            match self.transition(pending, count, dst) {
                Step::Complete => {
                    trace!(count, buffered = self.buffer.remaining(), "read completed");
                    return Ok(());
                }
                Step::Continue(next) => {
                    trace!(count, ?next, "partial read");
                    pending = next;
                    self.pending = Some(next);
                }
            }
        }
    }
}

impl<R> Drop for ReadCoordinator<R> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::replace(&mut self.buffer, ScratchBuffer::empty()));
        }
    }
}

impl<R> std::fmt::Debug for ReadCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCoordinator")
            .field("buffer", &self.buffer)
            .field("pending", &self.pending)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Shareable read side of a connection.
///
/// Clones drive the same coordinator. A call made while another call is in
/// flight fails immediately with [`IoError::ReadPending`]; it never waits.
pub struct Reader<R> {
    inner: Arc<Mutex<ReadCoordinator<R>>>,
}

impl<R> Clone for Reader<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for Reader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl<R> Reader<R> {
    pub fn new(coordinator: ReadCoordinator<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(coordinator)),
        }
    }

    /// True while a call holds the coordinator.
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ReadCoordinator<R>>> {
        self.inner.try_lock().map_err(|_| IoError::ReadPending)
    }
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub async fn skip(&self, amount: usize) -> Result<()> {
        self.acquire()?.skip(amount).await
    }

    pub async fn bytes(&self, dst: &mut [u8], amount: usize, offset: usize) -> Result<usize> {
        self.acquire()?.bytes(dst, amount, offset).await
    }

    pub async fn fill(&self, dst: &mut [u8]) -> Result<usize> {
        self.acquire()?.fill(dst).await
    }

    pub async fn bytes_vec(&self, amount: usize) -> Result<Vec<u8>> {
        self.acquire()?.bytes_vec(amount).await
    }

    pub async fn buffer(&self, dst: &mut BytesMut) -> Result<usize> {
        self.acquire()?.buffer(dst).await
    }

    pub async fn number<N: Number>(&self) -> Result<N> {
        self.acquire()?.number().await
    }

    pub async fn byte(&self) -> Result<i8> {
        self.number().await
    }

    pub async fn short(&self) -> Result<i16> {
        self.number().await
    }

    pub async fn int(&self) -> Result<i32> {
        self.number().await
    }

    pub async fn long(&self) -> Result<i64> {
        self.number().await
    }

    pub async fn float(&self) -> Result<f32> {
        self.number().await
    }

    pub async fn double(&self) -> Result<f64> {
        self.number().await
    }
}
