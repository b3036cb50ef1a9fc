use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mynt_io::{BufferPool, IoError, ReadCoordinator, Reader, WriteCoordinator, Writer};
use mynt_transport::Transport;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::error::{ConnectionError, Result};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One live duplex channel with a read side and a write side.
///
/// Each side owns a pooled scratch buffer and serves one request at a
/// time. Clones share both sides and the open/closed state, so a
/// connection can be cached and handed out more than once.
///
/// However the connection closes (an explicit [`close`](Self::close), a
/// dropped in-flight request, or a parent signal such as provider shutdown),
/// its write half is shut down so the peer sees end of stream.
pub struct Connection<T: Transport = TcpStream> {
    reader: Reader<T::Reader>,
    writer: Writer<T::Writer>,
    closed: CancellationToken,
    released: Arc<OnceCell<()>>,
    // Declared after `writer`: fires once the last clone has let go of it.
    _cancel_on_drop: Arc<DropGuard>,
    peer_addr: Option<SocketAddr>,
    transport: &'static str,
    id: u64,
}

impl<T: Transport> Connection<T> {
    /// Wrap `transport` using buffers from `pool`.
    ///
    /// Inside a tokio runtime a background task shuts the write half down
    /// when the connection closes by any route; outside one, only
    /// [`close`](Self::close) does.
    pub fn with_pool(transport: T, pool: &Arc<BufferPool>) -> Self {
        let connection = Self::establish(transport, pool, CancellationToken::new());
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(connection.release_on_close());
        }
        connection
    }

    /// Wrap `transport`; the connection closes when `closed` is cancelled.
    ///
    /// The caller runs `release_on_close` for it.
    pub(crate) fn establish(transport: T, pool: &Arc<BufferPool>, closed: CancellationToken) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let peer_addr = transport.peer_addr();
        let name = transport.transport_name();
        let (read_half, write_half) = transport.split();

        let reader = Reader::new(ReadCoordinator::from_pool(read_half, pool).with_close_signal(closed.clone()));
        let writer = Writer::new(WriteCoordinator::from_pool(write_half, pool).with_close_signal(closed.clone()));

        debug!(id, transport = name, peer = ?peer_addr, "connection established");

        Self {
            reader,
            writer,
            _cancel_on_drop: Arc::new(closed.clone().drop_guard()),
            closed,
            released: Arc::new(OnceCell::new()),
            peer_addr,
            transport: name,
            id,
        }
    }

    /// A task that waits for the close signal, then shuts the write half
    /// down. It holds no strong reference, so dropping every clone ends it.
    pub(crate) fn release_on_close(&self) -> impl Future<Output = ()> + Send + 'static {
        let writer = self.writer.downgrade();
        let closed = self.closed.clone();
        let released = Arc::clone(&self.released);
        let id = self.id;
        async move {
            closed.cancelled().await;
            let Some(writer) = writer.upgrade() else {
                return;
            };
            if let Err(err) = release(id, &writer, &released).await {
                debug!(id, error = %err, "write half release failed");
            }
        }
    }

    /// The read side.
    pub fn read(&self) -> &Reader<T::Reader> {
        &self.reader
    }

    /// The write side.
    pub fn write(&self) -> &Writer<T::Writer> {
        &self.writer
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Close the connection. Safe to call any number of times.
    ///
    /// In-flight requests on either side fail with [`IoError::Closed`]. The
    /// write direction is shut down once any in-flight write has unwound;
    /// every caller waits for that single shutdown.
    pub async fn close(&self) -> Result<()> {
        if !self.closed.is_cancelled() {
            debug!(id = self.id, "closing connection");
        }
        self.closed.cancel();
        release(self.id, &self.writer, &self.released).await
    }

    /// Resolves once the connection is closed, by any route.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport
    }
}

/// Shut the write half down at most once. A failed attempt leaves the cell
/// empty, so the next close retries.
async fn release<W>(id: u64, writer: &Writer<W>, released: &OnceCell<()>) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    released
        .get_or_try_init(|| async {
            match writer.shutdown().await {
                Ok(()) => {
                    debug!(id, "write half shut down");
                    Ok(())
                }
                // The peer may already be gone.
                Err(IoError::Transport(err))
                    if matches!(err.kind(), ErrorKind::NotConnected | ErrorKind::BrokenPipe) =>
                {
                    Ok(())
                }
                Err(err) => Err(ConnectionError::from(err)),
            }
        })
        .await
        .map(|_| ())
}

impl<T: Transport> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            writer: self.writer.clone(),
            closed: self.closed.clone(),
            released: Arc::clone(&self.released),
            _cancel_on_drop: Arc::clone(&self._cancel_on_drop),
            peer_addr: self.peer_addr,
            transport: self.transport,
            id: self.id,
        }
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("peer_addr", &self.peer_addr)
            .field("open", &self.is_open())
            .finish()
    }
}
