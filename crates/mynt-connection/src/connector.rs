use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mynt_transport::Transport;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{ConnectionError, Result};

type Slot<T> = Arc<OnceCell<Connection<T>>>;

/// Outbound connections cached by remote address.
///
/// Each address maps to a slot that is filled by exactly one dial.
/// Concurrent callers for the same address wait on that dial instead of
/// starting their own. A slot whose connection has closed is replaced.
pub(crate) struct Outbound<T: Transport = TcpStream> {
    slots: Mutex<HashMap<SocketAddr, Slot<T>>>,
}

impl<T: Transport> Default for Outbound<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Transport> Outbound<T> {
    pub(crate) async fn get_or_connect<F, Fut>(&self, addr: SocketAddr, dial: F) -> Result<Connection<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Connection<T>>>,
    {
        let slot = self.slot(addr);
        let connection = slot.get_or_try_init(dial).await?;
        trace!(%addr, id = connection.id(), "outbound connection ready");
        Ok(connection.clone())
    }

    fn slot(&self, addr: SocketAddr) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(&addr) {
            // An empty slot is a dial in progress, or one that failed and
            // will be retried by the next caller.
            if slot.get().is_none_or(Connection::is_open) {
                return Arc::clone(slot);
            }
            debug!(%addr, "replacing closed outbound connection");
        }
        let slot = Slot::<T>::default();
        slots.insert(addr, Arc::clone(&slot));
        slot
    }

    /// Remove every slot, returning the connections they held.
    pub(crate) fn drain(&self) -> Vec<Connection<T>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .drain()
            .filter_map(|(_, slot)| slot.get().cloned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Bound `dial` by `timeout`, when one is set.
pub(crate) async fn with_timeout<V, Fut>(timeout: Option<Duration>, dial: Fut) -> Result<V>
where
    Fut: Future<Output = Result<V>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, dial)
            .await
            .map_err(|_| ConnectionError::Timeout(limit))?,
        None => dial.await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mynt_io::BufferPool;
    use tokio::io::DuplexStream;

    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    /// Dials backed by in-memory streams; the far ends are kept alive.
    struct FakeDialer {
        pool: Arc<BufferPool>,
        dials: AtomicUsize,
        peers: Mutex<Vec<DuplexStream>>,
    }

    impl FakeDialer {
        fn new() -> Self {
            Self {
                pool: Arc::new(BufferPool::new(16).unwrap()),
                dials: AtomicUsize::new(0),
                peers: Mutex::new(Vec::new()),
            }
        }

        async fn dial(&self) -> Result<Connection<DuplexStream>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let (near, far) = tokio::io::duplex(64);
            self.peers.lock().unwrap().push(far);
            Ok(Connection::with_pool(near, &self.pool))
        }

        fn dials(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn repeated_connect_reuses_open_connection() {
        let dialer = FakeDialer::new();
        let outbound = Outbound::<DuplexStream>::default();

        let first = outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();
        let second = outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(dialer.dials(), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_dial() {
        let dialer = FakeDialer::new();
        let outbound = Outbound::<DuplexStream>::default();

        let (a, b) = tokio::join!(
            outbound.get_or_connect(addr(), || dialer.dial()),
            outbound.get_or_connect(addr(), || dialer.dial()),
        );

        assert_eq!(a.unwrap().id(), b.unwrap().id());
        assert_eq!(dialer.dials(), 1);
        assert_eq!(outbound.len(), 1);
    }

    #[tokio::test]
    async fn closed_connection_is_replaced() {
        let dialer = FakeDialer::new();
        let outbound = Outbound::<DuplexStream>::default();

        let first = outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();
        first.close().await.unwrap();

        let second = outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert!(second.is_open());
        assert_eq!(dialer.dials(), 2);
    }

    #[tokio::test]
    async fn failed_dial_is_retried_by_next_caller() {
        let dialer = FakeDialer::new();
        let outbound = Outbound::<DuplexStream>::default();

        let err = outbound
            .get_or_connect(addr(), || async { Err(ConnectionError::ProviderClosed) })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::ProviderClosed));

        let connection = outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();
        assert!(connection.is_open());
        assert_eq!(dialer.dials(), 1);
    }

    #[tokio::test]
    async fn drain_returns_cached_connections() {
        let dialer = FakeDialer::new();
        let outbound = Outbound::<DuplexStream>::default();
        let other: SocketAddr = "127.0.0.1:4001".parse().unwrap();

        outbound.get_or_connect(addr(), || dialer.dial()).await.unwrap();
        outbound.get_or_connect(other, || dialer.dial()).await.unwrap();

        assert_eq!(outbound.drain().len(), 2);
        assert_eq!(outbound.len(), 0);
    }

    #[tokio::test]
    async fn timeout_maps_to_timeout_error() {
        let limit = Duration::from_millis(10);
        let err = with_timeout(Some(limit), std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn dial_errors_pass_through_timeout() {
        let err = with_timeout(Some(Duration::from_secs(5)), async {
            Err::<(), _>(ConnectionError::ProviderClosed)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ConnectionError::ProviderClosed));

        let value = with_timeout(None, async { Ok::<_, ConnectionError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
