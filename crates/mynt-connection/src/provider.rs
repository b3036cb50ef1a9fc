use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use mynt_io::BufferPool;
use mynt_transport::{TcpSocket, Transport};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::connector::{with_timeout, Outbound};
use crate::error::{ConnectionError, Result};
use crate::listener::Listeners;

/// Source of connections: accepts inbound and dials outbound.
pub trait Provider: Send + Sync {
    type Transport: Transport;

    /// Accept the next inbound connection on `address`, listening there
    /// first if nothing is yet.
    fn accept(
        &self,
        address: SocketAddr,
    ) -> impl Future<Output = Result<Connection<Self::Transport>>> + Send;

    /// Connect to `address`.
    fn connect(
        &self,
        address: SocketAddr,
    ) -> impl Future<Output = Result<Connection<Self::Transport>>> + Send;

    fn is_open(&self) -> bool;

    /// Stop listening and close every connection this provider created.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// TCP connection provider.
///
/// Keeps at most one listener per address and caches outbound connections
/// by remote address. Every connection it hands out, accepted or dialed,
/// closes when the provider does and has its write half shut down before
/// [`close`](Provider::close) returns.
pub struct TcpProvider {
    config: ConnectionConfig,
    pool: Arc<BufferPool>,
    shutdown: CancellationToken,
    listeners: Listeners,
    outbound: Outbound,
    releases: TaskTracker,
}

impl TcpProvider {
    /// Create a provider with its own shutdown signal.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Create a provider that closes when `shutdown` is cancelled.
    pub fn with_shutdown(config: ConnectionConfig, shutdown: CancellationToken) -> Result<Self> {
        let pool = Arc::new(config.buffer_pool()?);
        Ok(Self {
            config,
            pool,
            shutdown,
            listeners: Listeners::default(),
            outbound: Outbound::default(),
            releases: TaskTracker::new(),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Listen on `address` ahead of any `accept`, returning the bound
    /// address (useful with port 0).
    pub async fn bind(&self, address: SocketAddr) -> Result<SocketAddr> {
        self.ensure_open()?;
        let socket = self
            .listeners
            .get_or_bind(address, &self.config.channel)
            .await?;
        Ok(socket.local_addr())
    }

    /// Addresses currently listened on.
    pub async fn listening(&self) -> Vec<SocketAddr> {
        self.listeners.addresses().await
    }

    /// The signal that closes this provider and its connections.
    pub fn shutdown_signal(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::ProviderClosed);
        }
        Ok(())
    }

    fn establish(&self, stream: TcpStream) -> Connection {
        let connection = Connection::establish(stream, &self.pool, self.shutdown.child_token());
        self.releases.spawn(connection.release_on_close());
        connection
    }

    async fn dial(&self, address: SocketAddr) -> Result<Connection> {
        let stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ConnectionError::ProviderClosed),
            dialed = with_timeout(self.config.connect_timeout, async {
                TcpSocket::connect_with_config(address, &self.config.channel)
                    .await
                    .map_err(ConnectionError::from)
            }) => dialed?,
        };
        Ok(self.establish(stream))
    }
}

impl Provider for TcpProvider {
    type Transport = TcpStream;

    async fn accept(&self, address: SocketAddr) -> Result<Connection> {
        self.ensure_open()?;
        let socket = self
            .listeners
            .get_or_bind(address, &self.config.channel)
            .await?;

        let stream = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ConnectionError::ProviderClosed),
            accepted = socket.accept() => accepted?,
        };
        Ok(self.establish(stream))
    }

    async fn connect(&self, address: SocketAddr) -> Result<Connection> {
        self.ensure_open()?;
        if !self.config.reuse_connections {
            return self.dial(address).await;
        }
        self.outbound
            .get_or_connect(address, || self.dial(address))
            .await
    }

    fn is_open(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    async fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("closing tcp provider");
        }
        self.shutdown.cancel();
        self.listeners.clear().await;
        for connection in self.outbound.drain() {
            if let Err(err) = connection.close().await {
                debug!(id = connection.id(), error = %err, "outbound close failed");
            }
        }
        // Each release task woke with the cancelled signal.
        self.releases.close();
        self.releases.wait().await;
        debug!("all connections released");
    }
}

impl std::fmt::Debug for TcpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpProvider")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .field("outbound", &self.outbound.len())
            .field("live", &self.releases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use mynt_io::IoError;

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn provider() -> Arc<TcpProvider> {
        Arc::new(TcpProvider::new(ConnectionConfig::default().with_buffer_size(64)).unwrap())
    }

    #[tokio::test]
    async fn accept_and_connect_exchange_values() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();

        let accepted = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                let connection = server.accept(addr).await.unwrap();
                let value = connection.read().int().await.unwrap();
                connection.write().long(i64::from(value) * 2).await.unwrap();
                connection
            }
        });

        let client = provider();
        let connection = client.connect(addr).await.unwrap();
        assert_eq!(connection.peer_addr(), Some(addr));
        assert_eq!(connection.transport_name(), "tcp");

        connection.write().int(21).await.unwrap();
        assert_eq!(connection.read().long().await.unwrap(), 42);

        let inbound = accepted.await.unwrap();
        assert!(inbound.is_open());
    }

    #[tokio::test]
    async fn bind_twice_reuses_listener() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        assert_eq!(server.bind(addr).await.unwrap(), addr);
        assert_eq!(server.listening().await, vec![addr]);
    }

    #[tokio::test]
    async fn connect_reuses_cached_connection() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        let _acceptor = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                let mut held = Vec::new();
                while let Ok(connection) = server.accept(addr).await {
                    held.push(connection);
                }
            }
        });

        let client = provider();
        let (a, b) = tokio::join!(client.connect(addr), client.connect(addr));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.id(), b.id());

        let c = client.connect(addr).await.unwrap();
        assert_eq!(a.id(), c.id());

        c.close().await.unwrap();
        let d = client.connect(addr).await.unwrap();
        assert_ne!(a.id(), d.id());

        server.close().await;
    }

    #[tokio::test]
    async fn connect_without_reuse_dials_every_time() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        let _acceptor = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                let mut held = Vec::new();
                while let Ok(connection) = server.accept(addr).await {
                    held.push(connection);
                }
            }
        });

        let client = TcpProvider::new(ConnectionConfig::default().with_reuse_connections(false)).unwrap();
        let a = client.connect(addr).await.unwrap();
        let b = client.connect(addr).await.unwrap();
        assert_ne!(a.id(), b.id());

        server.close().await;
    }

    #[tokio::test]
    async fn close_fails_pending_accept() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();

        let pending = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept(addr).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.close().await;
        assert!(!server.is_open());
        assert!(matches!(
            pending.await.unwrap(),
            Err(ConnectionError::ProviderClosed)
        ));
        assert!(matches!(
            server.accept(addr).await,
            Err(ConnectionError::ProviderClosed)
        ));
        assert!(matches!(
            server.bind(addr).await,
            Err(ConnectionError::ProviderClosed)
        ));
    }

    #[tokio::test]
    async fn close_closes_every_connection() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        let accepted = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept(addr).await.unwrap() }
        });

        let client = provider();
        let outbound = client.connect(addr).await.unwrap();
        let inbound = accepted.await.unwrap();

        client.close().await;
        assert!(!outbound.is_open());
        assert!(matches!(outbound.read().byte().await, Err(IoError::Closed)));
        assert!(matches!(
            client.connect(addr).await,
            Err(ConnectionError::ProviderClosed)
        ));

        // The far side sees end of stream once the write half shuts down.
        let err = inbound.read().int().await.unwrap_err();
        assert!(matches!(err, IoError::ClosedStream { required: 4 }));

        server.close().await;
        assert!(!inbound.is_open());
    }

    #[tokio::test]
    async fn server_close_ends_accepted_streams() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        let accepted = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept(addr).await.unwrap() }
        });

        let client = provider();
        let outbound = client.connect(addr).await.unwrap();
        let inbound = accepted.await.unwrap();
        inbound.write().short(3).await.unwrap();

        server.close().await;
        assert!(!inbound.is_open());

        assert_eq!(outbound.read().short().await.unwrap(), 3);
        let err = tokio::time::timeout(Duration::from_secs(1), outbound.read().int())
            .await
            .expect("peer should see end of stream")
            .unwrap_err();
        assert!(matches!(err, IoError::ClosedStream { required: 4 }));
        client.close().await;
    }

    #[tokio::test]
    async fn close_waits_for_writes_in_flight() {
        let server = provider();
        let addr = server.bind(loopback()).await.unwrap();
        let accepted = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept(addr).await.unwrap() }
        });

        let client = provider();
        let outbound = client.connect(addr).await.unwrap();
        let inbound = accepted.await.unwrap();

        // Nobody reads, so a large enough write stalls on the socket.
        let stalled = tokio::spawn({
            let inbound = inbound.clone();
            async move { inbound.write().write_all(&vec![1u8; 64 * 1024 * 1024]).await }
        });
        while !inbound.write().is_busy() {
            tokio::task::yield_now().await;
        }

        server.close().await;
        assert!(matches!(stalled.await.unwrap(), Err(IoError::Closed)));

        let mut sink = BytesMut::with_capacity(64 * 1024);
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                sink.clear();
                if let Err(err) = outbound.read().buffer(&mut sink).await {
                    break err;
                }
            }
        })
        .await
        .expect("peer should reach end of stream");
        assert!(matches!(drained, IoError::ClosedStream { .. }));
        client.close().await;
    }

    #[tokio::test]
    async fn injected_shutdown_closes_provider() {
        let shutdown = CancellationToken::new();
        let provider = TcpProvider::with_shutdown(ConnectionConfig::default(), shutdown.clone()).unwrap();
        assert!(provider.is_open());

        shutdown.cancel();
        assert!(!provider.is_open());
        assert!(matches!(
            provider.connect(loopback()).await,
            Err(ConnectionError::ProviderClosed)
        ));
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let addr = {
            let probe = TcpSocket::bind(loopback()).await.unwrap();
            probe.local_addr()
        };

        let client = provider();
        let err = client.connect(addr).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)));

        // A failed dial does not poison the cache.
        let server = provider();
        server.bind(addr).await.unwrap();
        let _acceptor = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.accept(addr).await }
        });
        assert!(client.connect(addr).await.is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = TcpProvider::new(ConnectionConfig::default().with_buffer_size(2)).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    }
}
