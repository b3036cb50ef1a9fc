use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Socket options applied to every accepted or connected stream.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Disable Nagle's algorithm. Default: true.
    pub nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl ChannelConfig {
    fn apply(&self, stream: &TcpStream) -> Result<()> {
        stream.set_nodelay(self.nodelay)?;
        Ok(())
    }
}

/// TCP listening socket.
///
/// Provides bind/accept/connect over tokio TCP. Accepting takes `&self`, so a
/// single listener can be shared by concurrent acceptors.
pub struct TcpSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ChannelConfig,
}

impl TcpSocket {
    /// Bind and listen on `addr` with default channel options.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_config(addr, ChannelConfig::default()).await
    }

    /// Bind and listen on `addr` with explicit channel options.
    ///
    /// Binding port 0 picks an ephemeral port; see [`TcpSocket::local_addr`].
    pub async fn bind_with_config(addr: SocketAddr, config: ChannelConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<TcpStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        self.config.apply(&stream)?;
        debug!(%peer, local = %self.local_addr, "accepted connection");
        Ok(stream)
    }

    /// Connect to a listening socket with default channel options.
    pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
        Self::connect_with_config(addr, &ChannelConfig::default()).await
    }

    /// Connect to a listening socket with explicit channel options.
    pub async fn connect_with_config(addr: SocketAddr, config: &ChannelConfig) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect { addr, source })?;
        config.apply(&stream)?;
        debug!(%addr, "connected to tcp socket");
        Ok(stream)
    }

    /// The address this socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        debug!(local = %self.local_addr, "closing tcp listener");
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish()
    }
}
