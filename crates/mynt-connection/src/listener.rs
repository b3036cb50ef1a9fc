use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use mynt_transport::{ChannelConfig, TcpSocket};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Listening sockets keyed by bound address, at most one per address.
#[derive(Debug, Default)]
pub(crate) struct Listeners {
    sockets: Mutex<HashMap<SocketAddr, Arc<TcpSocket>>>,
}

impl Listeners {
    /// Return the listener for `addr`, binding it on first use.
    ///
    /// The registry stays locked across the bind, so concurrent callers for
    /// one address never race two binds. Port 0 always binds a fresh
    /// ephemeral socket, registered under its real address.
    pub(crate) async fn get_or_bind(
        &self,
        addr: SocketAddr,
        config: &ChannelConfig,
    ) -> Result<Arc<TcpSocket>> {
        let mut sockets = self.sockets.lock().await;
        if let Some(socket) = sockets.get(&addr) {
            return Ok(Arc::clone(socket));
        }

        let socket = Arc::new(TcpSocket::bind_with_config(addr, config.clone()).await?);
        let local_addr = socket.local_addr();
        if local_addr != addr {
            debug!(requested = %addr, %local_addr, "registered listener under bound address");
        }
        sockets.insert(local_addr, Arc::clone(&socket));
        Ok(socket)
    }

    pub(crate) async fn addresses(&self) -> Vec<SocketAddr> {
        self.sockets.lock().await.keys().copied().collect()
    }

    /// Forget every listener; sockets close once in-flight accepts let go.
    pub(crate) async fn clear(&self) {
        self.sockets.lock().await.clear();
    }
}
