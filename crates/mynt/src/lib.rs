//! Async zero-copy byte-stream I/O.
//!
//! mynt exposes connections with suspendable typed reads and writes
//! (big-endian numbers, byte ranges, skips) over pluggable transports, each
//! direction backed by a single pooled scratch buffer.
//!
//! # Crate Structure
//!
//! - [`transport`]: Transport abstraction, TCP sockets, in-memory duplex
//! - [`io`]: Scratch buffers and the read/write coordinators
//! - [`connection`]: Connections and connection providers
//!
//! # Example
//!
//! ```no_run
//! use mynt::connection::{ConnectionConfig, Provider, TcpProvider};
//!
//! # async fn demo() -> mynt::connection::Result<()> {
//! let provider = TcpProvider::new(ConnectionConfig::default())?;
//! let connection = provider.connect("127.0.0.1:9000".parse().unwrap()).await?;
//! connection.write().int(42).await?;
//! let reply = connection.read().long().await?;
//! # let _ = reply;
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use mynt_transport::*;
}

/// Re-export buffer and coordinator types.
pub mod io {
    pub use mynt_io::*;
}

/// Re-export connection and provider types.
pub mod connection {
    pub use mynt_connection::*;
}

pub use mynt_connection::{Connection, ConnectionConfig, ConnectionError, Provider, TcpProvider};
