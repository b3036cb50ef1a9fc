//! Pluggable async byte-stream transports.
//!
//! Provides a unified interface over the channels mynt connections run on:
//! - TCP sockets (tokio)
//! - In-memory duplex pipes (tests, in-process peers)
//!
//! This is the lowest layer of mynt. Everything else builds on top of
//! the [`Transport`] trait provided here.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{ChannelConfig, TcpSocket};
pub use traits::Transport;
