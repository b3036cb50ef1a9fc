//! Connections and connection providers.
//!
//! A [`Connection`] binds a read coordinator and a write coordinator to one
//! transport. A [`Provider`] hands out connections: [`TcpProvider`] listens
//! with at most one socket per address and caches outbound connections.

pub mod config;
pub mod connection;
mod connector;
pub mod error;
mod listener;
pub mod provider;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use error::{ConnectionError, Result};
pub use provider::{Provider, TcpProvider};
