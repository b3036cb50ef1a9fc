/// Errors that can occur while establishing or using connections.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport-level error (bind, connect, accept).
    #[error("transport error: {0}")]
    Transport(#[from] mynt_transport::TransportError),

    /// Read or write request failed.
    #[error("io error: {0}")]
    Io(#[from] mynt_io::IoError),

    /// The provider was closed.
    #[error("provider closed")]
    ProviderClosed,

    /// Connecting took longer than the configured timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration rejected before use.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectionError {
    /// True when the underlying stream or connection is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            ConnectionError::Io(err) => err.is_closed(),
            ConnectionError::ProviderClosed => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
