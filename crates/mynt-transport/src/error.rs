use std::io;
use std::net::SocketAddr;

/// Failures opening or using a TCP socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("cannot reach {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("accept failed: {0}")]
    Accept(io::Error),

    /// Socket option or address lookup on an established stream.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// The underlying OS error kind, whatever the operation.
    pub fn kind(&self) -> io::ErrorKind {
        self.source_io().kind()
    }

    pub fn source_io(&self) -> &io::Error {
        match self {
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => source,
            TransportError::Accept(source) | TransportError::Io(source) => source,
        }
    }

    /// The address a bind or connect was aimed at, if any.
    pub fn addr(&self) -> Option<SocketAddr> {
        match self {
            TransportError::Bind { addr, .. } | TransportError::Connect { addr, .. } => Some(*addr),
            TransportError::Accept(_) | TransportError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_keeps_kind_and_addr() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let err = TransportError::Connect {
            addr,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(err.addr(), Some(addr));
        assert!(err.to_string().starts_with("cannot reach 127.0.0.1:9"));
    }

    #[test]
    fn io_errors_have_no_addr() {
        let err = TransportError::from(io::Error::from(io::ErrorKind::NotConnected));
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(err.addr().is_none());
    }
}
