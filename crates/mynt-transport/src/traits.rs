use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A connected duplex byte stream.
///
/// Connections never drive a transport as a whole: it is split once into a
/// read half and a write half, each owned by the coordinator for that
/// direction. Reads returning `Ok(0)` mean end of stream.
pub trait Transport: Send + 'static {
    /// Read half handed to the read coordinator.
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// Write half handed to the write coordinator.
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Reader, Self::Writer);

    /// Remote address, when the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl Transport for TcpStream {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.into_split()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// In-memory transport, see [`tokio::io::duplex`].
impl Transport for DuplexStream {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = WriteHalf<DuplexStream>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn transport_name(&self) -> &'static str {
        "duplex"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn duplex_halves_are_independent() {
        let (left, right) = tokio::io::duplex(64);
        assert_eq!(left.transport_name(), "duplex");
        assert!(left.peer_addr().is_none());

        let (mut left_read, mut left_write) = left.split();
        let (mut right_read, mut right_write) = right.split();

        left_write.write_all(b"ping").await.unwrap();
        right_write.write_all(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        right_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        left_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn dropped_peer_reads_as_eof() {
        let (left, right) = tokio::io::duplex(64);
        let (mut reader, _writer) = left.split();
        drop(right);

        let mut buf = [0u8; 8];
        let read = reader.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }
}
