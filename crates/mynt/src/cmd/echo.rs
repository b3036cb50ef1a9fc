use std::io;

use mynt_connection::{Connection, ConnectionConfig, ConnectionError, Provider};
use mynt_io::IoError;
use mynt_transport::Transport;
use tracing::{debug, info, warn};

use crate::cmd::{provider, shutdown_on_ctrl_c, EchoArgs};
use crate::exit::{connection_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub async fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let shutdown = shutdown_on_ctrl_c();
    let config = ConnectionConfig::default().with_buffer_size(args.buffer.buffer_size);
    let provider = provider(config, shutdown)?;

    let addr = provider
        .bind(args.addr)
        .await
        .map_err(|err| connection_error("bind failed", err))?;
    info!(%addr, "echo server listening");

    loop {
        let connection = match provider.accept(addr).await {
            Ok(connection) => connection,
            Err(ConnectionError::ProviderClosed) => break,
            Err(err) => return Err(connection_error("accept failed", err)),
        };
        info!(id = connection.id(), peer = ?connection.peer_addr(), "client connected");
        tokio::spawn(serve(connection, args.max_message));
    }

    provider.close().await;
    Ok(SUCCESS)
}

async fn serve<T: Transport>(connection: Connection<T>, max_message: usize) {
    let mut echoed = 0usize;
    loop {
        match echo_message(&connection, max_message).await {
            Ok(size) => {
                echoed += 1;
                debug!(id = connection.id(), size, "echoed message");
            }
            Err(err) if err.is_closed() => break,
            Err(err) => {
                warn!(id = connection.id(), error = %err, "echo failed");
                break;
            }
        }
    }
    info!(id = connection.id(), echoed, "client disconnected");
    if let Err(err) = connection.close().await {
        debug!(id = connection.id(), error = %err, "close failed");
    }
}

/// Read one `int` length-prefixed message and write it straight back.
async fn echo_message<T: Transport>(
    connection: &Connection<T>,
    max_message: usize,
) -> mynt_io::Result<usize> {
    let length = connection.read().int().await?;
    let size = usize::try_from(length)
        .ok()
        .filter(|size| *size <= max_message)
        .ok_or_else(|| {
            IoError::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message length {length} outside 0..={max_message}"),
            ))
        })?;

    let body = connection.read().bytes_vec(size).await?;
    let writer = connection.write();
    writer.int(length).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mynt_io::BufferPool;
    use tokio::io::DuplexStream;

    use super::*;

    fn pair() -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let pool = Arc::new(BufferPool::new(8).unwrap());
        let (left, right) = tokio::io::duplex(1024);
        (
            Connection::with_pool(left, &pool),
            Connection::with_pool(right, &pool),
        )
    }

    #[tokio::test]
    async fn echoes_message_larger_than_buffer() {
        let (client, server) = pair();
        let body: Vec<u8> = (0..100).collect();

        client.write().int(100).await.unwrap();
        client.write().write_all(&body).await.unwrap();

        assert_eq!(echo_message(&server, 1024).await.unwrap(), 100);
        assert_eq!(client.read().int().await.unwrap(), 100);
        assert_eq!(client.read().bytes_vec(100).await.unwrap(), body);
    }

    #[tokio::test]
    async fn empty_message_is_echoed() {
        let (client, server) = pair();
        client.write().int(0).await.unwrap();

        assert_eq!(echo_message(&server, 16).await.unwrap(), 0);
        assert_eq!(client.read().int().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn negative_or_oversized_length_is_invalid_data() {
        let (client, server) = pair();
        client.write().int(-1).await.unwrap();
        client.write().int(17).await.unwrap();

        for _ in 0..2 {
            let err = echo_message(&server, 16).await.unwrap_err();
            assert!(matches!(err, IoError::Transport(ref e) if e.kind() == io::ErrorKind::InvalidData));
        }
    }

    #[tokio::test]
    async fn serve_stops_at_end_of_stream() {
        let (client, server) = pair();
        client.write().int(2).await.unwrap();
        client.write().write_all(b"ok").await.unwrap();
        client.close().await.unwrap();

        serve(server.clone(), 16).await;
        assert!(!server.is_open());
    }
}
