//! Minimal echo server: accepts clients and echoes `int`-prefixed messages.
//!
//! Run with:
//!   cargo run --example echo-server -- 127.0.0.1:7000
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7000 int:5 bytes:hello \
//!     --expect int,bytes:5

use mynt::connection::{Connection, ConnectionConfig, Provider, TcpProvider};

async fn echo(connection: Connection) -> Result<(), mynt::io::IoError> {
    loop {
        let length = match connection.read().int().await {
            Ok(length) => length,
            Err(err) if err.is_closed() => return Ok(()),
            Err(err) => return Err(err),
        };
        let body = connection.read().bytes_vec(length.max(0) as usize).await?;
        eprintln!("connection {}: echoing {} bytes", connection.id(), body.len());

        connection.write().int(length).await?;
        connection.write().write_all(&body).await?;
        connection.write().flush().await?;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7000".to_string())
        .parse()?;

    let provider = TcpProvider::new(ConnectionConfig::default())?;
    let addr = provider.bind(addr).await?;
    eprintln!("Listening on {addr}");

    loop {
        let connection = provider.accept(addr).await?;
        eprintln!("Client connected: {:?}", connection.peer_addr());
        tokio::spawn(async move {
            if let Err(err) = echo(connection.clone()).await {
                eprintln!("Client failed: {err}");
            }
            let _ = connection.close().await;
        });
    }
}
