use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Subcommand};
use mynt_connection::{ConnectionConfig, TcpProvider};
use tokio_util::sync::CancellationToken;

use crate::exit::{connection_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;
use crate::value::{Expect, Value};

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Echo length-prefixed messages back to every client.
    Echo(EchoArgs),
    /// Connect and write typed values.
    Send(SendArgs),
    /// Accept connections and print decoded values.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args, format),
    }
}

/// Options shared by every command that opens connections.
#[derive(Args, Debug, Clone)]
pub struct BufferArgs {
    /// Scratch buffer size per direction in bytes.
    #[arg(long, default_value_t = mynt_io::DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to listen on (e.g. 127.0.0.1:7000).
    pub addr: SocketAddr,
    /// Largest accepted message body in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_message: usize,
    #[command(flatten)]
    pub buffer: BufferArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub addr: SocketAddr,
    /// Values to write, as KIND:VALUE (byte, short, int, long, float,
    /// double, bytes, skip).
    #[arg(value_name = "VALUE")]
    pub values: Vec<Value>,
    /// Values to read back after sending (comma-separated, e.g. int,bytes:5).
    #[arg(long, value_delimiter = ',')]
    pub expect: Vec<Expect>,
    /// Connect and response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub buffer: BufferArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Values making up one message (comma-separated, e.g. int,bytes:5).
    #[arg(long, value_delimiter = ',', required = true)]
    pub expect: Vec<Expect>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub buffer: BufferArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Also print platform and connection defaults.
    #[arg(long)]
    pub extended: bool,
}

/// A token cancelled on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            trigger.cancel();
        }
    });
    shutdown
}

pub fn provider(config: ConnectionConfig, shutdown: CancellationToken) -> CliResult<TcpProvider> {
    TcpProvider::with_shutdown(config, shutdown)
        .map_err(|err| connection_error("invalid configuration", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn tiny_buffer_is_usage_error() {
        let err = provider(
            ConnectionConfig::default().with_buffer_size(1),
            CancellationToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
