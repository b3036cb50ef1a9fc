use mynt_connection::{ConnectionConfig, Provider};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd::{parse_duration, provider, SendArgs};
use crate::exit::{connection_error, request_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_values, OutputFormat};
use crate::value::{read_values, write_value};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.values.is_empty() && args.expect.is_empty() {
        return Err(CliError::new(USAGE, "nothing to send or expect"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let config = ConnectionConfig::default()
        .with_buffer_size(args.buffer.buffer_size)
        .with_connect_timeout(timeout);
    let provider = provider(config, CancellationToken::new())?;

    let connection = provider
        .connect(args.addr)
        .await
        .map_err(|err| connection_error("connect failed", err))?;

    let writer = connection.write();
    for value in &args.values {
        write_value(writer, value)
            .await
            .map_err(|err| request_error("send failed", err))?;
    }
    writer
        .flush()
        .await
        .map_err(|err| request_error("send failed", err))?;
    debug!(count = args.values.len(), "values sent");

    if !args.expect.is_empty() {
        let values = tokio::time::timeout(timeout, read_values(connection.read(), &args.expect))
            .await
            .map_err(|_| CliError::new(TIMEOUT, format!("no response within {timeout:?}")))?
            .map_err(|err| request_error("receive failed", err))?;
        print_values(&values, connection.peer_addr(), connection.id(), format);
    }

    provider.close().await;
    Ok(SUCCESS)
}
