use mynt_connection::{ConnectionConfig, ConnectionError, Provider};
use tracing::info;

use crate::cmd::{provider, shutdown_on_ctrl_c, ListenArgs};
use crate::exit::{connection_error, request_error, CliResult, SUCCESS};
use crate::output::{print_values, OutputFormat};
use crate::value::read_values;

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let shutdown = shutdown_on_ctrl_c();
    let config = ConnectionConfig::default().with_buffer_size(args.buffer.buffer_size);
    let provider = provider(config, shutdown)?;

    let addr = provider
        .bind(args.addr)
        .await
        .map_err(|err| connection_error("bind failed", err))?;
    info!(%addr, "listening");

    let mut printed = 0usize;

    'accept: loop {
        let connection = match provider.accept(addr).await {
            Ok(connection) => connection,
            Err(ConnectionError::ProviderClosed) => break,
            Err(err) => return Err(connection_error("accept failed", err)),
        };

        loop {
            let values = match read_values(connection.read(), &args.expect).await {
                Ok(values) => values,
                Err(err) if err.is_closed() => break,
                Err(err) => return Err(request_error("receive failed", err)),
            };

            print_values(&values, connection.peer_addr(), connection.id(), format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                break 'accept;
            }
        }
    }

    provider.close().await;
    Ok(SUCCESS)
}
