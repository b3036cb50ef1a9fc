mod cmd;
mod exit;
mod logging;
mod output;
mod value;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "mynt", version, about = "Typed byte-stream I/O over TCP")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Expect, Value};

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "mynt",
            "send",
            "127.0.0.1:7000",
            "int:5",
            "bytes:hello",
            "--expect",
            "int,bytes:5",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send command");
        };
        assert_eq!(args.values, vec![Value::Int(5), Value::Bytes(b"hello".to_vec())]);
        assert_eq!(args.expect, vec![Expect::Int, Expect::Bytes(5)]);
        assert_eq!(args.buffer.buffer_size, mynt_io::DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn rejects_malformed_value() {
        let err = Cli::try_parse_from(["mynt", "send", "127.0.0.1:7000", "int:many"])
            .expect_err("bad value should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn listen_requires_expect() {
        let err = Cli::try_parse_from(["mynt", "listen", "127.0.0.1:7000"])
            .expect_err("missing --expect should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_echo_with_global_flags() {
        let cli = Cli::try_parse_from([
            "mynt",
            "echo",
            "0.0.0.0:7000",
            "--buffer-size",
            "64",
            "--format",
            "pretty",
            "--log-level",
            "debug",
        ])
        .expect("echo args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        let Command::Echo(args) = cli.command else {
            panic!("expected echo command");
        };
        assert_eq!(args.buffer.buffer_size, 64);
    }
}
