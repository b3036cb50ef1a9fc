use comfy_table::{presets::UTF8_FULL, Table};
use mynt_connection::ConnectionConfig;
use mynt_io::MIN_BUFFER_SIZE;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

/// Library defaults a peer needs to agree on buffer sizing.
#[derive(Serialize)]
struct Defaults {
    version: &'static str,
    os: &'static str,
    arch: &'static str,
    transports: [&'static str; 2],
    buffer_size: usize,
    min_buffer_size: usize,
    max_idle_buffers: usize,
    reuse_connections: bool,
}

impl Defaults {
    fn current() -> Self {
        let config = ConnectionConfig::default();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            transports: ["tcp", "duplex"],
            buffer_size: config.buffer_size,
            min_buffer_size: MIN_BUFFER_SIZE,
            max_idle_buffers: config.max_idle_buffers,
            reuse_connections: config.reuse_connections,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("version", self.version.to_string()),
            ("platform", format!("{}/{}", self.os, self.arch)),
            ("transports", self.transports.join(", ")),
            ("buffer_size", self.buffer_size.to_string()),
            ("min_buffer_size", self.min_buffer_size.to_string()),
            ("max_idle_buffers", self.max_idle_buffers.to_string()),
            ("reuse_connections", self.reuse_connections.to_string()),
        ]
    }
}

fn render(defaults: &Defaults, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(defaults).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["SETTING", "VALUE"]);
            for (key, value) in defaults.rows() {
                table.add_row(vec![key.to_string(), value]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => defaults
            .rows()
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if args.extended {
        println!("{}", render(&Defaults::current(), format));
    } else {
        println!("mynt {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(SUCCESS)
}
