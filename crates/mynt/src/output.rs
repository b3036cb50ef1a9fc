use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::value::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ValueOutput {
    kind: &'static str,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct ValuesOutput {
    peer: Option<String>,
    connection: u64,
    values: Vec<ValueOutput>,
    timestamp: String,
}

/// Render one message worth of decoded values as a single line or table.
pub fn render_values(
    values: &[Value],
    peer: Option<SocketAddr>,
    connection: u64,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => {
            let out = ValuesOutput {
                peer: peer.map(|addr| addr.to_string()),
                connection,
                values: values
                    .iter()
                    .map(|value| ValueOutput {
                        kind: value.kind(),
                        value: value.to_json(),
                    })
                    .collect(),
                timestamp: now_unix_seconds(),
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "VALUE"]);
            for (index, value) in values.iter().enumerate() {
                table.add_row(vec![index.to_string(), value.kind().to_string(), value.display()]);
            }
            table.to_string()
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = values
                .iter()
                .map(|value| format!("{}={}", value.kind(), value.display()))
                .collect();
            let peer = peer.map_or_else(|| "-".to_string(), |addr| addr.to_string());
            format!("connection={connection} peer={peer} {}", rendered.join(" "))
        }
    }
}

pub fn print_values(values: &[Value], peer: Option<SocketAddr>, connection: u64, format: OutputFormat) {
    println!("{}", render_values(values, peer, connection, format));
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
