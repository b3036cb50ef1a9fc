use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with a full filter, e.g. `mynt_io=trace,info`.
pub const LOG_ENV: &str = "MYNT_LOG";

/// Crates whose events the level flag applies to.
const CRATES: [&str; 4] = ["mynt", "mynt_connection", "mynt_io", "mynt_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directives for `level`: mynt crates at `level`, everything else
/// at `warn`.
fn directives(level: LogLevel) -> String {
    let mut out = String::from("warn");
    for name in CRATES {
        out.push(',');
        out.push_str(name);
        out.push('=');
        out.push_str(level.as_str());
    }
    out
}

fn filter(level: LogLevel, from_env: Option<String>) -> EnvFilter {
    from_env
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(directives(level)))
}

/// Install the stderr subscriber; stdout is reserved for decoded values.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level, std::env::var(LOG_ENV).ok()))
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
