use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "ragnarok.logs.jsonl";

/// Where log lines go.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogSink {
    /// Compact text on stderr. stdout carries the streamed answer.
    Stderr,
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    filter: String,
    sink: LogSink,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, default_level: &str) -> Self {
        let enabled = ["RAGNAROK_OBSERVABILITY_ENABLED", "RAGNAROK_OBSERVABILITY"]
            .into_iter()
            .find_map(|key| lookup(key))
            .map(|raw| parse_bool(&raw).unwrap_or(true))
            .unwrap_or(true);

        // An unparsable RAGNAROK_LOG_LEVEL falls through to RUST_LOG.
        let filter = ["RAGNAROK_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .find(|raw| EnvFilter::try_new(raw).is_ok())
            .unwrap_or_else(|| default_level.to_string());

        let sink = match lookup("RAGNAROK_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(raw) => json_sink(Path::new(&raw)),
            None => LogSink::Stderr,
        };

        Self {
            enabled,
            filter,
            sink,
        }
    }

    fn install(&self) {
        if !self.enabled {
            return;
        }
        let env_filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new("info"));
        match &self.sink {
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Stderr => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    }
}

fn json_sink(path: &Path) -> LogSink {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogSink::JsonFile { dir, file_name }
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `RAGNAROK_OBSERVABILITY_ENABLED` / `RAGNAROK_OBSERVABILITY`: enable flag (default enabled).
/// - `RAGNAROK_LOG_LEVEL`, then `RUST_LOG`: filter directives. `default_level` applies when
///   neither is set or valid.
/// - `RAGNAROK_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
pub fn init_logging(default_level: &str) {
    INIT.get_or_init(|| {
        LogSettings::from_lookup(|key| std::env::var(key).ok(), default_level).install();
    });
}
