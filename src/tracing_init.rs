//! Tracing subscriber setup for applications embedding restwire.
//!
//! Libraries should not own the global subscriber, so nothing here runs
//! implicitly. Binaries and tests call [`init_tracing`] once.

use crate::constants;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parses `RESTWIRE_LOG_FORMAT`; unknown values fall back to text.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Everything [`init_tracing`] reads from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    pub directive: String,
    pub format: LogFormat,
    pub file: Option<String>,
}

impl TracingOptions {
    #[must_use]
    pub fn from_env(verbosity: u8) -> Self {
        let format = match std::env::var(constants::ENV_RESTWIRE_LOG_FORMAT) {
            Ok(raw) => LogFormat::parse(&raw).unwrap_or_else(|| {
                // No subscriber yet, stderr is the only channel.
                eprintln!(
                    "Warning: unrecognized {} '{raw}', using 'text'",
                    constants::ENV_RESTWIRE_LOG_FORMAT
                );
                LogFormat::Text
            }),
            Err(_) => LogFormat::Text,
        };
        Self {
            directive: level_directive(verbosity),
            format,
            file: std::env::var(constants::ENV_RESTWIRE_LOG_FILE).ok(),
        }
    }
}

/// Log level directive for a verbosity count, falling back to `RESTWIRE_LOG`.
#[must_use]
pub fn level_directive(verbosity: u8) -> String {
    match verbosity {
        0 => std::env::var(constants::ENV_RESTWIRE_LOG).unwrap_or_else(|_| "error".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Writes to the configured log file, or stderr when there is none.
struct LogSink {
    file: Option<Mutex<File>>,
}

impl LogSink {
    fn open(path: Option<&str>) -> Self {
        let file = path.and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eprintln!("Warning: cannot open log file '{path}': {e}, using stderr"))
                .ok()
        });
        Self {
            file: file.map(Mutex::new),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = Box<dyn std::io::Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match self
            .file
            .as_ref()
            .and_then(|file| file.lock().ok())
            .and_then(|file| file.try_clone().ok())
        {
            Some(file) => Box::new(file),
            None => Box::new(std::io::stderr()),
        }
    }
}

/// Installs a global subscriber from `options`. Returns `false` when another
/// subscriber is already installed.
pub fn install(options: &TracingOptions) -> bool {
    let filter = EnvFilter::try_new(&options.directive).unwrap_or_else(|_| EnvFilter::new("error"));
    let sink = LogSink::open(options.file.as_deref());
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match options.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_list(false)
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(sink),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_writer(sink),
            )
            .try_init(),
    };
    installed.is_ok()
}

/// Installs a subscriber configured from `RESTWIRE_LOG*`. `verbosity` 1
/// enables debug output, 2 or more trace output (bodies included).
pub fn init_tracing(verbosity: u8) -> bool {
    install(&TracingOptions::from_env(verbosity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_env() {
        assert_eq!(level_directive(1), "debug");
        assert_eq!(level_directive(5), "trace");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(" JSON "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_install_twice_reports_existing_subscriber() {
        let options = TracingOptions {
            directive: "warn".to_string(),
            format: LogFormat::Text,
            file: None,
        };
        install(&options);
        assert!(!install(&options));
    }
}
