//! Tracing/logging initialization.
//!
//! JSON lines by default; `CLINIC_LOG_FORMAT=pretty` switches to
//! human-readable output. Filtering follows `RUST_LOG` (default `info`).

use core::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FORMAT: &str = "CLINIC_LOG_FORMAT";

/// Output format of the process-wide subscriber.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log format '{0}' (expected 'json' or 'pretty')")]
pub struct LogFormatError(String);

impl FromStr for LogFormat {
    type Err = LogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(LogFormatError(s.to_string())),
        }
    }
}

impl LogFormat {
    /// Read the format from the environment; unknown values fall back to JSON
    /// with a warning once the subscriber is up.
    pub fn from_env() -> (Self, Option<LogFormatError>) {
        match std::env::var(ENV_LOG_FORMAT) {
            Ok(raw) => match raw.parse() {
                Ok(format) => (format, None),
                Err(e) => (LogFormat::default(), Some(e)),
            },
            Err(_) => (LogFormat::default(), None),
        }
    }
}

/// Initialize tracing/logging for the process using the environment.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let (format, error) = LogFormat::from_env();
    init_with(format);
    if let Some(error) = error {
        ::tracing::warn!(%error, "falling back to json logs");
    }
}

/// Initialize tracing/logging with an explicit format.
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
