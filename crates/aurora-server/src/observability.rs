//! Logging setup for the Aurora server.
//!
//! Log events go through `tracing`. The subscriber honors `RUST_LOG`
//! (default `info`) and writes either JSON or pretty output, chosen by
//! `AURORA_LOG_FORMAT`.

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "AURORA_LOG_FORMAT";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

impl LogFormat {
    /// Reads `AURORA_LOG_FORMAT`; unset or unknown values fall back to pretty.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::parse::<Self>) {
            Some(Ok(format)) => format,
            Some(Err(_)) | None => Self::default(),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at startup. Later calls are no-ops.
///
/// # Example
///
/// ```rust
/// use aurora_server::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::from_env());
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Span for server lifecycle events.
#[must_use]
pub fn server_span(service: &str, host: &str, port: u16) -> Span {
    tracing::info_span!("server", service = service, host = host, port = port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json); // no-op
    }

    #[test]
    fn test_log_format_from_env_value() {
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(Some("xml")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Pretty);
    }

    #[test]
    fn test_server_span_creates_span() {
        let span = server_span("iceberg-rest", "127.0.0.1", 9001);
        let _guard = span.enter();
        tracing::info!("lifecycle message");
    }
}
