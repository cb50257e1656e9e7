//! Tracing subscriber setup.
//!
//! Logs go to stderr so the `check` subcommand keeps stdout for its report.

use std::env;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Dependency targets that are turned down regardless of `RUST_LOG`.
const NOISE_DIRECTIVES: [&str; 5] = [
    "hyper=warn",
    "reqwest=warn",
    "rustls=warn",
    "sqlx=warn",
    "tower_http=info",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Colored output; never applies to json.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
            ansi: false,
        }
    }
}

/// Colors only when stderr is a terminal and `NO_COLOR` is unset.
fn use_ansi(is_terminal: bool, no_color: Option<OsString>) -> bool {
    is_terminal && no_color.is_none_or(|v| v.is_empty())
}

impl LoggingConfig {
    /// Reads `RUST_LOG` and `LOG_FORMAT` (`json`, `pretty` or `compact`).
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Compact,
        };
        let ansi = use_ansi(io::stderr().is_terminal(), env::var_os("NO_COLOR"));
        Self {
            level,
            format,
            ansi,
        }
    }

    fn filter(&self) -> EnvFilter {
        NOISE_DIRECTIVES
            .iter()
            .filter_map(|d| d.parse::<Directive>().ok())
            .fold(EnvFilter::new(&self.level), EnvFilter::add_directive)
    }

    /// Installs the global subscriber.
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> Result<(), TryInitError> {
        let registry = tracing_subscriber::registry().with(self.filter());
        match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(false)
                        .with_target(true)
                        .json(),
                )
                .try_init()?,
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(self.ansi)
                        .pretty(),
                )
                .try_init()?,
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(self.ansi)
                        .compact()
                        .with_target(false),
                )
                .try_init()?,
        }
        info!(level = %self.level, format = ?self.format, "Logging initialized");
        Ok(())
    }
}
