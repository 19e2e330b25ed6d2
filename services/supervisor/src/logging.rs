//! Logging initialization and the logging sink on the shared state.
//!
//! Logs go to stderr; a worker's stdout belongs to the node program.

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init(format: LogFormat, level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(io::stderr))
            .try_init()?,
    }

    Ok(())
}

/// Text logging facility for nodes and collaborators.
///
/// Forwards to `tracing` under the `blitz::log` target.
#[derive(Debug, Clone)]
pub struct LogSink {
    scope: String,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new("blitz")
    }
}

impl LogSink {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn info(&self, text: impl AsRef<str>) {
        tracing::info!(target: "blitz::log", scope = %self.scope, "{}", text.as_ref());
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        tracing::warn!(target: "blitz::log", scope = %self.scope, "{}", text.as_ref());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        tracing::error!(target: "blitz::log", scope = %self.scope, "{}", text.as_ref());
    }

    pub fn debug(&self, text: impl AsRef<str>) {
        tracing::debug!(target: "blitz::log", scope = %self.scope, "{}", text.as_ref());
    }
}
