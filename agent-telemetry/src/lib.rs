//! Tracing subscriber installation.
//!
//! The runtime crates only emit `tracing` events; binaries decide where they
//! go by calling [`init_tracing`] once at startup.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive does not parse.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// Offending directive.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default filter directive, e.g. `info` or `agent_tools=debug`.
    pub level: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl TelemetrySettings {
    /// Builds the event filter. `RUST_LOG` takes precedence over `level`.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] when `level` does not parse.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|err| TelemetryError::InvalidFilter {
            directive: self.level.clone(),
            reason: err.to_string(),
        })
    }
}

/// Installs a global fmt subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad level and
/// [`TelemetryError::AlreadyInitialized`] when called more than once.
pub fn init_tracing(settings: &TelemetrySettings) -> TelemetryResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter()?)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialized(err.to_string()))
}
