//! Configuration errors. All of them are fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading or converting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A document is not valid YAML or does not match the expected shape.
    #[error("failed to parse {origin}: {source}")]
    Parse {
        /// File path or `<inline>`.
        origin: String,
        /// Parser failure.
        #[source]
        source: serde_yaml::Error,
    },

    /// The same entry appears in more than one document.
    #[error("{kind} `{name}` is defined more than once")]
    DuplicateEntry {
        /// `tool`, `capability` or `agent`.
        kind: &'static str,
        /// Offending key.
        name: String,
    },

    /// A capability body names itself differently from its key.
    #[error("capability `{key}` declares mismatched name `{declared}`")]
    NameMismatch {
        /// Map key.
        key: String,
        /// `name` field inside the body.
        declared: String,
    },

    /// An entry failed load-time validation.
    #[error("invalid {kind} `{name}`: {source}")]
    Definition {
        /// `tool`, `capability` or `agent`.
        kind: &'static str,
        /// Entry key.
        name: String,
        /// Validation failure.
        #[source]
        source: agent_primitives::Error,
    },

    /// Runtime settings could not be extracted.
    #[error("invalid runtime settings: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// Runtime settings parsed but hold an unusable value.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting {
        /// Dotted settings key.
        key: &'static str,
        /// Why the value is rejected.
        reason: String,
    },
}
