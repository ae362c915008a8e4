//! Configuration loading for the dispatch runtime.
//!
//! Tool, capability and agent documents are YAML files parsed with
//! `serde_yaml` into [`ConfigDocuments`] and converted into validated
//! [`Definitions`]. Process settings ([`RuntimeSettings`]) are layered with
//! `figment`.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod loader;
mod schema;
mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigDocuments;
pub use schema::{
    AgentEntry, AgentsDocument, CapabilitiesDocument, CapabilityEntry, Definitions, OrderedMap,
    ParameterEntry, ToolEntry, ToolsDocument, ValidationEntry,
};
pub use settings::{ENV_PREFIX, RateLimitSettings, RuntimeSettings, SandboxSettings};
