//! Core schema types shared across the toolgate runtime.
//!
//! Definitions in this crate are plain immutable values. They are built once
//! from parsed configuration and refer to each other by name only.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod error;
mod manifest;
mod schema;
mod tool;

/// Capability definitions and supporting builders.
pub use capability::{CapabilityBuilder, CapabilityDefinition};
/// Load-time and call-time error types.
pub use error::{Error, Result, SchemaError, SchemaResult};
/// Agent definitions and supporting builders.
pub use manifest::{AgentBuilder, AgentDefinition};
/// Parameter specifications and argument coercion.
pub use schema::{ParamType, ParameterSpec, ToolArguments, validate_and_coerce};
/// Tool definitions, function types, and module policies.
pub use tool::{
    CODE_PARAMETER, FunctionType, ModulePolicy, ModuleVerdict, TargetRef, ToolDefinition,
    ToolDefinitionBuilder,
};

pub(crate) const MAX_NAME_LEN: usize = 96;

/// Validates an entity name used as a registry key.
pub(crate) fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName {
            kind,
            name: name.to_owned(),
            reason: "name cannot be empty".into(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName {
            kind,
            name: name.to_owned(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName {
            kind,
            name: name.to_owned(),
            reason: "name cannot contain whitespace".into(),
        });
    }
    Ok(())
}
