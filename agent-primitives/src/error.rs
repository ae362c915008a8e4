//! Shared error definitions for the schema model.

use thiserror::Error;

use crate::ParamType;

/// Result alias used for definition construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Result alias used for call-time argument validation.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Errors raised while constructing definitions from configuration.
///
/// All of these are load-time failures.
#[derive(Debug, Error)]
pub enum Error {
    /// A tool, capability, agent, or parameter name failed validation.
    #[error("invalid {kind} name `{name}`: {reason}")]
    InvalidName {
        /// Kind of entity being named.
        kind: &'static str,
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A parameter declared a type tag outside the supported set.
    #[error("unknown parameter type `{tag}`")]
    UnknownParamType {
        /// The unrecognised tag.
        tag: String,
    },

    /// A tool or capability declared an unknown function type.
    #[error("unknown function type `{tag}`")]
    UnknownFunctionType {
        /// The unrecognised tag.
        tag: String,
    },

    /// The same parameter name was declared twice.
    #[error("parameter `{parameter}` is declared more than once on `{owner}`")]
    DuplicateParameter {
        /// Tool or capability owning the parameter list.
        owner: String,
        /// Repeated parameter name.
        parameter: String,
    },

    /// A default value does not coerce to the declared parameter type.
    #[error("default for parameter `{parameter}` is invalid: {source}")]
    InvalidDefault {
        /// Parameter carrying the default.
        parameter: String,
        /// Coercion failure.
        #[source]
        source: SchemaError,
    },

    /// A callable reference could not be parsed.
    #[error("invalid target reference `{target}`: {reason}")]
    InvalidTarget {
        /// The raw reference string.
        target: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A code-execution tool does not declare a `code` string parameter.
    #[error("code tool `{tool}` must declare a string `code` parameter")]
    MissingCodeParameter {
        /// Offending tool name.
        tool: String,
    },

    /// Capability definition failed validation.
    #[error("invalid capability `{name}`: {reason}")]
    InvalidCapability {
        /// Capability name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

/// Errors raised while validating a single argument against its spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required parameter was not supplied.
    #[error("missing required parameter `{parameter}`")]
    MissingRequiredParameter {
        /// Name of the missing parameter.
        parameter: String,
    },

    /// The supplied value could not be coerced to the declared type.
    #[error("parameter `{parameter}` expected {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the parameter.
        parameter: String,
        /// Declared type.
        expected: ParamType,
        /// Kind of the value actually supplied.
        actual: String,
    },

    /// The caller supplied a key that no parameter spec declares.
    #[error("unexpected parameter `{parameter}`")]
    UnexpectedParameter {
        /// The unknown key.
        parameter: String,
    },
}
