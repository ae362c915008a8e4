//! Error types for authorization tables.

use thiserror::Error;

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised while building or consulting the capability matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Two capabilities share a name.
    #[error("capability `{name}` is defined more than once")]
    DuplicateCapability {
        /// Offending capability name.
        name: String,
    },

    /// Two agents share a name.
    #[error("agent `{name}` is defined more than once")]
    DuplicateAgent {
        /// Offending agent name.
        name: String,
    },

    /// An agent references a capability that was never defined.
    #[error("agent `{agent}` references unknown capability `{capability}`")]
    UnknownCapability {
        /// Agent holding the reference.
        agent: String,
        /// Unresolved capability name.
        capability: String,
    },

    /// Agent name does not resolve.
    #[error("agent `{agent}` is not defined")]
    UnknownAgent {
        /// Requested agent name.
        agent: String,
    },

    /// None of the agent's capabilities cover the tool's function type.
    #[error("agent `{agent}` is not authorized to use tool `{tool}`")]
    AuthorizationDenied {
        /// Requesting agent.
        agent: String,
        /// Requested tool.
        tool: String,
    },
}
