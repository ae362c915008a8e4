//! Load-time and dispatch-time error types.

use std::time::Duration;

use agent_config::ConfigError;
use agent_policy::PolicyError;
use agent_primitives::{ParamType, SchemaError};
use agent_tools::registry::ToolError;
use agent_tools::sandbox::SandboxError;
use serde::Serialize;
use thiserror::Error;

/// Result alias for building a dispatcher.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result alias for dispatch calls.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Fatal startup failures. A dispatcher is never built from inconsistent
/// configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration could not be read, parsed or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A tool could not be registered.
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// Capability or agent tables are inconsistent.
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Recoverable failure of a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Caller exceeded its request budget.
    #[error("agent `{agent}` is rate limited; retry after {}ms", retry_after.as_millis())]
    RateLimitExceeded {
        /// Rejected agent.
        agent: String,
        /// Time until a request will be accepted again.
        retry_after: Duration,
    },
    /// No tool with this name is registered.
    #[error("tool `{tool}` is not registered")]
    UnknownTool {
        /// Requested tool.
        tool: String,
    },
    /// No agent with this name is defined.
    #[error("agent `{agent}` is not defined")]
    UnknownAgent {
        /// Requested agent.
        agent: String,
    },
    /// The agent's capabilities do not cover the tool.
    #[error("agent `{agent}` is not authorized to use tool `{tool}`")]
    AuthorizationDenied {
        /// Requesting agent.
        agent: String,
        /// Requested tool.
        tool: String,
    },
    /// A required argument was omitted.
    #[error("tool `{tool}` requires parameter `{parameter}`")]
    MissingRequiredParameter {
        /// Invoked tool.
        tool: String,
        /// Missing parameter.
        parameter: String,
    },
    /// An argument could not be coerced to its declared type.
    #[error("parameter `{parameter}` of tool `{tool}` expects {expected}, got {actual}")]
    TypeMismatch {
        /// Invoked tool.
        tool: String,
        /// Offending parameter.
        parameter: String,
        /// Declared type.
        expected: ParamType,
        /// Kind of the supplied value.
        actual: String,
    },
    /// An argument names no declared parameter.
    #[error("tool `{tool}` has no parameter `{parameter}`")]
    UnexpectedParameter {
        /// Invoked tool.
        tool: String,
        /// Unknown parameter.
        parameter: String,
    },
    /// The tool's target failed.
    #[error("tool `{tool}` failed: {cause}")]
    ToolExecutionError {
        /// Invoked tool.
        tool: String,
        /// Rendered failure.
        cause: String,
    },
    /// Code imported a blocked module.
    #[error("tool `{tool}` rejected import of blocked module `{module}`")]
    BlockedModuleImport {
        /// Invoked tool.
        tool: String,
        /// Blocked module.
        module: String,
    },
    /// Code imported a module outside the allow list.
    #[error("tool `{tool}` rejected import of `{module}`: not in allowed modules")]
    ModuleNotAllowed {
        /// Invoked tool.
        tool: String,
        /// Rejected module.
        module: String,
    },
    /// Code ran past its deadline and was terminated.
    #[error("tool `{tool}` timed out after {}s", timeout.as_secs())]
    ExecutionTimeout {
        /// Invoked tool.
        tool: String,
        /// Applied timeout.
        timeout: Duration,
    },
    /// Code raised an error.
    #[error("code in tool `{tool}` failed: {message}")]
    CodeRuntimeError {
        /// Invoked tool.
        tool: String,
        /// Error raised by the code.
        message: String,
    },
    /// The sandbox interpreter could not be driven.
    #[error("sandbox for tool `{tool}` is unavailable: {reason}")]
    SandboxUnavailable {
        /// Invoked tool.
        tool: String,
        /// Failure detail.
        reason: String,
    },
}

impl DispatchError {
    /// Returns a stable snake-case identifier for the failure kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::UnknownAgent { .. } => "unknown_agent",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::MissingRequiredParameter { .. } => "missing_required_parameter",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnexpectedParameter { .. } => "unexpected_parameter",
            Self::ToolExecutionError { .. } => "tool_execution_error",
            Self::BlockedModuleImport { .. } => "blocked_module_import",
            Self::ModuleNotAllowed { .. } => "module_not_allowed",
            Self::ExecutionTimeout { .. } => "execution_timeout",
            Self::CodeRuntimeError { .. } => "code_runtime_error",
            Self::SandboxUnavailable { .. } => "sandbox_unavailable",
        }
    }

    /// Returns `true` for failures that reflect a policy decision rather than
    /// a caller mistake or a tool fault.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. }
                | Self::AuthorizationDenied { .. }
                | Self::BlockedModuleImport { .. }
                | Self::ModuleNotAllowed { .. }
                | Self::ExecutionTimeout { .. }
        )
    }

    /// Renders the error for the caller.
    #[must_use]
    pub fn to_failure(&self) -> StructuredFailure {
        StructuredFailure {
            code: self.code(),
            message: self.to_string(),
        }
    }

    /// Maps a matcher failure for `agent` calling `tool`. Load-time variants
    /// cannot occur on a built matcher; they fail closed as a denial.
    pub(crate) fn from_policy(err: PolicyError, agent: &str, tool: &str) -> Self {
        match err {
            PolicyError::UnknownAgent { agent } => Self::UnknownAgent { agent },
            PolicyError::AuthorizationDenied { agent, tool } => {
                Self::AuthorizationDenied { agent, tool }
            }
            PolicyError::DuplicateCapability { .. }
            | PolicyError::DuplicateAgent { .. }
            | PolicyError::UnknownCapability { .. } => Self::AuthorizationDenied {
                agent: agent.to_owned(),
                tool: tool.to_owned(),
            },
        }
    }
}

impl From<ToolError> for DispatchError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownTool { name } => Self::UnknownTool { tool: name },
            ToolError::InvalidArguments { tool, source } => match source {
                SchemaError::MissingRequiredParameter { parameter } => {
                    Self::MissingRequiredParameter { tool, parameter }
                }
                SchemaError::TypeMismatch {
                    parameter,
                    expected,
                    actual,
                } => Self::TypeMismatch {
                    tool,
                    parameter,
                    expected,
                    actual,
                },
                SchemaError::UnexpectedParameter { parameter } => {
                    Self::UnexpectedParameter { tool, parameter }
                }
            },
            ToolError::Sandbox { tool, source } => match source {
                SandboxError::BlockedModuleImport { module } => {
                    Self::BlockedModuleImport { tool, module }
                }
                SandboxError::ModuleNotAllowed { module } => Self::ModuleNotAllowed { tool, module },
                SandboxError::ExecutionTimeout { timeout } => Self::ExecutionTimeout { tool, timeout },
                SandboxError::CodeRuntimeError { message } => Self::CodeRuntimeError { tool, message },
                SandboxError::Unavailable { reason } => Self::SandboxUnavailable { tool, reason },
            },
            ToolError::Execution { tool, cause } => Self::ToolExecutionError { tool, cause },
            err @ (ToolError::DuplicateTool { .. }
            | ToolError::DuplicateTarget { .. }
            | ToolError::UnresolvableTarget { .. }) => Self::ToolExecutionError {
                tool: String::new(),
                cause: err.to_string(),
            },
        }
    }
}

/// Serializable failure returned across the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredFailure {
    /// Stable failure identifier, see [`DispatchError::code`].
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}
