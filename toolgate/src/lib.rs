//! Capability-gated tool dispatch.
//!
//! This crate bundles the runtime crates behind one dependency. A typical
//! embedding loads configuration, binds the non-code tool targets it
//! implements, and keeps a [`SharedDispatcher`] for its chat loop:
//!
//! ```no_run
//! use toolgate::{RuntimeBuilder, SharedDispatcher};
//! use toolgate::primitives::ToolArguments;
//!
//! # fn main() -> Result<(), toolgate::LoadError> {
//! let dispatcher = RuntimeBuilder::from_yaml_files(["config/tools.yaml", "config/capabilities.yaml"])?
//!     .target("tools.search_functions.ddg_search", |args: ToolArguments| async move {
//!         Ok::<_, anyhow::Error>(format!("no results for {}", args.get_str("topic").unwrap_or_default()))
//!     })
//!     .target("tools.web_functions.get_web_page", |_args: ToolArguments| async move {
//!         Ok::<_, anyhow::Error>(String::new())
//!     })
//!     .build()?;
//! let shared = SharedDispatcher::new(dispatcher);
//! # let _ = shared;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

/// Definitions and argument validation.
pub use agent_primitives as primitives;

/// Tool registry, built-in targets and the code sandbox.
pub use agent_tools as tools;

/// Capability matching and rate limiting.
pub use agent_policy as policy;

/// Configuration documents and runtime settings.
pub use agent_config as config;

/// Dispatch boundary.
pub use agent_kernel as kernel;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

pub use agent_kernel::{
    DispatchError, DispatchResult, Dispatcher, LoadError, LoadResult, RuntimeBuilder,
    SharedDispatcher, StructuredFailure,
};
