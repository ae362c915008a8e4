//! Dispatch runtime: one call boundary in front of the tool registry.
//!
//! [`RuntimeBuilder`] turns configuration into a [`Dispatcher`], which checks
//! rate limits and capabilities before handing a call to the
//! [`agent_tools::registry::ToolRegistry`]. Every failure comes back as a
//! [`DispatchError`]; the runtime never panics or prints on behalf of a
//! caller.

#![warn(missing_docs, clippy::pedantic)]

mod bootstrap;
mod dispatch;
mod error;
mod observer;

pub use bootstrap::RuntimeBuilder;
pub use dispatch::{Dispatcher, SharedDispatcher};
pub use error::{DispatchError, DispatchResult, LoadError, LoadResult, StructuredFailure};
pub use observer::{
    CompositeDispatchObserver, DispatchObserver, DispatchRecord, TracingDispatchObserver,
};
