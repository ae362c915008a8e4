//! Tool registration, argument validation, and sandboxed code execution.
//!
//! A [`registry::ToolRegistry`] is filled once at startup from tool
//! definitions and an explicit [`registry::TargetTable`] of callables. Code
//! tools never call a target directly; they are routed through the
//! [`sandbox::SandboxedExecutor`].

#![warn(missing_docs, clippy::pedantic)]

pub mod builtin;
pub mod imports;
pub mod registry;
pub mod runner;
pub mod sandbox;
