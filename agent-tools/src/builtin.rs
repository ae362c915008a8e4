//! Built-in tool targets shipped with the runtime.

use std::path::PathBuf;

use agent_primitives::{FunctionType, ParamType, ParameterSpec, ToolArguments, ToolDefinition};
use anyhow::Context;
use tracing::debug;

use crate::registry::TargetTable;

/// Target path the `save_file` tool binds to.
pub const SAVE_FILE_TARGET: &str = "tools.file_functions.save_file";

/// Writes `data` to `file_path`, replacing any existing content.
///
/// # Errors
///
/// Fails when either argument is missing or the file cannot be written.
pub async fn save_file(args: ToolArguments) -> anyhow::Result<String> {
    let path = args
        .get_str("file_path")
        .map(PathBuf::from)
        .context("missing `file_path` argument")?;
    let data = args.get_str("data").context("missing `data` argument")?;

    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), bytes = data.len(), "file saved");

    Ok(format!("Data saved to: {}", path.display()))
}

/// Returns the definition of the built-in `save_file` tool.
///
/// # Errors
///
/// Only fails if the static definition is malformed.
pub fn save_file_definition() -> agent_primitives::Result<ToolDefinition> {
    ToolDefinition::builder("save_file", SAVE_FILE_TARGET, FunctionType::File)?
        .description("Save data to a file")
        .parameter(
            ParameterSpec::new("file_path", ParamType::String)?
                .required(true)
                .with_description("Path to the file"),
        )?
        .parameter(
            ParameterSpec::new("data", ParamType::String)?
                .required(true)
                .with_description("Data to write to the file"),
        )?
        .returns("string")
        .build()
}

/// Returns a target table with every built-in target bound.
#[must_use]
pub fn builtin_targets() -> TargetTable {
    TargetTable::new().with(SAVE_FILE_TARGET, save_file)
}
