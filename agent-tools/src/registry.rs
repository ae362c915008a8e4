//! Runtime registry for tool definitions and their callables.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use agent_primitives::{
    CODE_PARAMETER, FunctionType, ModulePolicy, SchemaError, TargetRef, ToolArguments,
    ToolDefinition, validate_and_coerce,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::sandbox::{SandboxError, SandboxedExecutor};

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Contract every non-code tool target satisfies.
///
/// Targets receive coerced arguments in declared order and return text.
/// Any error is reported to callers as [`ToolError::Execution`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool.
    async fn invoke(&self, args: ToolArguments) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(ToolArguments) -> Fut,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn invoke(&self, args: ToolArguments) -> anyhow::Result<String> {
        (self)(args).await
    }
}

/// Explicit table of callables keyed by dotted target path.
///
/// Built once at startup; tool definitions resolve their target against it
/// when registered, never at call time.
#[derive(Clone, Default)]
pub struct TargetTable {
    targets: HashMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetTable")
            .field("paths", &self.paths())
            .finish()
    }
}

impl TargetTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a callable under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTarget`] when the path is already bound.
    pub fn bind<T>(&mut self, path: impl Into<String>, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        let path = path.into();
        if self.targets.contains_key(&path) {
            return Err(ToolError::DuplicateTarget { path });
        }
        self.targets.insert(path, Arc::new(tool));
        Ok(())
    }

    /// Binds a callable, replacing any previous binding for `path`.
    #[must_use]
    pub fn with<T>(mut self, path: impl Into<String>, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.targets.insert(path.into(), Arc::new(tool));
        self
    }

    /// Merges another table into this one; bindings in `other` win.
    #[must_use]
    pub fn merge(mut self, other: TargetTable) -> Self {
        self.targets.extend(other.targets);
        self
    }

    /// Resolves a target reference.
    #[must_use]
    pub fn resolve(&self, target: &TargetRef) -> Option<Arc<dyn Tool>> {
        self.targets.get(&target.path()).cloned()
    }

    /// Returns all bound paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

#[derive(Clone)]
enum Handler {
    Callable(Arc<dyn Tool>),
    Sandboxed(ModulePolicy),
}

#[derive(Clone)]
struct RegisteredTool {
    definition: Arc<ToolDefinition>,
    handler: Handler,
}

/// Registry of tools keyed by name.
///
/// Registration needs `&mut self`; once shared behind an `Arc` the registry
/// is read-only and safe for concurrent invocation.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    targets: TargetTable,
    sandbox: SandboxedExecutor,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Creates an empty registry resolving targets from `targets` and running
    /// code tools through `sandbox`.
    #[must_use]
    pub fn new(targets: TargetTable, sandbox: SandboxedExecutor) -> Self {
        Self {
            tools: HashMap::new(),
            targets,
            sandbox,
        }
    }

    /// Registers a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is taken and
    /// [`ToolError::UnresolvableTarget`] if a non-code tool's target is not
    /// bound in the target table.
    pub fn register(&mut self, definition: ToolDefinition) -> ToolResult<()> {
        let name = definition.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        let handler = if definition.function_type().is_sandboxed() {
            let policy = definition.module_policy().cloned().unwrap_or_default();
            let overlap = policy.overlap();
            if !overlap.is_empty() {
                warn!(tool = %name, modules = ?overlap, "modules both allowed and blocked; treating as blocked");
            }
            Handler::Sandboxed(policy)
        } else {
            let callable = self.targets.resolve(definition.target()).ok_or_else(|| {
                ToolError::UnresolvableTarget {
                    tool: name.clone(),
                    target: definition.target().path(),
                }
            })?;
            Handler::Callable(callable)
        };

        debug!(tool = %name, function_type = %definition.function_type(), "tool registered");
        self.tools.insert(
            name,
            RegisteredTool {
                definition: Arc::new(definition),
                handler,
            },
        );
        Ok(())
    }

    /// Returns `true` if a tool with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the definition registered under `name`.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| tool.definition.as_ref())
    }

    /// Returns all definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut definitions: Vec<&ToolDefinition> = self
            .tools
            .values()
            .map(|tool| tool.definition.as_ref())
            .collect();
        definitions.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        definitions
    }

    /// Returns all registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the names of tools with the given function type, sorted.
    #[must_use]
    pub fn tools_by_type(&self, function_type: FunctionType) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .values()
            .filter(|tool| tool.definition.function_type() == function_type)
            .map(|tool| tool.definition.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Iterates `(name, function type)` pairs for authorization tables.
    pub fn function_types(&self) -> impl Iterator<Item = (&str, FunctionType)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.as_str(), tool.definition.function_type()))
    }

    /// Validates and coerces `args` against the tool's parameter specs.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] or [`ToolError::InvalidArguments`].
    pub fn prepare(&self, name: &str, args: &Map<String, Value>) -> ToolResult<ToolArguments> {
        let tool = self.lookup(name)?;
        coerce_arguments(&tool.definition, args)
    }

    /// Validates arguments and invokes the named tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for unregistered names,
    /// [`ToolError::InvalidArguments`] before any call when validation fails,
    /// [`ToolError::Sandbox`] for code-execution failures, and
    /// [`ToolError::Execution`] when a target callable fails.
    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> ToolResult<String> {
        let tool = self.lookup(name)?;
        let arguments = coerce_arguments(&tool.definition, args)?;

        match &tool.handler {
            Handler::Sandboxed(policy) => {
                let code = arguments.get_str(CODE_PARAMETER).unwrap_or_default();
                let timeout = arguments.get_i64("timeout");
                let output = self
                    .sandbox
                    .execute(code, timeout, policy)
                    .await
                    .map_err(|source| ToolError::Sandbox {
                        tool: name.to_owned(),
                        source,
                    })?;
                Ok(output.render())
            }
            Handler::Callable(callable) => {
                callable
                    .invoke(arguments)
                    .await
                    .map_err(|err| ToolError::Execution {
                        tool: name.to_owned(),
                        cause: format!("{err:#}"),
                    })
            }
        }
    }

    fn lookup(&self, name: &str) -> ToolResult<&RegisteredTool> {
        self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })
    }
}

fn coerce_arguments(
    definition: &ToolDefinition,
    args: &Map<String, Value>,
) -> ToolResult<ToolArguments> {
    let invalid = |source| ToolError::InvalidArguments {
        tool: definition.name().to_owned(),
        source,
    };

    let mut unexpected: Vec<&String> = args
        .keys()
        .filter(|key| definition.parameter(key).is_none())
        .collect();
    unexpected.sort_unstable();
    if let Some(parameter) = unexpected.first() {
        return Err(invalid(SchemaError::UnexpectedParameter {
            parameter: (*parameter).clone(),
        }));
    }

    let mut arguments = ToolArguments::new();
    for spec in definition.parameters() {
        if let Some(value) = validate_and_coerce(spec, args.get(spec.name())).map_err(invalid)? {
            arguments.push(spec.name(), value);
        }
    }
    Ok(arguments)
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Target path was bound twice in a target table.
    #[error("target `{path}` is already bound")]
    DuplicateTarget {
        /// Offending target path.
        path: String,
    },

    /// The tool's callable reference is not bound in the target table.
    #[error("tool `{tool}` refers to unresolvable target `{target}`")]
    UnresolvableTarget {
        /// Tool being registered.
        tool: String,
        /// Dotted target path.
        target: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Arguments failed validation against the parameter specs.
    #[error("invalid arguments for tool `{tool}`: {source}")]
    InvalidArguments {
        /// Tool being invoked.
        tool: String,
        /// Validation failure.
        #[source]
        source: SchemaError,
    },

    /// Sandboxed execution failed.
    #[error("sandboxed execution of `{tool}` failed: {source}")]
    Sandbox {
        /// Tool being invoked.
        tool: String,
        /// Sandbox failure.
        #[source]
        source: SandboxError,
    },

    /// Tool target failed.
    #[error("tool `{tool}` failed: {cause}")]
    Execution {
        /// Tool being invoked.
        tool: String,
        /// Rendered error chain returned by the target.
        cause: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_primitives::{ParamType, ParameterSpec};
    use serde_json::json;

    use crate::sandbox::{CodeJob, CodeRunner, SandboxConfig, SandboxOutput, SandboxResult};

    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        async fn run(&self, job: CodeJob) -> SandboxResult<SandboxOutput> {
            Ok(SandboxOutput {
                stdout: job.code,
                result: None,
                truncated: false,
            })
        }
    }

    fn sandbox() -> SandboxedExecutor {
        SandboxedExecutor::new(Arc::new(EchoRunner), SandboxConfig::default())
    }

    fn search_definition() -> ToolDefinition {
        let topic = ParameterSpec::new("topic", ParamType::String)
            .unwrap()
            .required(true);
        let max_results = ParameterSpec::new("max_results", ParamType::Integer)
            .unwrap()
            .with_default(json!(5))
            .unwrap();
        ToolDefinition::builder("ddg_search", "tools.search_functions.ddg_search", FunctionType::Search)
            .unwrap()
            .description("Search DuckDuckGo")
            .parameter(topic)
            .unwrap()
            .parameter(max_results)
            .unwrap()
            .build()
            .unwrap()
    }

    fn code_definition() -> ToolDefinition {
        let code = ParameterSpec::new("code", ParamType::String)
            .unwrap()
            .required(true);
        let timeout = ParameterSpec::new("timeout", ParamType::Integer)
            .unwrap()
            .with_default(json!(30))
            .unwrap();
        ToolDefinition::builder(
            "execute_python_code",
            "tools.code_functions.execute_python_code",
            FunctionType::Code,
        )
        .unwrap()
        .parameter(code)
        .unwrap()
        .parameter(timeout)
        .unwrap()
        .module_policy(ModulePolicy::new(["math"], ["os"]))
        .build()
        .unwrap()
    }

    fn counting_registry() -> (Arc<AtomicUsize>, ToolRegistry) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let targets = TargetTable::new().with(
            "tools.search_functions.ddg_search",
            move |args: ToolArguments| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(format!(
                        "{}:{}",
                        args.get_str("topic").unwrap_or_default(),
                        args.get_i64("max_results").unwrap_or_default()
                    ))
                }
            },
        );
        let mut registry = ToolRegistry::new(targets, sandbox());
        registry.register(search_definition()).unwrap();
        registry.register(code_definition()).unwrap();
        (calls, registry)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn invoke_coerces_and_applies_defaults() {
        let (calls, registry) = counting_registry();
        let output = registry
            .invoke("ddg_search", &args(json!({"topic": "rust"})))
            .await
            .unwrap();

        assert_eq!(output, "rust:5");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let prepared = registry
            .prepare("ddg_search", &args(json!({"max_results": "3", "topic": "x"})))
            .unwrap();
        assert_eq!(prepared.names(), ["topic", "max_results"]);
        assert_eq!(prepared.get_i64("max_results"), Some(3));
    }

    #[tokio::test]
    async fn missing_required_parameter_never_calls_target() {
        let (calls, registry) = counting_registry();
        let err = registry
            .invoke("ddg_search", &args(json!({"max_results": 2})))
            .await
            .expect_err("missing topic");

        assert!(matches!(
            err,
            ToolError::InvalidArguments {
                source: SchemaError::MissingRequiredParameter { .. },
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn type_mismatch_never_calls_target() {
        let (calls, registry) = counting_registry();
        let err = registry
            .invoke("ddg_search", &args(json!({"topic": "rust", "max_results": "many"})))
            .await
            .expect_err("mismatch");

        assert!(matches!(
            err,
            ToolError::InvalidArguments {
                source: SchemaError::TypeMismatch { .. },
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unexpected_parameter_is_rejected() {
        let (calls, registry) = counting_registry();
        let err = registry
            .invoke("ddg_search", &args(json!({"topic": "rust", "region": "us"})))
            .await
            .expect_err("unexpected");

        assert!(matches!(
            err,
            ToolError::InvalidArguments {
                source: SchemaError::UnexpectedParameter { ref parameter },
                ..
            } if parameter == "region"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn target_failure_is_wrapped() {
        let targets = TargetTable::new().with("tools.search_functions.ddg_search", |_args: ToolArguments| async {
            Err::<String, _>(anyhow::anyhow!("network down"))
        });
        let mut registry = ToolRegistry::new(targets, sandbox());
        registry.register(search_definition()).unwrap();

        let err = registry
            .invoke("ddg_search", &args(json!({"topic": "rust"})))
            .await
            .expect_err("target failure");
        assert!(matches!(
            err,
            ToolError::Execution { ref tool, ref cause } if tool == "ddg_search" && cause.contains("network down")
        ));
    }

    #[tokio::test]
    async fn code_tools_route_through_sandbox() {
        let (calls, registry) = counting_registry();
        let output = registry
            .invoke("execute_python_code", &args(json!({"code": "  print(1)  "})))
            .await
            .unwrap();
        assert_eq!(output, "print(1)");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = registry
            .invoke("execute_python_code", &args(json!({"code": "import os", "timeout": 5})))
            .await
            .expect_err("blocked");
        assert!(matches!(
            err,
            ToolError::Sandbox {
                source: SandboxError::BlockedModuleImport { ref module },
                ..
            } if module == "os"
        ));
    }

    #[test]
    fn duplicate_and_unresolvable_registrations_fail() {
        let (_, mut registry) = counting_registry();
        let err = registry.register(search_definition()).expect_err("duplicate");
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "ddg_search"));

        let web = ToolDefinition::builder("get_web_page", "tools.web_functions.get_web_page", FunctionType::Web)
            .unwrap()
            .build()
            .unwrap();
        let err = registry.register(web).expect_err("unbound target");
        assert!(matches!(
            err,
            ToolError::UnresolvableTarget { ref target, .. } if target == "tools.web_functions.get_web_page"
        ));
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let (_, registry) = counting_registry();
        let err = registry
            .invoke("fake_tool", &Map::new())
            .await
            .expect_err("unknown tool should error");

        assert!(matches!(err, ToolError::UnknownTool { name } if name == "fake_tool"));
    }

    #[test]
    fn lists_tools_by_type() {
        let (_, registry) = counting_registry();
        assert_eq!(registry.names(), ["ddg_search", "execute_python_code"]);
        assert_eq!(registry.tools_by_type(FunctionType::Code), ["execute_python_code"]);
        assert!(registry.tools_by_type(FunctionType::File).is_empty());
        assert_eq!(registry.definitions()[0].name(), "ddg_search");
    }

    #[test]
    fn target_table_rejects_duplicate_bindings() {
        let mut table = TargetTable::new();
        table
            .bind("tools.echo", |args: ToolArguments| async move {
                Ok::<_, anyhow::Error>(args.len().to_string())
            })
            .unwrap();
        let err = table
            .bind("tools.echo", |_: ToolArguments| async { Ok::<_, anyhow::Error>(String::new()) })
            .expect_err("duplicate");
        assert!(matches!(err, ToolError::DuplicateTarget { path } if path == "tools.echo"));
        assert_eq!(table.paths(), ["tools.echo"]);
    }
}
