//! Startup assembly of a [`Dispatcher`] from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_config::{ConfigDocuments, Definitions, RuntimeSettings};
use agent_policy::{CapabilityMatcher, RateLimiter};
use agent_tools::builtin::builtin_targets;
use agent_tools::registry::{TargetTable, Tool, ToolRegistry};
use agent_tools::runner::PythonRunner;
use agent_tools::sandbox::{CodeRunner, SandboxConfig, SandboxedExecutor};
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::error::LoadResult;
use crate::observer::{DispatchObserver, TracingDispatchObserver};

/// Builder assembling a [`Dispatcher`].
///
/// Every load-time check runs in [`RuntimeBuilder::build`]; a builder that
/// builds successfully yields a dispatcher whose tables are consistent.
pub struct RuntimeBuilder {
    definitions: Definitions,
    targets: TargetTable,
    settings: RuntimeSettings,
    runner: Option<Arc<dyn CodeRunner>>,
    observer: Option<Arc<dyn DispatchObserver>>,
}

impl RuntimeBuilder {
    /// Starts from already validated definitions.
    #[must_use]
    pub fn new(definitions: Definitions) -> Self {
        Self {
            definitions,
            targets: TargetTable::new(),
            settings: RuntimeSettings::default(),
            runner: None,
            observer: None,
        }
    }

    /// Starts from parsed configuration documents.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoadError::Config`] when an entry fails validation.
    pub fn from_config(documents: ConfigDocuments) -> LoadResult<Self> {
        Ok(Self::new(documents.into_definitions()?))
    }

    /// Starts from YAML configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoadError::Config`] when a file cannot be read,
    /// parsed or validated.
    pub fn from_yaml_files<I, P>(paths: I) -> LoadResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::from_config(ConfigDocuments::from_yaml_files(paths)?)
    }

    /// Adds target bindings. Later bindings replace earlier ones and the
    /// built-in targets.
    #[must_use]
    pub fn targets(mut self, targets: TargetTable) -> Self {
        self.targets = self.targets.merge(targets);
        self
    }

    /// Binds a single target.
    #[must_use]
    pub fn target<T>(mut self, path: impl Into<String>, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.targets = self.targets.with(path, tool);
        self
    }

    /// Replaces the runtime settings.
    #[must_use]
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the interpreter-backed code runner.
    #[must_use]
    pub fn code_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the dispatch observer. Defaults to [`TracingDispatchObserver`].
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Registers every tool, resolves every agent and returns the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoadError`] for invalid settings, duplicate or
    /// unresolvable tools, and unresolved capability references.
    pub fn build(self) -> LoadResult<Dispatcher> {
        let Self {
            definitions,
            targets,
            settings,
            runner,
            observer,
        } = self;
        settings.validate()?;

        let runner = runner.unwrap_or_else(|| {
            Arc::new(PythonRunner::new(&settings.sandbox.interpreter)) as Arc<dyn CodeRunner>
        });
        let sandbox = SandboxedExecutor::new(
            runner,
            SandboxConfig {
                default_timeout: Duration::from_secs(settings.sandbox.default_timeout_secs),
                max_timeout: Duration::from_secs(settings.sandbox.max_timeout_secs),
                max_output_bytes: settings.sandbox.max_output_bytes,
            },
        );

        let mut tools = ToolRegistry::new(builtin_targets().merge(targets), sandbox);
        for definition in definitions.tools {
            tools.register(definition)?;
        }

        let matcher = CapabilityMatcher::new(
            definitions.capabilities,
            definitions.agents,
            tools.function_types(),
        )?;

        let limiter = settings
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(settings.rate_limit.limit(), settings.rate_limit.scope));

        info!(
            tools = tools.names().len(),
            capabilities = matcher.capabilities().len(),
            agents = matcher.agents().len(),
            rate_limited = limiter.is_some(),
            "dispatcher ready"
        );

        Ok(Dispatcher::new(
            tools,
            matcher,
            limiter,
            observer.unwrap_or_else(|| Arc::new(TracingDispatchObserver) as Arc<dyn DispatchObserver>),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_config::RateLimitSettings;
    use agent_primitives::ToolArguments;
    use agent_tools::sandbox::{CodeJob, SandboxOutput, SandboxResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::dispatch::SharedDispatcher;
    use crate::error::{DispatchError, LoadError};
    use crate::observer::DispatchRecord;

    const CONFIG: &str = r"
tools:
  ddg_search:
    function: tools.search_functions.ddg_search
    function_type: search
    parameters:
      topic: {type: string, required: true}
      max_results: {type: integer, default: 5}
  execute_python_code:
    function: tools.code_functions.execute_python_code
    function_type: code
    parameters:
      code: {type: string, required: true}
      timeout: {type: integer, default: 30}
    validation:
      allowed_modules: [math]
      blocked_modules: [os]
capabilities:
  information_retrieval:
    function_types: [search, web]
  code_execution:
    function_types: [code]
agents:
  SearchAgent:
    capabilities: [information_retrieval]
  ChatAgent:
    capabilities: [information_retrieval, code_execution]
";

    struct ResultRunner;

    #[async_trait]
    impl CodeRunner for ResultRunner {
        async fn run(&self, _job: CodeJob) -> SandboxResult<SandboxOutput> {
            Ok(SandboxOutput {
                stdout: String::new(),
                result: Some("2".into()),
                truncated: false,
            })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        codes: Mutex<Vec<&'static str>>,
    }

    impl DispatchObserver for RecordingObserver {
        fn on_dispatch(&self, record: &DispatchRecord<'_>) {
            let code = record.outcome.map_or_else(DispatchError::code, |_| "ok");
            self.codes.lock().expect("observer poisoned").push(code);
        }
    }

    fn builder(calls: Arc<AtomicUsize>) -> RuntimeBuilder {
        RuntimeBuilder::from_config(ConfigDocuments::from_yaml_str(CONFIG).unwrap())
            .unwrap()
            .target(
                "tools.search_functions.ddg_search",
                move |args: ToolArguments| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(format!(
                            "results for {}",
                            args.get_str("topic").unwrap_or_default()
                        ))
                    }
                },
            )
            .code_runner(Arc::new(ResultRunner))
    }

    fn args(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn authorized_call_reaches_target() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = builder(calls.clone()).build().unwrap();

        let output = dispatcher
            .dispatch("SearchAgent", "ddg_search", &args(json!({"topic": "rust"})))
            .await
            .unwrap();

        assert_eq!(output, "results for rust");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn denial_never_reaches_registry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = builder(calls.clone()).build().unwrap();

        let err = dispatcher
            .dispatch("SearchAgent", "execute_python_code", &args(json!({"code": "1"})))
            .await
            .expect_err("denied");
        assert_eq!(
            err,
            DispatchError::AuthorizationDenied {
                agent: "SearchAgent".into(),
                tool: "execute_python_code".into(),
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn checks_run_in_order() {
        let dispatcher = builder(Arc::new(AtomicUsize::new(0))).build().unwrap();

        let unknown_tool = dispatcher
            .dispatch("Nobody", "fake_tool", &serde_json::Map::new())
            .await
            .expect_err("unknown tool first");
        assert_eq!(unknown_tool.code(), "unknown_tool");

        let unknown_agent = dispatcher
            .dispatch("Nobody", "ddg_search", &serde_json::Map::new())
            .await
            .expect_err("unknown agent");
        assert_eq!(unknown_agent.code(), "unknown_agent");

        let missing = dispatcher
            .dispatch("ChatAgent", "ddg_search", &serde_json::Map::new())
            .await
            .expect_err("missing topic");
        assert_eq!(missing.code(), "missing_required_parameter");
    }

    #[tokio::test]
    async fn code_tools_use_configured_runner() {
        let dispatcher = builder(Arc::new(AtomicUsize::new(0))).build().unwrap();
        let output = dispatcher
            .dispatch("ChatAgent", "execute_python_code", &args(json!({"code": "result = 1 + 1"})))
            .await
            .unwrap();
        assert_eq!(output, "2");

        let err = dispatcher
            .dispatch("ChatAgent", "execute_python_code", &args(json!({"code": "import os.path"})))
            .await
            .expect_err("blocked");
        assert_eq!(
            err,
            DispatchError::BlockedModuleImport {
                tool: "execute_python_code".into(),
                module: "os.path".into(),
            }
        );
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_anything_else() {
        let settings = RuntimeSettings {
            rate_limit: RateLimitSettings {
                max_requests_per_minute: 1,
                ..RateLimitSettings::default()
            },
            ..RuntimeSettings::default()
        };
        let dispatcher = builder(Arc::new(AtomicUsize::new(0)))
            .settings(settings)
            .build()
            .unwrap();

        dispatcher
            .dispatch("SearchAgent", "ddg_search", &args(json!({"topic": "a"})))
            .await
            .unwrap();
        let err = dispatcher
            .dispatch("SearchAgent", "fake_tool", &serde_json::Map::new())
            .await
            .expect_err("limited");
        assert!(matches!(err, DispatchError::RateLimitExceeded { ref agent, .. } if agent == "SearchAgent"));

        let other = dispatcher
            .dispatch("ChatAgent", "ddg_search", &args(json!({"topic": "b"})))
            .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn unknown_agents_share_one_window() {
        let settings = RuntimeSettings {
            rate_limit: RateLimitSettings {
                max_requests_per_minute: 1,
                ..RateLimitSettings::default()
            },
            ..RuntimeSettings::default()
        };
        let dispatcher = builder(Arc::new(AtomicUsize::new(0)))
            .settings(settings)
            .build()
            .unwrap();

        let first = dispatcher
            .dispatch("Ghost-1", "ddg_search", &args(json!({"topic": "a"})))
            .await
            .expect_err("unknown agent");
        assert_eq!(first.code(), "unknown_agent");

        for ghost in ["Ghost-2", "Ghost-3"] {
            let err = dispatcher
                .dispatch(ghost, "fake_tool", &serde_json::Map::new())
                .await
                .expect_err("shared window is spent");
            assert!(matches!(err, DispatchError::RateLimitExceeded { ref agent, .. } if agent == ghost));
        }

        let limiter = dispatcher.rate_limiter().unwrap();
        assert_eq!(limiter.remaining("Ghost-2"), 1);
        assert_eq!(limiter.remaining(agent_policy::UNKNOWN_CALLER), 0);
        assert!(dispatcher
            .dispatch("SearchAgent", "ddg_search", &args(json!({"topic": "b"})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn observer_sees_every_outcome() {
        let observer = Arc::new(RecordingObserver::default());
        let dispatcher = builder(Arc::new(AtomicUsize::new(0)))
            .observer(observer.clone())
            .build()
            .unwrap();

        let _ = dispatcher
            .dispatch("SearchAgent", "ddg_search", &args(json!({"topic": "a"})))
            .await;
        let _ = dispatcher
            .dispatch("SearchAgent", "execute_python_code", &args(json!({"code": "1"})))
            .await;

        let codes = observer.codes.lock().expect("observer poisoned").clone();
        assert_eq!(codes, ["ok", "authorization_denied"]);
    }

    #[test]
    fn unbound_target_fails_to_build() {
        let err = RuntimeBuilder::from_config(ConfigDocuments::from_yaml_str(CONFIG).unwrap())
            .unwrap()
            .build()
            .expect_err("ddg_search has no target");
        assert!(matches!(err, LoadError::Tool(_)));
    }

    #[test]
    fn unresolved_capability_fails_to_build() {
        let config = format!("{CONFIG}  CodeAgent:\n    capabilities: [teleportation]\n");
        let err = builder(Arc::new(AtomicUsize::new(0)))
            .definitions_from(&config)
            .build()
            .expect_err("unknown capability");
        assert!(matches!(err, LoadError::Policy(_)));
    }

    #[tokio::test]
    async fn reload_swaps_dispatcher() {
        let shared = SharedDispatcher::new(builder(Arc::new(AtomicUsize::new(0))).build().unwrap());
        let before = shared.current();

        let replacement = RuntimeBuilder::from_config(
            ConfigDocuments::from_yaml_str(
                "capabilities:\n  c:\n    function_types: [file]\nagents:\n  FileAgent:\n    capabilities: [c]\n",
            )
            .unwrap(),
        )
        .unwrap()
        .code_runner(Arc::new(ResultRunner))
        .build()
        .unwrap();
        let previous = shared.reload(replacement);

        assert!(Arc::ptr_eq(&before, &previous));
        let err = shared
            .dispatch("SearchAgent", "ddg_search", &args(json!({"topic": "a"})))
            .await
            .expect_err("old tool gone");
        assert_eq!(err.code(), "unknown_tool");
        assert!(shared.current().authorized_tools("FileAgent").unwrap().is_empty());
    }

    impl RuntimeBuilder {
        fn definitions_from(mut self, yaml: &str) -> Self {
            self.definitions = ConfigDocuments::from_yaml_str(yaml)
                .unwrap()
                .into_definitions()
                .unwrap();
            self
        }
    }
}
