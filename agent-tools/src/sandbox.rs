//! Policy sandbox for code-execution tools.
//!
//! Each execution is checked statically against the tool's
//! [`ModulePolicy`], then handed to a [`CodeRunner`] under a wall-clock
//! timeout. Runners execute in an isolated unit (the default
//! [`PythonRunner`](crate::runner::PythonRunner) spawns a fresh interpreter
//! process per call) so dropping the run future on timeout reclaims it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_primitives::{ModulePolicy, ModuleVerdict};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::imports::scan_imports;

/// Message returned when code completes without output or a `result` binding.
pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully (no output)";

const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Result alias for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors produced by sandboxed execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The code imports a module on the deny list.
    #[error("import of blocked module `{module}`")]
    BlockedModuleImport {
        /// Offending module.
        module: String,
    },

    /// The code imports a module outside a non-empty allow list.
    #[error("module `{module}` is not in the allowed modules")]
    ModuleNotAllowed {
        /// Offending module.
        module: String,
    },

    /// Execution did not finish before the deadline.
    #[error("execution exceeded timeout of {}s", timeout.as_secs())]
    ExecutionTimeout {
        /// Effective timeout.
        timeout: Duration,
    },

    /// The executed code raised an error.
    #[error("code raised an error: {message}")]
    CodeRuntimeError {
        /// Error text reported by the interpreter.
        message: String,
    },

    /// The execution unit could not be started or spoke garbage.
    #[error("sandbox unavailable: {reason}")]
    Unavailable {
        /// Human-readable reason.
        reason: String,
    },
}

/// States an individual execution moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Request accepted, nothing run yet.
    Idle,
    /// Code is executing in the runner.
    Running,
    /// Code finished normally.
    Completed,
    /// Deadline elapsed; the runner was torn down.
    TimedOut,
    /// An import was rejected by policy.
    ImportViolation,
    /// The code raised, or the runner failed.
    RuntimeFault,
}

impl SandboxState {
    /// Returns `true` for states no execution leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    /// Terminal state reached by a failed execution.
    #[must_use]
    pub const fn from_error(error: &SandboxError) -> Self {
        match error {
            SandboxError::BlockedModuleImport { .. } | SandboxError::ModuleNotAllowed { .. } => {
                Self::ImportViolation
            }
            SandboxError::ExecutionTimeout { .. } => Self::TimedOut,
            SandboxError::CodeRuntimeError { .. } | SandboxError::Unavailable { .. } => {
                Self::RuntimeFault
            }
        }
    }
}

/// Work handed to a [`CodeRunner`].
#[derive(Debug, Clone)]
pub struct CodeJob {
    /// Source text, already trimmed.
    pub code: String,
    /// Policy the runner must enforce on imports it observes at run time.
    pub policy: ModulePolicy,
}

/// Captured result of a completed execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SandboxOutput {
    /// Text written to standard output.
    pub stdout: String,
    /// Rendered value of the `result` binding, if the code set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Whether `stdout` was cut to the configured limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl SandboxOutput {
    /// Renders the output as the tool's textual result.
    #[must_use]
    pub fn render(&self) -> String {
        let stdout = self.stdout.trim_end();
        match (stdout.is_empty(), self.result.as_deref()) {
            (true, None) => NO_OUTPUT_MESSAGE.to_owned(),
            (true, Some(result)) => result.to_owned(),
            (false, None) => stdout.to_owned(),
            (false, Some(result)) => format!("{stdout}\nresult: {result}"),
        }
    }

    fn truncate(&mut self, max_bytes: usize) {
        if self.stdout.len() <= max_bytes {
            return;
        }
        let mut cut = max_bytes;
        while !self.stdout.is_char_boundary(cut) {
            cut -= 1;
        }
        self.stdout.truncate(cut);
        self.stdout.push_str(TRUNCATION_MARKER);
        self.truncated = true;
    }
}

/// Executes code in an isolated unit.
///
/// Implementations must release every resource they hold when the returned
/// future is dropped; the executor drops it when the timeout elapses.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Runs the job to completion.
    async fn run(&self, job: CodeJob) -> SandboxResult<SandboxOutput>;
}

/// Limits applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Timeout used when the call does not supply one.
    pub default_timeout: Duration,
    /// Upper bound for caller-supplied timeouts.
    pub max_timeout: Duration,
    /// Maximum captured stdout size in bytes.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(300),
            max_output_bytes: 64 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Returns the effective timeout for a requested value in seconds.
    #[must_use]
    pub fn effective_timeout(&self, requested_secs: Option<i64>) -> Duration {
        let Some(secs) = requested_secs else {
            return self.default_timeout.min(self.max_timeout);
        };
        let secs = u64::try_from(secs.max(1)).unwrap_or(1);
        Duration::from_secs(secs).min(self.max_timeout)
    }
}

/// Runs code under an import policy and a timeout.
#[derive(Clone)]
pub struct SandboxedExecutor {
    runner: Arc<dyn CodeRunner>,
    config: SandboxConfig,
}

impl fmt::Debug for SandboxedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxedExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxedExecutor {
    /// Creates an executor backed by the supplied runner.
    #[must_use]
    pub fn new(runner: Arc<dyn CodeRunner>, config: SandboxConfig) -> Self {
        Self { runner, config }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Executes `code`, returning the captured output.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::BlockedModuleImport`] or
    /// [`SandboxError::ModuleNotAllowed`] for policy violations,
    /// [`SandboxError::ExecutionTimeout`] when the deadline elapses, and
    /// [`SandboxError::CodeRuntimeError`] when the code itself fails.
    pub async fn execute(
        &self,
        code: &str,
        timeout_secs: Option<i64>,
        policy: &ModulePolicy,
    ) -> SandboxResult<SandboxOutput> {
        let timeout = self.config.effective_timeout(timeout_secs);
        debug!(state = ?SandboxState::Running, ?timeout, "sandbox execution started");
        let outcome = self.run_checked(code.trim(), timeout, policy).await;

        let state = match &outcome {
            Ok(_) => SandboxState::Completed,
            Err(err) => SandboxState::from_error(err),
        };
        debug_assert!(state.is_terminal(), "execution settled in {state:?}");
        match &outcome {
            Ok(output) => debug!(?state, truncated = output.truncated, "sandbox execution finished"),
            Err(err) => warn!(?state, error = %err, "sandbox execution failed"),
        }

        outcome
    }

    async fn run_checked(
        &self,
        code: &str,
        timeout: Duration,
        policy: &ModulePolicy,
    ) -> SandboxResult<SandboxOutput> {
        debug!(state = ?SandboxState::Idle, timeout_secs = timeout.as_secs(), "sandbox job accepted");
        check_imports(&scan_imports(code), policy)?;

        debug!(state = ?SandboxState::Running, "sandbox job started");
        let job = CodeJob {
            code: code.to_owned(),
            policy: policy.clone(),
        };

        // Dropping the runner future on elapse tears the execution unit down.
        let mut output = tokio::time::timeout(timeout, self.runner.run(job))
            .await
            .map_err(|_| SandboxError::ExecutionTimeout { timeout })??;

        output.truncate(self.config.max_output_bytes);
        Ok(output)
    }
}

/// Checks statically discovered imports against `policy`.
///
/// Every module is checked against the deny list before any allow-list
/// check, so a blocked import is reported even when an earlier import is
/// merely not allowed.
///
/// # Errors
///
/// Returns [`SandboxError::BlockedModuleImport`] or
/// [`SandboxError::ModuleNotAllowed`].
pub fn check_imports(modules: &[String], policy: &ModulePolicy) -> SandboxResult<()> {
    if let Some(module) = modules.iter().find(|module| policy.is_blocked(module)) {
        return Err(SandboxError::BlockedModuleImport {
            module: module.clone(),
        });
    }

    if let Some(module) = modules
        .iter()
        .find(|module| policy.verdict(module) == ModuleVerdict::NotAllowed)
    {
        return Err(SandboxError::ModuleNotAllowed {
            module: module.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct RecordingRunner {
        calls: AtomicUsize,
        output: SandboxOutput,
    }

    #[async_trait]
    impl CodeRunner for RecordingRunner {
        async fn run(&self, _job: CodeJob) -> SandboxResult<SandboxOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    struct SlowRunner {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CodeRunner for SlowRunner {
        async fn run(&self, _job: CodeJob) -> SandboxResult<SandboxOutput> {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(SandboxOutput::default())
        }
    }

    fn policy() -> ModulePolicy {
        ModulePolicy::new(["pandas", "numpy", "os"], ["os", "subprocess", "sys"])
    }

    fn recording(output: SandboxOutput) -> (Arc<RecordingRunner>, SandboxedExecutor) {
        let runner = Arc::new(RecordingRunner {
            calls: AtomicUsize::new(0),
            output,
        });
        let executor = SandboxedExecutor::new(runner.clone(), SandboxConfig::default());
        (runner, executor)
    }

    #[tokio::test]
    async fn blocked_module_fails_before_running() {
        let (runner, executor) = recording(SandboxOutput::default());
        let err = executor
            .execute("import os", Some(5), &policy())
            .await
            .expect_err("blocked");

        assert_eq!(err, SandboxError::BlockedModuleImport { module: "os".into() });
        assert_eq!(SandboxState::from_error(&err), SandboxState::ImportViolation);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blocked_wins_over_earlier_not_allowed_import() {
        let (_, executor) = recording(SandboxOutput::default());
        let err = executor
            .execute("import requests\nimport subprocess", None, &policy())
            .await
            .expect_err("violation");

        assert_eq!(
            err,
            SandboxError::BlockedModuleImport {
                module: "subprocess".into()
            }
        );
    }

    #[tokio::test]
    async fn module_outside_allow_list_is_rejected() {
        let (_, executor) = recording(SandboxOutput::default());
        let err = executor
            .execute("from requests import get", None, &policy())
            .await
            .expect_err("not allowed");

        assert_eq!(err, SandboxError::ModuleNotAllowed { module: "requests".into() });
    }

    #[tokio::test]
    async fn allowed_code_reaches_runner() {
        let (runner, executor) = recording(SandboxOutput {
            stdout: String::new(),
            result: Some("2".into()),
            truncated: false,
        });
        let output = executor
            .execute("  import pandas as pd; result = 1+1  ", Some(5), &policy())
            .await
            .unwrap();

        assert_eq!(output.render(), "2");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_stops_execution() {
        let finished = Arc::new(AtomicBool::new(false));
        let executor = SandboxedExecutor::new(
            Arc::new(SlowRunner {
                finished: finished.clone(),
            }),
            SandboxConfig::default(),
        );

        let err = executor
            .execute("while True: pass", Some(1), &ModulePolicy::default())
            .await
            .expect_err("timeout");
        assert_eq!(
            err,
            SandboxError::ExecutionTimeout {
                timeout: Duration::from_secs(1)
            }
        );

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!finished.load(Ordering::SeqCst), "runner kept going after timeout");
    }

    #[tokio::test]
    async fn output_is_truncated_to_limit() {
        let runner = Arc::new(RecordingRunner {
            calls: AtomicUsize::new(0),
            output: SandboxOutput {
                stdout: "é".repeat(20),
                result: None,
                truncated: false,
            },
        });
        let config = SandboxConfig {
            max_output_bytes: 5,
            ..SandboxConfig::default()
        };
        let executor = SandboxedExecutor::new(runner, config);
        let output = executor
            .execute("print('x')", None, &ModulePolicy::default())
            .await
            .unwrap();

        assert!(output.truncated);
        assert!(output.stdout.starts_with("éé"));
        assert!(output.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn effective_timeout_is_clamped() {
        let config = SandboxConfig::default();
        assert_eq!(config.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(config.effective_timeout(Some(0)), Duration::from_secs(1));
        assert_eq!(config.effective_timeout(Some(-3)), Duration::from_secs(1));
        assert_eq!(config.effective_timeout(Some(10_000)), Duration::from_secs(300));
    }

    #[test]
    fn render_combines_output_and_result() {
        assert_eq!(SandboxOutput::default().render(), NO_OUTPUT_MESSAGE);
        let output = SandboxOutput {
            stdout: "hello\n".into(),
            result: Some("42".into()),
            truncated: false,
        };
        assert_eq!(output.render(), "hello\nresult: 42");
        assert!(SandboxState::TimedOut.is_terminal());
        assert!(!SandboxState::Running.is_terminal());
    }
}
