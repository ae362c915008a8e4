//! Subprocess-backed [`CodeRunner`] for Python code tools.
//!
//! Each job runs in a fresh interpreter process started with a cleared
//! environment. The harness script installs a run-time import guard for the
//! sandbox namespace, executes the code with stdout captured, and prints a
//! single JSON report as the last line of its own stdout.
//!
//! The guard tracks which code objects came from the submitted source,
//! including strings the source later hands to `exec`, and applies the
//! policy to imports those make. Modules the source imported may load their
//! own helpers freely. The real importer lives in an audit hook, which the
//! sandboxed code cannot reach or remove.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::sandbox::{CodeJob, CodeRunner, SandboxError, SandboxOutput, SandboxResult};

const HARNESS: &str = include_str!("harness.py");

/// Environment variables inherited by the interpreter process.
const ALLOWED_ENV_VARS: &[&str] = &["HOME", "LANG", "LC_ALL", "LC_CTYPE", "TMPDIR"];

const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessReport {
    Completed {
        #[serde(default)]
        output: String,
        #[serde(default)]
        result: Option<String>,
    },
    Blocked {
        module: String,
    },
    NotAllowed {
        module: String,
    },
    Fault {
        message: String,
    },
}

/// Runs code with a Python interpreter in a child process.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    interpreter: PathBuf,
    args: Vec<String>,
}

impl Default for PythonRunner {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl PythonRunner {
    /// Creates a runner for the given interpreter, run in isolated mode.
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: vec!["-I".into()],
        }
    }

    /// Replaces the interpreter flags passed before the harness.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the interpreter path.
    #[must_use]
    pub fn interpreter(&self) -> &PathBuf {
        &self.interpreter
    }

    /// Returns `true` when the interpreter can be started.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg("-c")
            .arg(HARNESS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .kill_on_drop(true);

        for var in ALLOWED_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                cmd.env(var, value);
            }
        }
        cmd
    }
}

#[async_trait]
impl CodeRunner for PythonRunner {
    async fn run(&self, job: CodeJob) -> SandboxResult<SandboxOutput> {
        let request = json!({
            "code": job.code,
            "allowed": job.policy.allowed(),
            "blocked": job.policy.blocked(),
        })
        .to_string();

        let mut child = self.command().spawn().map_err(|err| SandboxError::Unavailable {
            reason: format!("failed to start {}: {err}", self.interpreter.display()),
        })?;
        debug!(interpreter = %self.interpreter.display(), pid = ?child.id(), "interpreter spawned");

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.as_bytes())
                .await
                .map_err(|err| SandboxError::Unavailable {
                    reason: format!("failed to send job to interpreter: {err}"),
                })?;
            if let Err(err) = stdin.shutdown().await {
                debug!(error = %err, "interpreter stdin already closed");
            }
        }

        // The child moves into this future, so dropping it on timeout kills it.
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| SandboxError::Unavailable {
                reason: format!("failed to collect interpreter output: {err}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(report) = last_report(&stdout) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::CodeRuntimeError {
                message: format!(
                    "interpreter exited ({}) without a report: {}",
                    output.status,
                    tail(stderr.trim(), STDERR_TAIL_BYTES)
                ),
            });
        };

        match report {
            HarnessReport::Completed { output, result } => Ok(SandboxOutput {
                stdout: output,
                result,
                truncated: false,
            }),
            HarnessReport::Blocked { module } => Err(SandboxError::BlockedModuleImport { module }),
            HarnessReport::NotAllowed { module } => Err(SandboxError::ModuleNotAllowed { module }),
            HarnessReport::Fault { message } => Err(SandboxError::CodeRuntimeError { message }),
        }
    }
}

fn last_report(stdout: &str) -> Option<HarnessReport> {
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
