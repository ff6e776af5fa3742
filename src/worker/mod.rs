//! Worker invocation adapter.
//!
//! Bridges one task request to a single invocation of the external
//! text-generation CLI. The invocation is wrapped in a bounded timeout and
//! every failure mode (non-zero exit, timeout, spawn failure) comes back as
//! a `WorkerError` value so the server can still build a well-formed
//! `failed` task record.
//!
//! Deterministic pre-fetch hooks may run before the worker; their output is
//! injected into the prompt context so the worker always receives required
//! data instead of being trusted to request it.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::WorkerError;

/// Default timeout for a single worker invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Upper timeout bound for orchestration entry points.
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// A deterministic, non-generative data-gathering step that runs before the
/// worker. Output is appended to the prompt context.
#[async_trait]
pub trait PrefetchHook: Send + Sync {
    /// Short name used in the injected context header and in logs.
    fn name(&self) -> &str;

    /// Gather data for the given prompt. Errors are logged and skipped;
    /// a hook failure never fails the task.
    async fn fetch(&self, prompt: &str) -> Result<String, WorkerError>;
}

/// Interface between the task server and the external generation process.
#[async_trait]
pub trait WorkerAdapter: Send + Sync {
    /// Execute one worker invocation for the given prompt.
    ///
    /// `role_context` is the agent's role definition, prepended to the
    /// prompt. Failures are returned as values, never panics.
    async fn execute(&self, prompt: &str, role_context: &str) -> Result<String, WorkerError>;
}

/// Configuration for the command-line worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Program to spawn (e.g. the generation CLI binary).
    pub program: String,
    /// Fixed arguments passed before the prompt.
    pub args: Vec<String>,
    /// Whether the prompt is passed on stdin instead of as an argument.
    pub prompt_on_stdin: bool,
    /// Invocation timeout.
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["-p".to_string()],
            prompt_on_stdin: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl WorkerConfig {
    /// Builder method to set the program.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Builder method to set the timeout, clamped to the orchestration
    /// ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(Duration::from_secs(MAX_TIMEOUT_SECS));
        self
    }

    /// Builder method to pass the prompt on stdin.
    pub fn with_prompt_on_stdin(mut self, on_stdin: bool) -> Self {
        self.prompt_on_stdin = on_stdin;
        self
    }
}

/// Worker adapter that spawns the external generation CLI as a subprocess.
pub struct CommandWorker {
    config: WorkerConfig,
    prefetch_hooks: Vec<Box<dyn PrefetchHook>>,
}

impl CommandWorker {
    /// Creates a worker with no pre-fetch hooks.
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            prefetch_hooks: Vec::new(),
        }
    }

    /// Adds a pre-fetch hook; hooks run in registration order.
    pub fn with_prefetch(mut self, hook: Box<dyn PrefetchHook>) -> Self {
        self.prefetch_hooks.push(hook);
        self
    }

    /// Runs all pre-fetch hooks and returns the joined context block, or an
    /// empty string when nothing was gathered.
    async fn run_prefetch(&self, prompt: &str) -> String {
        let mut sections = Vec::new();
        for hook in &self.prefetch_hooks {
            match hook.fetch(prompt).await {
                Ok(output) if !output.is_empty() => {
                    debug!(hook = hook.name(), bytes = output.len(), "prefetch ok");
                    sections.push(format!("## {}\n{}", hook.name(), output));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(hook = hook.name(), error = %e, "prefetch failed, skipping");
                }
            }
        }
        sections.join("\n\n")
    }

    /// Builds the full prompt from role context, pre-fetched data and the
    /// caller's request.
    fn assemble_prompt(role_context: &str, prefetched: &str, prompt: &str) -> String {
        let mut full = String::new();
        if !role_context.is_empty() {
            full.push_str("# Role\n");
            full.push_str(role_context);
            full.push_str("\n\n");
        }
        if !prefetched.is_empty() {
            full.push_str("# Reference data\n");
            full.push_str(prefetched);
            full.push_str("\n\n");
        }
        full.push_str("# Request\n");
        full.push_str(prompt);
        full
    }
}

#[async_trait]
impl WorkerAdapter for CommandWorker {
    async fn execute(&self, prompt: &str, role_context: &str) -> Result<String, WorkerError> {
        let prefetched = self.run_prefetch(prompt).await;
        let full_prompt = Self::assemble_prompt(role_context, &prefetched, prompt);

        let mut command = tokio::process::Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.config.prompt_on_stdin {
            command.stdin(Stdio::piped());
        } else {
            command.arg(&full_prompt);
            command.stdin(Stdio::null());
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| WorkerError::Spawn {
            program: self.config.program.clone(),
            message: e.to_string(),
        })?;

        // the stdin write shares the invocation deadline: a worker that never
        // drains its stdin would otherwise block us indefinitely once the
        // prompt exceeds the pipe buffer
        let stdin = child.stdin.take();
        let run = async {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(full_prompt.as_bytes()).await {
                    warn!(error = %e, "failed to write prompt to worker stdin");
                }
                // drop closes the pipe so the worker sees EOF
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.config.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the still-running process when the
                // consumed future is dropped here
                return Err(WorkerError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                });
            }
        };

        let duration = start.elapsed();
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(code, secs = duration.as_secs(), "worker exited non-zero");
            return Err(WorkerError::NonZeroExit { code, stderr });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(
            secs = duration.as_secs(),
            bytes = stdout.len(),
            "worker invocation complete"
        );
        Ok(stdout)
    }
}
