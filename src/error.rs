//! Error types for scriptforge operations.
//!
//! Defines comprehensive error types for all major subsystems:
//! - Task protocol handling and request validation
//! - Worker process invocation
//! - Outbound agent calls
//! - Pipeline orchestration
//! - Local state persistence

use thiserror::Error;

/// Errors that can occur while handling a task-protocol request.
///
/// Each variant maps onto exactly one HTTP status at the server boundary;
/// anything not covered here surfaces as a 500.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid task id '{0}': must match ^[A-Za-z0-9_-]{{1,64}}$")]
    InvalidTaskId(String),

    #[error("Input rejected: {0}")]
    DangerousInput(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors that can occur while invoking the external worker process.
///
/// These are captured into `failed` task records and never propagate as
/// HTTP errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Worker exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Failed to spawn worker '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur on outbound calls to other agents.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Agent '{name}' returned status {status}")]
    BadStatus { name: String, status: u16 },

    #[error("Agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("Failed to parse agent response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that can occur during a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Daily quota exhausted: {used}/{limit} runs used")]
    QuotaExhausted { used: u32, limit: u32 },

    #[error("Phase '{phase}' failed: {message}")]
    PhaseFailed { phase: String, message: String },

    #[error("Agent call failed: {0}")]
    Agent(#[from] ClientError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::pipeline::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the local state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to create state directory: {0}")]
    DirectoryCreationFailed(String),
}
