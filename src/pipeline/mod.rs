//! Orchestration engine: configuration, score extraction, and the
//! phase-driven runner.

pub mod config;
pub mod runner;
pub mod score;

pub use config::{ConfigError, PipelineConfig};
pub use runner::{AgentCaller, PipelineRun, PipelineRunner, RegistryCaller, RunStatus};
pub use score::extract_score;
