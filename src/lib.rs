//! scriptforge: multi-agent script production over a small task protocol.
//!
//! This library provides task-protocol agent servers (submit / track /
//! cancel with a security middleware chain) and a score-gated orchestration
//! engine that sequences collect, generate, review and improve phases
//! across a fleet of such servers.

// Core modules
pub mod agents;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod state;
pub mod worker;

// Re-export commonly used error types
pub use error::{ClientError, PipelineError, ProtocolError, StateError, WorkerError};
