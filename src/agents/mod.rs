//! Outbound side of the task protocol: per-agent clients and the registry.

pub mod client;
pub mod registry;

pub use client::{extract_output, AgentClient};
pub use registry::{AgentRegistry, DiscoveryEntry};
