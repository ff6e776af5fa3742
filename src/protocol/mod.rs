//! Agent task protocol: wire types and request validation.

pub mod types;
pub mod validate;

pub use types::{
    AgentCard, AgentSkill, Artifact, Message, Part, Task, TaskSendRequest, TaskState, TaskStatus,
};
pub use validate::{check_dangerous_text, check_message, validate_task_id};
