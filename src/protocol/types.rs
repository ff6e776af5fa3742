//! Wire model for the agent task protocol.
//!
//! Types mirror the JSON schema exchanged between agents: a `Task` is a unit
//! of submitted work with a tracked lifecycle, `Message`s carry the
//! conversation, `Part`s are the smallest content unit, and `Artifact`s hold
//! named outputs of a completed task.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Cancelled,
    InputRequired,
}

impl TaskState {
    /// Returns true once the task can no longer change state.
    ///
    /// Terminal records are immutable; the only transition out of a live
    /// state besides completion is the explicit working -> cancelled one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Submitted => write!(f, "submitted"),
            TaskState::Working => write!(f, "working"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Cancelled => write!(f, "cancelled"),
            TaskState::InputRequired => write!(f, "input_required"),
        }
    }
}

/// Smallest content unit: exactly one variant per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    File { file: serde_json::Value },
    Data { data: serde_json::Value },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Returns the text content if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

/// One turn of the conversation attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender: "user" or "agent".
    pub role: String,
    /// Ordered content parts.
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// Create an agent message with a single text part.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: "agent".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenates all text parts, one per line.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Current status of a task: state plus an optional explanatory message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl TaskStatus {
    /// Status with no message.
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    /// Status carrying an agent message.
    pub fn with_message(state: TaskState, message: Message) -> Self {
        Self {
            state,
            message: Some(message),
        }
    }
}

/// A named, typed output attached to a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parts: Vec<Part>,
}

impl Artifact {
    /// Create a named artifact with a single text part.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            parts: vec![Part::text(text)],
        }
    }

    /// First non-empty text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .find(|t| !t.is_empty())
    }
}

/// A unit of submitted work with a tracked lifecycle and recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Task {
    /// Creates a new task in the `working` state with the submitted message
    /// as the first history entry.
    pub fn working(id: impl Into<String>, context_id: Option<String>, message: Message) -> Self {
        Self {
            id: id.into(),
            context_id,
            status: TaskStatus::new(TaskState::Working),
            history: vec![message],
            artifacts: Vec::new(),
        }
    }

    /// Transitions the task to `completed`, capturing the worker output both
    /// as the status message and as a named artifact.
    pub fn complete(&mut self, artifact_name: &str, output: impl Into<String>) {
        let output = output.into();
        self.status = TaskStatus::with_message(TaskState::Completed, Message::agent(&output));
        self.artifacts.push(Artifact::text(artifact_name, output));
    }

    /// Transitions the task to `failed` with the error text.
    pub fn fail(&mut self, error: impl std::fmt::Display) {
        self.status = TaskStatus::with_message(
            TaskState::Failed,
            Message::agent(format!("Error: {}", error)),
        );
    }
}

/// Request body for task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSendRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub message: Message,
}

/// A single advertised skill on an agent card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Public capability descriptor served by every agent without auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    /// Card with the fixed capability flags this crate supports.
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: serde_json::json!({
                "streaming": false,
                "pushNotifications": false,
            }),
            skills: Vec::new(),
        }
    }

    /// Builder method to add a skill.
    pub fn with_skill(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.skills.push(AgentSkill {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Working.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
    }

    #[test]
    fn test_task_state_serde_names() {
        assert_eq!(
            serde_json::to_string(&TaskState::InputRequired).unwrap(),
            "\"input_required\""
        );
        assert_eq!(
            serde_json::to_string(&TaskState::Working).unwrap(),
            "\"working\""
        );
    }

    #[test]
    fn test_part_tagged_union() {
        let json = r#"{"type": "text", "text": "hello"}"#;
        let part: Part = serde_json::from_str(json).unwrap();
        assert_eq!(part.as_text(), Some("hello"));

        let json = r#"{"type": "data", "data": {"k": 1}}"#;
        let part: Part = serde_json::from_str(json).unwrap();
        assert!(part.as_text().is_none());
    }

    #[test]
    fn test_message_joined_text() {
        let msg = Message {
            role: "user".to_string(),
            parts: vec![
                Part::text("line one"),
                Part::Data {
                    data: serde_json::json!({}),
                },
                Part::text("line two"),
            ],
        };
        assert_eq!(msg.joined_text(), "line one\nline two");
    }

    #[test]
    fn test_task_complete_captures_output_twice() {
        let mut task = Task::working("t-1", None, Message::user("ping"));
        task.complete("response", "pong");

        assert_eq!(task.status.state, TaskState::Completed);
        let status_text = task.status.message.as_ref().unwrap().joined_text();
        assert_eq!(status_text, "pong");

        assert_eq!(task.artifacts.len(), 1);
        assert_eq!(task.artifacts[0].name.as_deref(), Some("response"));
        assert_eq!(task.artifacts[0].first_text(), Some("pong"));
    }

    #[test]
    fn test_task_fail_captures_error() {
        let mut task = Task::working("t-2", None, Message::user("ping"));
        task.fail("boom");
        assert_eq!(task.status.state, TaskState::Failed);
        assert!(task
            .status
            .message
            .as_ref()
            .unwrap()
            .joined_text()
            .contains("boom"));
        assert!(task.artifacts.is_empty());
    }

    #[test]
    fn test_context_id_wire_name() {
        let task = Task::working("t-3", Some("ctx-9".to_string()), Message::user("hi"));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["contextId"], "ctx-9");

        let req: TaskSendRequest =
            serde_json::from_str(r#"{"contextId": "c", "message": {"role": "user", "parts": []}}"#)
                .unwrap();
        assert_eq!(req.context_id.as_deref(), Some("c"));
    }
}
