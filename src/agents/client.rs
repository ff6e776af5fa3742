//! Outbound client for calling other task protocol servers.
//!
//! Connect and read timeouts are independent: generation can legitimately
//! take minutes, but a TCP handshake that hangs for more than thirty
//! seconds means the agent is down.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::OnceCell;

use crate::error::ClientError;
use crate::protocol::{AgentCard, Task};

/// TCP connect budget, independent of how slow generation is.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Short timeout for the card route; discovery must be cheap.
const CARD_TIMEOUT_SECS: u64 = 10;

/// Client bound to one remote agent.
pub struct AgentClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
    card: OnceCell<AgentCard>,
}

impl AgentClient {
    /// Creates a client for the agent at `base_url`.
    ///
    /// The read timeout is set per call; only the connect timeout is fixed
    /// here.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
            card: OnceCell::new(),
        })
    }

    /// Logical agent name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// Fetches (and caches) the agent's capability card.
    pub async fn fetch_card(&self) -> Result<&AgentCard, ClientError> {
        self.card
            .get_or_try_init(|| async {
                let response = self
                    .http
                    .get(format!("{}/card", self.base_url))
                    .timeout(Duration::from_secs(CARD_TIMEOUT_SECS))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(ClientError::BadStatus {
                        name: self.name.clone(),
                        status: response.status().as_u16(),
                    });
                }
                Ok(response.json::<AgentCard>().await?)
            })
            .await
    }

    /// Submits one task and waits for the full task record.
    ///
    /// `read_timeout` covers the whole exchange and is set by the caller up
    /// to the orchestration-level ceiling.
    pub async fn send_task(
        &self,
        message: &str,
        read_timeout: Duration,
    ) -> Result<Task, ClientError> {
        let payload = json!({
            "message": {
                "role": "user",
                "parts": [{"type": "text", "text": message}],
            }
        });

        let response = self
            .with_auth(self.http.post(format!("{}/tasks", self.base_url)))
            .timeout(read_timeout)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::BadStatus {
                name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<Task>().await?)
    }

    /// Fetches a task record by id.
    pub async fn get_task(&self, task_id: &str, read_timeout: Duration) -> Result<Task, ClientError> {
        let response = self
            .with_auth(
                self.http
                    .get(format!("{}/tasks/{}", self.base_url, task_id)),
            )
            .timeout(read_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::BadStatus {
                name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<Task>().await?)
    }

    /// Advisory cancel.
    pub async fn cancel_task(
        &self,
        task_id: &str,
        read_timeout: Duration,
    ) -> Result<Task, ClientError> {
        let response = self
            .with_auth(
                self.http
                    .post(format!("{}/tasks/{}/cancel", self.base_url, task_id)),
            )
            .timeout(read_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::BadStatus {
                name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.json::<Task>().await?)
    }
}

/// Pulls the agent's text output from a task record.
///
/// Artifacts are checked first, then the status message: the artifact is
/// the authoritative output, the status message a convenience copy.
pub fn extract_output(task: &Task) -> Option<String> {
    for artifact in &task.artifacts {
        if let Some(text) = artifact.first_text() {
            return Some(text.to_string());
        }
    }
    task.status.message.as_ref().and_then(|m| {
        let text = m.joined_text();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Artifact, Message, Task, TaskState, TaskStatus};

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = AgentClient::new("reviewer", "http://localhost:8104/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8104");
    }

    #[test]
    fn test_extract_output_prefers_artifact() {
        let mut task = Task::working("t", None, Message::user("q"));
        task.status = TaskStatus::with_message(TaskState::Completed, Message::agent("status copy"));
        task.artifacts.push(Artifact::text("response", "artifact text"));

        assert_eq!(extract_output(&task).as_deref(), Some("artifact text"));
    }

    #[test]
    fn test_extract_output_falls_back_to_status_message() {
        let mut task = Task::working("t", None, Message::user("q"));
        task.status = TaskStatus::with_message(TaskState::Failed, Message::agent("Error: boom"));

        assert_eq!(extract_output(&task).as_deref(), Some("Error: boom"));
    }

    #[test]
    fn test_extract_output_none_when_empty() {
        let task = Task::working("t", None, Message::user("q"));
        assert!(extract_output(&task).is_none());
    }
}
